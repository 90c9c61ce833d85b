//! FT_RWIPV6: 16-byte addresses in network order.  IPv4 flows are stored
//! as `::ffff:a.b.c.d`; bit 0x80 of the on-disk tcp_state byte marks a
//! genuine IPv6 record.
//!
//! ```text
//! v2 (56 bytes)  0- 5 times/flags/proto (state byte 5 carries the flag)
//!                6- 7 application 8-9 sPort 10-11 dPort 12-15 elapsed
//!                16-19 packets 20-23 bytes 24-39 sIP 40-55 dIP
//! v1 (68)        0- 7 sTime 8-11 elapsed 12-13 sPort 14-15 dPort 16 proto
//!                17 flow type 18-19 sensor 20 flags 21 init 22 session
//!                23 tcp_state 24-25 application 26-27 memo 28-31 packets
//!                32-35 bytes 36-51 sIP 52-67 dIP
//! ```

use crate::bits::SwapField::{self, U16, U32, U64};
use crate::codec::{fill_from_header, sanitize_tcp_state, CodecError};
use crate::pack::compact::{pack_times_flags_proto, unpack_times_flags_proto};
use crate::pack::{
    get_i64, get_ipv6, get_u16, get_u32, ipv6_wire_flag, put_i64, put_ipv6, put_u16, put_u32,
    read_ipv6_flag,
};
use crate::record::FlowRecord;
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    V2,
}

const SWAP_V2: &[SwapField] = &[U32(0), U16(6), U16(8), U16(10), U32(12), U32(16), U32(20)];
const SWAP_V1: &[SwapField] = &[
    U64(0), U32(8), U16(12), U16(14), U16(18), U16(24), U16(26), U32(28), U32(32),
];

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            1 => Some(Layout::V1),
            2 => Some(Layout::V2),
            _ => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V1 => 68,
            Layout::V2 => 56,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V1 => SWAP_V1,
            Layout::V2 => SWAP_V2,
        }
    }

    pub fn pack(self, ctx: &StreamContext, rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
        let flag = ipv6_wire_flag(rec)?;
        match self {
            Layout::V2 => {
                pack_times_flags_proto(ar, rec, ctx.base_time())?;
                ar[5] |= flag;
                put_u16(ar, 6, rec.application);
                put_u16(ar, 8, rec.src_port);
                put_u16(ar, 10, rec.dst_port);
                put_u32(ar, 12, rec.duration);
                put_u32(ar, 16, rec.packets);
                put_u32(ar, 20, rec.bytes);
                put_ipv6(ar, 24, &rec.src_ip);
                put_ipv6(ar, 40, &rec.dst_ip);
            }
            Layout::V1 => {
                put_i64(ar, 0, rec.start_time);
                put_u32(ar, 8, rec.duration);
                put_u16(ar, 12, rec.src_port);
                put_u16(ar, 14, rec.dst_port);
                ar[16] = rec.protocol;
                ar[17] = rec.flow_type;
                put_u16(ar, 18, rec.sensor_id);
                ar[20] = rec.tcp_flags_all;
                ar[21] = rec.tcp_flags_init;
                ar[22] = rec.tcp_flags_session;
                ar[23] = rec.tcp_state() | flag;
                put_u16(ar, 24, rec.application);
                put_u16(ar, 26, rec.memo);
                put_u32(ar, 28, rec.packets);
                put_u32(ar, 32, rec.bytes);
                put_ipv6(ar, 36, &rec.src_ip);
                put_ipv6(ar, 52, &rec.dst_ip);
            }
        }
        Ok(())
    }

    pub fn unpack(self, ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let mut rec = FlowRecord::default();
        match self {
            Layout::V2 => {
                let is_ipv6 = read_ipv6_flag(ar[5])?;
                unpack_times_flags_proto(&mut rec, ar, ctx.base_time());
                rec.application = get_u16(ar, 6);
                rec.src_port    = get_u16(ar, 8);
                rec.dst_port    = get_u16(ar, 10);
                rec.duration    = get_u32(ar, 12);
                rec.packets     = get_u32(ar, 16);
                rec.bytes       = get_u32(ar, 20);
                rec.src_ip      = get_ipv6(ar, 24, is_ipv6);
                rec.dst_ip      = get_ipv6(ar, 40, is_ipv6);
                fill_from_header(&mut rec, ctx);
            }
            Layout::V1 => {
                let is_ipv6 = read_ipv6_flag(ar[23])?;
                rec.start_time        = get_i64(ar, 0);
                rec.duration          = get_u32(ar, 8);
                rec.src_port          = get_u16(ar, 12);
                rec.dst_port          = get_u16(ar, 14);
                rec.protocol          = ar[16];
                rec.flow_type         = ar[17];
                rec.sensor_id         = get_u16(ar, 18);
                rec.tcp_flags_all     = ar[20];
                rec.tcp_flags_init    = ar[21];
                rec.tcp_flags_session = ar[22];
                rec.set_tcp_state(ar[23]);
                rec.application       = get_u16(ar, 24);
                rec.memo              = get_u16(ar, 26);
                rec.packets           = get_u32(ar, 28);
                rec.bytes             = get_u32(ar, 32);
                rec.src_ip            = get_ipv6(ar, 36, is_ipv6);
                rec.dst_ip            = get_ipv6(ar, 52, is_ipv6);
                sanitize_tcp_state(&mut rec);
            }
        }
        Ok(rec)
    }
}
