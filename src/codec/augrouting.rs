//! FT_RWAUGROUTING: routed records that also keep the TCP state, the
//! initial and session flags, and the application.
//!
//! ```text
//! v5 (40 bytes)  0- 5 times/flags/proto 6-7 application 8-9 sPort 10-11 dPort
//!                12-15 elapsed 16-19 packets 20-23 bytes 24-27 sIP 28-31 dIP
//!                32-35 nhIP 36-37 input 38-39 output
//! v4 (36)        0-15 flags/times/volumes with state tail 16-17 sPort 18-19 dPort
//!                20-21 input 22-23 output 24-27 sIP 28-31 dIP 32-35 nhIP
//! v1-v3 (36)     0- 3 sIP 4- 7 dIP 8- 9 sPort 10-11 dPort 12-23 time/bytes/pkts
//!                with folded proto/flags 24-25 application 26 tcp_state
//!                27 rest flags 28-31 nhIP 32-33 input 34-35 output
//! ```
//!
//! v5 stores packets, bytes and elapsed at full width, so it is the only
//! hour-relative layout that does not reject zero-packet flows.

use crate::bits::SwapField::{self, U16, U32};
use crate::codec::{fill_from_header, CodecError};
use crate::pack::compact::{
    pack_flags_times_volumes, pack_time_bytes_pkts_proto_flags, pack_times_flags_proto,
    unpack_flags_times_volumes, unpack_time_bytes_pkts_proto_flags, unpack_times_flags_proto,
    TimeBytesPktsFlags, VolumeTail,
};
use crate::pack::{get_ipv4, get_u16, get_u32, put_ipv4, put_u16, put_u32};
use crate::record::FlowRecord;
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// v1, v2 and v3.
    V1,
    V4,
    V5,
}

const SWAP_V5: &[SwapField] = &[
    U32(0), U16(6), U16(8), U16(10), U32(12), U32(16), U32(20),
    U32(24), U32(28), U32(32), U16(36), U16(38),
];
const SWAP_V4: &[SwapField] = &[
    U32(0), U32(4), U32(8), U16(14), U16(16), U16(18), U16(20), U16(22),
    U32(24), U32(28), U32(32),
];
const SWAP_V1: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U32(16), U32(20), U16(24),
    U32(28), U16(32), U16(34),
];

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            1..=3 => Some(Layout::V1),
            4     => Some(Layout::V4),
            5     => Some(Layout::V5),
            _     => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V1 | Layout::V4 => 36,
            Layout::V5              => 40,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V1 => SWAP_V1,
            Layout::V4 => SWAP_V4,
            Layout::V5 => SWAP_V5,
        }
    }

    pub fn pack(self, ctx: &StreamContext, rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
        let base = ctx.base_time();
        match self {
            Layout::V5 => {
                pack_times_flags_proto(ar, rec, base)?;
                put_u16(ar, 6, rec.application);
                put_u16(ar, 8, rec.src_port);
                put_u16(ar, 10, rec.dst_port);
                put_u32(ar, 12, rec.duration);
                put_u32(ar, 16, rec.packets);
                put_u32(ar, 20, rec.bytes);
                put_ipv4(ar, 24, &rec.src_ip)?;
                put_ipv4(ar, 28, &rec.dst_ip)?;
                put_ipv4(ar, 32, &rec.next_hop_ip)?;
                put_u16(ar, 36, rec.input_snmp);
                put_u16(ar, 38, rec.output_snmp);
            }
            Layout::V4 => {
                pack_flags_times_volumes(ar, rec, base, VolumeTail::Present)?;
                put_u16(ar, 16, rec.src_port);
                put_u16(ar, 18, rec.dst_port);
                put_u16(ar, 20, rec.input_snmp);
                put_u16(ar, 22, rec.output_snmp);
                put_ipv4(ar, 24, &rec.src_ip)?;
                put_ipv4(ar, 28, &rec.dst_ip)?;
                put_ipv4(ar, 32, &rec.next_hop_ip)?;
            }
            Layout::V1 => {
                let (w, pf) = pack_time_bytes_pkts_proto_flags(rec, base)?;
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u16(ar, 8, rec.src_port);
                put_u16(ar, 10, rec.dst_port);
                put_u32(ar, 12, w.pkts_stime);
                put_u32(ar, 16, w.bbe);
                put_u32(ar, 20, w.msec_flags);
                put_u16(ar, 24, rec.application);
                ar[26] = pf.tcp_state;
                ar[27] = pf.rest_flags;
                put_ipv4(ar, 28, &rec.next_hop_ip)?;
                put_u16(ar, 32, rec.input_snmp);
                put_u16(ar, 34, rec.output_snmp);
            }
        }
        Ok(())
    }

    pub fn unpack(self, ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let base = ctx.base_time();
        let mut rec = FlowRecord::default();
        match self {
            Layout::V5 => {
                unpack_times_flags_proto(&mut rec, ar, base);
                rec.application = get_u16(ar, 6);
                rec.src_port    = get_u16(ar, 8);
                rec.dst_port    = get_u16(ar, 10);
                rec.duration    = get_u32(ar, 12);
                rec.packets     = get_u32(ar, 16);
                rec.bytes       = get_u32(ar, 20);
                rec.src_ip      = get_ipv4(ar, 24);
                rec.dst_ip      = get_ipv4(ar, 28);
                rec.next_hop_ip = get_ipv4(ar, 32);
                rec.input_snmp  = get_u16(ar, 36);
                rec.output_snmp = get_u16(ar, 38);
            }
            Layout::V4 => {
                unpack_flags_times_volumes(&mut rec, ar, base, VolumeTail::Present, false);
                rec.src_port    = get_u16(ar, 16);
                rec.dst_port    = get_u16(ar, 18);
                rec.input_snmp  = get_u16(ar, 20);
                rec.output_snmp = get_u16(ar, 22);
                rec.src_ip      = get_ipv4(ar, 24);
                rec.dst_ip      = get_ipv4(ar, 28);
                rec.next_hop_ip = get_ipv4(ar, 32);
            }
            Layout::V1 => {
                rec.src_ip      = get_ipv4(ar, 0);
                rec.dst_ip      = get_ipv4(ar, 4);
                rec.src_port    = get_u16(ar, 8);
                rec.dst_port    = get_u16(ar, 10);
                rec.application = get_u16(ar, 24);
                unpack_time_bytes_pkts_proto_flags(
                    &mut rec, base, TimeBytesPktsFlags::read(ar, 12), ar[26], ar[27],
                );
                rec.next_hop_ip = get_ipv4(ar, 28);
                rec.input_snmp  = get_u16(ar, 32);
                rec.output_snmp = get_u16(ar, 34);
            }
        }
        fill_from_header(&mut rec, ctx);
        Ok(rec)
    }
}
