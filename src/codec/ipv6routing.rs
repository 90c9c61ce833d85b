//! FT_RWIPV6ROUTING: the full record with 16-byte addresses, next hop and
//! interfaces.  Every version stores absolute millisecond times and the
//! per-record sensor and flow type.
//!
//! ```text
//! v3 (100 bytes) 0-27 as v1  28-31 input u32 32-39 packets u64 40-47 bytes u64
//!                48-63 sIP 64-79 dIP 80-95 nhIP 96-99 output u32
//! v1/v2 (88)     0- 7 sTime 8-11 elapsed 12-13 sPort 14-15 dPort 16 proto
//!                17 flow type 18-19 sensor 20 flags 21 init 22 session
//!                23 tcp_state 24-25 application 26-27 memo 28-29 input
//!                30-31 output 32-35 packets 36-39 bytes 40-55 sIP 56-71 dIP
//!                72-87 nhIP
//! ```
//!
//! v3 widens packets and bytes to 64 bits and interfaces to 32; reading
//! clamps anything wider than the record's fields to their maximum.

use crate::bits::SwapField::{self, U16, U32, U64};
use crate::codec::{sanitize_tcp_state, CodecError};
use crate::pack::{
    get_i64, get_ipv6, get_u16, get_u32, get_u64, ipv6_wire_flag, put_i64, put_ipv6, put_u16,
    put_u32, put_u64, read_ipv6_flag,
};
use crate::record::FlowRecord;
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    /// v1 with the application cleared on read.
    V2,
    V3,
}

const SWAP_V3: &[SwapField] = &[
    U64(0), U32(8), U16(12), U16(14), U16(18), U16(24), U16(26), U32(28), U64(32), U64(40), U32(96),
];
const SWAP_V1: &[SwapField] = &[
    U64(0), U32(8), U16(12), U16(14), U16(18), U16(24), U16(26), U16(28), U16(30), U32(32), U32(36),
];

/// Bytes 0..28, shared by every version.
fn pack_head(rec: &FlowRecord, ar: &mut [u8], flag: u8) {
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
}

fn unpack_head(rec: &mut FlowRecord, ar: &[u8]) {
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
}

#[inline]
fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

#[inline]
fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            1 => Some(Layout::V1),
            2 => Some(Layout::V2),
            3 => Some(Layout::V3),
            _ => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V1 | Layout::V2 => 88,
            Layout::V3              => 100,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V1 | Layout::V2 => SWAP_V1,
            Layout::V3              => SWAP_V3,
        }
    }

    pub fn pack(self, _ctx: &StreamContext, rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
        let flag = ipv6_wire_flag(rec)?;
        pack_head(rec, ar, flag);
        match self {
            Layout::V3 => {
                put_u32(ar, 28, u32::from(rec.input_snmp));
                put_u64(ar, 32, u64::from(rec.packets));
                put_u64(ar, 40, u64::from(rec.bytes));
                put_ipv6(ar, 48, &rec.src_ip);
                put_ipv6(ar, 64, &rec.dst_ip);
                put_ipv6(ar, 80, &rec.next_hop_ip);
                put_u32(ar, 96, u32::from(rec.output_snmp));
            }
            Layout::V1 | Layout::V2 => {
                put_u16(ar, 28, rec.input_snmp);
                put_u16(ar, 30, rec.output_snmp);
                put_u32(ar, 32, rec.packets);
                put_u32(ar, 36, rec.bytes);
                put_ipv6(ar, 40, &rec.src_ip);
                put_ipv6(ar, 56, &rec.dst_ip);
                put_ipv6(ar, 72, &rec.next_hop_ip);
            }
        }
        Ok(())
    }

    pub fn unpack(self, _ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let is_ipv6 = read_ipv6_flag(ar[23])?;
        let mut rec = FlowRecord::default();
        unpack_head(&mut rec, ar);
        match self {
            Layout::V3 => {
                rec.input_snmp  = clamp_u16(get_u32(ar, 28));
                rec.packets     = clamp_u32(get_u64(ar, 32));
                rec.bytes       = clamp_u32(get_u64(ar, 40));
                rec.src_ip      = get_ipv6(ar, 48, is_ipv6);
                rec.dst_ip      = get_ipv6(ar, 64, is_ipv6);
                rec.next_hop_ip = get_ipv6(ar, 80, is_ipv6);
                rec.output_snmp = clamp_u16(get_u32(ar, 96));
            }
            Layout::V1 | Layout::V2 => {
                rec.input_snmp  = get_u16(ar, 28);
                rec.output_snmp = get_u16(ar, 30);
                rec.packets     = get_u32(ar, 32);
                rec.bytes       = get_u32(ar, 36);
                rec.src_ip      = get_ipv6(ar, 40, is_ipv6);
                rec.dst_ip      = get_ipv6(ar, 56, is_ipv6);
                rec.next_hop_ip = get_ipv6(ar, 72, is_ipv6);
                sanitize_tcp_state(&mut rec);
                if self == Layout::V2 {
                    rec.application = 0;
                }
            }
        }
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FileFormat;
    use crate::pack::WIRE_IPV6_FLAG;
    use crate::record::{Address, IPPROTO_UDP, TCPSTATE_EXPANDED};
    use crate::stream::IoMode;

    fn ctx() -> StreamContext {
        StreamContext::new(FileFormat::Ipv6Routing, IoMode::Write)
    }

    fn sample() -> FlowRecord {
        FlowRecord {
            src_ip:      Address::V4(0xC633_6401),
            dst_ip:      Address::V4(0xCB00_7101),
            next_hop_ip: Address::V4(0xC000_0201),
            src_port:    123,
            dst_port:    123,
            protocol:    IPPROTO_UDP,
            packets:     u32::MAX,
            bytes:       u32::MAX,
            start_time:  -5_000,
            duration:    u32::MAX,
            input_snmp:  u16::MAX,
            output_snmp: 1,
            sensor_id:   0x1234,
            flow_type:   0xAB,
            application: 123,
            memo:        0xBEEF,
            ..Default::default()
        }
    }

    #[test]
    fn full_width_round_trips() {
        for layout in [Layout::V1, Layout::V3] {
            let mut ar = vec![0u8; layout.record_len()];
            layout.pack(&ctx(), &sample(), &mut ar).unwrap();
            assert_eq!(layout.unpack(&ctx(), &ar).unwrap(), sample(), "{:?}", layout);
        }
    }

    #[test]
    fn v3_clamps_wide_counters() {
        let mut ar = [0u8; 100];
        Layout::V3.pack(&ctx(), &sample(), &mut ar).unwrap();
        put_u32(&mut ar, 28, 70_000);
        put_u64(&mut ar, 32, 5_000_000_000);
        put_u64(&mut ar, 40, 1 << 40);
        put_u32(&mut ar, 96, 65_536);
        let out = Layout::V3.unpack(&ctx(), &ar).unwrap();
        assert_eq!(out.input_snmp, u16::MAX);
        assert_eq!(out.output_snmp, u16::MAX);
        assert_eq!(out.packets, u32::MAX);
        assert_eq!(out.bytes, u32::MAX);
    }

    #[test]
    fn v2_clears_application() {
        let mut ar = [0u8; 88];
        Layout::V1.pack(&ctx(), &sample(), &mut ar).unwrap();
        let out = Layout::V2.unpack(&ctx(), &ar).unwrap();
        assert_eq!(out.application, 0);
        assert_eq!(out.memo, 0xBEEF);
    }

    #[test]
    fn only_v1_and_v2_sanitize() {
        let rec = FlowRecord { tcp_state: TCPSTATE_EXPANDED, ..sample() };
        let mut ar = [0u8; 100];
        Layout::V3.pack(&ctx(), &rec, &mut ar).unwrap();
        assert_eq!(Layout::V3.unpack(&ctx(), &ar).unwrap().tcp_state, TCPSTATE_EXPANDED);

        let mut ar = [0u8; 88];
        Layout::V1.pack(&ctx(), &rec, &mut ar).unwrap();
        let expected = if cfg!(feature = "tcpstate-fix") { 0 } else { TCPSTATE_EXPANDED };
        assert_eq!(Layout::V1.unpack(&ctx(), &ar).unwrap().tcp_state, expected);
    }

    #[cfg(feature = "ipv6")]
    #[test]
    fn mixed_families_are_written_as_ipv6() {
        let rec = FlowRecord {
            next_hop_ip: Address::V6([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
            ..sample()
        };
        let mut ar = [0u8; 100];
        Layout::V3.pack(&ctx(), &rec, &mut ar).unwrap();
        assert_eq!(ar[23] & WIRE_IPV6_FLAG, WIRE_IPV6_FLAG);
        let out = Layout::V3.unpack(&ctx(), &ar).unwrap();
        assert_eq!(out.src_ip, Address::V6(sample().src_ip.to_ipv6_bytes()));
        assert_eq!(out.next_hop_ip, rec.next_hop_ip);
    }
}
