//! FT_RWAUGMENTED: the augmented layouts without routing information.
//! Byte positions match FT_RWAUGROUTING up to the point where the next
//! hop and interfaces would start.

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

pub const DEFAULT_VERSION: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    V4,
    V5,
}

const SWAP_V5: &[SwapField] = &[
    U32(0), U16(6), U16(8), U16(10), U32(12), U32(16), U32(20), U32(24), U32(28),
];
const SWAP_V4: &[SwapField] = &[
    U32(0), U32(4), U32(8), U16(14), U16(16), U16(18), U32(20), U32(24),
];
const SWAP_V1: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U32(16), U32(20), U16(24),
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
            Layout::V1 | Layout::V4 => 28,
            Layout::V5              => 32,
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
            }
            Layout::V4 => {
                pack_flags_times_volumes(ar, rec, base, VolumeTail::Present)?;
                put_u16(ar, 16, rec.src_port);
                put_u16(ar, 18, rec.dst_port);
                put_ipv4(ar, 20, &rec.src_ip)?;
                put_ipv4(ar, 24, &rec.dst_ip)?;
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
            }
            Layout::V4 => {
                unpack_flags_times_volumes(&mut rec, ar, base, VolumeTail::Present, false);
                rec.src_port = get_u16(ar, 16);
                rec.dst_port = get_u16(ar, 18);
                rec.src_ip   = get_ipv4(ar, 20);
                rec.dst_ip   = get_ipv4(ar, 24);
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
            }
        }
        fill_from_header(&mut rec, ctx);
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FileFormat;
    use crate::record::{Address, IPPROTO_TCP, RST_FLAG, SYN_FLAG, TCPSTATE_UNIFORM_PACKET_SIZE};
    use crate::stream::IoMode;

    const BASE: i64 = 1_500_000_000_000;

    fn ctx() -> StreamContext {
        StreamContext::new(FileFormat::Augmented, IoMode::Write).with_base_time(BASE)
    }

    fn sample() -> FlowRecord {
        FlowRecord {
            src_ip:        Address::V4(0x0A01_0203),
            dst_ip:        Address::V4(0x0A04_0506),
            src_port:      1_234,
            dst_port:      3_389,
            protocol:      IPPROTO_TCP,
            tcp_state:     TCPSTATE_UNIFORM_PACKET_SIZE,
            tcp_flags_all: SYN_FLAG | RST_FLAG,
            packets:       2,
            bytes:         80,
            start_time:    BASE + 59_999,
            duration:      1,
            ..Default::default()
        }
    }

    #[test]
    fn all_layouts_round_trip() {
        for layout in [Layout::V1, Layout::V4, Layout::V5] {
            let mut ar = vec![0u8; layout.record_len()];
            layout.pack(&ctx(), &sample(), &mut ar).unwrap();
            assert_eq!(layout.unpack(&ctx(), &ar).unwrap(), sample(), "{:?}", layout);
        }
    }

    #[test]
    fn routing_fields_are_dropped() {
        let rec = FlowRecord {
            next_hop_ip: Address::V4(1),
            input_snmp:  3,
            output_snmp: 4,
            ..sample()
        };
        let mut ar = [0u8; 28];
        Layout::V4.pack(&ctx(), &rec, &mut ar).unwrap();
        assert_eq!(Layout::V4.unpack(&ctx(), &ar).unwrap(), sample());
    }
}
