//! FT_RWAUGWEB: augmented web records.  Like FT_RWWWW the server port is
//! coded in two bits and only TCP is accepted.
//!
//! ```text
//! v5 (30 bytes)  0- 5 times/flags/proto (bit 22 of word 0: src-is-server)
//!                6- 7 application 8-11 server code:2 elapsed:30
//!                12-15 packets 16-19 bytes 20-23 sIP 24-27 dIP 28-29 client port
//! v4 (26)        0-15 flags/times/volumes with state tail, server bits at
//!                20-22 of word 8   16-19 sIP 20-23 dIP 24-25 client port
//! v1-v3 (26)     0- 3 sIP 4- 7 dIP 8-19 time/bytes/pkts; low bits of the
//!                last word: src-is-server:1 code:2 flags:8
//!                20-21 client port 22-23 application 24 tcp_state 25 rest flags
//! ```

use crate::bits::SwapField::{self, U16, U32};
use crate::bits::{get_bits, MASK21, MASK3, MASK30};
use crate::codec::www::require_tcp;
use crate::codec::{fill_from_header, CodecError};
use crate::pack::compact::{
    pack_flags_times_volumes, pack_time_bytes_pkts_proto_flags, pack_times_flags_proto,
    unpack_flags_times_volumes, unpack_time_bytes_pkts_proto_flags, unpack_times_flags_proto,
    TimeBytesPktsFlags, VolumeTail,
};
use crate::pack::{
    get_ipv4, get_u16, get_u32, join_web_ports, put_ipv4, put_u16, put_u32, split_web_ports,
};
use crate::record::{FlowRecord, IPPROTO_TCP};
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    V4,
    V5,
}

const SWAP_V5: &[SwapField] = &[
    U32(0), U16(6), U32(8), U32(12), U32(16), U32(20), U32(24), U16(28),
];
const SWAP_V4: &[SwapField] = &[
    U32(0), U32(4), U32(8), U16(14), U32(16), U32(20), U16(24),
];
const SWAP_V1: &[SwapField] = &[
    U32(0), U32(4), U32(8), U32(12), U32(16), U16(20), U16(22),
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
            Layout::V1 | Layout::V4 => 26,
            Layout::V5              => 30,
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
        require_tcp(rec)?;
        let base = ctx.base_time();
        let (src_is_server, code, client) = split_web_ports(rec);
        let src_bit = u32::from(src_is_server);

        match self {
            Layout::V5 => {
                if rec.duration & !MASK30 != 0 {
                    return Err(CodecError::ElapsedOverflow { duration: rec.duration });
                }
                pack_times_flags_proto(ar, rec, base)?;
                put_u32(ar, 0, get_u32(ar, 0) | (src_bit << 22));
                put_u16(ar, 6, rec.application);
                put_u32(ar, 8, (code << 30) | rec.duration);
                put_u32(ar, 12, rec.packets);
                put_u32(ar, 16, rec.bytes);
                put_ipv4(ar, 20, &rec.src_ip)?;
                put_ipv4(ar, 24, &rec.dst_ip)?;
                put_u16(ar, 28, client);
            }
            Layout::V4 => {
                pack_flags_times_volumes(ar, rec, base, VolumeTail::Present)?;
                let word = (get_u32(ar, 8) & !(MASK3 << 20)) | (code << 20) | (src_bit << 22);
                put_u32(ar, 8, word);
                put_ipv4(ar, 16, &rec.src_ip)?;
                put_ipv4(ar, 20, &rec.dst_ip)?;
                put_u16(ar, 24, client);
            }
            Layout::V1 => {
                let (w, pf) = pack_time_bytes_pkts_proto_flags(rec, base)?;
                let msec = (w.msec_flags & (MASK21 << 11))
                    | (src_bit << 10)
                    | (code << 8)
                    | u32::from(pf.prot_flags);
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u32(ar, 8, w.pkts_stime);
                put_u32(ar, 12, w.bbe);
                put_u32(ar, 16, msec);
                put_u16(ar, 20, client);
                put_u16(ar, 22, rec.application);
                ar[24] = pf.tcp_state;
                ar[25] = pf.rest_flags;
            }
        }
        Ok(())
    }

    pub fn unpack(self, ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let base = ctx.base_time();
        let mut rec = FlowRecord::default();
        match self {
            Layout::V5 => {
                let w0 = get_u32(ar, 0);
                let w8 = get_u32(ar, 8);
                unpack_times_flags_proto(&mut rec, ar, base);
                rec.application = get_u16(ar, 6);
                rec.duration    = w8 & MASK30;
                rec.packets     = get_u32(ar, 12);
                rec.bytes       = get_u32(ar, 16);
                rec.src_ip      = get_ipv4(ar, 20);
                rec.dst_ip      = get_ipv4(ar, 24);
                join_web_ports(&mut rec, get_bits(w0, 22, 1) != 0, w8 >> 30, get_u16(ar, 28));
            }
            Layout::V4 => {
                unpack_flags_times_volumes(&mut rec, ar, base, VolumeTail::Present, true);
                rec.src_ip = get_ipv4(ar, 16);
                rec.dst_ip = get_ipv4(ar, 20);
                let word = get_u32(ar, 8);
                join_web_ports(&mut rec, get_bits(word, 22, 1) != 0, get_bits(word, 20, 2), get_u16(ar, 24));
            }
            Layout::V1 => {
                rec.src_ip = get_ipv4(ar, 0);
                rec.dst_ip = get_ipv4(ar, 4);
                let w = TimeBytesPktsFlags::read(ar, 8);
                join_web_ports(
                    &mut rec,
                    get_bits(w.msec_flags, 10, 1) != 0,
                    get_bits(w.msec_flags, 8, 2),
                    get_u16(ar, 20),
                );
                rec.application = get_u16(ar, 22);
                // Bit 10 is the server side here, so TCP must be fixed first.
                rec.protocol = IPPROTO_TCP;
                unpack_time_bytes_pkts_proto_flags(&mut rec, base, w, ar[24], ar[25]);
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
    use crate::record::{Address, ACK_FLAG, FIN_FLAG, IPPROTO_ICMP, SYN_FLAG, TCPSTATE_EXPANDED};
    use crate::stream::IoMode;

    const BASE: i64 = 1_690_000_000_000;

    fn ctx() -> StreamContext {
        StreamContext::new(FileFormat::AugWeb, IoMode::Write).with_base_time(BASE)
    }

    fn sample() -> FlowRecord {
        FlowRecord {
            src_ip:            Address::V4(0x0A00_0005),
            dst_ip:            Address::V4(0x8EFA_4A2E),
            src_port:          49_152,
            dst_port:          80,
            protocol:          IPPROTO_TCP,
            tcp_state:         TCPSTATE_EXPANDED,
            tcp_flags_init:    SYN_FLAG,
            tcp_flags_session: ACK_FLAG | FIN_FLAG,
            tcp_flags_all:     SYN_FLAG | ACK_FLAG | FIN_FLAG,
            application:       80,
            packets:           16,
            bytes:             20_480,
            start_time:        BASE + 4_000_000,
            duration:          65_536,
            ..Default::default()
        }
    }

    fn round_trip(layout: Layout, rec: &FlowRecord) -> Result<FlowRecord, CodecError> {
        let mut ar = vec![0u8; layout.record_len()];
        layout.pack(&ctx(), rec, &mut ar)?;
        layout.unpack(&ctx(), &ar)
    }

    #[test]
    fn client_side_source() {
        for layout in [Layout::V1, Layout::V4, Layout::V5] {
            assert_eq!(round_trip(layout, &sample()).unwrap(), sample(), "{:?}", layout);
        }
    }

    #[test]
    fn server_side_source() {
        let rec = FlowRecord { src_port: 443, dst_port: 60_000, ..sample() };
        for layout in [Layout::V1, Layout::V4, Layout::V5] {
            assert_eq!(round_trip(layout, &rec).unwrap(), rec, "{:?}", layout);
        }
    }

    #[test]
    fn v5_elapsed_limit_checked_first() {
        let rec = FlowRecord { duration: 1 << 30, start_time: BASE - 1, ..sample() };
        assert!(matches!(round_trip(Layout::V5, &rec), Err(CodecError::ElapsedOverflow { .. })));
    }

    #[test]
    fn protocol_must_be_tcp() {
        let rec = FlowRecord { protocol: IPPROTO_ICMP, ..sample() };
        assert!(matches!(round_trip(Layout::V4, &rec), Err(CodecError::ProtocolMismatch { .. })));
    }
}
