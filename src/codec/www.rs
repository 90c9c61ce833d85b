//! FT_RWWWW: TCP web traffic.  Only the client port is stored in full; the
//! server port is reduced to a two-bit code (80, 443, 8080, other) plus a
//! bit saying which side was the server.  Non-TCP records are rejected.
//!
//! ```text
//! v5 (22 bytes)  0-11 flags/times/volumes; bits 20-22 of word 8 carry
//!                server code and src-is-server    12-15 sIP 16-19 dIP 20-21 client port
//! v3/v4 (22)     0- 3 sIP 4- 7 dIP 8-19 time/bytes/pkts/flags with the
//!                server bits at 8-10 of the last word   20-21 client port
//! v1/v2 (20)     0- 3 sIP 4- 7 dIP 8-11 pef 12-15 sbb 16-17 client port
//!                18 src-is-server:1 pad:1 flags:6   19 server code:2 pad:6
//! ```

use crate::bits::SwapField::{self, U16, U32};
use crate::bits::{get_bits, MASK3, MASK6};
use crate::codec::{fill_from_header, CodecError};
use crate::pack::compact::{
    pack_flags_times_volumes, pack_sbb_pef, pack_time_bytes_pkts_flags, unpack_flags_times_volumes,
    unpack_sbb_pef, unpack_time_bytes_pkts_flags, SbbPef, TimeBytesPktsFlags, VolumeTail,
};
use crate::pack::{
    get_ipv4, get_u16, get_u32, join_web_ports, put_ipv4, put_u16, put_u32, split_web_ports,
};
use crate::record::{FlowRecord, IPPROTO_TCP};
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    V3,
    V5,
}

const SWAP_V5: &[SwapField] = &[U32(0), U32(4), U32(8), U32(12), U32(16), U16(20)];
const SWAP_V3: &[SwapField] = &[U32(0), U32(4), U32(8), U32(12), U32(16), U16(20)];
const SWAP_V1: &[SwapField] = &[U32(0), U32(4), U32(8), U32(12), U16(16)];

pub(crate) fn require_tcp(rec: &FlowRecord) -> Result<(), CodecError> {
    if rec.protocol != IPPROTO_TCP {
        return Err(CodecError::ProtocolMismatch { protocol: rec.protocol });
    }
    Ok(())
}

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            1 | 2 => Some(Layout::V1),
            3 | 4 => Some(Layout::V3),
            5     => Some(Layout::V5),
            _     => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V1              => 20,
            Layout::V3 | Layout::V5 => 22,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V1 => SWAP_V1,
            Layout::V3 => SWAP_V3,
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
                pack_flags_times_volumes(ar, rec, base, VolumeTail::Absent)?;
                // The web bits take the place of the is_tcp marker.
                let word = (get_u32(ar, 8) & !(MASK3 << 20)) | (code << 20) | (src_bit << 22);
                put_u32(ar, 8, word);
                put_ipv4(ar, 12, &rec.src_ip)?;
                put_ipv4(ar, 16, &rec.dst_ip)?;
                put_u16(ar, 20, client);
            }
            Layout::V3 => {
                let w = pack_time_bytes_pkts_flags(rec, base)?;
                let msec = (w.msec_flags & !(MASK3 << 8)) | (src_bit << 10) | (code << 8);
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u32(ar, 8, w.pkts_stime);
                put_u32(ar, 12, w.bbe);
                put_u32(ar, 16, msec);
                put_u16(ar, 20, client);
            }
            Layout::V1 => {
                let w = pack_sbb_pef(rec, base)?;
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u32(ar, 8, w.pef);
                put_u32(ar, 12, w.sbb);
                put_u16(ar, 16, client);
                ar[18] = ((src_bit as u8) << 7) | (rec.tcp_flags_all & MASK6 as u8);
                ar[19] = (code << 6) as u8;
            }
        }
        Ok(())
    }

    pub fn unpack(self, ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let base = ctx.base_time();
        let mut rec = FlowRecord::default();
        match self {
            Layout::V5 => {
                unpack_flags_times_volumes(&mut rec, ar, base, VolumeTail::Absent, true);
                rec.src_ip = get_ipv4(ar, 12);
                rec.dst_ip = get_ipv4(ar, 16);
                let word = get_u32(ar, 8);
                join_web_ports(&mut rec, get_bits(word, 22, 1) != 0, get_bits(word, 20, 2), get_u16(ar, 20));
            }
            Layout::V3 => {
                rec.src_ip = get_ipv4(ar, 0);
                rec.dst_ip = get_ipv4(ar, 4);
                let w = TimeBytesPktsFlags::read(ar, 8);
                join_web_ports(
                    &mut rec,
                    get_bits(w.msec_flags, 10, 1) != 0,
                    get_bits(w.msec_flags, 8, 2),
                    get_u16(ar, 20),
                );
                rec.protocol = IPPROTO_TCP;
                unpack_time_bytes_pkts_flags(&mut rec, base, w);
            }
            Layout::V1 => {
                rec.src_ip = get_ipv4(ar, 0);
                rec.dst_ip = get_ipv4(ar, 4);
                unpack_sbb_pef(&mut rec, base, SbbPef { sbb: get_u32(ar, 12), pef: get_u32(ar, 8) });
                rec.tcp_flags_all = ar[18] & MASK6 as u8;
                join_web_ports(&mut rec, ar[18] & 0x80 != 0, u32::from(ar[19] >> 6), get_u16(ar, 16));
                rec.protocol = IPPROTO_TCP;
            }
        }
        fill_from_header(&mut rec, ctx);
        Ok(rec)
    }
}
