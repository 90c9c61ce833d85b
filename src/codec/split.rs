//! FT_RWSPLIT: the smallest hour-relative IPv4 layout, with no next hop
//! and no interfaces.  Sensor and flow type come from the file header.
//!
//! ```text
//! v5 (24 bytes)  0-11 flags/times/volumes  12-13 sPort 14-15 dPort 16-19 sIP 20-23 dIP
//! v3/v4 (24)     0- 3 sIP 4- 7 dIP 8- 9 sPort 10-11 dPort 12-23 time/bytes/pkts/flags
//! v1/v2 (22)     0- 3 sIP 4- 7 dIP 8- 9 sPort 10-11 dPort 12-15 pef 16-19 sbb 20 proto 21 flags
//! ```

use crate::bits::SwapField::{self, U16, U32};
use crate::codec::{fill_from_header, CodecError};
use crate::pack::compact::{
    pack_flags_times_volumes, pack_sbb_pef, pack_time_bytes_pkts_flags, unpack_flags_times_volumes,
    unpack_sbb_pef, unpack_time_bytes_pkts_flags, SbbPef, TimeBytesPktsFlags, VolumeTail,
};
use crate::pack::{get_ipv4, get_u16, get_u32, put_ipv4, put_u16, put_u32};
use crate::record::FlowRecord;
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    V3,
    V5,
}

const SWAP_V5: &[SwapField] = &[U32(0), U32(4), U32(8), U16(12), U16(14), U32(16), U32(20)];
const SWAP_V3: &[SwapField] = &[U32(0), U32(4), U16(8), U16(10), U32(12), U32(16), U32(20)];
const SWAP_V1: &[SwapField] = &[U32(0), U32(4), U16(8), U16(10), U32(12), U32(16)];

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
            Layout::V1              => 22,
            Layout::V3 | Layout::V5 => 24,
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
        let base = ctx.base_time();
        match self {
            Layout::V5 => {
                pack_flags_times_volumes(ar, rec, base, VolumeTail::Absent)?;
                put_u16(ar, 12, rec.src_port);
                put_u16(ar, 14, rec.dst_port);
                put_ipv4(ar, 16, &rec.src_ip)?;
                put_ipv4(ar, 20, &rec.dst_ip)?;
            }
            Layout::V3 => {
                let w = pack_time_bytes_pkts_flags(rec, base)?;
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u16(ar, 8, rec.src_port);
                put_u16(ar, 10, rec.dst_port);
                put_u32(ar, 12, w.pkts_stime);
                put_u32(ar, 16, w.bbe);
                put_u32(ar, 20, w.msec_flags);
            }
            Layout::V1 => {
                let w = pack_sbb_pef(rec, base)?;
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u16(ar, 8, rec.src_port);
                put_u16(ar, 10, rec.dst_port);
                put_u32(ar, 12, w.pef);
                put_u32(ar, 16, w.sbb);
                ar[20] = rec.protocol;
                ar[21] = rec.tcp_flags_all;
            }
        }
        Ok(())
    }

    pub fn unpack(self, ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let base = ctx.base_time();
        let mut rec = FlowRecord::default();
        match self {
            Layout::V5 => {
                unpack_flags_times_volumes(&mut rec, ar, base, VolumeTail::Absent, false);
                rec.src_port = get_u16(ar, 12);
                rec.dst_port = get_u16(ar, 14);
                rec.src_ip   = get_ipv4(ar, 16);
                rec.dst_ip   = get_ipv4(ar, 20);
            }
            Layout::V3 => {
                rec.src_ip   = get_ipv4(ar, 0);
                rec.dst_ip   = get_ipv4(ar, 4);
                rec.src_port = get_u16(ar, 8);
                rec.dst_port = get_u16(ar, 10);
                unpack_time_bytes_pkts_flags(&mut rec, base, TimeBytesPktsFlags::read(ar, 12));
            }
            Layout::V1 => {
                rec.src_ip   = get_ipv4(ar, 0);
                rec.dst_ip   = get_ipv4(ar, 4);
                rec.src_port = get_u16(ar, 8);
                rec.dst_port = get_u16(ar, 10);
                unpack_sbb_pef(&mut rec, base, SbbPef { sbb: get_u32(ar, 16), pef: get_u32(ar, 12) });
                rec.protocol      = ar[20];
                rec.tcp_flags_all = ar[21];
            }
        }
        fill_from_header(&mut rec, ctx);
        Ok(rec)
    }
}
