//! FT_FLOWCAP: records as written by the flow collector, before they are
//! sorted into hourly files.  Times are absolute seconds; the sub-second
//! parts of start and elapsed share three hand-packed bytes.
//!
//! ```text
//!            v2      v3/v4    v5/v6
//! sIP         0        0        0
//! dIP         4        4        4
//! bytes       8        8        8
//! sTime s    12       12       12
//! elapsed s  16 u16   16 u16   16 u16   (clamped to 0xFFFF)
//! sPort      18       18       18
//! dPort      20       20       20
//! app         -       22       22
//! input      22 u8    24 u8    24 u16
//! output     23 u8    25 u8    26 u16
//! packets    24 u24   26 u24   28 u24   (clamped to 0xFFFFFF)
//! proto      27       29       31
//! flags      28       30       32
//! init flags 29 (TOS) 31       33
//! tcp_state   -       32       34
//! time_frac   -       33-35    35-37
//! hash        -       36 (v4)   -
//! ```
//!
//! Sensor comes from the file header; flow type is never stored.

use crate::bits::SwapField::{self, U16, U24, U32};
use crate::bits::{get_bits, MASK6};
use crate::codec::CodecError;
use crate::pack::{get_ipv4, get_u16, get_u24, get_u32, put_ipv4, put_u16, put_u24, put_u32};
use crate::record::{FlowRecord, TCPSTATE_EXPANDED};
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 5;

const MAX_ELAPSED_SECS: u32 = 0xFFFF;
const MAX_PACKETS:      u32 = 0xFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V2,
    V3,
    /// v3 plus a payload hash.
    V4,
    V5,
    /// v5 with the application cleared on read.
    V6,
}

const SWAP_V5: &[SwapField] = &[
    U32(0), U32(4), U32(8), U32(12), U16(16), U16(18), U16(20), U16(22), U16(24), U16(26), U24(28),
];
const SWAP_V4: &[SwapField] = &[
    U32(0), U32(4), U32(8), U32(12), U16(16), U16(18), U16(20), U16(22), U24(26), U32(36),
];
const SWAP_V3: &[SwapField] = &[
    U32(0), U32(4), U32(8), U32(12), U16(16), U16(18), U16(20), U16(22), U24(26),
];
const SWAP_V2: &[SwapField] = &[
    U32(0), U32(4), U32(8), U32(12), U16(16), U16(18), U16(20), U24(24),
];

// ── Sub-second bytes ─────────────────────────────────────────────────────────

/// `start_ms:10 | elapsed_ms:10 | pad:4`, most significant bit first,
/// whatever the file's byte order.
pub fn pack_time_frac(start_ms: u32, elapsed_ms: u32) -> [u8; 3] {
    [
        (start_ms >> 2) as u8,
        (((start_ms & 0x3) << 6) | ((elapsed_ms >> 4) & MASK6)) as u8,
        ((elapsed_ms & 0xF) << 4) as u8,
    ]
}

/// Returns `(start_ms, elapsed_ms)`.
pub fn unpack_time_frac(b: [u8; 3]) -> (u32, u32) {
    let (b0, b1, b2) = (u32::from(b[0]), u32::from(b[1]), u32::from(b[2]));
    ((b0 << 2) | get_bits(b1, 6, 2), ((b1 & MASK6) << 4) | get_bits(b2, 4, 4))
}

// ── Shared pieces ────────────────────────────────────────────────────────────

/// Bytes 0..22, common to every version.
fn pack_head(rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
    put_ipv4(ar, 0, &rec.src_ip)?;
    put_ipv4(ar, 4, &rec.dst_ip)?;
    put_u32(ar, 8, rec.bytes);
    put_u32(ar, 12, rec.start_seconds() as u32);
    put_u16(ar, 16, rec.elapsed_seconds().min(MAX_ELAPSED_SECS) as u16);
    put_u16(ar, 18, rec.src_port);
    put_u16(ar, 20, rec.dst_port);
    Ok(())
}

/// Whole seconds only; the caller adds the sub-second parts.
fn unpack_head(rec: &mut FlowRecord, ar: &[u8]) {
    rec.src_ip     = get_ipv4(ar, 0);
    rec.dst_ip     = get_ipv4(ar, 4);
    rec.bytes      = get_u32(ar, 8);
    rec.start_time = i64::from(get_u32(ar, 12)) * 1000;
    rec.duration   = u32::from(get_u16(ar, 16)) * 1000;
    rec.src_port   = get_u16(ar, 18);
    rec.dst_port   = get_u16(ar, 20);
}

/// Protocol, both flag bytes, state and sub-second times, starting at `off`.
fn pack_tail(rec: &FlowRecord, ar: &mut [u8], off: usize) {
    put_u24(ar, off, rec.packets.min(MAX_PACKETS));
    ar[off + 3] = rec.protocol;
    let state = rec.tcp_state();
    if state & TCPSTATE_EXPANDED != 0 {
        ar[off + 4] = rec.tcp_flags_session;
        ar[off + 5] = rec.tcp_flags_init;
    } else {
        ar[off + 4] = rec.tcp_flags_all;
        ar[off + 5] = 0;
    }
    ar[off + 6] = state;
    ar[off + 7..off + 10].copy_from_slice(&pack_time_frac(rec.start_msec(), rec.elapsed_msec()));
}

fn unpack_tail(rec: &mut FlowRecord, ar: &[u8], off: usize) {
    rec.packets  = get_u24(ar, off);
    rec.protocol = ar[off + 3];
    let state = ar[off + 6];
    rec.set_tcp_state(state);
    if state & TCPSTATE_EXPANDED != 0 {
        rec.tcp_flags_session = ar[off + 4];
        rec.tcp_flags_init    = ar[off + 5];
        rec.tcp_flags_all     = ar[off + 4] | ar[off + 5];
    } else {
        rec.tcp_flags_all = ar[off + 4];
    }
    let (start_ms, elapsed_ms) = unpack_time_frac([ar[off + 7], ar[off + 8], ar[off + 9]]);
    rec.start_time += i64::from(start_ms);
    rec.duration   += elapsed_ms;
}

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            2 => Some(Layout::V2),
            3 => Some(Layout::V3),
            4 => Some(Layout::V4),
            5 => Some(Layout::V5),
            6 => Some(Layout::V6),
            _ => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V2              => 30,
            Layout::V3              => 36,
            Layout::V4              => 40,
            Layout::V5 | Layout::V6 => 38,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V2              => SWAP_V2,
            Layout::V3              => SWAP_V3,
            Layout::V4              => SWAP_V4,
            Layout::V5 | Layout::V6 => SWAP_V5,
        }
    }

    pub fn pack(self, _ctx: &StreamContext, rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
        pack_head(rec, ar)?;
        match self {
            Layout::V5 | Layout::V6 => {
                put_u16(ar, 22, rec.application);
                put_u16(ar, 24, rec.input_snmp);
                put_u16(ar, 26, rec.output_snmp);
                pack_tail(rec, ar, 28);
            }
            Layout::V3 | Layout::V4 => {
                put_u16(ar, 22, rec.application);
                ar[24] = rec.input_snmp as u8;
                ar[25] = rec.output_snmp as u8;
                pack_tail(rec, ar, 26);
                if self == Layout::V4 {
                    put_ipv4(ar, 36, &rec.next_hop_ip)?;
                }
            }
            Layout::V2 => {
                ar[22] = rec.input_snmp as u8;
                ar[23] = rec.output_snmp as u8;
                put_u24(ar, 24, rec.packets.min(MAX_PACKETS));
                ar[27] = rec.protocol;
                ar[28] = rec.tcp_flags_all;
                ar[29] = 0;
            }
        }
        Ok(())
    }

    pub fn unpack(self, ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let mut rec = FlowRecord::default();
        unpack_head(&mut rec, ar);
        match self {
            Layout::V5 | Layout::V6 => {
                rec.application = get_u16(ar, 22);
                rec.input_snmp  = get_u16(ar, 24);
                rec.output_snmp = get_u16(ar, 26);
                unpack_tail(&mut rec, ar, 28);
                if self == Layout::V6 {
                    rec.application = 0;
                }
            }
            Layout::V3 | Layout::V4 => {
                rec.application = get_u16(ar, 22);
                rec.input_snmp  = u16::from(ar[24]);
                rec.output_snmp = u16::from(ar[25]);
                unpack_tail(&mut rec, ar, 26);
                if self == Layout::V4 {
                    rec.next_hop_ip = get_ipv4(ar, 36);
                }
            }
            Layout::V2 => {
                rec.input_snmp    = u16::from(ar[22]);
                rec.output_snmp   = u16::from(ar[23]);
                rec.packets       = get_u24(ar, 24);
                rec.protocol      = ar[27];
                rec.tcp_flags_all = ar[28];
            }
        }
        rec.sensor_id = ctx.header_sensor();
        Ok(rec)
    }
}
