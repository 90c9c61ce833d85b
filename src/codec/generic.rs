//! FT_RWGENERIC: the wide, self-contained IPv4 layouts.
//!
//! Every version stores absolute times and full 32-bit volumes, so these
//! layouts never consult the stream's base time.
//!
//! ```text
//! v5 (52 bytes)                       v3/v4 (56 bytes)
//!  0- 7  start_time ms (i64)           0- 3 sIP     4- 7 dIP
//!  8-11  elapsed ms                    8- 9 sPort  10-11 dPort
//! 12-13  sPort   14-15 dPort          12-15 nhIP   16-17 input  18-19 output
//! 16     proto   17 flow_type         20-23 start secs   24-27 elapsed secs
//! 18-19  sensor                       28-31 packets      32-35 bytes
//! 20 flags 21 init 22 session 23 state 36 proto 37 flow_type 38-39 sensor
//! 24-25  application 26-27 memo       40 flags 41 init 42 session 43 state
//! 28-29  input 30-31 output           44-47 zero (former bpp)
//! 32-35  packets 36-39 bytes          48-49 start ms  50-51 elapsed ms
//! 40-43  sIP 44-47 dIP 48-51 nhIP     52-53 application 54-55 zero
//!
//! v2 (48 bytes): v3 without the millisecond words and application.
//!
//! v0 (40 bytes) / v1 (37 bytes)
//!  0- 3 sIP  4- 7 dIP  8- 9 sPort 10-11 dPort
//! 12 proto  13 flags  14 input (u8)  15 output (u8)
//! 16-19 nhIP 20-23 start secs 24-27 packets 28-31 bytes 32-35 elapsed secs
//! 36 sensor (u8)  37-39 zero padding (v0 only)
//! ```

use crate::bits::SwapField::{self, U16, U32, U64};
use crate::codec::{sanitize_tcp_state, CodecError};
use crate::pack::{get_i64, get_ipv4, get_u16, get_u32, put_i64, put_ipv4, put_u16, put_u32};
use crate::record::FlowRecord;
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// v0: the v1 body with three bytes of padding.
    V0,
    V1,
    V2,
    /// v3 and v4.
    V3,
    V5,
}

const SWAP_V5: &[SwapField] = &[
    U64(0), U32(8), U16(12), U16(14), U16(18), U16(24), U16(26),
    U16(28), U16(30), U32(32), U32(36), U32(40), U32(44), U32(48),
];
const SWAP_V3: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U16(16), U16(18), U32(20),
    U32(24), U32(28), U32(32), U16(38), U32(44), U16(48), U16(50), U16(52),
];
const SWAP_V2: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U16(16), U16(18), U32(20),
    U32(24), U32(28), U32(32), U16(38), U32(44),
];
const SWAP_V1: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(16), U32(20), U32(24), U32(28), U32(32),
];

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            0     => Some(Layout::V0),
            1     => Some(Layout::V1),
            2     => Some(Layout::V2),
            3 | 4 => Some(Layout::V3),
            5     => Some(Layout::V5),
            _     => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V0 => 40,
            Layout::V1 => 37,
            Layout::V2 => 48,
            Layout::V3 => 56,
            Layout::V5 => 52,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V0 | Layout::V1 => SWAP_V1,
            Layout::V2              => SWAP_V2,
            Layout::V3              => SWAP_V3,
            Layout::V5              => SWAP_V5,
        }
    }

    pub fn pack(self, _ctx: &StreamContext, rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
        match self {
            Layout::V5              => pack_v5(rec, ar),
            Layout::V3              => pack_v2_v3(rec, ar, true),
            Layout::V2              => pack_v2_v3(rec, ar, false),
            Layout::V0 | Layout::V1 => pack_v1(rec, ar),
        }
    }

    pub fn unpack(self, _ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let mut rec = FlowRecord::default();
        match self {
            Layout::V5 => {
                unpack_v5(&mut rec, ar);
                sanitize_tcp_state(&mut rec);
            }
            Layout::V3 => {
                unpack_v2_v3(&mut rec, ar, true);
                sanitize_tcp_state(&mut rec);
            }
            Layout::V2 => {
                unpack_v2_v3(&mut rec, ar, false);
                sanitize_tcp_state(&mut rec);
            }
            Layout::V0 | Layout::V1 => unpack_v1(&mut rec, ar),
        }
        Ok(rec)
    }
}

// ── v5 ───────────────────────────────────────────────────────────────────────

fn pack_v5(rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
    put_ipv4(ar, 40, &rec.src_ip)?;
    put_ipv4(ar, 44, &rec.dst_ip)?;
    put_ipv4(ar, 48, &rec.next_hop_ip)?;

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
    ar[23] = rec.tcp_state();
    put_u16(ar, 24, rec.application);
    put_u16(ar, 26, rec.memo);
    put_u16(ar, 28, rec.input_snmp);
    put_u16(ar, 30, rec.output_snmp);
    put_u32(ar, 32, rec.packets);
    put_u32(ar, 36, rec.bytes);
    Ok(())
}

fn unpack_v5(rec: &mut FlowRecord, ar: &[u8]) {
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
    rec.input_snmp        = get_u16(ar, 28);
    rec.output_snmp       = get_u16(ar, 30);
    rec.packets           = get_u32(ar, 32);
    rec.bytes             = get_u32(ar, 36);
    rec.src_ip            = get_ipv4(ar, 40);
    rec.dst_ip            = get_ipv4(ar, 44);
    rec.next_hop_ip       = get_ipv4(ar, 48);
}

// ── v2 / v3 / v4 ─────────────────────────────────────────────────────────────

fn pack_v2_v3(rec: &FlowRecord, ar: &mut [u8], millis: bool) -> Result<(), CodecError> {
    put_ipv4(ar, 0, &rec.src_ip)?;
    put_ipv4(ar, 4, &rec.dst_ip)?;
    put_u16(ar, 8, rec.src_port);
    put_u16(ar, 10, rec.dst_port);
    put_ipv4(ar, 12, &rec.next_hop_ip)?;
    put_u16(ar, 16, rec.input_snmp);
    put_u16(ar, 18, rec.output_snmp);

    put_u32(ar, 20, rec.start_seconds() as u32);
    put_u32(ar, 24, rec.elapsed_seconds());
    put_u32(ar, 28, rec.packets);
    put_u32(ar, 32, rec.bytes);

    ar[36] = rec.protocol;
    ar[37] = rec.flow_type;
    put_u16(ar, 38, rec.sensor_id);
    ar[40] = rec.tcp_flags_all;
    ar[41] = rec.tcp_flags_init;
    ar[42] = rec.tcp_flags_session;
    ar[43] = rec.tcp_state();
    put_u32(ar, 44, 0);

    if millis {
        put_u16(ar, 48, rec.start_msec() as u16);
        put_u16(ar, 50, rec.elapsed_msec() as u16);
        put_u16(ar, 52, rec.application);
        put_u16(ar, 54, 0);
    }
    Ok(())
}

fn unpack_v2_v3(rec: &mut FlowRecord, ar: &[u8], millis: bool) {
    rec.src_ip      = get_ipv4(ar, 0);
    rec.dst_ip      = get_ipv4(ar, 4);
    rec.src_port    = get_u16(ar, 8);
    rec.dst_port    = get_u16(ar, 10);
    rec.next_hop_ip = get_ipv4(ar, 12);
    rec.input_snmp  = get_u16(ar, 16);
    rec.output_snmp = get_u16(ar, 18);

    let (start_ms, elapsed_ms) = if millis {
        (get_u16(ar, 48), get_u16(ar, 50))
    } else {
        (0, 0)
    };
    rec.start_time = i64::from(get_u32(ar, 20)) * 1000 + i64::from(start_ms);
    rec.duration   = get_u32(ar, 24).wrapping_mul(1000).wrapping_add(u32::from(elapsed_ms));

    rec.packets           = get_u32(ar, 28);
    rec.bytes             = get_u32(ar, 32);
    rec.protocol          = ar[36];
    rec.flow_type         = ar[37];
    rec.sensor_id         = get_u16(ar, 38);
    rec.tcp_flags_all     = ar[40];
    rec.tcp_flags_init    = ar[41];
    rec.tcp_flags_session = ar[42];
    rec.set_tcp_state(ar[43]);

    if millis {
        rec.application = get_u16(ar, 52);
    }
}

// ── v0 / v1 ──────────────────────────────────────────────────────────────────

fn pack_v1(rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
    if rec.input_snmp > 255 || rec.output_snmp > 255 {
        return Err(CodecError::SnmpOverflow { input: rec.input_snmp, output: rec.output_snmp });
    }
    if rec.sensor_id > 255 {
        return Err(CodecError::SensorOverflow { sensor: rec.sensor_id });
    }

    put_ipv4(ar, 0, &rec.src_ip)?;
    put_ipv4(ar, 4, &rec.dst_ip)?;
    put_u16(ar, 8, rec.src_port);
    put_u16(ar, 10, rec.dst_port);
    ar[12] = rec.protocol;
    ar[13] = rec.tcp_flags_all;
    ar[14] = rec.input_snmp as u8;
    ar[15] = rec.output_snmp as u8;
    put_ipv4(ar, 16, &rec.next_hop_ip)?;
    put_u32(ar, 20, rec.start_seconds() as u32);
    put_u32(ar, 24, rec.packets);
    put_u32(ar, 28, rec.bytes);
    put_u32(ar, 32, rec.elapsed_seconds());
    ar[36] = rec.sensor_id as u8;
    // v0 padding (37..40) is already zero in the scratch buffer.
    Ok(())
}

fn unpack_v1(rec: &mut FlowRecord, ar: &[u8]) {
    rec.src_ip        = get_ipv4(ar, 0);
    rec.dst_ip        = get_ipv4(ar, 4);
    rec.src_port      = get_u16(ar, 8);
    rec.dst_port      = get_u16(ar, 10);
    rec.protocol      = ar[12];
    rec.tcp_flags_all = ar[13];
    rec.input_snmp    = u16::from(ar[14]);
    rec.output_snmp   = u16::from(ar[15]);
    rec.next_hop_ip   = get_ipv4(ar, 16);
    rec.start_time    = i64::from(get_u32(ar, 20)) * 1000;
    rec.packets       = get_u32(ar, 24);
    rec.bytes         = get_u32(ar, 28);
    rec.duration      = get_u32(ar, 32).wrapping_mul(1000);
    rec.sensor_id     = u16::from(ar[36]);
}
