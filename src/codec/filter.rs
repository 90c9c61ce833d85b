//! FT_RWFILTER: output of record selection, with sensor and flow type
//! carried in every record.
//!
//! ```text
//! v4/v5 (44 bytes)
//!  0- 3 sIP  4- 7 dIP  8- 9 sPort 10-11 dPort 12-15 nhIP
//! 16-17 input 18-19 output 20-23 start secs 24-27 elapsed secs
//! 28-31 packets:20 pflag:1 is_tcp:1 start_ms:10
//! 32-35 bpp:20 pad:2 elapsed_ms:10
//! 36-37 sensor 38 flow_type 39 prot_flags 40-41 application
//! 42 tcp_state 43 rest_flags
//!
//! v3 (40 bytes)
//!  0-27 as v4
//! 28-31 packets:20 pflag:1 pad:3 flow_type:8
//! 32-35 bpp:20 pad:12
//! 36-37 sensor 38 proto 39 flags
//!
//! v1/v2 (32 bytes)
//!  0- 3 sIP  4- 7 dIP  8- 9 sPort 10-11 dPort
//! 12 proto 13 flags 14 input (u8) 15 output (u8)
//! 16-19 nhIP 20-23 start secs
//! 24-27 packets:20 elapsed_secs:11 pflag:1
//! 28-31 bpp:20 pad:4 sensor:8        (v2)
//!       bpp:20 sensor:6 pad:6        (v1)
//! ```

use crate::bits::{get_bits, SwapField::{self, U16, U32}, MASK6, MASK8, MASK10, MASK11, MASK20};
use crate::codec::CodecError;
use crate::pack::{
    get_ipv4, get_u16, get_u32, pack_bytes_packets, pack_proto_flags, put_ipv4, put_u16,
    put_u32, unpack_bytes_packets, unpack_proto_flags, ProtoFlags, Volume, MAX_ELAPSED_TIME_OLD,
};
use crate::record::FlowRecord;
use crate::stream::StreamContext;

pub const DEFAULT_VERSION: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    V1,
    V2,
    V3,
    /// v4 and v5.
    V4,
}

const SWAP_V4: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U16(16), U16(18),
    U32(20), U32(24), U32(28), U32(32), U16(36), U16(40),
];
const SWAP_V3: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U16(16), U16(18),
    U32(20), U32(24), U32(28), U32(32), U16(36),
];
const SWAP_V1: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(16), U32(20), U32(24), U32(28),
];

impl Layout {
    pub fn for_version(version: u8) -> Option<Self> {
        match version {
            1     => Some(Layout::V1),
            2     => Some(Layout::V2),
            3     => Some(Layout::V3),
            4 | 5 => Some(Layout::V4),
            _     => None,
        }
    }

    pub fn record_len(self) -> usize {
        match self {
            Layout::V1 | Layout::V2 => 32,
            Layout::V3              => 40,
            Layout::V4              => 44,
        }
    }

    pub fn swap_table(self) -> &'static [SwapField] {
        match self {
            Layout::V1 | Layout::V2 => SWAP_V1,
            Layout::V3              => SWAP_V3,
            Layout::V4              => SWAP_V4,
        }
    }

    pub fn pack(self, _ctx: &StreamContext, rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
        match self {
            Layout::V4 => pack_v4(rec, ar),
            Layout::V3 => pack_v3(rec, ar),
            Layout::V2 => pack_v1_v2(rec, ar, false),
            Layout::V1 => pack_v1_v2(rec, ar, true),
        }
    }

    pub fn unpack(self, _ctx: &StreamContext, ar: &[u8]) -> Result<FlowRecord, CodecError> {
        let mut rec = FlowRecord::default();
        match self {
            Layout::V4 => unpack_v4(&mut rec, ar),
            Layout::V3 => unpack_v3(&mut rec, ar),
            Layout::V2 => unpack_v1_v2(&mut rec, ar, false),
            Layout::V1 => unpack_v1_v2(&mut rec, ar, true),
        }
        Ok(rec)
    }
}

/// Addresses, ports, next hop and both interfaces: bytes 0..20 of v3-v5.
fn pack_endpoints(rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
    put_ipv4(ar, 0, &rec.src_ip)?;
    put_ipv4(ar, 4, &rec.dst_ip)?;
    put_u16(ar, 8, rec.src_port);
    put_u16(ar, 10, rec.dst_port);
    put_ipv4(ar, 12, &rec.next_hop_ip)?;
    put_u16(ar, 16, rec.input_snmp);
    put_u16(ar, 18, rec.output_snmp);
    Ok(())
}

fn unpack_endpoints(rec: &mut FlowRecord, ar: &[u8]) {
    rec.src_ip      = get_ipv4(ar, 0);
    rec.dst_ip      = get_ipv4(ar, 4);
    rec.src_port    = get_u16(ar, 8);
    rec.dst_port    = get_u16(ar, 10);
    rec.next_hop_ip = get_ipv4(ar, 12);
    rec.input_snmp  = get_u16(ar, 16);
    rec.output_snmp = get_u16(ar, 18);
}

// ── v4 / v5 ──────────────────────────────────────────────────────────────────

fn pack_v4(rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
    let vol = pack_bytes_packets(rec)?;
    let pf = pack_proto_flags(rec);
    pack_endpoints(rec, ar)?;

    put_u32(ar, 20, rec.start_seconds() as u32);
    put_u32(ar, 24, rec.elapsed_seconds());
    put_u32(ar, 28, (vol.packets << 12)
        | (u32::from(vol.pflag) << 11)
        | (u32::from(pf.is_tcp) << 10)
        | (rec.start_msec() & MASK10));
    put_u32(ar, 32, (vol.bpp << 12) | (rec.elapsed_msec() & MASK10));
    put_u16(ar, 36, rec.sensor_id);
    ar[38] = rec.flow_type;
    ar[39] = pf.prot_flags;
    put_u16(ar, 40, rec.application);
    ar[42] = pf.tcp_state;
    ar[43] = pf.rest_flags;
    Ok(())
}

fn unpack_v4(rec: &mut FlowRecord, ar: &[u8]) {
    unpack_endpoints(rec, ar);
    let pkts_stimems = get_u32(ar, 28);
    let bb_elapsems  = get_u32(ar, 32);

    rec.sensor_id   = get_u16(ar, 36);
    rec.flow_type   = ar[38];
    rec.application = get_u16(ar, 40);
    rec.start_time  = i64::from(get_u32(ar, 20)) * 1000 + i64::from(get_bits(pkts_stimems, 0, 10));

    unpack_proto_flags(rec, ProtoFlags {
        is_tcp:     get_bits(pkts_stimems, 10, 1) != 0,
        prot_flags: ar[39],
        tcp_state:  ar[42],
        rest_flags: ar[43],
    });

    rec.duration = get_u32(ar, 24).wrapping_mul(1000).wrapping_add(get_bits(bb_elapsems, 0, 10));
    unpack_bytes_packets(rec, Volume {
        bpp:     get_bits(bb_elapsems, 12, 20),
        packets: get_bits(pkts_stimems, 12, 20),
        pflag:   get_bits(pkts_stimems, 11, 1) != 0,
    });
}

// ── v3 ───────────────────────────────────────────────────────────────────────

fn pack_v3(rec: &FlowRecord, ar: &mut [u8]) -> Result<(), CodecError> {
    pack_endpoints(rec, ar)?;
    put_u32(ar, 20, rec.start_seconds() as u32);
    put_u32(ar, 24, rec.elapsed_seconds());

    let vol = pack_bytes_packets(rec)?;
    put_u32(ar, 28, (vol.packets << 12) | (u32::from(vol.pflag) << 11) | u32::from(rec.flow_type));
    put_u32(ar, 32, vol.bpp << 12);
    put_u16(ar, 36, rec.sensor_id);
    ar[38] = rec.protocol;
    ar[39] = rec.tcp_flags_all;
    Ok(())
}

fn unpack_v3(rec: &mut FlowRecord, ar: &[u8]) {
    unpack_endpoints(rec, ar);
    rec.start_time    = i64::from(get_u32(ar, 20)) * 1000;
    rec.duration      = get_u32(ar, 24).wrapping_mul(1000);
    rec.sensor_id     = get_u16(ar, 36);
    rec.protocol      = ar[38];
    rec.tcp_flags_all = ar[39];

    let pkts_ftype = get_u32(ar, 28);
    rec.flow_type = get_bits(pkts_ftype, 0, 8) as u8;
    unpack_bytes_packets(rec, Volume {
        bpp:     get_u32(ar, 32) >> 12,
        packets: get_bits(pkts_ftype, 12, 20),
        pflag:   get_bits(pkts_ftype, 11, 1) != 0,
    });
}

// ── v1 / v2 ──────────────────────────────────────────────────────────────────

fn pack_v1_v2(rec: &FlowRecord, ar: &mut [u8], six_bit_sensor: bool) -> Result<(), CodecError> {
    if rec.input_snmp > 255 || rec.output_snmp > 255 {
        return Err(CodecError::SnmpOverflow { input: rec.input_snmp, output: rec.output_snmp });
    }
    if rec.sensor_id > 255 {
        return Err(CodecError::SensorOverflow { sensor: rec.sensor_id });
    }
    let elapsed = rec.elapsed_seconds();
    if elapsed >= MAX_ELAPSED_TIME_OLD {
        return Err(CodecError::ElapsedOverflow { duration: rec.duration });
    }
    let vol = pack_bytes_packets(rec)?;

    let sensor = u32::from(rec.sensor_id);
    let mut bbs = (vol.bpp << 12) | (sensor & MASK8);
    if six_bit_sensor {
        if sensor > MASK6 {
            return Err(CodecError::SensorOverflow { sensor: rec.sensor_id });
        }
        bbs = (bbs & 0xFFFF_F000) | ((bbs & MASK6) << 6);
    }
    let pef = (vol.packets << 12) | (elapsed << 1) | u32::from(vol.pflag);

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
    put_u32(ar, 24, pef);
    put_u32(ar, 28, bbs);
    Ok(())
}

fn unpack_v1_v2(rec: &mut FlowRecord, ar: &[u8], six_bit_sensor: bool) {
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

    let pef = get_u32(ar, 24);
    let sbb = get_u32(ar, 28);
    rec.duration = 1000 * ((pef >> 1) & MASK11);
    unpack_bytes_packets(rec, Volume {
        bpp:     (sbb >> 12) & MASK20,
        packets: pef >> 12,
        pflag:   pef & 1 != 0,
    });

    rec.sensor_id = if six_bit_sensor {
        ((sbb >> 6) & MASK6) as u16
    } else {
        (sbb & MASK8) as u16
    };
}
