//! FT_RWROUTED: hour-relative IPv4 records with next hop and interfaces.
//! Sensor and flow type come from the file header.
//!
//! ```text
//! v5 (32 bytes)  0-11 flags/times/volumes  12-13 sPort 14-15 dPort
//!                16-17 input 18-19 output  20-23 sIP 24-27 dIP 28-31 nhIP
//! v3/v4 (32)     0- 3 sIP 4- 7 dIP 8- 9 sPort 10-11 dPort
//!                12-23 time/bytes/pkts/flags  24-27 nhIP 28-29 input 30-31 output
//! v1/v2 (28)     0- 3 sIP 4- 7 dIP 8-11 nhIP 12-13 sPort 14-15 dPort
//!                16-19 pef 20-23 sbb 24 proto 25 flags 26 input (u8) 27 output (u8)
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
    /// v1 and v2.
    V1,
    /// v3 and v4.
    V3,
    V5,
}

const SWAP_V5: &[SwapField] = &[
    U32(0), U32(4), U32(8), U16(12), U16(14), U16(16), U16(18), U32(20), U32(24), U32(28),
];
const SWAP_V3: &[SwapField] = &[
    U32(0), U32(4), U16(8), U16(10), U32(12), U32(16), U32(20), U32(24), U16(28), U16(30),
];
const SWAP_V1: &[SwapField] = &[
    U32(0), U32(4), U32(8), U16(12), U16(14), U32(16), U32(20),
];

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
            Layout::V1              => 28,
            Layout::V3 | Layout::V5 => 32,
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
                put_u16(ar, 16, rec.input_snmp);
                put_u16(ar, 18, rec.output_snmp);
                put_ipv4(ar, 20, &rec.src_ip)?;
                put_ipv4(ar, 24, &rec.dst_ip)?;
                put_ipv4(ar, 28, &rec.next_hop_ip)?;
            }
            Layout::V3 => {
                let w = pack_time_bytes_pkts_flags(rec, base)?;
                put_u32(ar, 12, w.pkts_stime);
                put_u32(ar, 16, w.bbe);
                put_u32(ar, 20, w.msec_flags);
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_u16(ar, 8, rec.src_port);
                put_u16(ar, 10, rec.dst_port);
                put_ipv4(ar, 24, &rec.next_hop_ip)?;
                put_u16(ar, 28, rec.input_snmp);
                put_u16(ar, 30, rec.output_snmp);
            }
            Layout::V1 => {
                if rec.input_snmp > 255 || rec.output_snmp > 255 {
                    return Err(CodecError::SnmpOverflow { input: rec.input_snmp, output: rec.output_snmp });
                }
                let w = pack_sbb_pef(rec, base)?;
                put_u32(ar, 16, w.pef);
                put_u32(ar, 20, w.sbb);
                put_ipv4(ar, 0, &rec.src_ip)?;
                put_ipv4(ar, 4, &rec.dst_ip)?;
                put_ipv4(ar, 8, &rec.next_hop_ip)?;
                put_u16(ar, 12, rec.src_port);
                put_u16(ar, 14, rec.dst_port);
                ar[24] = rec.protocol;
                ar[25] = rec.tcp_flags_all;
                ar[26] = rec.input_snmp as u8;
                ar[27] = rec.output_snmp as u8;
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
                rec.src_port    = get_u16(ar, 12);
                rec.dst_port    = get_u16(ar, 14);
                rec.input_snmp  = get_u16(ar, 16);
                rec.output_snmp = get_u16(ar, 18);
                rec.src_ip      = get_ipv4(ar, 20);
                rec.dst_ip      = get_ipv4(ar, 24);
                rec.next_hop_ip = get_ipv4(ar, 28);
            }
            Layout::V3 => {
                rec.src_ip   = get_ipv4(ar, 0);
                rec.dst_ip   = get_ipv4(ar, 4);
                rec.src_port = get_u16(ar, 8);
                rec.dst_port = get_u16(ar, 10);
                unpack_time_bytes_pkts_flags(&mut rec, base, TimeBytesPktsFlags::read(ar, 12));
                rec.next_hop_ip = get_ipv4(ar, 24);
                rec.input_snmp  = get_u16(ar, 28);
                rec.output_snmp = get_u16(ar, 30);
            }
            Layout::V1 => {
                rec.src_ip      = get_ipv4(ar, 0);
                rec.dst_ip      = get_ipv4(ar, 4);
                rec.next_hop_ip = get_ipv4(ar, 8);
                rec.src_port    = get_u16(ar, 12);
                rec.dst_port    = get_u16(ar, 14);
                unpack_sbb_pef(&mut rec, base, SbbPef { sbb: get_u32(ar, 20), pef: get_u32(ar, 16) });
                rec.protocol      = ar[24];
                rec.tcp_flags_all = ar[25];
                rec.input_snmp    = u16::from(ar[26]);
                rec.output_snmp   = u16::from(ar[27]);
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
    use crate::record::{Address, IPPROTO_UDP};
    use crate::stream::IoMode;

    const BASE: i64 = 1_577_836_800_000;

    fn ctx() -> StreamContext {
        StreamContext::new(FileFormat::Routed, IoMode::Write)
            .with_base_time(BASE)
            .with_header_sensor(12)
            .with_header_flow_type(3)
    }

    fn sample() -> FlowRecord {
        FlowRecord {
            src_ip:      Address::V4(0x0101_0101),
            dst_ip:      Address::V4(0x0808_0808),
            next_hop_ip: Address::V4(0x0A0A_0A01),
            src_port:    5353,
            dst_port:    53,
            protocol:    IPPROTO_UDP,
            packets:     2,
            bytes:       180,
            start_time:  BASE + 3_600_250,
            duration:    1_500,
            input_snmp:  7,
            output_snmp: 260,
            sensor_id:   12,
            flow_type:   3,
            ..Default::default()
        }
    }

    fn round_trip(layout: Layout, rec: &FlowRecord) -> Result<FlowRecord, CodecError> {
        let mut ar = vec![0u8; layout.record_len()];
        layout.pack(&ctx(), rec, &mut ar)?;
        layout.unpack(&ctx(), &ar)
    }

    #[test]
    fn v5_and_v3_keep_milliseconds() {
        let rec = sample();
        assert_eq!(round_trip(Layout::V5, &rec).unwrap(), rec);
        assert_eq!(round_trip(Layout::V3, &rec).unwrap(), rec);
    }

    #[test]
    fn v1_rejects_wide_interfaces() {
        assert!(matches!(
            round_trip(Layout::V1, &sample()),
            Err(CodecError::SnmpOverflow { input: 7, output: 260 })
        ));
        let rec = FlowRecord { output_snmp: 9, ..sample() };
        let out = round_trip(Layout::V1, &rec).unwrap();
        assert_eq!(out.start_time, BASE + 3_600_000);
        assert_eq!(out.duration, 1_000);
        assert_eq!(out.output_snmp, 9);
    }

    #[test]
    fn start_before_base() {
        let rec = FlowRecord { start_time: BASE - 1_000, ..sample() };
        assert!(matches!(round_trip(Layout::V5, &rec), Err(CodecError::StartTimeUnderflow { .. })));
    }
}
