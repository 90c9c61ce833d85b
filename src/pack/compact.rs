//! Time-and-volume recipes for the hour-relative layouts.
//!
//! All start times here are stored as an offset from the stream's base
//! time (the start of the file's hour), so a record more than 4096 seconds
//! past the base, or before it, cannot be packed.
//!
//! | recipe | words | time resolution | elapsed cap |
//! |--------|-------|-----------------|-------------|
//! | sbb/pef | 2 | seconds | 2047 s |
//! | time/bytes/pkts/flags | 3 | milliseconds | 4095 s |
//! | flags/times/volumes | 3 (+4 byte tail) | milliseconds | 4095.999 s |
//! | times/flags/proto | 6 bytes | milliseconds | none (no elapsed) |

use crate::bits::{get_bits, MASK10, MASK12, MASK20, MASK21, MASK22};
use crate::codec::CodecError;
use crate::record::{FlowRecord, IPPROTO_TCP, TCPSTATE_EXPANDED};

use super::{
    get_u16, get_u32, pack_bytes_packets, pack_proto_flags, put_u16, put_u32, unpack_bytes_packets,
    unpack_proto_flags, ProtoFlags, Volume, MAX_ELAPSED_TIME, MAX_ELAPSED_TIME_OLD, MAX_START_TIME,
};

/// Milliseconds between `base` and the record start, checked against the
/// 4096-second window.
fn start_offset(rec: &FlowRecord, base: i64) -> Result<i64, CodecError> {
    if rec.start_time < base {
        return Err(CodecError::StartTimeUnderflow { start_time: rec.start_time, base_time: base });
    }
    let offset = rec.start_time
        .checked_sub(base)
        .ok_or(CodecError::StartTimeOverflow { start_time: rec.start_time, base_time: base })?;
    if offset >= MAX_START_TIME * 1000 {
        return Err(CodecError::StartTimeOverflow { start_time: rec.start_time, base_time: base });
    }
    Ok(offset)
}

// ── sbb / pef ────────────────────────────────────────────────────────────────

/// `sbb`: start seconds (12) | bytes per packet (20).
/// `pef`: packets (20) | elapsed seconds (11) | multiplier (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbbPef {
    pub sbb: u32,
    pub pef: u32,
}

pub fn pack_sbb_pef(rec: &FlowRecord, base: i64) -> Result<SbbPef, CodecError> {
    let elapsed = rec.elapsed_seconds();
    if elapsed >= MAX_ELAPSED_TIME_OLD {
        return Err(CodecError::ElapsedOverflow { duration: rec.duration });
    }
    let start = (start_offset(rec, base)? / 1000) as u32;
    let vol = pack_bytes_packets(rec)?;

    Ok(SbbPef {
        sbb: ((start & MASK12) << 20) | (vol.bpp & MASK20),
        pef: (vol.packets << 12) | (elapsed << 1) | u32::from(vol.pflag),
    })
}

pub fn unpack_sbb_pef(rec: &mut FlowRecord, base: i64, words: SbbPef) {
    let SbbPef { sbb, pef } = words;
    rec.duration   = 1000 * get_bits(pef, 1, 11);
    rec.start_time = base.saturating_add(i64::from(sbb >> 20) * 1000);
    unpack_bytes_packets(rec, Volume {
        bpp:     sbb & MASK20,
        packets: pef >> 12,
        pflag:   pef & 1 != 0,
    });
}

// ── time / bytes / packets / flags ───────────────────────────────────────────

/// Three words:
///
/// ```text
/// pkts_stime  packets:20  start_secs:12
/// bbe         bpp:20      elapsed_secs:12
/// msec_flags  start_ms:10 elapsed_ms:10 pflag:1 is_tcp:1 pad:2 prot_flags:8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBytesPktsFlags {
    pub pkts_stime: u32,
    pub bbe:        u32,
    pub msec_flags: u32,
}

impl TimeBytesPktsFlags {
    pub fn read(ar: &[u8], off: usize) -> Self {
        Self {
            pkts_stime: get_u32(ar, off),
            bbe:        get_u32(ar, off + 4),
            msec_flags: get_u32(ar, off + 8),
        }
    }
}

pub fn pack_time_bytes_pkts_flags(rec: &FlowRecord, base: i64) -> Result<TimeBytesPktsFlags, CodecError> {
    let elapsed_s  = rec.duration / 1000;
    let elapsed_ms = rec.duration % 1000;
    if elapsed_s >= MAX_ELAPSED_TIME {
        return Err(CodecError::ElapsedOverflow { duration: rec.duration });
    }
    let offset   = start_offset(rec, base)?;
    let start_s  = (offset / 1000) as u32;
    let start_ms = (offset % 1000) as u32;
    let vol = pack_bytes_packets(rec)?;

    let (is_tcp, prot_flags) = if rec.protocol == IPPROTO_TCP {
        (1u32, rec.tcp_flags_all)
    } else {
        (0u32, rec.protocol)
    };

    Ok(TimeBytesPktsFlags {
        pkts_stime: (vol.packets << 12) | (start_s & MASK12),
        bbe:        (vol.bpp << 12) | (elapsed_s & MASK12),
        msec_flags: ((start_ms & MASK10) << 22)
            | ((elapsed_ms & MASK10) << 12)
            | (u32::from(vol.pflag) << 11)
            | (is_tcp << 10)
            | u32::from(prot_flags),
    })
}

/// A record whose protocol is already TCP keeps it and takes the flags byte.
pub fn unpack_time_bytes_pkts_flags(rec: &mut FlowRecord, base: i64, w: TimeBytesPktsFlags) {
    rec.start_time = base.saturating_add(
        i64::from(get_bits(w.pkts_stime, 0, 12)) * 1000 + i64::from(get_bits(w.msec_flags, 22, 10)),
    );
    rec.duration = 1000 * get_bits(w.bbe, 0, 12) + get_bits(w.msec_flags, 12, 10);

    let is_tcp     = get_bits(w.msec_flags, 10, 1) != 0;
    let prot_flags = get_bits(w.msec_flags, 0, 8) as u8;
    if rec.protocol == IPPROTO_TCP {
        rec.tcp_flags_all = prot_flags;
    } else if !is_tcp {
        rec.protocol = prot_flags;
    } else {
        rec.protocol      = IPPROTO_TCP;
        rec.tcp_flags_all = prot_flags;
    }

    unpack_bytes_packets(rec, Volume {
        bpp:     get_bits(w.bbe, 12, 20),
        packets: get_bits(w.pkts_stime, 12, 20),
        pflag:   get_bits(w.msec_flags, 11, 1) != 0,
    });
}

/// The augmented variant: the low eleven bits of `msec_flags` hold the
/// folded protocol/flags byte and is_tcp marker, while `tcp_state` and
/// `rest_flags` travel in the returned [`ProtoFlags`] for the caller to place.
pub fn pack_time_bytes_pkts_proto_flags(
    rec:  &FlowRecord,
    base: i64,
) -> Result<(TimeBytesPktsFlags, ProtoFlags), CodecError> {
    let mut w = pack_time_bytes_pkts_flags(rec, base)?;
    let pf = pack_proto_flags(rec);
    w.msec_flags = (w.msec_flags & (MASK21 << 11))
        | (u32::from(pf.is_tcp) << 10)
        | u32::from(pf.prot_flags);
    Ok((w, pf))
}

pub fn unpack_time_bytes_pkts_proto_flags(
    rec:        &mut FlowRecord,
    base:       i64,
    w:          TimeBytesPktsFlags,
    tcp_state:  u8,
    rest_flags: u8,
) {
    unpack_time_bytes_pkts_flags(rec, base, w);
    unpack_proto_flags(rec, ProtoFlags {
        is_tcp:     get_bits(w.msec_flags, 10, 1) != 0,
        prot_flags: get_bits(w.msec_flags, 0, 8) as u8,
        tcp_state,
        rest_flags,
    });
}

// ── flags / times / volumes ──────────────────────────────────────────────────

/// Whether the four-byte `tcp_state | rest_flags | application` tail follows
/// the twelve-byte body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeTail {
    Absent,
    Present,
}

impl VolumeTail {
    pub fn len(self) -> usize {
        match self {
            VolumeTail::Absent  => 12,
            VolumeTail::Present => 16,
        }
    }
}

/// Writes bytes `0..12` (or `0..16`) of `ar`:
///
/// ```text
///  0- 3  start_ms_offset:22  bpp_hi:10
///  4- 7  bpp_lo:10           elapsed_ms:22
///  8-11  prot_flags:8 pflag:1 is_tcp:1 pad:2 packets:20
/// 12     tcp_state                      (tail only)
/// 13     rest_flags                     (tail only)
/// 14-15  application                    (tail only)
/// ```
pub fn pack_flags_times_volumes(
    ar:   &mut [u8],
    rec:  &FlowRecord,
    base: i64,
    tail: VolumeTail,
) -> Result<(), CodecError> {
    if rec.duration >= 1000 * MAX_ELAPSED_TIME {
        return Err(CodecError::ElapsedOverflow { duration: rec.duration });
    }
    let start = start_offset(rec, base)? as u32;
    let vol = pack_bytes_packets(rec)?;

    put_u32(ar, 0, ((start & MASK22) << 10) | get_bits(vol.bpp, 10, 10));
    put_u32(ar, 4, (get_bits(vol.bpp, 0, 10) << 22) | (rec.duration & MASK22));

    let tcp_state = match tail {
        VolumeTail::Absent => 0,
        VolumeTail::Present => {
            let state = rec.tcp_state();
            ar[12] = state;
            ar[13] = if !rec.is_tcp() {
                rec.tcp_flags_all
            } else if state & TCPSTATE_EXPANDED != 0 {
                rec.tcp_flags_session
            } else {
                0
            };
            put_u16(ar, 14, rec.application);
            state
        }
    };

    let mut word = (u32::from(vol.pflag) << 23) | (vol.packets & MASK20);
    if !rec.is_tcp() {
        word |= u32::from(rec.protocol) << 24;
    } else if tcp_state & TCPSTATE_EXPANDED != 0 {
        word |= (u32::from(rec.tcp_flags_init) << 24) | (1 << 22);
    } else {
        word |= (u32::from(rec.tcp_flags_all) << 24) | (1 << 22);
    }
    put_u32(ar, 8, word);
    Ok(())
}

/// `force_tcp` treats the record as TCP whatever the stored is_tcp bit says.
pub fn unpack_flags_times_volumes(
    rec:       &mut FlowRecord,
    ar:        &[u8],
    base:      i64,
    tail:      VolumeTail,
    force_tcp: bool,
) {
    let (tcp_state, rest_flags) = match tail {
        VolumeTail::Absent => (0, 0),
        VolumeTail::Present => {
            rec.set_tcp_state(ar[12]);
            rec.application = get_u16(ar, 14);
            (ar[12], ar[13])
        }
    };

    let word   = get_u32(ar, 8);
    let is_tcp = force_tcp || get_bits(word, 22, 1) != 0;
    let high   = get_bits(word, 24, 8) as u8;
    if !is_tcp {
        rec.protocol      = high;
        rec.tcp_flags_all = rest_flags;
    } else {
        rec.protocol = IPPROTO_TCP;
        if tcp_state & TCPSTATE_EXPANDED != 0 {
            rec.tcp_flags_session = rest_flags;
            rec.tcp_flags_init    = high;
        }
        rec.tcp_flags_all = high | rest_flags;
    }

    let w0 = get_u32(ar, 0);
    let w1 = get_u32(ar, 4);
    rec.duration   = w1 & MASK22;
    rec.start_time = base.saturating_add(i64::from(get_bits(w0, 10, 22)));

    unpack_bytes_packets(rec, Volume {
        bpp:     (get_bits(w0, 0, 10) << 10) | get_bits(w1, 22, 10),
        packets: get_bits(word, 0, 20),
        pflag:   get_bits(word, 23, 1) != 0,
    });
}

// ── times / flags / proto ────────────────────────────────────────────────────

/// Writes bytes `0..6` of `ar`:
///
/// ```text
/// 0-3  rest_flags:8 is_tcp:1 unused:1 start_ms_offset:22
/// 4    protocol (non-TCP), initial flags (expanded) or all flags
/// 5    tcp_state
/// ```
///
/// Non-TCP flows lose their flags.
pub fn pack_times_flags_proto(ar: &mut [u8], rec: &FlowRecord, base: i64) -> Result<(), CodecError> {
    let start = start_offset(rec, base)? as u32 & MASK22;

    if !rec.is_tcp() {
        put_u32(ar, 0, start);
        ar[4] = rec.protocol;
    } else if rec.is_expanded() {
        put_u32(ar, 0, (u32::from(rec.tcp_flags_session) << 24) | (1 << 23) | start);
        ar[4] = rec.tcp_flags_init;
    } else {
        put_u32(ar, 0, (1 << 23) | start);
        ar[4] = rec.tcp_flags_all;
    }
    ar[5] = rec.tcp_state();
    Ok(())
}

pub fn unpack_times_flags_proto(rec: &mut FlowRecord, ar: &[u8], base: i64) {
    let word = get_u32(ar, 0);
    rec.start_time = base.saturating_add(i64::from(get_bits(word, 0, 22)));

    if get_bits(word, 23, 1) == 0 {
        rec.protocol = ar[4];
    } else if ar[5] & TCPSTATE_EXPANDED != 0 {
        rec.protocol          = IPPROTO_TCP;
        rec.tcp_flags_session = get_bits(word, 24, 8) as u8;
        rec.tcp_flags_init    = ar[4];
        rec.tcp_flags_all     = rec.tcp_flags_init | rec.tcp_flags_session;
    } else {
        rec.protocol      = IPPROTO_TCP;
        rec.tcp_flags_all = ar[4];
    }
    rec.set_tcp_state(ar[5]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ACK_FLAG, IPPROTO_UDP, PSH_FLAG, SYN_FLAG};

    const BASE: i64 = 1_577_836_800_000;

    fn tcp_record() -> FlowRecord {
        FlowRecord {
            protocol:          IPPROTO_TCP,
            packets:           10,
            bytes:             4_000,
            start_time:        BASE + 1_234_567,
            duration:          61_250,
            tcp_state:         TCPSTATE_EXPANDED,
            tcp_flags_init:    SYN_FLAG,
            tcp_flags_session: ACK_FLAG | PSH_FLAG,
            tcp_flags_all:     SYN_FLAG | ACK_FLAG | PSH_FLAG,
            application:       80,
            ..Default::default()
        }
    }

    #[test]
    fn sbb_pef_truncates_to_seconds() {
        let rec = tcp_record();
        let w = pack_sbb_pef(&rec, BASE).unwrap();
        let mut out = FlowRecord::default();
        unpack_sbb_pef(&mut out, BASE, w);
        assert_eq!(out.start_time, BASE + 1_234_000);
        assert_eq!(out.duration, 61_000);
        assert_eq!((out.packets, out.bytes), (10, 4_000));
    }

    #[test]
    fn sbb_pef_limits() {
        let mut rec = tcp_record();
        rec.duration = 2_048_000;
        assert!(matches!(pack_sbb_pef(&rec, BASE), Err(CodecError::ElapsedOverflow { .. })));
        rec.duration = 2_047_999;
        assert!(pack_sbb_pef(&rec, BASE).is_ok());

        rec.start_time = BASE - 1;
        assert!(matches!(pack_sbb_pef(&rec, BASE), Err(CodecError::StartTimeUnderflow { .. })));
        rec.start_time = BASE + 4_096_000;
        assert!(matches!(pack_sbb_pef(&rec, BASE), Err(CodecError::StartTimeOverflow { .. })));
    }

    #[test]
    fn tbpf_keeps_milliseconds() {
        let rec = tcp_record();
        let w = pack_time_bytes_pkts_flags(&rec, BASE).unwrap();
        let mut out = FlowRecord::default();
        unpack_time_bytes_pkts_flags(&mut out, BASE, w);
        assert_eq!(out.start_time, rec.start_time);
        assert_eq!(out.duration, rec.duration);
        assert_eq!(out.protocol, IPPROTO_TCP);
        assert_eq!(out.tcp_flags_all, rec.tcp_flags_all);
    }

    #[test]
    fn tbpf_with_proto_flags_keeps_expanded_flags() {
        let rec = tcp_record();
        let (w, pf) = pack_time_bytes_pkts_proto_flags(&rec, BASE).unwrap();
        assert_eq!(w.msec_flags & 0xFF, u32::from(SYN_FLAG));
        let mut out = FlowRecord::default();
        unpack_time_bytes_pkts_proto_flags(&mut out, BASE, w, pf.tcp_state, pf.rest_flags);
        assert_eq!(out.tcp_flags_init, SYN_FLAG);
        assert_eq!(out.tcp_flags_session, ACK_FLAG | PSH_FLAG);
        assert_eq!(out.tcp_flags_all, rec.tcp_flags_all);
        assert_eq!(out.start_time, rec.start_time);
        assert_eq!(out.duration, rec.duration);
    }

    #[test]
    fn ftv_long_tail_round_trip() {
        let rec = tcp_record();
        let mut ar = [0u8; 16];
        pack_flags_times_volumes(&mut ar, &rec, BASE, VolumeTail::Present).unwrap();
        let mut out = FlowRecord::default();
        unpack_flags_times_volumes(&mut out, &ar, BASE, VolumeTail::Present, false);
        assert_eq!(out.start_time, rec.start_time);
        assert_eq!(out.duration, rec.duration);
        assert_eq!(out.tcp_flags_init, SYN_FLAG);
        assert_eq!(out.tcp_flags_session, ACK_FLAG | PSH_FLAG);
        assert_eq!(out.tcp_flags_all, rec.tcp_flags_all);
        assert_eq!(out.application, 80);
        assert_eq!(out.tcp_state, TCPSTATE_EXPANDED);
    }

    #[test]
    fn ftv_short_drops_session_flags() {
        let rec = tcp_record();
        let mut ar = [0u8; 12];
        pack_flags_times_volumes(&mut ar, &rec, BASE, VolumeTail::Absent).unwrap();
        let mut out = FlowRecord::default();
        unpack_flags_times_volumes(&mut out, &ar, BASE, VolumeTail::Absent, false);
        assert_eq!(out.protocol, IPPROTO_TCP);
        // No tail means EXPANDED is treated as clear: all flags land in the high byte.
        assert_eq!(out.tcp_flags_all, rec.tcp_flags_all);
        assert_eq!(out.tcp_flags_init, 0);
        assert_eq!(out.tcp_state, 0);
    }

    #[test]
    fn ftv_elapsed_cap_is_milliseconds() {
        let mut rec = tcp_record();
        rec.duration = 4_096_000;
        let mut ar = [0u8; 12];
        assert!(matches!(
            pack_flags_times_volumes(&mut ar, &rec, BASE, VolumeTail::Absent),
            Err(CodecError::ElapsedOverflow { duration: 4_096_000 })
        ));
        assert_eq!(ar, [0u8; 12]);
    }

    #[test]
    fn tfp_non_tcp_loses_flags() {
        let rec = FlowRecord {
            protocol: IPPROTO_UDP,
            tcp_flags_all: ACK_FLAG,
            start_time: BASE + 999,
            ..Default::default()
        };
        let mut ar = [0u8; 6];
        pack_times_flags_proto(&mut ar, &rec, BASE).unwrap();
        let mut out = FlowRecord::default();
        unpack_times_flags_proto(&mut out, &ar, BASE);
        assert_eq!(out.protocol, IPPROTO_UDP);
        assert_eq!(out.tcp_flags_all, 0);
        assert_eq!(out.start_time, BASE + 999);
    }

    #[test]
    fn tfp_expanded_tcp() {
        let rec = tcp_record();
        let mut ar = [0u8; 6];
        pack_times_flags_proto(&mut ar, &rec, BASE).unwrap();
        assert_eq!(ar[4], SYN_FLAG);
        let mut out = FlowRecord::default();
        unpack_times_flags_proto(&mut out, &ar, BASE);
        assert_eq!(out.tcp_flags_session, ACK_FLAG | PSH_FLAG);
        assert_eq!(out.tcp_flags_all, rec.tcp_flags_all);
    }

    #[test]
    fn start_far_past_a_negative_base() {
        let rec = FlowRecord { start_time: i64::MAX, ..tcp_record() };
        assert!(matches!(
            pack_time_bytes_pkts_flags(&rec, -1_000),
            Err(CodecError::StartTimeOverflow { start_time: i64::MAX, base_time: -1_000 })
        ));
        let mut ar = [0u8; 6];
        assert!(matches!(
            pack_times_flags_proto(&mut ar, &rec, i64::MIN),
            Err(CodecError::StartTimeOverflow { .. })
        ));
        assert!(matches!(pack_sbb_pef(&rec, -1), Err(CodecError::StartTimeOverflow { .. })));
    }

    #[test]
    fn offsets_saturate_near_the_top_of_time() {
        let base = i64::MAX - 10;
        let w = TimeBytesPktsFlags { pkts_stime: u32::MAX, bbe: 1 << 12, msec_flags: u32::MAX };
        let mut out = FlowRecord::default();
        unpack_time_bytes_pkts_flags(&mut out, base, w);
        assert_eq!(out.start_time, i64::MAX);

        let mut out = FlowRecord::default();
        unpack_sbb_pef(&mut out, base, SbbPef { sbb: u32::MAX, pef: 1 << 12 });
        assert_eq!(out.start_time, i64::MAX);

        let mut out = FlowRecord::default();
        unpack_times_flags_proto(&mut out, &[0xFF; 6], base);
        assert_eq!(out.start_time, i64::MAX);
    }
}
