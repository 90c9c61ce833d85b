//! Canonical in-memory flow record.
//!
//! Every on-disk layout decodes into, and encodes from, a [`FlowRecord`].
//! Fields a layout does not store come back as zero, or as the stream
//! header's sensor and flow type for formats that keep those per file.
//!
//! # TCP flags
//! `tcp_flags_all` is the union of the flags of every packet in the flow.
//! When [`TCPSTATE_EXPANDED`] is set in `tcp_state`, the flow also carries
//! the flags of its first packet (`tcp_flags_init`) and the union of the
//! remaining packets (`tcp_flags_session`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP:  u8 = 6;
pub const IPPROTO_UDP:  u8 = 17;

// ── TCP flag bits ────────────────────────────────────────────────────────────

pub const FIN_FLAG: u8 = 0x01;
pub const SYN_FLAG: u8 = 0x02;
pub const RST_FLAG: u8 = 0x04;
pub const PSH_FLAG: u8 = 0x08;
pub const ACK_FLAG: u8 = 0x10;
pub const URG_FLAG: u8 = 0x20;
pub const ECE_FLAG: u8 = 0x40;
pub const CWR_FLAG: u8 = 0x80;

// ── TCP state bits ───────────────────────────────────────────────────────────

/// Initial and session flags are present.
pub const TCPSTATE_EXPANDED:             u8 = 0x01;
pub const TCPSTATE_FIN_FOLLOWED_NOT_ACK: u8 = 0x08;
pub const TCPSTATE_UNIFORM_PACKET_SIZE:  u8 = 0x10;
pub const TCPSTATE_TIMEOUT_KILLED:       u8 = 0x20;
pub const TCPSTATE_TIMEOUT_STARTED:      u8 = 0x40;
/// Bits of `tcp_state` that belong to the canonical record.
pub const TCPSTATE_MASK:                 u8 = 0x79;

// ── Address ──────────────────────────────────────────────────────────────────

const V4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF];

/// An IPv4 (host-order integer) or IPv6 (network-order bytes) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "IpAddr", into = "IpAddr")]
pub enum Address {
    V4(u32),
    V6([u8; 16]),
}

impl Default for Address {
    fn default() -> Self { Address::V4(0) }
}

impl Address {
    #[inline]
    pub fn is_ipv6(&self) -> bool {
        matches!(self, Address::V6(_))
    }

    /// The IPv4 value, also for `::ffff:a.b.c.d` mapped addresses.
    pub fn to_ipv4(&self) -> Option<u32> {
        match self {
            Address::V4(v) => Some(*v),
            Address::V6(b) if b[..12] == V4_MAPPED_PREFIX => {
                Some(u32::from_be_bytes([b[12], b[13], b[14], b[15]]))
            }
            Address::V6(_) => None,
        }
    }

    /// The 16 network-order bytes; IPv4 becomes `::ffff:a.b.c.d`.
    pub fn to_ipv6_bytes(&self) -> [u8; 16] {
        match self {
            Address::V6(b) => *b,
            Address::V4(v) => {
                let mut b = [0u8; 16];
                b[..12].copy_from_slice(&V4_MAPPED_PREFIX);
                b[12..].copy_from_slice(&v.to_be_bytes());
                b
            }
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Address::V4(u32::from(v4)),
            IpAddr::V6(v6) => Address::V6(v6.octets()),
        }
    }
}

impl From<Address> for IpAddr {
    fn from(a: Address) -> Self {
        match a {
            Address::V4(v) => IpAddr::V4(Ipv4Addr::from(v)),
            Address::V6(b) => IpAddr::V6(Ipv6Addr::from(b)),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self { Address::V4(u32::from(ip)) }
}

impl From<Ipv6Addr> for Address {
    fn from(ip: Ipv6Addr) -> Self { Address::V6(ip.octets()) }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        IpAddr::from(*self).fmt(f)
    }
}

// ── FlowRecord ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRecord {
    pub src_ip:            Address,
    pub dst_ip:            Address,
    pub next_hop_ip:       Address,
    pub src_port:          u16,
    pub dst_port:          u16,
    pub protocol:          u8,
    pub packets:           u32,
    pub bytes:             u32,
    /// Milliseconds since the UNIX epoch.
    pub start_time:        i64,
    /// Milliseconds.
    pub duration:          u32,
    pub tcp_flags_all:     u8,
    pub tcp_flags_init:    u8,
    pub tcp_flags_session: u8,
    pub tcp_state:         u8,
    pub input_snmp:        u16,
    pub output_snmp:       u16,
    pub sensor_id:         u16,
    pub flow_type:         u8,
    pub application:       u16,
    pub memo:              u16,
}

impl FlowRecord {
    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.protocol == IPPROTO_TCP
    }

    /// `tcp_state` restricted to its canonical bits.
    #[inline]
    pub fn tcp_state(&self) -> u8 {
        self.tcp_state & TCPSTATE_MASK
    }

    #[inline]
    pub fn set_tcp_state(&mut self, state: u8) {
        self.tcp_state = state & TCPSTATE_MASK;
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.tcp_state & TCPSTATE_EXPANDED != 0
    }

    /// True when any of the three addresses is a `V6` value.
    pub fn is_ipv6(&self) -> bool {
        self.src_ip.is_ipv6() || self.dst_ip.is_ipv6() || self.next_hop_ip.is_ipv6()
    }

    #[inline]
    pub fn start_seconds(&self) -> i64 {
        self.start_time.div_euclid(1000)
    }

    #[inline]
    pub fn start_msec(&self) -> u32 {
        self.start_time.rem_euclid(1000) as u32
    }

    #[inline]
    pub fn elapsed_seconds(&self) -> u32 {
        self.duration / 1000
    }

    #[inline]
    pub fn elapsed_msec(&self) -> u32 {
        self.duration % 1000
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_time)
    }

    pub fn end_time(&self) -> i64 {
        self.start_time.saturating_add(i64::from(self.duration))
    }

    /// Records from pre-3.6 writers sometimes carry a stray EXPANDED bit.
    /// The bit is only honoured for TCP flows that actually have initial or
    /// session flags; otherwise it is cleared along with both fields.
    pub fn clear_stray_expanded(&mut self) {
        if self.is_expanded()
            && (!self.is_tcp() || (self.tcp_flags_init == 0 && self.tcp_flags_session == 0))
        {
            self.tcp_state &= !TCPSTATE_EXPANDED;
            self.tcp_flags_init    = 0;
            self.tcp_flags_session = 0;
        }
    }
}

/// Render TCP flags as the eight-letter `FSRPAUEC` string, blanks for unset bits.
pub fn tcp_flags_string(flags: u8) -> String {
    const LETTERS: [char; 8] = ['F', 'S', 'R', 'P', 'A', 'U', 'E', 'C'];
    LETTERS
        .iter()
        .enumerate()
        .map(|(i, c)| if flags & (1 << i) != 0 { *c } else { ' ' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_time_saturates() {
        let rec = FlowRecord { start_time: i64::MAX - 5, duration: 1000, ..Default::default() };
        assert_eq!(rec.end_time(), i64::MAX);
        let rec = FlowRecord { start_time: 1_000, duration: 250, ..Default::default() };
        assert_eq!(rec.end_time(), 1_250);
    }

    #[test]
    fn mapped_ipv4_round_trip() {
        let a = Address::V4(0x0A00_0001);
        let bytes = a.to_ipv6_bytes();
        assert_eq!(&bytes[10..], &[0xFF, 0xFF, 10, 0, 0, 1]);
        assert_eq!(Address::V6(bytes).to_ipv4(), Some(0x0A00_0001));
        let pure: Address = "2001:db8::1".parse::<Ipv6Addr>().unwrap().into();
        assert_eq!(pure.to_ipv4(), None);
    }

    #[test]
    fn time_helpers() {
        let r = FlowRecord { start_time: 1_700_000_123_456, duration: 2_500, ..Default::default() };
        assert_eq!(r.start_seconds(), 1_700_000_123);
        assert_eq!(r.start_msec(), 456);
        assert_eq!(r.elapsed_seconds(), 2);
        assert_eq!(r.elapsed_msec(), 500);
        assert_eq!(r.end_time(), 1_700_000_125_956);
        assert!(r.start_datetime().is_some());
    }

    #[test]
    fn stray_expanded_cleared_for_udp() {
        let mut r = FlowRecord {
            protocol: IPPROTO_UDP,
            tcp_state: TCPSTATE_EXPANDED,
            tcp_flags_init: SYN_FLAG,
            tcp_flags_session: ACK_FLAG,
            ..Default::default()
        };
        r.clear_stray_expanded();
        assert_eq!(r.tcp_state, 0);
        assert_eq!(r.tcp_flags_init, 0);
        assert_eq!(r.tcp_flags_session, 0);
    }

    #[test]
    fn stray_expanded_kept_for_real_tcp() {
        let mut r = FlowRecord {
            protocol: IPPROTO_TCP,
            tcp_state: TCPSTATE_EXPANDED,
            tcp_flags_init: SYN_FLAG,
            ..Default::default()
        };
        r.clear_stray_expanded();
        assert_eq!(r.tcp_state, TCPSTATE_EXPANDED);
        assert_eq!(r.tcp_flags_init, SYN_FLAG);

        let mut empty = FlowRecord { protocol: IPPROTO_TCP, tcp_state: 0x11, ..Default::default() };
        empty.clear_stray_expanded();
        assert_eq!(empty.tcp_state, TCPSTATE_UNIFORM_PACKET_SIZE);
    }

    #[test]
    fn flags_string() {
        assert_eq!(tcp_flags_string(SYN_FLAG | ACK_FLAG), " S  A   ");
        assert_eq!(tcp_flags_string(0xFF), "FSRPAUEC");
    }

    #[test]
    fn serde_uses_ip_text() {
        let r = FlowRecord { src_ip: Address::V4(0xC0A8_0001), ..Default::default() };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"192.168.0.1\""));
        let back: FlowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
