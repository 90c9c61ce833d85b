//! Shared packers: bit-layout recipes reused by several record layouts.
//!
//! Every `pack_*` function reads a [`FlowRecord`] and either returns the
//! encoded words or fails without touching any buffer.  Every `unpack_*`
//! function writes the fields it owns into a record and leaves the others
//! alone, so layouts can chain several recipes over one record.
//!
//! # Bytes per packet
//! Byte counts are not stored directly by the compact layouts.  They keep
//! the packet count and a 20-bit fixed-point bytes-per-packet value (14
//! whole bits, 6 fraction bits).  Packet counts of 2^20 or more are stored
//! divided by 64 with a multiplier flag set.

pub mod compact;

use byteorder::{ByteOrder, NativeEndian};

use crate::bits::{get_bits, MASK6, MASK14};
use crate::codec::CodecError;
use crate::record::{Address, FlowRecord, IPPROTO_TCP, TCPSTATE_EXPANDED};

/// Packet counts at or above this value are stored divided by [`PKTS_DIVISOR`].
pub const MAX_PKTS:             u32 = 1 << 20;
pub const PKTS_DIVISOR:         u32 = 64;
/// Fixed-point precision of the bytes-per-packet fraction.
pub const BPP_PRECN:            u32 = 64;
pub const BPP_PRECN_DIV_2:      u32 = BPP_PRECN / 2;
/// Start-time offsets are limited to 4096 seconds past the file's hour.
pub const MAX_START_TIME:       i64 = 4096;
/// Elapsed seconds for the millisecond-aware layouts.
pub const MAX_ELAPSED_TIME:     u32 = 4096;
/// Elapsed seconds for the oldest second-resolution layouts.
pub const MAX_ELAPSED_TIME_OLD: u32 = 2048;

/// Bit of the on-disk tcp_state byte that marks an IPv6 record.
pub const WIRE_IPV6_FLAG: u8 = 0x80;

/// True when this build can materialise IPv6 addresses.
pub const IPV6_ENABLED: bool = cfg!(feature = "ipv6");

// ── Native-order field access ────────────────────────────────────────────────

#[inline]
pub fn get_u16(ar: &[u8], off: usize) -> u16 { NativeEndian::read_u16(&ar[off..off + 2]) }
#[inline]
pub fn get_u24(ar: &[u8], off: usize) -> u32 { NativeEndian::read_u24(&ar[off..off + 3]) }
#[inline]
pub fn get_u32(ar: &[u8], off: usize) -> u32 { NativeEndian::read_u32(&ar[off..off + 4]) }
#[inline]
pub fn get_u64(ar: &[u8], off: usize) -> u64 { NativeEndian::read_u64(&ar[off..off + 8]) }
#[inline]
pub fn get_i64(ar: &[u8], off: usize) -> i64 { NativeEndian::read_i64(&ar[off..off + 8]) }

#[inline]
pub fn put_u16(ar: &mut [u8], off: usize, v: u16) { NativeEndian::write_u16(&mut ar[off..off + 2], v) }
#[inline]
pub fn put_u24(ar: &mut [u8], off: usize, v: u32) { NativeEndian::write_u24(&mut ar[off..off + 3], v) }
#[inline]
pub fn put_u32(ar: &mut [u8], off: usize, v: u32) { NativeEndian::write_u32(&mut ar[off..off + 4], v) }
#[inline]
pub fn put_u64(ar: &mut [u8], off: usize, v: u64) { NativeEndian::write_u64(&mut ar[off..off + 8], v) }
#[inline]
pub fn put_i64(ar: &mut [u8], off: usize, v: i64) { NativeEndian::write_i64(&mut ar[off..off + 8], v) }

// ── Addresses ────────────────────────────────────────────────────────────────

/// The IPv4 value of `addr`, accepting `::ffff:a.b.c.d` mapped addresses.
pub fn ipv4_of(addr: &Address) -> Result<u32, CodecError> {
    addr.to_ipv4().ok_or(CodecError::UnsupportedIpv6)
}

#[inline]
pub fn put_ipv4(ar: &mut [u8], off: usize, addr: &Address) -> Result<(), CodecError> {
    put_u32(ar, off, ipv4_of(addr)?);
    Ok(())
}

#[inline]
pub fn get_ipv4(ar: &[u8], off: usize) -> Address {
    Address::V4(get_u32(ar, off))
}

/// Write 16 network-order bytes; IPv4 values are written as mapped addresses.
#[inline]
pub fn put_ipv6(ar: &mut [u8], off: usize, addr: &Address) {
    ar[off..off + 16].copy_from_slice(&addr.to_ipv6_bytes());
}

/// Read a 16-byte address.  Records without the IPv6 flag hold mapped IPv4.
pub fn get_ipv6(ar: &[u8], off: usize, is_ipv6: bool) -> Address {
    let mut b = [0u8; 16];
    b.copy_from_slice(&ar[off..off + 16]);
    if is_ipv6 {
        Address::V6(b)
    } else {
        Address::V4(u32::from_be_bytes([b[12], b[13], b[14], b[15]]))
    }
}

/// Flag bits to OR into the on-disk tcp_state byte.  A record with any
/// IPv6 address is written as IPv6 throughout.
pub fn ipv6_wire_flag(rec: &FlowRecord) -> Result<u8, CodecError> {
    match (rec.is_ipv6(), IPV6_ENABLED) {
        (false, _)    => Ok(0),
        (true, true)  => Ok(WIRE_IPV6_FLAG),
        (true, false) => Err(CodecError::UnsupportedIpv6),
    }
}

/// Whether the on-disk tcp_state byte marks the record as IPv6.
pub fn read_ipv6_flag(state: u8) -> Result<bool, CodecError> {
    let is_ipv6 = state & WIRE_IPV6_FLAG != 0;
    if is_ipv6 && !IPV6_ENABLED {
        return Err(CodecError::UnsupportedIpv6);
    }
    Ok(is_ipv6)
}

// ── bytes / packets ──────────────────────────────────────────────────────────

/// Packet count and bytes-per-packet as stored by the compact layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Volume {
    /// 20-bit fixed-point bytes per packet.
    pub bpp:     u32,
    /// Stored packet count, divided by 64 when `pflag` is set.
    pub packets: u32,
    pub pflag:   bool,
}

pub fn pack_bytes_packets(rec: &FlowRecord) -> Result<Volume, CodecError> {
    let packets = rec.packets;
    let bytes   = rec.bytes;

    if packets == 0 {
        return Err(CodecError::PacketsZero);
    }
    if packets > bytes {
        return Err(CodecError::PacketsGtBytes { packets, bytes });
    }

    let (stored, pflag) = if packets < MAX_PKTS {
        (packets, false)
    } else {
        let divided = packets / PKTS_DIVISOR;
        if divided >= MAX_PKTS {
            return Err(CodecError::PacketsOverflow { packets });
        }
        (divided, true)
    };

    let quot = bytes / packets;
    if quot > MASK14 {
        return Err(CodecError::BppOverflow { bytes, packets });
    }
    let rem  = u64::from(bytes % packets);
    let frac = (rem * u64::from(BPP_PRECN) / u64::from(packets)) as u32;

    Ok(Volume { bpp: (quot << 6) | frac, packets: stored, pflag })
}

/// Restore `packets` and `bytes`, rounding the fractional part half-up.
pub fn unpack_bytes_packets(rec: &mut FlowRecord, vol: Volume) {
    let packets = if vol.pflag {
        u64::from(vol.packets) * u64::from(PKTS_DIVISOR)
    } else {
        u64::from(vol.packets)
    };
    let whole = u64::from(get_bits(vol.bpp, 6, 14));
    let frac  = u64::from(vol.bpp & MASK6);
    let i     = frac * packets;
    let mut bytes = whole * packets + i / u64::from(BPP_PRECN);
    if i % u64::from(BPP_PRECN) >= u64::from(BPP_PRECN_DIV_2) {
        bytes += 1;
    }
    rec.packets = packets as u32;
    rec.bytes   = bytes as u32;
}

// ── protocol / flags ─────────────────────────────────────────────────────────

/// Protocol and TCP flags folded into one byte plus a TCP marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtoFlags {
    pub is_tcp:     bool,
    /// Protocol for non-TCP; initial or all flags for TCP.
    pub prot_flags: u8,
    pub tcp_state:  u8,
    /// All flags for non-TCP; session flags for expanded TCP; else 0.
    pub rest_flags: u8,
}

pub fn pack_proto_flags(rec: &FlowRecord) -> ProtoFlags {
    let tcp_state = rec.tcp_state();
    if !rec.is_tcp() {
        ProtoFlags {
            is_tcp:     false,
            prot_flags: rec.protocol,
            tcp_state,
            rest_flags: rec.tcp_flags_all,
        }
    } else if tcp_state & TCPSTATE_EXPANDED != 0 {
        ProtoFlags {
            is_tcp:     true,
            prot_flags: rec.tcp_flags_init,
            tcp_state,
            rest_flags: rec.tcp_flags_session,
        }
    } else {
        ProtoFlags {
            is_tcp:     true,
            prot_flags: rec.tcp_flags_all,
            tcp_state,
            rest_flags: 0,
        }
    }
}

/// A record whose protocol is already TCP is treated as TCP regardless of
/// `pf.is_tcp`; the web layouts rely on this.
pub fn unpack_proto_flags(rec: &mut FlowRecord, pf: ProtoFlags) {
    rec.set_tcp_state(pf.tcp_state);

    if rec.protocol == IPPROTO_TCP || pf.is_tcp {
        rec.protocol = IPPROTO_TCP;
        if pf.tcp_state & TCPSTATE_EXPANDED != 0 {
            rec.tcp_flags_init    = pf.prot_flags;
            rec.tcp_flags_session = pf.rest_flags;
            rec.tcp_flags_all     = pf.prot_flags | pf.rest_flags;
        } else {
            rec.tcp_flags_all = pf.prot_flags;
        }
    } else {
        rec.protocol      = pf.prot_flags;
        rec.tcp_flags_all = pf.rest_flags;
    }
}

// ── Web server ports ─────────────────────────────────────────────────────────

#[inline]
pub fn is_web_port(port: u16) -> bool {
    matches!(port, 80 | 443 | 8080)
}

/// Two-bit code for a web server port: 80, 443, 8080, anything else.
#[inline]
pub fn encode_web_port(port: u16) -> u32 {
    match port {
        80   => 0,
        443  => 1,
        8080 => 2,
        _    => 3,
    }
}

#[inline]
pub fn expand_web_port(code: u32) -> u16 {
    match code & 0x3 {
        0 => 80,
        1 => 443,
        2 => 8080,
        _ => 0,
    }
}

/// Web layouts store only the client port plus the server port's code.
/// Returns `(src_is_server, server_code, client_port)`.
pub fn split_web_ports(rec: &FlowRecord) -> (bool, u32, u16) {
    if is_web_port(rec.src_port) {
        (true, encode_web_port(rec.src_port), rec.dst_port)
    } else {
        (false, encode_web_port(rec.dst_port), rec.src_port)
    }
}

pub fn join_web_ports(rec: &mut FlowRecord, src_is_server: bool, code: u32, client: u16) {
    if src_is_server {
        rec.src_port = expand_web_port(code);
        rec.dst_port = client;
    } else {
        rec.dst_port = expand_web_port(code);
        rec.src_port = client;
    }
}
