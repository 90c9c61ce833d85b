//! Bit-field and byte-order primitives shared by every record layout.
//!
//! # Bit fields
//! Compact layouts pack several values into one 32-bit word.  A field is
//! addressed by its least-significant bit `offset` and its `width`, with
//! `offset + width <= 32`.
//!
//! # Byte order
//! Records are assembled in host byte order.  When the file was written on
//! a machine of the other endianness, every multi-byte integer in the
//! record is reversed in place.  Each layout publishes a table of
//! [`SwapField`]s naming those integers; IPv6 addresses and single bytes
//! never appear in a table.

/// `MASK(n)`: the low `n` bits set.
#[inline]
pub const fn mask(width: u32) -> u32 {
    if width >= 32 { u32::MAX } else { (1u32 << width) - 1 }
}

pub const MASK2:  u32 = mask(2);
pub const MASK3:  u32 = mask(3);
pub const MASK6:  u32 = mask(6);
pub const MASK8:  u32 = mask(8);
pub const MASK10: u32 = mask(10);
pub const MASK11: u32 = mask(11);
pub const MASK12: u32 = mask(12);
pub const MASK14: u32 = mask(14);
pub const MASK20: u32 = mask(20);
pub const MASK21: u32 = mask(21);
pub const MASK22: u32 = mask(22);
pub const MASK30: u32 = mask(30);

/// Extract `width` bits of `word` starting at bit `offset`.
#[inline]
pub fn get_bits(word: u32, offset: u32, width: u32) -> u32 {
    word.checked_shr(offset).unwrap_or(0) & mask(width)
}

/// Overwrite `width` bits of `word` at `offset` with the low bits of `value`.
/// Bits outside the field are untouched.
#[inline]
pub fn set_bits(word: &mut u32, value: u32, offset: u32, width: u32) {
    let field = mask(width).checked_shl(offset).unwrap_or(0);
    let bits  = (value & mask(width)).checked_shl(offset).unwrap_or(0);
    *word = (*word & !field) | bits;
}

// ── Byte order ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    #[inline]
    pub fn native() -> Self {
        if cfg!(target_endian = "big") { Endian::Big } else { Endian::Little }
    }

    /// True when data in this order must be reversed to be read natively.
    #[inline]
    pub fn needs_swap(self) -> bool {
        self != Self::native()
    }

    pub fn name(self) -> &'static str {
        match self {
            Endian::Big    => "big",
            Endian::Little => "little",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "big"    | "be" => Some(Endian::Big),
            "little" | "le" => Some(Endian::Little),
            "native"        => Some(Self::native()),
            _               => None,
        }
    }
}

/// One multi-byte integer inside a record, located by byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapField {
    U16(usize),
    /// Three-byte packet counter used by the flowcap layouts.
    U24(usize),
    U32(usize),
    U64(usize),
}

impl SwapField {
    #[inline]
    pub fn offset(self) -> usize {
        match self {
            SwapField::U16(o) | SwapField::U24(o) | SwapField::U32(o) | SwapField::U64(o) => o,
        }
    }

    #[inline]
    pub fn width(self) -> usize {
        match self {
            SwapField::U16(_) => 2,
            SwapField::U24(_) => 3,
            SwapField::U32(_) => 4,
            SwapField::U64(_) => 8,
        }
    }
}

#[inline]
pub fn swap16(buf: &mut [u8], offset: usize) {
    buf[offset..offset + 2].reverse();
}

#[inline]
pub fn swap32(buf: &mut [u8], offset: usize) {
    buf[offset..offset + 4].reverse();
}

#[inline]
pub fn swap64(buf: &mut [u8], offset: usize) {
    buf[offset..offset + 8].reverse();
}

/// Reverse every field of `fields` in place.  Applying the same table twice
/// restores the original bytes.
pub fn swap_fields(buf: &mut [u8], fields: &[SwapField]) {
    for &f in fields {
        match f {
            SwapField::U16(o) => swap16(buf, o),
            SwapField::U24(o) => buf[o..o + 3].reverse(),
            SwapField::U32(o) => swap32(buf, o),
            SwapField::U64(o) => swap64(buf, o),
        }
    }
}
