//! Representable ranges per `(format, version)`.
//!
//! When a record fails to pack, callers can ask how far the format reaches
//! for the field that overflowed, for example to print "duration exceeds
//! 4095000 ms" next to the offending record.

use crate::bits::{MASK6, MASK14, MASK30};
use crate::pack::{MAX_ELAPSED_TIME, MAX_ELAPSED_TIME_OLD, MAX_PKTS, MAX_START_TIME, PKTS_DIVISOR};

use super::FileFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    PacketsZero,
    StartTimeUnderflow,
    StartTimeOverflow,
    ElapsedOverflow,
    PacketsOverflow,
    BppOverflow,
    SnmpOverflow,
    SensorOverflow,
}

impl LimitKind {
    pub fn all() -> [LimitKind; 8] {
        [
            LimitKind::PacketsZero,
            LimitKind::StartTimeUnderflow,
            LimitKind::StartTimeOverflow,
            LimitKind::ElapsedOverflow,
            LimitKind::PacketsOverflow,
            LimitKind::BppOverflow,
            LimitKind::SnmpOverflow,
            LimitKind::SensorOverflow,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            LimitKind::PacketsZero        => "min-packets",
            LimitKind::StartTimeUnderflow => "min-start-time",
            LimitKind::StartTimeOverflow  => "max-start-time",
            LimitKind::ElapsedOverflow    => "max-elapsed",
            LimitKind::PacketsOverflow    => "max-packets",
            LimitKind::BppOverflow        => "max-bytes-per-packet",
            LimitKind::SnmpOverflow       => "max-snmp",
            LimitKind::SensorOverflow     => "max-sensor",
        }
    }
}

/// Formats that store start time relative to the file's hour.
fn hour_relative(format: FileFormat) -> bool {
    matches!(
        format,
        FileFormat::Augmented
            | FileFormat::AugRouting
            | FileFormat::AugWeb
            | FileFormat::NotRouted
            | FileFormat::Routed
            | FileFormat::Split
            | FileFormat::Www
    )
}

fn packed_family(format: FileFormat) -> bool {
    matches!(
        format,
        FileFormat::Filter
            | FileFormat::NotRouted
            | FileFormat::Routed
            | FileFormat::Split
            | FileFormat::Www
    )
}

fn augmented_family(format: FileFormat) -> bool {
    matches!(format, FileFormat::Augmented | FileFormat::AugRouting | FileFormat::AugWeb)
}

/// The smallest (underflow kinds) or largest value `format`/`version` can
/// hold for `kind`.  Times are milliseconds; `base_time` is the stream's
/// base time for the hour-relative formats.
pub fn limit_for(format: FileFormat, version: u8, kind: LimitKind, base_time: i64) -> i64 {
    let u32_max = i64::from(u32::MAX);
    let hour_end = base_time.saturating_add((MAX_START_TIME - 1) * 1000);
    let max_pkts = i64::from(MAX_PKTS) * i64::from(PKTS_DIVISOR) - 1;

    match kind {
        LimitKind::PacketsZero => 1,

        LimitKind::StartTimeUnderflow => {
            if hour_relative(format) { base_time } else { 0 }
        }

        LimitKind::StartTimeOverflow => match format {
            f if hour_relative(f)                   => hour_end,
            FileFormat::Generic if version == 5     => i64::MAX,
            FileFormat::Ipv6 if version == 2        => hour_end,
            FileFormat::Ipv6 | FileFormat::Ipv6Routing => i64::MAX,
            _                                       => u32_max * 1000,
        },

        LimitKind::ElapsedOverflow => match format {
            FileFormat::AugWeb if version <= 4      => i64::from(MAX_ELAPSED_TIME - 1) * 1000,
            FileFormat::AugWeb                      => i64::from(MASK30),
            f if augmented_family(f) && version <= 4 => i64::from(MAX_ELAPSED_TIME - 1) * 1000,
            f if augmented_family(f)                => u32_max,
            FileFormat::Flowcap                     => i64::from(u16::MAX) * 1000,
            f if packed_family(f) && version <= 2   => i64::from(MAX_ELAPSED_TIME_OLD - 1) * 1000,
            f if packed_family(f)                   => i64::from(MAX_ELAPSED_TIME - 1) * 1000,
            _                                       => u32_max,
        },

        LimitKind::PacketsOverflow => match format {
            f if augmented_family(f) && version == 5 => u32_max,
            f if augmented_family(f) || packed_family(f) => max_pkts,
            FileFormat::Flowcap                     => 0x00FF_FFFF,
            _                                       => u32_max,
        },

        LimitKind::BppOverflow => match format {
            f if augmented_family(f) && version == 5 => u32_max,
            f if augmented_family(f) || packed_family(f) => i64::from(MASK14),
            _                                       => u32_max,
        },

        LimitKind::SnmpOverflow => match format {
            FileFormat::AugRouting | FileFormat::Ipv6Routing => i64::from(u16::MAX),
            FileFormat::Filter | FileFormat::NotRouted | FileFormat::Routed => {
                if version <= 2 { i64::from(u8::MAX) } else { i64::from(u16::MAX) }
            }
            FileFormat::Generic => {
                if version <= 1 { i64::from(u8::MAX) } else { i64::from(u16::MAX) }
            }
            FileFormat::Flowcap => {
                if (2..=4).contains(&version) { i64::from(u8::MAX) } else { i64::from(u16::MAX) }
            }
            _ => 0,
        },

        LimitKind::SensorOverflow => match (format, version) {
            (FileFormat::Filter, 1)                 => i64::from(MASK6),
            (FileFormat::Filter, 2)                 => i64::from(u8::MAX),
            (FileFormat::Generic, 0 | 1)            => i64::from(u8::MAX),
            _                                       => i64::from(u16::MAX),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: i64 = 1_577_836_800_000;

    #[test]
    fn hour_relative_start_limits() {
        assert_eq!(limit_for(FileFormat::Split, 5, LimitKind::StartTimeUnderflow, BASE), BASE);
        assert_eq!(limit_for(FileFormat::Split, 5, LimitKind::StartTimeOverflow, BASE), BASE + 4_095_000);
        assert_eq!(limit_for(FileFormat::Ipv6, 2, LimitKind::StartTimeOverflow, BASE), BASE + 4_095_000);
        assert_eq!(limit_for(FileFormat::Ipv6, 1, LimitKind::StartTimeOverflow, BASE), i64::MAX);
        assert_eq!(limit_for(FileFormat::Generic, 5, LimitKind::StartTimeOverflow, BASE), i64::MAX);
        assert_eq!(limit_for(FileFormat::Generic, 3, LimitKind::StartTimeOverflow, BASE), 4_294_967_295_000);
        assert_eq!(limit_for(FileFormat::Flowcap, 5, LimitKind::StartTimeUnderflow, BASE), 0);
    }

    #[test]
    fn elapsed_limits() {
        assert_eq!(limit_for(FileFormat::Routed, 2, LimitKind::ElapsedOverflow, 0), 2_047_000);
        assert_eq!(limit_for(FileFormat::Routed, 3, LimitKind::ElapsedOverflow, 0), 4_095_000);
        assert_eq!(limit_for(FileFormat::AugWeb, 5, LimitKind::ElapsedOverflow, 0), (1 << 30) - 1);
        assert_eq!(limit_for(FileFormat::AugRouting, 5, LimitKind::ElapsedOverflow, 0), 4_294_967_295);
        assert_eq!(limit_for(FileFormat::Flowcap, 5, LimitKind::ElapsedOverflow, 0), 65_535_000);
    }

    #[test]
    fn volume_and_id_limits() {
        assert_eq!(limit_for(FileFormat::Www, 1, LimitKind::PacketsOverflow, 0), 67_108_863);
        assert_eq!(limit_for(FileFormat::Flowcap, 3, LimitKind::PacketsOverflow, 0), 16_777_215);
        assert_eq!(limit_for(FileFormat::AugWeb, 4, LimitKind::BppOverflow, 0), 16_383);
        assert_eq!(limit_for(FileFormat::Filter, 1, LimitKind::SensorOverflow, 0), 63);
        assert_eq!(limit_for(FileFormat::Filter, 4, LimitKind::SensorOverflow, 0), 65_535);
        assert_eq!(limit_for(FileFormat::Flowcap, 4, LimitKind::SnmpOverflow, 0), 255);
        assert_eq!(limit_for(FileFormat::Split, 5, LimitKind::SnmpOverflow, 0), 0);
    }
}
