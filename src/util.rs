//! Small formatting helpers shared by the vault and transfer layers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a byte count with binary units: `500 B`, `1.0 KB`, `3.4 GB`.
pub fn human_readable_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64 / div as f64;
    format!("{value:.1} {}B", ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}

/// RFC 3339, UTC, second precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Unix seconds to a UTC instant, clamping out-of-range values to the epoch.
pub fn from_epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Serde adapter for RFC 3339 second-precision timestamps.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_readable_size_units() {
        assert_eq!(human_readable_size(0), "0 B");
        assert_eq!(human_readable_size(500), "500 B");
        assert_eq!(human_readable_size(1024), "1.0 KB");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(1_048_576), "1.0 MB");
        assert_eq!(human_readable_size(1_073_741_824), "1.0 GB");
        assert_eq!(human_readable_size(1_099_511_627_776), "1.0 TB");
    }

    #[test]
    fn timestamps_are_second_precision_utc() {
        let at = from_epoch_secs(1_700_000_000);
        assert_eq!(format_timestamp(at), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn out_of_range_epoch_clamps() {
        assert_eq!(from_epoch_secs(i64::MAX), DateTime::<Utc>::default());
    }
}
