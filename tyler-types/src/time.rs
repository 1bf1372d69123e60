//! UTC datetime serde helpers.
//!
//! All timestamps in the thread model are timezone-aware UTC. Serialized
//! forms use RFC 3339 with a UTC offset; naive datetimes encountered on
//! input are reinterpreted as UTC rather than rejected.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// The current instant, truncated to microsecond precision so values
/// survive serialization round-trips unchanged.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1000 * 1000)
        .unwrap_or(now)
}

/// Format a datetime the way the thread model serializes it.
#[must_use]
pub fn format_utc(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a datetime, accepting RFC 3339 or a naive datetime assumed UTC.
///
/// # Errors
///
/// Returns the underlying chrono parse error when neither form matches.
pub fn parse_utc(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => {
            // Naive input: rewrite as UTC.
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|naive| naive.and_utc())
                .map_err(|_| rfc_err)
        }
    }
}

/// Serde adapter for `DateTime<Utc>` fields.
pub mod utc_datetime {
    use super::*;

    /// Serialize as RFC 3339 with microsecond precision and a UTC offset.
    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_utc(value))
    }

    /// Deserialize from RFC 3339, reinterpreting naive datetimes as UTC.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_utc(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc3339_with_offset() {
        let dt = parse_utc("2024-02-07T00:00:00+00:00").unwrap();
        assert_eq!(format_utc(&dt), "2024-02-07T00:00:00.000000+00:00");
    }

    #[test]
    fn parse_rfc3339_with_non_utc_offset_normalizes() {
        let dt = parse_utc("2024-02-07T02:00:00+02:00").unwrap();
        assert_eq!(format_utc(&dt), "2024-02-07T00:00:00.000000+00:00");
    }

    #[test]
    fn parse_naive_assumes_utc() {
        let dt = parse_utc("2024-02-07T12:30:00").unwrap();
        assert_eq!(format_utc(&dt), "2024-02-07T12:30:00.000000+00:00");
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_utc("not a date").is_err());
    }

    #[test]
    fn roundtrip_preserves_instant() {
        let now = now_utc();
        let parsed = parse_utc(&format_utc(&now)).unwrap();
        assert_eq!(now, parsed);
    }
}
