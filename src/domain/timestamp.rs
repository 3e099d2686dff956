//! Fixed-width RFC 3339 timestamps
//!
//! Stored dates always carry nine fractional digits and a `Z` suffix, so
//! their text form sorts in time order wherever the store compares strings.
//! Use with `#[serde(with = "crate::domain::timestamp")]`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(at))
}

/// Accepts any RFC 3339 offset or precision, normalized to UTC.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn width_does_not_depend_on_precision() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(250);

        assert_eq!(format(&whole), "2024-03-01T12:00:00.000000000Z");
        assert_eq!(format(&whole).len(), format(&fractional).len());
        assert!(format(&whole) < format(&fractional));
    }

    #[test]
    fn parses_other_offsets_and_precisions() {
        #[derive(serde::Deserialize)]
        struct Doc {
            #[serde(with = "super")]
            at: DateTime<Utc>,
        }

        let doc: Doc = serde_json::from_str(r#"{"at":"2024-03-01T13:00:00+01:00"}"#).unwrap();
        assert_eq!(doc.at, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }
}
