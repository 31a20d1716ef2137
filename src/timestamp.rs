//! Timestamp recognition and the canonical `YYYY-MM-DD HH:MM:SS` form
//!
//! Recognized line prefixes:
//! - `2025-09-15 13:45:56` / `2025-09-15  3:45:56` / `2025-09-15T13:45:56`
//! - legacy MySQL `250915 13:45:56`

use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};

/// All timestamps are naive: logs carry server-local wall clock time.
pub type Timestamp = NaiveDateTime;

pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

lazy_static::lazy_static! {
    static ref ISO_TS: Regex =
        Regex::new(r"^\s*(\d{4})-(\d{2})-(\d{2})[ T]+(\d{1,2}):(\d{2}):(\d{2})").unwrap();
    static ref LEGACY_TS: Regex =
        Regex::new(r"^\s*(\d{2})(\d{2})(\d{2})\s+(\d{1,2}):(\d{2}):(\d{2})\b").unwrap();
}

/// What a single line says about time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTimestamp {
    /// No timestamp token on the line; the sticky timestamp applies.
    Absent,
    /// A timestamp token is present but names an impossible time.
    Invalid,
    Valid(Timestamp),
}

/// Extract the timestamp carried by a log line, if any.
pub fn extract(line: &str) -> LineTimestamp {
    if let Some(caps) = ISO_TS.captures(line) {
        let year = field(&caps, 1);
        return build(year, &caps);
    }
    if let Some(caps) = LEGACY_TS.captures(line) {
        let year = field(&caps, 1).map(|yy| 2000 + yy);
        return build(year, &caps);
    }
    LineTimestamp::Absent
}

fn field(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn build(year: Option<u32>, caps: &Captures<'_>) -> LineTimestamp {
    let parts = (
        year,
        field(caps, 2),
        field(caps, 3),
        field(caps, 4),
        field(caps, 5),
        field(caps, 6),
    );
    let (Some(y), Some(mo), Some(d), Some(h), Some(mi), Some(s)) = parts else {
        return LineTimestamp::Invalid;
    };
    NaiveDate::from_ymd_opt(y as i32, mo, d)
        .and_then(|date| date.and_hms_opt(h, mi, s))
        .map(LineTimestamp::Valid)
        .unwrap_or(LineTimestamp::Invalid)
}

/// Render a timestamp in canonical form.
pub fn format(ts: &Timestamp) -> String {
    ts.format(CANONICAL_FORMAT).to_string()
}

/// Parse a canonical-form timestamp.
pub fn parse_canonical(s: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(s, CANONICAL_FORMAT).ok()
}

/// Serde adapter writing timestamps in canonical form.
pub mod canonical {
    use super::{Timestamp, CANONICAL_FORMAT};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(CANONICAL_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_canonical(&raw).ok_or_else(|| serde::de::Error::custom("bad timestamp"))
    }
}

/// Serde adapter for optional canonical timestamps.
pub mod canonical_opt {
    use super::{Timestamp, CANONICAL_FORMAT};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&ts.format(CANONICAL_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw {
            Some(raw) => super::parse_canonical(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("bad timestamp")),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        parse_canonical(s).unwrap()
    }

    #[test]
    fn test_extract_iso_timestamp() {
        let line = "2025-09-15 13:45:56 0 [Note] WSREP: Shifting SYNCED -> DONOR/DESYNCED (TO: 1625)";
        assert_eq!(extract(line), LineTimestamp::Valid(ts("2025-09-15 13:45:56")));
    }

    #[test]
    fn test_extract_single_digit_hour_is_normalized() {
        let line = "2025-09-15  3:04:05 0 [Note] WSREP: something";
        let LineTimestamp::Valid(parsed) = extract(line) else {
            panic!("expected a timestamp");
        };
        assert_eq!(format(&parsed), "2025-09-15 03:04:05");
    }

    #[test]
    fn test_extract_legacy_mysql_prefix() {
        let line = "250915 13:45:56 [Note] WSREP: Member 0.1 (db3) synced with group.";
        assert_eq!(extract(line), LineTimestamp::Valid(ts("2025-09-15 13:45:56")));
    }

    #[test]
    fn test_extract_invalid_date_is_reported() {
        assert_eq!(extract("2025-13-40 10:00:00 [Note] x"), LineTimestamp::Invalid);
        assert_eq!(extract("2025-01-01 25:00:00 [Note] x"), LineTimestamp::Invalid);
    }

    #[test]
    fn test_extract_absent() {
        assert_eq!(extract("  members(2):"), LineTimestamp::Absent);
        assert_eq!(
            extract("\t0: 378c0ec7-9221-11f0-a3db-8e2d5b0f3a12, db1"),
            LineTimestamp::Absent
        );
    }

    #[test]
    fn test_extract_ignores_dates_inside_message() {
        let line = "\tWSREP: last committed at 2025-09-15 13:45:56, continuing";
        assert_eq!(extract(line), LineTimestamp::Absent);
        assert_eq!(
            extract("  2025-09-15 13:45:56 0 [Note] WSREP: indented"),
            LineTimestamp::Valid(ts("2025-09-15 13:45:56"))
        );
    }

    #[test]
    fn test_canonical_serde_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "canonical")]
            at: Timestamp,
            #[serde(with = "canonical_opt")]
            maybe: Option<Timestamp>,
        }
        let w = Wrapper { at: ts("2025-09-15 13:45:56"), maybe: None };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"at":"2025-09-15 13:45:56","maybe":null}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.at, w.at);
    }
}
