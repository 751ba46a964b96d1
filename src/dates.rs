//! Publish-timestamp normalization.
//!
//! Order of attempts: RFC 3339 / ISO-8601 (with and without fractional seconds,
//! with and without offset), RFC 2822 (RSS `pubDate`), a fixed list of legacy
//! patterns, then bare unix seconds / milliseconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

const NAIVE_DATETIME_PATTERNS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %H:%M",
];

const NAIVE_DATE_PATTERNS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%b %d, %Y", "%B %d, %Y", "%d %B %Y"];

/// Parse a source timestamp; `None` if no known format matches.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // ISO with a trailing "Z" but a space separator, or with a "+0000" style offset.
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Utc.timestamp_opt(dt.unix_timestamp(), 0).single();
    }

    let no_zone = s.trim_end_matches('Z').trim_end_matches(" UTC").trim_end_matches(" GMT");
    for p in NAIVE_DATETIME_PATTERNS {
        if let Ok(n) = NaiveDateTime::parse_from_str(no_zone, p) {
            return Some(Utc.from_utc_datetime(&n));
        }
    }
    for p in NAIVE_DATE_PATTERNS {
        if let Ok(d) = NaiveDate::parse_from_str(no_zone, p) {
            return d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        return match s.len() {
            13 => Utc.timestamp_millis_opt(n).single(),
            9 | 10 => Utc.timestamp_opt(n, 0).single(),
            _ => None,
        };
    }

    None
}

/// Total variant used by the cleaner: falls back to `now`. The flag is `true` when
/// the fallback was taken.
pub fn normalize_published(raw: &str, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    match parse_published(raw) {
        Some(dt) => (dt, false),
        None => (now, true),
    }
}

/// Age in hours (negative ages clamp to zero).
pub fn age_hours(published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = now.signed_duration_since(published).num_seconds().max(0);
    secs as f64 / 3600.0
}
