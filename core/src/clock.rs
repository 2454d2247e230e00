//! Analysis clock — the single time zone every component buckets in.
//!
//! RULE: No component reads the platform's local zone.
//! Naive timestamps are interpreted in the configured offset, and every
//! hour / weekday / bucket extraction goes through this clock, so the
//! presentation layer and the engine always agree on "10:00".

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Offset, TimeZone, Timelike, Utc};

/// Naive layouts accepted from the normalizer, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisClock {
    offset: FixedOffset,
}

impl AnalysisClock {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Returns `None` for offsets beyond ±14h.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        if minutes.abs() > MAX_OFFSET_MINUTES {
            return None;
        }
        FixedOffset::east_opt(minutes * 60).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse a raw normalizer timestamp. RFC 3339 strings keep their own
    /// offset; naive strings are read in the clock's zone.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Hour of day (0–23) in the clock's zone.
    pub fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&self.offset).hour()
    }

    /// Day of week in the clock's zone, Monday = 0.
    pub fn local_weekday(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&self.offset).weekday().num_days_from_monday()
    }

    /// Index of the `width_minutes` bucket containing `at`, aligned to the
    /// local wall clock (a 5-minute bucket always starts at :00, :05, ...).
    pub fn bucket(&self, at: DateTime<Utc>, width_minutes: i64) -> i64 {
        let local_secs = at.timestamp() + i64::from(self.offset.local_minus_utc());
        local_secs.div_euclid(bucket_width_secs(width_minutes))
    }

    /// First instant of a bucket produced by [`AnalysisClock::bucket`].
    pub fn bucket_start(&self, bucket: i64, width_minutes: i64) -> DateTime<Utc> {
        let utc_secs = bucket
            .saturating_mul(bucket_width_secs(width_minutes))
            .saturating_sub(i64::from(self.offset.local_minus_utc()));
        DateTime::from_timestamp(utc_secs, 0).unwrap_or_default()
    }

    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Bucket width in seconds, at least one minute.
fn bucket_width_secs(width_minutes: i64) -> i64 {
    width_minutes.max(1).saturating_mul(60)
}

impl Default for AnalysisClock {
    fn default() -> Self {
        Self::utc()
    }
}
