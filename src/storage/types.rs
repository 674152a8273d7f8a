//! Core data types for the reading store
//!
//! - `Reading`: a single sensor glucose value as stored locally
//! - `TimeRange`: a half-open time interval for queries

use super::error::{StorageError, StorageResult};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A single CGM reading
///
/// Created once by the sync engine on first sight and never updated.
/// `glucose_value` is always canonical mg/dL; values `<= 0` are sensor
/// error markers and never reach analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Source-assigned unique id
    pub external_id: String,
    /// Glucose in mg/dL
    pub glucose_value: i64,
    /// Unix timestamp in milliseconds (authoritative order key)
    pub timestamp_ms: i64,
    /// ISO 8601 timestamp as reported by the device
    pub display_timestamp: String,
    /// Numeric trend arrow code
    #[serde(default)]
    pub trend_code: Option<i64>,
    /// Trend arrow name (e.g. "Flat", "FortyFiveUp")
    #[serde(default)]
    pub trend_direction: Option<String>,
    /// Uploader/device label
    #[serde(default)]
    pub device_label: Option<String>,
}

impl Reading {
    /// Create a reading with only the fields analytics need
    pub fn new(
        external_id: impl Into<String>,
        glucose_value: i64,
        timestamp_ms: i64,
        display_timestamp: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            glucose_value,
            timestamp_ms,
            display_timestamp: display_timestamp.into(),
            trend_code: None,
            trend_direction: None,
            device_label: None,
        }
    }

    /// Create a reading whose display timestamp is derived from `timestamp_ms` (UTC)
    pub fn at(external_id: impl Into<String>, glucose_value: i64, timestamp_ms: i64) -> Self {
        let display = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_default();
        Self::new(external_id, glucose_value, timestamp_ms, display)
    }

    /// Builder: set trend arrow
    pub fn trend(mut self, code: i64, direction: impl Into<String>) -> Self {
        self.trend_code = Some(code);
        self.trend_direction = Some(direction.into());
        self
    }

    /// Builder: set device label
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device_label = Some(device.into());
        self
    }

    /// Whether this reading is usable for analytics
    pub fn is_valid(&self) -> bool {
        self.glucose_value > 0
    }

    /// Wall-clock time of the reading
    ///
    /// Uses the display timestamp with its own offset; falls back to
    /// `timestamp_ms` in UTC when the string does not parse.
    pub fn local_time(&self) -> DateTime<FixedOffset> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.display_timestamp) {
            return dt;
        }
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_default()
            .fixed_offset()
    }

    /// Hour of day, 0-23
    pub fn hour(&self) -> u32 {
        self.local_time().hour()
    }

    /// Day of week, Monday = 0
    pub fn weekday(&self) -> u32 {
        self.local_time().weekday().num_days_from_monday()
    }

    /// Calendar date
    pub fn date(&self) -> NaiveDate {
        self.local_time().date_naive()
    }

    /// ISO week as (iso year, week number)
    pub fn iso_week(&self) -> (i32, u32) {
        let week = self.local_time().iso_week();
        (week.year(), week.week())
    }
}

/// Time range for queries (half-open interval: [start, end))
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range; `start` must be before `end`
    pub fn new(start: i64, end: i64) -> StorageResult<Self> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(StorageError::InvalidTimeRange)
        }
    }

    /// Everything at or after `start`
    pub fn since(start: i64) -> Self {
        Self {
            start,
            end: i64::MAX,
        }
    }

    /// Create a range for the last N days from now
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now().timestamp_millis();
        let start = end - (days * 24 * 3600 * 1000);
        Self { start, end }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_wall_clock_uses_display_offset() {
        // 2024-01-15 23:30 at UTC-05:00 is already Tuesday in UTC
        let reading = Reading::new("a", 120, 1705379400000, "2024-01-15T23:30:00-05:00");

        assert_eq!(reading.hour(), 23);
        assert_eq!(reading.weekday(), 0); // Monday
        assert_eq!(reading.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(reading.iso_week(), (2024, 3));
    }

    #[test]
    fn test_reading_falls_back_to_epoch() {
        // Jan 15, 2024 at 10:30:00 UTC
        let reading = Reading::new("b", 120, 1705314600000, "not a date");
        assert_eq!(reading.hour(), 10);
        assert_eq!(reading.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_reading_at_formats_display() {
        let reading = Reading::at("c", 99, 1705314600000);
        assert_eq!(reading.display_timestamp, "2024-01-15T10:30:00.000Z");
        assert_eq!(reading.hour(), 10);
    }

    #[test]
    fn test_sensor_error_marker() {
        assert!(Reading::at("x", 1, 0).is_valid());
        assert!(!Reading::at("y", 0, 0).is_valid());
        assert!(!Reading::at("z", -5, 0).is_valid());
    }

    #[test]
    fn test_reading_serialization() {
        let reading = Reading::at("id1", 140, 1705314600000)
            .trend(4, "FortyFiveUp")
            .device("xDrip");
        let json = serde_json::to_string(&reading).unwrap();
        let restored: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(reading, restored);
    }

    #[test]
    fn test_time_range_rejects_empty_interval() {
        let range = TimeRange::new(1000, 2000).unwrap();
        assert_eq!((range.start, range.end), (1000, 2000));

        assert!(matches!(TimeRange::new(5, 5), Err(StorageError::InvalidTimeRange)));
        assert!(matches!(TimeRange::new(9, 5), Err(StorageError::InvalidTimeRange)));
        assert_eq!(TimeRange::since(10).end, i64::MAX);
    }
}
