//! Remote CGM Source
//!
//! This module connects glucoscope to the remote time-series endpoint:
//! - `RemoteSource`: trait over the paginated entries + status API
//! - `NightscoutSource`: HTTP implementation for Nightscout servers
//! - `SyncEngine`: walks the source backward in time into the `ReadingStore`

mod nightscout;
mod sync;

pub use nightscout::{NightscoutConfig, NightscoutSource};
pub use sync::{SyncEngine, SyncError, SyncReport, DEFAULT_PAGE_SIZE};

use crate::storage::Reading;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Entry type of a sensor glucose value; every other type is ignored
pub const GLUCOSE_ENTRY_TYPE: &str = "sgv";

/// Common trait for remote reading sources
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Unique name for this source
    fn name(&self) -> &str;

    /// Fetch up to `count` entries with timestamp `<= before`, newest first
    ///
    /// `None` means no upper bound.
    async fn fetch_entries(
        &self,
        count: usize,
        before: Option<i64>,
    ) -> Result<Vec<RemoteEntry>, SourceError>;

    /// Fetch the single most recent entry
    async fn fetch_latest(&self) -> Result<Option<RemoteEntry>, SourceError>;

    /// Fetch server status (units and thresholds)
    async fn fetch_status(&self) -> Result<ServerStatus, SourceError>;
}

/// One entry as returned by the entries endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteEntry {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sgv: Option<i64>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(rename = "dateString", default)]
    pub date_string: Option<String>,
    #[serde(default)]
    pub trend: Option<i64>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

impl RemoteEntry {
    /// Whether this entry is a sensor glucose value
    pub fn is_glucose(&self) -> bool {
        self.kind.as_deref() == Some(GLUCOSE_ENTRY_TYPE)
    }

    /// Convert to a stored reading
    ///
    /// Entries without an id or timestamp cannot be deduplicated or
    /// ordered and are dropped. A missing value is stored as 0, the
    /// sensor error marker.
    pub fn to_reading(&self) -> Option<Reading> {
        if !self.is_glucose() {
            return None;
        }
        let id = self.id.clone()?;
        let date = self.date?;

        let mut reading = match &self.date_string {
            Some(ds) => Reading::new(id, self.sgv.unwrap_or(0), date, ds.clone()),
            None => Reading::at(id, self.sgv.unwrap_or(0), date),
        };
        reading.trend_code = self.trend;
        reading.trend_direction = self.direction.clone();
        reading.device_label = self.device.clone();
        Some(reading)
    }
}

/// Response of the status endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub settings: ServerSettings,
}

/// Display settings reported by the server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub thresholds: Option<ServerThresholds>,
}

/// Alarm thresholds in mg/dL as configured on the server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerThresholds {
    #[serde(rename = "bgLow", default)]
    pub bg_low: Option<f64>,
    #[serde(rename = "bgTargetBottom", default)]
    pub bg_target_bottom: Option<f64>,
    #[serde(rename = "bgTargetTop", default)]
    pub bg_target_top: Option<f64>,
    #[serde(rename = "bgHigh", default)]
    pub bg_high: Option<f64>,
}

/// Errors that can occur while talking to the remote source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status} from {url}")]
    ApiError { status: u16, url: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_deserializes_nightscout_shape() {
        let json = r#"{
            "_id": "65a4f0c2e1",
            "type": "sgv",
            "sgv": 142,
            "date": 1705314600000,
            "dateString": "2024-01-15T10:30:00.000Z",
            "trend": 4,
            "direction": "FortyFiveUp",
            "device": "xDrip-DexcomG6",
            "noise": 1
        }"#;

        let entry: RemoteEntry = serde_json::from_str(json).unwrap();
        assert!(entry.is_glucose());

        let reading = entry.to_reading().unwrap();
        assert_eq!(reading.external_id, "65a4f0c2e1");
        assert_eq!(reading.glucose_value, 142);
        assert_eq!(reading.timestamp_ms, 1705314600000);
        assert_eq!(reading.trend_direction.as_deref(), Some("FortyFiveUp"));
        assert_eq!(reading.device_label.as_deref(), Some("xDrip-DexcomG6"));
    }

    #[test]
    fn test_non_glucose_entries_are_skipped() {
        let json = r#"[
            {"_id": "m1", "type": "mbg", "mbg": 110, "date": 1705314600000},
            {"_id": "c1", "type": "cal", "date": 1705314600000},
            {"type": "sgv", "sgv": 100, "date": 1705314600000},
            {"_id": "s1", "type": "sgv", "sgv": 100}
        ]"#;

        let entries: Vec<RemoteEntry> = serde_json::from_str(json).unwrap();
        assert!(entries.iter().all(|e| e.to_reading().is_none()));
    }

    #[test]
    fn test_missing_value_becomes_error_marker() {
        let entry = RemoteEntry {
            id: Some("x".into()),
            kind: Some("sgv".into()),
            date: Some(1705314600000),
            ..Default::default()
        };
        let reading = entry.to_reading().unwrap();
        assert_eq!(reading.glucose_value, 0);
        assert!(!reading.is_valid());
        assert_eq!(reading.display_timestamp, "2024-01-15T10:30:00.000Z");
    }

    #[test]
    fn test_status_deserializes() {
        let json = r#"{
            "status": "ok",
            "settings": {
                "units": "mmol",
                "thresholds": {"bgLow": 54, "bgTargetBottom": 72, "bgTargetTop": 160, "bgHigh": 260}
            }
        }"#;
        let status: ServerStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.settings.units.as_deref(), Some("mmol"));
        let t = status.settings.thresholds.unwrap();
        assert_eq!(t.bg_low, Some(54.0));
        assert_eq!(t.bg_high, Some(260.0));
    }
}
