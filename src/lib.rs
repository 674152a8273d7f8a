//! # Glucoscope
//!
//! Local-first continuous glucose monitor analytics: sync readings from a
//! Nightscout server into SQLite, then compute glycemic metrics and look
//! for recurring patterns.
//!
//! ## Modules
//!
//! - [`storage`]: Deduplicated SQLite reading store
//! - [`source`]: Remote source trait, Nightscout client and sync engine
//! - [`context`]: Thresholds and display units
//! - [`metrics`]: Statistics, time in range, GMI, CV, rollups and reports
//! - [`patterns`]: Trend alerts, clustering, anomaly and weekday analysis
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glucoscope::{AnalysisContext, MetricsEngine, ReadingStore, TimeRange};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ReadingStore::open(std::path::Path::new("./cgm_data.db"))?;
//!     let readings = store.query(TimeRange::last_days(14))?;
//!
//!     if let Some(metrics) = MetricsEngine::new(AnalysisContext::default()).compute(&readings) {
//!         println!("TIR {:.1}%, GMI {:.1}%", metrics.time_in_range.in_range_pct, metrics.gmi_estimated_a1c);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod metrics;
pub mod patterns;
pub mod source;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{Reading, ReadingStore, StorageError, StorageResult, TimeRange};

pub use source::{
    NightscoutConfig, NightscoutSource, RemoteEntry, RemoteSource, ServerStatus, SourceError,
    SyncEngine, SyncError, SyncReport,
};

pub use context::{AnalysisContext, GlucoseUnit, Thresholds, ThresholdsResolver};

pub use metrics::{AnalysisError, AnalysisResult, MetricsEngine, TimeInRange, WindowMetrics};

pub use patterns::{
    ml_insights, AnomalyDetector, DayCorrelationAnalyzer, MlOptions, PatternClusterer,
    TrendAlert, TrendAlertDetector,
};

pub use config::{Config, ConfigError};
