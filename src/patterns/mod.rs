//! Pattern Detection
//!
//! Detectors that look across many readings for recurring behaviour:
//! - `alerts`: rule-based recurring lows/highs and weekly TIR trends
//! - `clusters`: k-means over per-reading time and level features
//! - `anomalies`: isolation forest over per-day aggregates
//! - `days`: weekday-by-weekday comparison
//! - `insights`: the three ML detectors run together
//!
//! The numeric machinery (feature extraction, k-means, isolation forest)
//! is crate-internal. All randomness is seeded, so identical input and
//! seed give identical output.

mod alerts;
mod anomalies;
mod clusters;
mod days;
mod features;
mod insights;
mod isolation;
mod kmeans;

pub use alerts::{
    AlertCategory, AlertDetails, Severity, TrendAlert, TrendAlertDetector, TrendReport,
    DEFAULT_MIN_OCCURRENCES,
};
pub use anomalies::{
    AnomalyDay, AnomalyDetector, AnomalyReport, DEFAULT_CONTAMINATION, MIN_DAYS_ANOMALY,
    MIN_READINGS_ANOMALY,
};
pub use clusters::{
    ClusterPattern, ClusterReport, PatternClusterer, PatternType, DEFAULT_CLUSTERS,
    MIN_READINGS_CLUSTERING,
};
pub use days::{DayCorrelation, DayCorrelationAnalyzer, DayStat, MIN_READINGS_PER_WEEKDAY};
pub use insights::{ml_insights, DetailedResults, MlInsights, MlOptions, Outcome, MIN_READINGS_ML_INSIGHTS};

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 42;
