//! Glycemic Metrics
//!
//! This module derives metrics from reading windows:
//! - `stats`: descriptive statistics, time in range, GMI, CV
//! - `rollup`: the shared "group by key, aggregate" primitive
//! - `report`: window analysis, weekly summaries, current reading
//! - `compare`: period parsing and period-over-period deltas
//!
//! Everything here is recomputed on demand and never cached.

mod compare;
mod error;
mod report;
mod rollup;
mod stats;

pub use compare::{
    compare_periods, compare_periods_at, parse_period, Change, Comparison, ComparisonSummary,
    Delta, Deltas, Period, PeriodMetrics, PeriodPair,
};
pub use error::{AnalysisError, AnalysisResult};
pub use report::{
    analyze, analyze_at, analyze_readings, current_glucose, weekly_summary, Analysis,
    CurrentGlucose, DateRange, WeekSummary,
};
pub use rollup::{keys, rollup, weekday_name, GlucoseAggregate, WEEKDAY_NAMES};
pub use stats::{
    cv, glucose_status, gmi, statistics, time_in_range, CvStatus, MetricsEngine, Statistics,
    TimeInRange, WindowMetrics, CV_STABLE_THRESHOLD,
};

/// Round to `digits` decimals, ties to even
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round_ties_even() / scale
}
