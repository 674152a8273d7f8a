//! Window statistics
//!
//! Descriptive statistics, time-in-range buckets and the clinical indices
//! (GMI, CV) for a bounded set of readings.
//!
//! Conventions a client-side renderer reproduces verbatim:
//! - population mean/std (divide by n)
//! - median is the element at `n / 2` of the sorted values
//! - TIR bands are `(-inf, urgent_low)`, `[urgent_low, target_low)`,
//!   `[target_low, target_high]`, `(target_high, urgent_high]`,
//!   `(urgent_high, inf)`, each `count / n * 100` rounded to one decimal
//! - GMI and CV always use the unrounded mg/dL mean and std

use super::round_to;
use crate::context::{AnalysisContext, GlucoseUnit, Thresholds};
use crate::storage::Reading;
use serde::Serialize;

/// CV strictly below this is "stable"
pub const CV_STABLE_THRESHOLD: f64 = 36.0;

const GMI_INTERCEPT: f64 = 3.31;
const GMI_SLOPE: f64 = 0.02392;

/// Descriptive statistics in display units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub unit: GlucoseUnit,
    /// Unrounded mg/dL mean
    #[serde(skip)]
    pub raw_mean: f64,
    /// Unrounded mg/dL population std
    #[serde(skip)]
    pub raw_std: f64,
}

/// Percent of readings per glucose band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeInRange {
    pub very_low_pct: f64,
    pub low_pct: f64,
    pub in_range_pct: f64,
    pub high_pct: f64,
    pub very_high_pct: f64,
}

impl TimeInRange {
    /// Sum of all bands; 100 up to rounding
    pub fn total(&self) -> f64 {
        self.very_low_pct + self.low_pct + self.in_range_pct + self.high_pct + self.very_high_pct
    }
}

/// Glucose variability classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CvStatus {
    #[serde(rename = "stable")]
    Stable,
    #[serde(rename = "high variability")]
    HighVariability,
}

impl CvStatus {
    pub fn from_cv(cv: f64) -> Self {
        if cv < CV_STABLE_THRESHOLD {
            Self::Stable
        } else {
            Self::HighVariability
        }
    }
}

/// Derived metrics for one reading window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowMetrics {
    pub statistics: Statistics,
    pub time_in_range: TimeInRange,
    pub gmi_estimated_a1c: f64,
    pub cv_variability: f64,
    pub cv_status: CvStatus,
}

/// Computes window metrics under one analysis context
#[derive(Debug, Clone, Copy)]
pub struct MetricsEngine {
    ctx: AnalysisContext,
}

impl MetricsEngine {
    pub fn new(ctx: AnalysisContext) -> Self {
        Self { ctx }
    }

    /// Metrics for a reading window; None when no valid readings remain
    pub fn compute(&self, readings: &[Reading]) -> Option<WindowMetrics> {
        let values: Vec<i64> = readings
            .iter()
            .filter(|r| r.is_valid())
            .map(|r| r.glucose_value)
            .collect();
        self.compute_values(&values)
    }

    /// Metrics for raw mg/dL values
    pub fn compute_values(&self, values: &[i64]) -> Option<WindowMetrics> {
        let statistics = statistics(values, self.ctx.unit)?;
        let time_in_range = time_in_range(values, &self.ctx.thresholds)?;

        let cv = cv(statistics.raw_mean, statistics.raw_std);
        Some(WindowMetrics {
            gmi_estimated_a1c: gmi(statistics.raw_mean),
            cv_variability: cv,
            cv_status: CvStatus::from_cv(cv),
            statistics,
            time_in_range,
        })
    }
}

/// Descriptive statistics; None for empty input
pub fn statistics(values: &[i64], unit: GlucoseUnit) -> Option<Statistics> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let n = sorted.len();
    let mean = sorted.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let std = (sorted.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n as f64).sqrt();

    Some(Statistics {
        count: n,
        mean: unit.display(round_to(mean, 1)),
        std: unit.display(round_to(std, 1)),
        min: unit.display(sorted[0] as f64),
        max: unit.display(sorted[n - 1] as f64),
        median: unit.display(sorted[n / 2] as f64),
        unit,
        raw_mean: mean,
        raw_std: std,
    })
}

/// Five-band time in range; None for empty input
pub fn time_in_range(values: &[i64], t: &Thresholds) -> Option<TimeInRange> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let pct = |pred: &dyn Fn(i64) -> bool| {
        round_to(values.iter().filter(|&&v| pred(v)).count() as f64 / n * 100.0, 1)
    };

    Some(TimeInRange {
        very_low_pct: pct(&|v| v < t.urgent_low),
        low_pct: pct(&|v| v >= t.urgent_low && v < t.target_low),
        in_range_pct: pct(&|v| v >= t.target_low && v <= t.target_high),
        high_pct: pct(&|v| v > t.target_high && v <= t.urgent_high),
        very_high_pct: pct(&|v| v > t.urgent_high),
    })
}

/// Glucose Management Indicator from a mg/dL mean
pub fn gmi(mean_mgdl: f64) -> f64 {
    round_to(GMI_INTERCEPT + GMI_SLOPE * mean_mgdl, 1)
}

/// Coefficient of variation in percent; 0 when the mean is 0
pub fn cv(mean_mgdl: f64, std_mgdl: f64) -> f64 {
    if mean_mgdl == 0.0 {
        return 0.0;
    }
    round_to(std_mgdl / mean_mgdl * 100.0, 1)
}

/// Human label for a single mg/dL value
pub fn glucose_status(value: i64, t: &Thresholds) -> &'static str {
    if value < t.urgent_low {
        "VERY LOW - urgent"
    } else if value < t.target_low {
        "low"
    } else if value <= t.target_high {
        "in range"
    } else if value <= t.urgent_high {
        "high"
    } else {
        "VERY HIGH"
    }
}
