//! Trend Alerts
//!
//! Rule-based detection of recurring lows/highs and week-over-week
//! time-in-range trends.
//!
//! Out-of-range readings are bucketed three ways: by hour of day, by
//! weekday and by (weekday, hour). A bucket is a pattern only when it has
//! at least `min_occurrences` events spread over at least
//! `min_occurrences` distinct calendar days (ISO weeks for weekday
//! buckets), so one bad day cannot masquerade as a habit. Every qualifying
//! bucket is reported: a daily 02:00 low also shows up per weekday and per
//! (weekday, 02:00) once those buckets clear the same gates.

use crate::context::{AnalysisContext, Thresholds};
use crate::metrics::{keys, rollup, round_to, weekday_name, AnalysisError, AnalysisResult};
use crate::storage::Reading;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

pub const DEFAULT_MIN_OCCURRENCES: usize = 2;

/// Weeks averaged on each side of the trend comparison
const TREND_WEEKS: usize = 3;
/// TIR change (points) that makes a trend reportable
const TREND_CHANGE_POINTS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    RecurringLows,
    RecurringHighs,
    TrendImprovement,
    TrendWorsening,
}

/// Structured facts behind an alert
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_days: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_weeks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_glucose: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_tir: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_tir: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAlert {
    pub severity: Severity,
    pub category: AlertCategory,
    pub pattern: String,
    pub message: String,
    pub details: AlertDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub days_analyzed: i64,
    pub alert_count: usize,
    pub alerts: Vec<TrendAlert>,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Excursion {
    Low,
    High,
}

impl Excursion {
    fn category(self) -> AlertCategory {
        match self {
            Self::Low => AlertCategory::RecurringLows,
            Self::High => AlertCategory::RecurringHighs,
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Low => "Lows",
            Self::High => "Highs",
        }
    }

    fn adjective(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    count: usize,
    sum: i64,
    dates: BTreeSet<NaiveDate>,
    weeks: BTreeSet<(i32, u32)>,
}

impl Bucket {
    fn add(&mut self, reading: &Reading) {
        self.count += 1;
        self.sum += reading.glucose_value;
        self.dates.insert(reading.date());
        self.weeks.insert(reading.iso_week());
    }

    fn mean(&self) -> f64 {
        self.sum as f64 / self.count.max(1) as f64
    }
}

/// Human label for an hour of day
fn time_label(hour: u32) -> String {
    match hour {
        0..=5 => "overnight".to_string(),
        6..=9 => "breakfast".to_string(),
        11..=13 => "lunch".to_string(),
        17..=20 => "dinner".to_string(),
        _ => format!("around {:02}:00", hour),
    }
}

/// Recurring-excursion and trend detector
#[derive(Debug, Clone)]
pub struct TrendAlertDetector {
    ctx: AnalysisContext,
    min_occurrences: usize,
    overnight: Range<u32>,
}

impl TrendAlertDetector {
    pub fn new(ctx: AnalysisContext) -> Self {
        Self {
            ctx,
            min_occurrences: DEFAULT_MIN_OCCURRENCES,
            overnight: 0..6,
        }
    }

    /// Builder: events and distinct days a bucket needs (minimum 1)
    pub fn min_occurrences(mut self, n: usize) -> Self {
        self.min_occurrences = n.max(1);
        self
    }

    /// Builder: overnight hours `[start, end)`; wraps past midnight when start > end
    pub fn overnight(mut self, start: u32, end: u32) -> Self {
        self.overnight = start..end;
        self
    }

    fn is_overnight(&self, hour: u32) -> bool {
        let (start, end) = (self.overnight.start, self.overnight.end);
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    fn severity(&self, kind: Excursion, hour: Option<u32>) -> Severity {
        match (kind, hour) {
            (Excursion::Low, Some(h)) if self.is_overnight(h) => Severity::High,
            _ => Severity::Medium,
        }
    }

    /// Alerts sorted high, medium, low
    pub fn detect(&self, readings: &[Reading]) -> Vec<TrendAlert> {
        let t = &self.ctx.thresholds;
        let mut alerts = Vec::new();

        for kind in [Excursion::Low, Excursion::High] {
            let events: Vec<&Reading> = readings
                .iter()
                .filter(|r| r.is_valid())
                .filter(|r| match kind {
                    Excursion::Low => t.is_low(r.glucose_value),
                    Excursion::High => t.is_high(r.glucose_value),
                })
                .collect();
            self.recurring(kind, &events, &mut alerts);
        }

        if let Some(alert) = self.weekly_trend(readings) {
            alerts.push(alert);
        }

        alerts.sort_by_key(|a| a.severity);
        alerts
    }

    /// `detect` wrapped with its inputs; errors when the window has no valid readings
    pub fn report(&self, readings: &[Reading], days: i64) -> AnalysisResult<TrendReport> {
        if !readings.iter().any(|r| r.is_valid()) {
            return Err(AnalysisError::DataUnavailable(format!("the last {} days", days)));
        }

        let alerts = self.detect(readings);
        tracing::info!(days, alerts = alerts.len(), "Trend alert scan complete");
        Ok(TrendReport {
            days_analyzed: days,
            alert_count: alerts.len(),
            alerts,
            thresholds: self.ctx.thresholds,
        })
    }

    fn recurring(&self, kind: Excursion, events: &[&Reading], alerts: &mut Vec<TrendAlert>) {
        let min = self.min_occurrences;
        let mut by_hour: BTreeMap<u32, Bucket> = BTreeMap::new();
        let mut by_weekday: BTreeMap<u32, Bucket> = BTreeMap::new();
        let mut by_day_hour: BTreeMap<(u32, u32), Bucket> = BTreeMap::new();

        for r in events {
            by_hour.entry(r.hour()).or_default().add(r);
            by_weekday.entry(r.weekday()).or_default().add(r);
            by_day_hour.entry((r.weekday(), r.hour())).or_default().add(r);
        }

        let qualifies = |b: &Bucket| b.count >= min && b.dates.len() >= min;
        let display = |b: &Bucket| self.ctx.unit.display(round_to(b.mean(), 1));

        for (&hour, bucket) in by_hour.iter().filter(|(_, b)| qualifies(b)) {
            alerts.push(TrendAlert {
                severity: self.severity(kind, Some(hour)),
                category: kind.category(),
                pattern: format!("{} around {:02}:00", kind.noun(), hour),
                message: format!(
                    "Glucose has run {} around {:02}:00 on {} different days ({} readings)",
                    kind.adjective(),
                    hour,
                    bucket.dates.len(),
                    bucket.count
                ),
                details: AlertDetails {
                    hour: Some(hour),
                    time_label: Some(time_label(hour)),
                    occurrences: Some(bucket.count),
                    distinct_days: Some(bucket.dates.len()),
                    avg_glucose: Some(display(bucket)),
                    ..Default::default()
                },
            });
        }

        for (&day, bucket) in by_weekday
            .iter()
            .filter(|(_, b)| b.count >= min && b.weeks.len() >= min)
        {
            let name = weekday_name(day);
            alerts.push(TrendAlert {
                severity: self.severity(kind, None),
                category: kind.category(),
                pattern: format!("{} on {}s", kind.noun(), name),
                message: format!(
                    "Glucose often runs {} on {}s ({} readings across {} weeks)",
                    kind.adjective(),
                    name,
                    bucket.count,
                    bucket.weeks.len()
                ),
                details: AlertDetails {
                    weekday: Some(name),
                    occurrences: Some(bucket.count),
                    distinct_weeks: Some(bucket.weeks.len()),
                    avg_glucose: Some(display(bucket)),
                    ..Default::default()
                },
            });
        }

        for (&(day, hour), bucket) in by_day_hour.iter().filter(|(_, b)| qualifies(b))
        {
            let name = weekday_name(day);
            let label = time_label(hour);
            alerts.push(TrendAlert {
                severity: self.severity(kind, Some(hour)),
                category: kind.category(),
                pattern: format!("{} on {} {}", kind.noun(), name, label),
                message: format!(
                    "Glucose runs {} on {}s {} ({:02}:00) on {} different days",
                    kind.adjective(),
                    name,
                    label,
                    hour,
                    bucket.dates.len()
                ),
                details: AlertDetails {
                    hour: Some(hour),
                    weekday: Some(name),
                    time_label: Some(label),
                    occurrences: Some(bucket.count),
                    distinct_days: Some(bucket.dates.len()),
                    avg_glucose: Some(display(bucket)),
                    ..Default::default()
                },
            });
        }
    }

    /// Mean TIR of the latest weeks against the weeks before them
    fn weekly_trend(&self, readings: &[Reading]) -> Option<TrendAlert> {
        let weekly: Vec<f64> = rollup(readings, &self.ctx.thresholds, keys::iso_week)
            .into_values()
            .map(|agg| agg.tir_pct)
            .collect();
        if weekly.len() < TREND_WEEKS {
            return None;
        }

        let split = weekly.len() - TREND_WEEKS;
        let recent = &weekly[split..];
        let previous = &weekly[split.saturating_sub(TREND_WEEKS)..split];
        if previous.is_empty() {
            return None;
        }

        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        let recent_tir = round_to(mean(recent), 1);
        let previous_tir = round_to(mean(previous), 1);
        let change = round_to(mean(recent) - mean(previous), 1);

        if change.abs() < TREND_CHANGE_POINTS {
            tracing::debug!(change, "Weekly TIR change below reporting threshold");
            return None;
        }

        let (severity, category, verb) = if change > 0.0 {
            (Severity::Low, AlertCategory::TrendImprovement, "improved")
        } else {
            (Severity::Medium, AlertCategory::TrendWorsening, "dropped")
        };

        Some(TrendAlert {
            severity,
            category,
            pattern: "Weekly time in range".to_string(),
            message: format!(
                "Time in range {} from {:.1}% to {:.1}% over the last {} weeks",
                verb, previous_tir, recent_tir, TREND_WEEKS
            ),
            details: AlertDetails {
                recent_tir: Some(recent_tir),
                previous_tir: Some(previous_tir),
                change: Some(change),
                ..Default::default()
            },
        })
    }
}
