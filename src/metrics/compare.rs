//! Period comparison
//!
//! Parses human period descriptions ("last 7 days", "last month",
//! "january") into time windows and compares window metrics between two
//! of them.

use super::stats::{MetricsEngine, WindowMetrics};
use super::{round_to, AnalysisError, AnalysisResult};
use crate::context::AnalysisContext;
use crate::storage::{ReadingStore, StorageResult, TimeRange};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;

/// A resolved time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: String,
}

impl Period {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, description: impl Into<String>) -> Self {
        Self {
            start,
            end,
            description: description.into(),
        }
    }

    /// Half-open millisecond range; errors when the period is empty
    pub fn time_range(&self) -> StorageResult<TimeRange> {
        TimeRange::new(self.start.timestamp_millis(), self.end.timestamp_millis())
    }
}

const MAX_PERIOD_DAYS: i64 = 36_500;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parse a period description relative to `now`
pub fn parse_period(text: &str, now: DateTime<Utc>) -> AnalysisResult<Period> {
    let normalized = text.trim().to_lowercase();
    let invalid = || AnalysisError::InvalidPeriod(text.to_string());

    let day_count = Regex::new(r"^(last|past|previous)\s+(\d+)\s+days?$").map_err(|_| invalid())?;
    if let Some(caps) = day_count.captures(&normalized) {
        let n: i64 = caps[2].parse().map_err(|_| invalid())?;
        if n <= 0 || n > MAX_PERIOD_DAYS {
            return Err(invalid());
        }
        let span = Duration::days(n);
        let plural = if n == 1 { "" } else { "s" };
        return Ok(match &caps[1] {
            "previous" => Period::new(now - span * 2, now - span, format!("Previous {} day{}", n, plural)),
            _ => Period::new(now - span, now, format!("Last {} day{}", n, plural)),
        });
    }

    let today = Utc.from_utc_datetime(&now.date_naive().and_hms_opt(0, 0, 0).ok_or_else(invalid)?);
    let monday = today - Duration::days(now.weekday().num_days_from_monday() as i64);
    let this_month = month_start(now.year(), now.month()).ok_or_else(invalid)?;

    match normalized.as_str() {
        "this week" => return Ok(Period::new(monday, now, "This week")),
        "last week" => return Ok(Period::new(monday - Duration::days(7), monday, "Last week")),
        "this month" => return Ok(Period::new(this_month, now, "This month")),
        "last month" => {
            let (y, m) = prev_month(now.year(), now.month());
            let start = month_start(y, m).ok_or_else(invalid)?;
            return Ok(Period::new(start, this_month, "Last month"));
        }
        _ => {}
    }

    // Full month names or three-letter abbreviations, most recent occurrence
    let month = MONTHS
        .iter()
        .position(|name| normalized == *name || (normalized.len() == 3 && name.starts_with(normalized.as_str())))
        .map(|i| i as u32 + 1)
        .ok_or_else(invalid)?;

    let year = if month <= now.month() { now.year() } else { now.year() - 1 };
    let (ny, nm) = next_month(year, month);
    let start = month_start(year, month).ok_or_else(invalid)?;
    let end = month_start(ny, nm).ok_or_else(invalid)?;
    Ok(Period::new(
        start,
        end,
        format!("{} {}", capitalize(MONTHS[month as usize - 1]), year),
    ))
}

/// Metrics for one side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub readings: usize,
    #[serde(flatten)]
    pub metrics: WindowMetrics,
}

/// Direction of a metric change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Improved,
    Worsened,
    Unchanged,
}

/// Difference of one metric, first period minus second
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Delta {
    pub value: f64,
    pub change: Change,
}

impl Delta {
    fn between(current: f64, previous: f64, higher_is_better: bool) -> Self {
        let value = round_to(current - previous, 1);
        let change = if value == 0.0 {
            Change::Unchanged
        } else if (value > 0.0) == higher_is_better {
            Change::Improved
        } else {
            Change::Worsened
        };
        Self { value, change }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deltas {
    pub average_glucose: Delta,
    pub time_in_range: Delta,
    pub gmi_estimated_a1c: Delta,
    pub cv_variability: Delta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub key_improvements: Vec<String>,
    pub key_regressions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodPair {
    pub period1: PeriodMetrics,
    pub period2: PeriodMetrics,
}

/// Result of comparing two periods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub comparison: PeriodPair,
    pub deltas: Deltas,
    pub summary: ComparisonSummary,
}

/// Compare two periods given as text
pub fn compare_periods(
    store: &ReadingStore,
    ctx: &AnalysisContext,
    period1: &str,
    period2: &str,
) -> AnalysisResult<Comparison> {
    compare_periods_at(store, ctx, period1, period2, Utc::now())
}

/// `compare_periods` with an explicit "now"
pub fn compare_periods_at(
    store: &ReadingStore,
    ctx: &AnalysisContext,
    period1: &str,
    period2: &str,
    now: DateTime<Utc>,
) -> AnalysisResult<Comparison> {
    let p1 = period_metrics(store, ctx, parse_period(period1, now)?)?;
    let p2 = period_metrics(store, ctx, parse_period(period2, now)?)?;

    let (m1, m2) = (&p1.metrics, &p2.metrics);
    let deltas = Deltas {
        average_glucose: Delta::between(m1.statistics.mean, m2.statistics.mean, false),
        time_in_range: Delta::between(
            m1.time_in_range.in_range_pct,
            m2.time_in_range.in_range_pct,
            true,
        ),
        gmi_estimated_a1c: Delta::between(m1.gmi_estimated_a1c, m2.gmi_estimated_a1c, false),
        cv_variability: Delta::between(m1.cv_variability, m2.cv_variability, false),
    };
    let summary = summarize(&deltas, ctx);

    tracing::debug!(
        period1 = %p1.description,
        period2 = %p2.description,
        tir_delta = deltas.time_in_range.value,
        "Compared periods"
    );

    Ok(Comparison {
        comparison: PeriodPair {
            period1: p1,
            period2: p2,
        },
        deltas,
        summary,
    })
}

fn period_metrics(
    store: &ReadingStore,
    ctx: &AnalysisContext,
    period: Period,
) -> AnalysisResult<PeriodMetrics> {
    let unavailable = || AnalysisError::DataUnavailable(period.description.to_lowercase());

    let range = period.time_range().map_err(|_| unavailable())?;
    let readings = store.query(range)?;
    let metrics = MetricsEngine::new(*ctx)
        .compute(&readings)
        .ok_or_else(unavailable)?;

    Ok(PeriodMetrics {
        readings: metrics.statistics.count,
        description: period.description,
        start: period.start,
        end: period.end,
        metrics,
    })
}

fn summarize(deltas: &Deltas, ctx: &AnalysisContext) -> ComparisonSummary {
    let unit = ctx.unit.label();
    let lines = [
        (deltas.time_in_range, "Time in range", " percentage points"),
        (deltas.average_glucose, "Average glucose", unit),
        (deltas.gmi_estimated_a1c, "GMI", "%"),
        (deltas.cv_variability, "Glucose variability (CV)", "%"),
    ];

    let mut summary = ComparisonSummary {
        key_improvements: Vec::new(),
        key_regressions: Vec::new(),
    };
    for (delta, label, suffix) in lines {
        let direction = if delta.value > 0.0 { "up" } else { "down" };
        let sep = if suffix.starts_with(' ') || suffix == "%" { "" } else { " " };
        let line = format!("{} {} {:.1}{}{}", label, direction, delta.value.abs(), sep, suffix);
        match delta.change {
            Change::Improved => summary.key_improvements.push(line),
            Change::Worsened => summary.key_regressions.push(line),
            Change::Unchanged => {}
        }
    }
    summary
}
