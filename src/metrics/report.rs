//! Report views
//!
//! Window analysis, weekly summaries and the live current-reading lookup,
//! built from `MetricsEngine` and the rollup primitive.

use super::rollup::{keys, rollup, weekday_name};
use super::stats::{glucose_status, MetricsEngine, WindowMetrics};
use super::{round_to, AnalysisError, AnalysisResult};
use crate::context::{AnalysisContext, GlucoseUnit};
use crate::source::RemoteSource;
use crate::storage::{Reading, ReadingStore};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

const DAY_MS: i64 = 24 * 3600 * 1000;

/// First/last reading dates of an analysis window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
    pub days_analyzed: i64,
}

/// Full analysis of a trailing window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub date_range: DateRange,
    pub readings: usize,
    #[serde(flatten)]
    pub metrics: WindowMetrics,
    /// Hour of day -> mean, rounded to whole mg/dL before unit conversion
    pub hourly_averages: BTreeMap<u32, f64>,
    pub unit: GlucoseUnit,
}

/// Analyze the last `days` days of stored readings
pub fn analyze(store: &ReadingStore, ctx: &AnalysisContext, days: i64) -> AnalysisResult<Analysis> {
    analyze_at(store, ctx, days, Utc::now().timestamp_millis())
}

/// `analyze` with an explicit "now"
pub fn analyze_at(
    store: &ReadingStore,
    ctx: &AnalysisContext,
    days: i64,
    now_ms: i64,
) -> AnalysisResult<Analysis> {
    let readings = store.since(now_ms - days * DAY_MS)?;
    analyze_readings(&readings, ctx, days)
}

/// Analyze an already-loaded window
pub fn analyze_readings(
    readings: &[Reading],
    ctx: &AnalysisContext,
    days: i64,
) -> AnalysisResult<Analysis> {
    let metrics = MetricsEngine::new(*ctx)
        .compute(readings)
        .ok_or_else(|| AnalysisError::DataUnavailable(format!("the last {} days", days)))?;

    let valid: Vec<&Reading> = readings.iter().filter(|r| r.is_valid()).collect();
    let date_prefix = |r: Option<&&Reading>| {
        r.map(|r| r.display_timestamp.chars().take(10).collect::<String>())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    };

    let hourly_averages = rollup(readings, &ctx.thresholds, keys::hour)
        .into_iter()
        .map(|(hour, agg)| (hour, ctx.unit.display(round_to(agg.mean, 0))))
        .collect();

    tracing::debug!(
        readings = valid.len(),
        days,
        tir = metrics.time_in_range.in_range_pct,
        "Computed window analysis"
    );

    Ok(Analysis {
        date_range: DateRange {
            from: date_prefix(valid.first()),
            to: date_prefix(valid.last()),
            days_analyzed: days,
        },
        readings: valid.len(),
        metrics,
        hourly_averages,
        unit: ctx.unit,
    })
}

/// One ISO week of readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    /// ISO week label, e.g. "2024-W03"
    pub week: String,
    pub readings: usize,
    /// Mean in display units
    pub mean: f64,
    pub tir_pct: f64,
    pub daily_tir: BTreeMap<NaiveDate, f64>,
    pub best_day: NaiveDate,
    pub best_day_name: &'static str,
    pub best_day_tir: f64,
    /// TIR change against the previous week in the set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tir_change: Option<f64>,
}

/// Per-week summaries, oldest week first; errors when no week has valid readings
pub fn weekly_summary(readings: &[Reading], ctx: &AnalysisContext) -> AnalysisResult<Vec<WeekSummary>> {
    let weeks = rollup(readings, &ctx.thresholds, keys::iso_week);
    let days = rollup(readings, &ctx.thresholds, keys::date);

    let mut summaries: Vec<WeekSummary> = Vec::with_capacity(weeks.len());
    for ((year, week), agg) in weeks {
        let daily: BTreeMap<NaiveDate, f64> = days
            .iter()
            .filter(|(date, _)| {
                let iso = date.iso_week();
                (iso.year(), iso.week()) == (year, week)
            })
            .map(|(date, day)| (*date, round_to(day.tir_pct, 1)))
            .collect();

        // Earliest date wins ties
        let Some((best_day, best_day_tir)) = daily
            .iter()
            .fold(None, |best: Option<(NaiveDate, f64)>, (d, &tir)| match best {
                Some((_, b)) if b >= tir => best,
                _ => Some((*d, tir)),
            })
        else {
            continue;
        };

        let tir_pct = round_to(agg.tir_pct, 1);
        let tir_change = summaries
            .last()
            .map(|prev| round_to(tir_pct - prev.tir_pct, 1));

        summaries.push(WeekSummary {
            week: format!("{}-W{:02}", year, week),
            readings: agg.count,
            mean: ctx.unit.display(round_to(agg.mean, 1)),
            tir_pct,
            daily_tir: daily,
            best_day,
            best_day_name: weekday_name(best_day.weekday().num_days_from_monday()),
            best_day_tir,
            tir_change,
        });
    }

    if summaries.is_empty() {
        return Err(AnalysisError::DataUnavailable("the requested weeks".into()));
    }
    Ok(summaries)
}

/// The most recent remote reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentGlucose {
    pub glucose: f64,
    pub unit: GlucoseUnit,
    pub trend: Option<String>,
    pub timestamp: Option<String>,
    pub status: &'static str,
}

/// Fetch the newest entry straight from the source
pub async fn current_glucose(
    source: &dyn RemoteSource,
    ctx: &AnalysisContext,
) -> AnalysisResult<CurrentGlucose> {
    let entry = source
        .fetch_latest()
        .await?
        .ok_or_else(|| AnalysisError::DataUnavailable("the current reading".into()))?;

    let sgv = entry.sgv.unwrap_or(0);
    Ok(CurrentGlucose {
        glucose: ctx.unit.display(sgv as f64),
        unit: ctx.unit,
        trend: entry.direction,
        timestamp: entry.date_string,
        status: glucose_status(sgv, &ctx.thresholds),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Thresholds;
    use crate::source::{RemoteEntry, ServerStatus, SourceError};
    use async_trait::async_trait;

    // Monday 2024-01-15 00:00 UTC
    const JAN_15_2024: i64 = 1_705_276_800_000;
    const HOUR_MS: i64 = 3600 * 1000;

    fn reading(i: usize, value: i64, ts: i64) -> Reading {
        Reading::at(format!("r{}", i), value, ts)
    }

    #[test]
    fn test_analyze_reports_window() {
        let mut store = ReadingStore::open_in_memory().unwrap();
        let readings: Vec<Reading> = (0..48)
            .map(|i| reading(i, if i % 2 == 0 { 100 } else { 200 }, JAN_15_2024 + i as i64 * HOUR_MS))
            .collect();
        store.insert_page(&readings).unwrap();

        let now = JAN_15_2024 + 2 * DAY_MS;
        let analysis = analyze_at(&store, &AnalysisContext::default(), 7, now).unwrap();

        assert_eq!(analysis.readings, 48);
        assert_eq!(analysis.date_range.from, "2024-01-15");
        assert_eq!(analysis.date_range.to, "2024-01-16");
        assert_eq!(analysis.date_range.days_analyzed, 7);
        assert_eq!(analysis.metrics.statistics.mean, 150.0);
        assert_eq!(analysis.metrics.time_in_range.in_range_pct, 50.0);
        assert_eq!(analysis.hourly_averages.len(), 24);
        assert_eq!(analysis.hourly_averages[&0], 100.0);
        assert_eq!(analysis.hourly_averages[&1], 200.0);

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["gmi_estimated_a1c"], 6.9);
        assert_eq!(json["unit"], "mg/dL");
    }

    #[test]
    fn test_analyze_empty_window_is_data_unavailable() {
        let store = ReadingStore::open_in_memory().unwrap();
        let err = analyze(&store, &AnalysisContext::default(), 90).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[test]
    fn test_hourly_averages_in_mmol() {
        let ctx = AnalysisContext::new(Thresholds::default(), GlucoseUnit::MmolL);
        let readings = vec![reading(0, 180, JAN_15_2024), reading(1, 181, JAN_15_2024 + 60_000)];
        let analysis = analyze_readings(&readings, &ctx, 1).unwrap();
        // round(180.5, 0) is 180 before conversion
        assert_eq!(analysis.hourly_averages[&0], 10.0);
    }

    #[test]
    fn test_weekly_summary() {
        let mut readings = Vec::new();
        // Week 3: Monday all in range, Tuesday half in range
        for h in 0..10 {
            readings.push(reading(h, 120, JAN_15_2024 + h as i64 * HOUR_MS));
            readings.push(reading(100 + h, if h % 2 == 0 { 120 } else { 250 }, JAN_15_2024 + DAY_MS + h as i64 * HOUR_MS));
        }
        // Week 4: Monday all low
        for h in 0..10 {
            readings.push(reading(200 + h, 60, JAN_15_2024 + 7 * DAY_MS + h as i64 * HOUR_MS));
        }

        let weeks = weekly_summary(&readings, &AnalysisContext::default()).unwrap();
        assert_eq!(weeks.len(), 2);

        assert_eq!(weeks[0].week, "2024-W03");
        assert_eq!(weeks[0].readings, 20);
        assert_eq!(weeks[0].tir_pct, 75.0);
        assert_eq!(weeks[0].daily_tir.len(), 2);
        assert_eq!(weeks[0].best_day, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(weeks[0].best_day_name, "Monday");
        assert_eq!(weeks[0].best_day_tir, 100.0);
        assert_eq!(weeks[0].tir_change, None);

        assert_eq!(weeks[1].week, "2024-W04");
        assert_eq!(weeks[1].tir_pct, 0.0);
        assert_eq!(weeks[1].tir_change, Some(-75.0));
    }

    #[test]
    fn test_best_day_tie_prefers_earliest() {
        let readings = vec![
            reading(0, 120, JAN_15_2024 + 2 * DAY_MS),
            reading(1, 120, JAN_15_2024 + 3 * DAY_MS),
        ];
        let weeks = weekly_summary(&readings, &AnalysisContext::default()).unwrap();
        assert_eq!(weeks[0].best_day_name, "Wednesday");
    }

    #[test]
    fn test_weekly_summary_without_readings() {
        let ctx = AnalysisContext::default();
        let err = weekly_summary(&[], &ctx).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));

        let markers = vec![reading(0, 0, JAN_15_2024), reading(1, -1, JAN_15_2024 + HOUR_MS)];
        assert!(matches!(
            weekly_summary(&markers, &ctx),
            Err(AnalysisError::DataUnavailable(_))
        ));
    }

    struct LatestSource(Option<RemoteEntry>);

    #[async_trait]
    impl RemoteSource for LatestSource {
        fn name(&self) -> &str {
            "latest"
        }

        async fn fetch_entries(&self, _: usize, _: Option<i64>) -> Result<Vec<RemoteEntry>, SourceError> {
            Ok(Vec::new())
        }

        async fn fetch_latest(&self) -> Result<Option<RemoteEntry>, SourceError> {
            Ok(self.0.clone())
        }

        async fn fetch_status(&self) -> Result<ServerStatus, SourceError> {
            Ok(ServerStatus::default())
        }
    }

    #[tokio::test]
    async fn test_current_glucose() {
        let source = LatestSource(Some(RemoteEntry {
            id: Some("e1".into()),
            kind: Some("sgv".into()),
            sgv: Some(65),
            direction: Some("FortyFiveDown".into()),
            date_string: Some("2024-01-15T10:30:00.000Z".into()),
            ..Default::default()
        }));

        let current = current_glucose(&source, &AnalysisContext::default()).await.unwrap();
        assert_eq!(current.glucose, 65.0);
        assert_eq!(current.status, "low");
        assert_eq!(current.trend.as_deref(), Some("FortyFiveDown"));
    }

    #[tokio::test]
    async fn test_current_glucose_empty() {
        let err = current_glucose(&LatestSource(None), &AnalysisContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }
}
