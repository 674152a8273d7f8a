//! Day-of-week correlation
//!
//! Compares control across weekdays and reports only differences large
//! enough to matter.

use crate::context::Thresholds;
use crate::metrics::{keys, rollup, round_to, weekday_name, AnalysisError, AnalysisResult};
use crate::storage::Reading;
use serde::Serialize;

/// Readings a weekday needs to be included
pub const MIN_READINGS_PER_WEEKDAY: usize = 10;

/// TIR gap (points) between best and worst day worth reporting
const TIR_GAP_POINTS: f64 = 10.0;
/// Std (mg/dL) above which the least stable day is called out
const HIGH_VARIABILITY_STD: f64 = 50.0;
/// Weekday vs weekend mean gap (mg/dL) worth reporting
const WEEKEND_GAP_MGDL: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStat {
    pub day: &'static str,
    /// Monday = 0
    pub day_index: u32,
    pub avg_glucose: f64,
    pub std_dev: f64,
    pub tir_percent: f64,
    pub low_count: usize,
    pub high_count: usize,
    pub total_readings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCorrelation {
    pub day_stats: Vec<DayStat>,
    pub best_day: DayStat,
    pub worst_day: DayStat,
    pub most_stable_day: DayStat,
    pub least_stable_day: DayStat,
    pub insights: Vec<String>,
}

/// First element with the greatest key
fn first_max_by<'a>(stats: &'a [DayStat], key: impl Fn(&DayStat) -> f64) -> Option<&'a DayStat> {
    stats.iter().fold(None, |best, s| match best {
        Some(b) if key(b) >= key(s) => Some(b),
        _ => Some(s),
    })
}

/// First element with the smallest key
fn first_min_by<'a>(stats: &'a [DayStat], key: impl Fn(&DayStat) -> f64) -> Option<&'a DayStat> {
    stats.iter().fold(None, |best, s| match best {
        Some(b) if key(b) <= key(s) => Some(b),
        _ => Some(s),
    })
}

#[derive(Debug, Clone)]
pub struct DayCorrelationAnalyzer {
    thresholds: Thresholds,
}

impl DayCorrelationAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, readings: &[Reading]) -> AnalysisResult<DayCorrelation> {
        let by_weekday = rollup(readings, &self.thresholds, keys::weekday);
        let busiest = by_weekday.values().map(|a| a.count).max().unwrap_or(0);

        let day_stats: Vec<DayStat> = by_weekday
            .into_iter()
            .filter(|(_, agg)| agg.count >= MIN_READINGS_PER_WEEKDAY)
            .map(|(day_index, agg)| DayStat {
                day: weekday_name(day_index),
                day_index,
                avg_glucose: round_to(agg.mean, 1),
                std_dev: round_to(agg.std, 1),
                tir_percent: round_to(agg.tir_pct, 1),
                low_count: agg.low_count,
                high_count: agg.high_count,
                total_readings: agg.count,
            })
            .collect();

        let picks = (
            first_max_by(&day_stats, |s| s.tir_percent),
            first_min_by(&day_stats, |s| s.tir_percent),
            first_min_by(&day_stats, |s| s.std_dev),
            first_max_by(&day_stats, |s| s.std_dev),
        );
        let (Some(best), Some(worst), Some(most_stable), Some(least_stable)) = picks else {
            return Err(AnalysisError::insufficient(
                "day correlation analysis",
                MIN_READINGS_PER_WEEKDAY,
                "readings on at least one weekday",
                busiest,
            ));
        };

        let insights = day_insights(&day_stats, best, worst, most_stable, least_stable);

        Ok(DayCorrelation {
            best_day: best.clone(),
            worst_day: worst.clone(),
            most_stable_day: most_stable.clone(),
            least_stable_day: least_stable.clone(),
            insights,
            day_stats,
        })
    }
}

fn day_insights(
    stats: &[DayStat],
    best: &DayStat,
    worst: &DayStat,
    most_stable: &DayStat,
    least_stable: &DayStat,
) -> Vec<String> {
    let mut insights = Vec::new();

    if best.day != worst.day && best.tir_percent - worst.tir_percent > TIR_GAP_POINTS {
        insights.push(format!(
            "{}s are your best day with {:.0}% time-in-range",
            best.day,
            round_to(best.tir_percent, 0)
        ));
        insights.push(format!(
            "{}s are more challenging with {:.0}% time-in-range",
            worst.day,
            round_to(worst.tir_percent, 0)
        ));
    }

    if most_stable.day != least_stable.day {
        insights.push(format!(
            "Glucose is most stable on {}s (std dev {:.0})",
            most_stable.day,
            round_to(most_stable.std_dev, 0)
        ));
        if least_stable.std_dev > HIGH_VARIABILITY_STD {
            insights.push(format!(
                "More variable on {}s (std dev {:.0})",
                least_stable.day,
                round_to(least_stable.std_dev, 0)
            ));
        }
    }

    // Reading-weighted means of the rounded daily averages
    let weighted = |weekend: bool| {
        let (sum, n) = stats
            .iter()
            .filter(|s| (s.day_index >= 5) == weekend)
            .fold((0.0, 0usize), |(sum, n), s| {
                (sum + s.avg_glucose * s.total_readings as f64, n + s.total_readings)
            });
        (n > 0).then(|| sum / n as f64)
    };

    if let (Some(weekday_avg), Some(weekend_avg)) = (weighted(false), weighted(true)) {
        if (weekday_avg - weekend_avg).abs() > WEEKEND_GAP_MGDL {
            let line = if weekday_avg > weekend_avg {
                format!(
                    "Weekday average ({:.0}) is higher than weekend ({:.0})",
                    round_to(weekday_avg, 0),
                    round_to(weekend_avg, 0)
                )
            } else {
                format!(
                    "Weekend average ({:.0}) is higher than weekday ({:.0})",
                    round_to(weekend_avg, 0),
                    round_to(weekday_avg, 0)
                )
            };
            insights.push(line);
        }
    }

    insights
}
