//! Unusual-day detection
//!
//! Each qualifying calendar day becomes an eight-feature vector
//! `[mean, std, min, max, range, tir%, low%, high%]`; an isolation forest
//! over the standardized vectors flags the days that stand out.

use super::features::StandardScaler;
use super::isolation::IsolationForest;
use crate::context::Thresholds;
use crate::metrics::{keys, rollup, round_to, weekday_name, AnalysisError, AnalysisResult};
use crate::storage::Reading;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

pub const MIN_READINGS_ANOMALY: usize = 100;
pub const MIN_DAYS_ANOMALY: usize = 10;
/// Readings a day needs to be scored
pub const MIN_READINGS_PER_DAY: usize = 10;
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

const MAX_REPORTED: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyDay {
    pub date: NaiveDate,
    pub avg_glucose: f64,
    pub tir_percent: f64,
    pub readings_count: usize,
    pub anomaly_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub total_days_analyzed: usize,
    pub anomalies_detected: usize,
    /// Most anomalous first, at most ten
    pub anomalies: Vec<AnomalyDay>,
    pub insights: Vec<String>,
}

/// Isolation-forest detector over per-day aggregates
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    thresholds: Thresholds,
    contamination: f64,
    seed: u64,
}

impl AnomalyDetector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            contamination: DEFAULT_CONTAMINATION,
            seed: super::DEFAULT_SEED,
        }
    }

    /// Builder: expected share of outlier days
    pub fn contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    /// Builder: random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn detect(&self, readings: &[Reading]) -> AnalysisResult<AnomalyReport> {
        let valid = readings.iter().filter(|r| r.is_valid()).count();
        if valid < MIN_READINGS_ANOMALY {
            return Err(AnalysisError::insufficient(
                "anomaly detection",
                MIN_READINGS_ANOMALY,
                "readings",
                valid,
            ));
        }

        let days: Vec<_> = rollup(readings, &self.thresholds, keys::date)
            .into_iter()
            .filter(|(_, agg)| agg.count >= MIN_READINGS_PER_DAY)
            .collect();
        if days.len() < MIN_DAYS_ANOMALY {
            return Err(AnalysisError::insufficient(
                "anomaly detection",
                MIN_DAYS_ANOMALY,
                "days of data",
                days.len(),
            ));
        }

        let features: Vec<Vec<f64>> = days
            .iter()
            .map(|(_, a)| {
                vec![
                    a.mean,
                    a.std,
                    a.min as f64,
                    a.max as f64,
                    a.range() as f64,
                    a.tir_pct,
                    a.low_pct,
                    a.high_pct,
                ]
            })
            .collect();
        let scaled = StandardScaler::fit_transform(&features);

        let model = IsolationForest::new(self.contamination, self.seed)
            .fit(&scaled)
            .ok_or_else(|| AnalysisError::insufficient("anomaly detection", MIN_DAYS_ANOMALY, "days of data", 0))?;
        let scores = model.score_samples(&scaled);

        let mut anomalies: Vec<AnomalyDay> = days
            .iter()
            .zip(&scores)
            .filter(|(_, score)| model.is_outlier(**score))
            .map(|((date, agg), &score)| AnomalyDay {
                date: *date,
                avg_glucose: round_to(agg.mean, 0),
                tir_percent: round_to(agg.tir_pct, 1),
                readings_count: agg.count,
                anomaly_score: round_to(score, 3),
            })
            .collect();
        anomalies.sort_by(|a, b| a.anomaly_score.total_cmp(&b.anomaly_score));

        let insights = anomaly_insights(&anomalies);
        tracing::debug!(
            days = days.len(),
            anomalies = anomalies.len(),
            offset = model.offset,
            "Scored days for anomalies"
        );

        let anomalies_detected = anomalies.len();
        anomalies.truncate(MAX_REPORTED);
        Ok(AnomalyReport {
            total_days_analyzed: days.len(),
            anomalies_detected,
            anomalies,
            insights,
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn anomaly_insights(anomalies: &[AnomalyDay]) -> Vec<String> {
    let Some(worst) = anomalies.first() else {
        return vec!["No significant anomalies detected - your patterns are consistent".to_string()];
    };

    let mut insights = vec![
        format!("Detected {} unusual days in your data", anomalies.len()),
        format!(
            "Most unusual: {} ({}) - avg {:.0} mg/dL, {:.0}% time-in-range",
            worst.date.format("%b %d"),
            weekday_name(worst.date.weekday().num_days_from_monday()),
            worst.avg_glucose,
            round_to(worst.tir_percent, 0),
        ),
    ];

    if anomalies.len() >= 3 {
        let avg_tir = mean(anomalies.iter().map(|a| a.tir_percent));
        let avg_glucose = mean(anomalies.iter().map(|a| a.avg_glucose));
        if avg_tir < 50.0 {
            insights.push(format!(
                "Unusual days typically have poor control (avg {:.0}% TIR)",
                round_to(avg_tir, 0)
            ));
        }
        if avg_glucose > 180.0 {
            insights.push(format!(
                "Unusual days tend to run high (avg {:.0} mg/dL)",
                round_to(avg_glucose, 0)
            ));
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    // Monday 2024-01-01 00:00 UTC
    const BASE: i64 = 1_704_067_200_000;
    const HOUR_MS: i64 = 3600 * 1000;
    const DAY_MS: i64 = 24 * HOUR_MS;

    /// `days` days of hourly readings; `wild` days swing between extremes
    fn days_of_data(days: usize, wild: &[usize]) -> Vec<Reading> {
        let mut readings = Vec::new();
        for d in 0..days {
            for h in 0..24 {
                let value = if wild.contains(&d) {
                    if h % 2 == 0 { 45 } else { 330 }
                } else {
                    110 + ((d * 7 + h * 3) % 20) as i64
                };
                readings.push(Reading::at(
                    format!("d{}h{}", d, h),
                    value,
                    BASE + d as i64 * DAY_MS + h as i64 * HOUR_MS,
                ));
            }
        }
        readings
    }

    #[test]
    fn test_requires_minimum_readings() {
        let readings: Vec<Reading> = days_of_data(4, &[]).into_iter().take(99).collect();
        let err = AnomalyDetector::new(Thresholds::default()).detect(&readings).unwrap_err();
        assert!(err.to_string().contains("Need at least 100 readings for anomaly detection"));
    }

    #[test]
    fn test_requires_ten_qualifying_days() {
        // Plenty of readings but only 9 days
        let err = AnomalyDetector::new(Thresholds::default())
            .detect(&days_of_data(9, &[]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InsufficientData { required: 10, found: 9, .. }
        ));
        assert!(err.to_string().contains("Need at least 10 days of data for anomaly detection"));
    }

    #[test]
    fn test_flags_wild_day() {
        let report = AnomalyDetector::new(Thresholds::default())
            .detect(&days_of_data(30, &[17]))
            .unwrap();

        assert_eq!(report.total_days_analyzed, 30);
        assert!(report.anomalies_detected >= 1);
        let worst = &report.anomalies[0];
        assert_eq!(worst.date, NaiveDate::from_ymd_opt(2024, 1, 18).unwrap());
        assert_eq!(worst.tir_percent, 0.0);
        assert!(report.anomalies.windows(2).all(|w| w[0].anomaly_score <= w[1].anomaly_score));
        assert_eq!(report.insights[0], format!("Detected {} unusual days in your data", report.anomalies_detected));
        assert!(report.insights[1].starts_with("Most unusual: Jan 18 (Thursday)"));
    }

    #[test]
    fn test_deterministic() {
        let readings = days_of_data(20, &[3, 11]);
        let detector = AnomalyDetector::new(Thresholds::default());
        assert_eq!(detector.detect(&readings).unwrap(), detector.detect(&readings).unwrap());
    }

    #[test]
    fn test_insights_for_poor_control() {
        let day = |d: u32, avg: f64, tir: f64| AnomalyDay {
            date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            avg_glucose: avg,
            tir_percent: tir,
            readings_count: 100,
            anomaly_score: -0.7,
        };
        let insights = anomaly_insights(&[day(1, 220.0, 20.0), day(2, 200.0, 30.0), day(3, 190.0, 40.0)]);
        assert_eq!(insights.len(), 4);
        assert_eq!(insights[2], "Unusual days typically have poor control (avg 30% TIR)");
        assert_eq!(insights[3], "Unusual days tend to run high (avg 203 mg/dL)");

        assert_eq!(
            anomaly_insights(&[]),
            vec!["No significant anomalies detected - your patterns are consistent"]
        );
    }
}
