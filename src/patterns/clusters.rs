//! Time-pattern clustering
//!
//! Groups readings with similar time-of-day, weekday, level and slope,
//! then describes each group in plain language.

use super::features::{reading_features, StandardScaler};
use super::kmeans::KMeans;
use crate::context::Thresholds;
use crate::metrics::{round_to, weekday_name, AnalysisError, AnalysisResult};
use crate::storage::Reading;
use serde::Serialize;
use std::collections::HashMap;

/// Minimum readings before clustering is attempted
pub const MIN_READINGS_CLUSTERING: usize = 50;

pub const DEFAULT_CLUSTERS: usize = 5;

/// Dominant regime of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PatternType {
    #[serde(rename = "Low glucose pattern")]
    Low,
    #[serde(rename = "High glucose pattern")]
    High,
    #[serde(rename = "In-range pattern")]
    InRange,
}

/// One recurring regime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterPattern {
    pub cluster_id: usize,
    pub pattern_type: PatternType,
    pub avg_glucose: f64,
    pub avg_hour: f64,
    pub dominant_hour: u32,
    pub most_common_day: &'static str,
    pub reading_count: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterReport {
    pub n_clusters: usize,
    pub total_readings: usize,
    /// Largest cluster first
    pub patterns: Vec<ClusterPattern>,
}

/// k-means over per-reading features
#[derive(Debug, Clone)]
pub struct PatternClusterer {
    thresholds: Thresholds,
    k: usize,
    seed: u64,
}

impl PatternClusterer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            k: DEFAULT_CLUSTERS,
            seed: super::DEFAULT_SEED,
        }
    }

    /// Builder: number of clusters (minimum 1)
    pub fn clusters(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Builder: random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn cluster(&self, readings: &[Reading]) -> AnalysisResult<ClusterReport> {
        let valid = readings.iter().filter(|r| r.is_valid()).count();
        if valid < MIN_READINGS_CLUSTERING {
            return Err(AnalysisError::insufficient(
                "pattern clustering",
                MIN_READINGS_CLUSTERING,
                "readings",
                valid,
            ));
        }

        let (features, kept) = reading_features(readings, &self.thresholds);
        let scaled = StandardScaler::fit_transform(&features);
        let fit = KMeans::new(self.k, self.seed)
            .fit(&scaled)
            .ok_or_else(|| AnalysisError::insufficient("clustering", self.k, "readings", kept.len()))?;

        // Clusters in order of first appearance
        let mut order: Vec<usize> = Vec::new();
        let mut members: HashMap<usize, Vec<&Reading>> = HashMap::new();
        for (reading, &label) in kept.iter().zip(&fit.labels) {
            members
                .entry(label)
                .or_insert_with(|| {
                    order.push(label);
                    Vec::new()
                })
                .push(*reading);
        }

        let mut patterns: Vec<ClusterPattern> = order
            .into_iter()
            .filter_map(|label| members.get(&label).map(|m| self.describe(label, m)))
            .collect();
        patterns.sort_by(|a, b| b.reading_count.cmp(&a.reading_count));

        tracing::debug!(
            readings = kept.len(),
            clusters = patterns.len(),
            inertia = fit.inertia,
            "Clustered time patterns"
        );

        Ok(ClusterReport {
            n_clusters: self.k,
            total_readings: readings.len(),
            patterns,
        })
    }

    fn describe(&self, label: usize, members: &[&Reading]) -> ClusterPattern {
        let n = members.len() as f64;
        let avg_glucose = members.iter().map(|r| r.glucose_value as f64).sum::<f64>() / n;
        let avg_hour = members.iter().map(|r| r.hour() as f64).sum::<f64>() / n;

        let pattern_type = if avg_glucose < self.thresholds.target_low as f64 {
            PatternType::Low
        } else if avg_glucose > self.thresholds.target_high as f64 {
            PatternType::High
        } else {
            PatternType::InRange
        };

        let most_common_day = weekday_name(first_mode(members.iter().map(|r| r.weekday())));
        let dominant_hour = first_mode(members.iter().map(|r| r.hour()));

        ClusterPattern {
            cluster_id: label,
            pattern_type,
            avg_glucose: round_to(avg_glucose, 0),
            avg_hour: round_to(avg_hour, 1),
            dominant_hour,
            most_common_day,
            reading_count: members.len(),
            description: describe_cluster(pattern_type, avg_glucose, avg_hour, most_common_day, members.len()),
        }
    }
}

/// Most frequent value; the earliest seen wins ties
fn first_mode(values: impl Iterator<Item = u32>) -> u32 {
    let mut counts: Vec<(u32, usize)> = Vec::new();
    for v in values {
        match counts.iter_mut().find(|(k, _)| *k == v) {
            Some((_, c)) => *c += 1,
            None => counts.push((v, 1)),
        }
    }
    counts
        .iter()
        .fold(None, |best: Option<(u32, usize)>, &(v, c)| match best {
            Some((_, bc)) if bc >= c => best,
            _ => Some((v, c)),
        })
        .map_or(0, |(v, _)| v)
}

fn time_of_day(hour: u32) -> &'static str {
    match hour {
        0..=5 => "overnight",
        6..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "late night",
    }
}

fn describe_cluster(
    pattern_type: PatternType,
    avg_glucose: f64,
    avg_hour: f64,
    day: &str,
    count: usize,
) -> String {
    let avg = avg_glucose.trunc() as i64;
    let trend = match pattern_type {
        PatternType::Low => format!("tend to run low (avg {} mg/dL)", avg),
        PatternType::High => format!("tend to run high (avg {} mg/dL)", avg),
        PatternType::InRange => format!("stay in range (avg {} mg/dL)", avg),
    };
    format!(
        "You {} during {} on {}s ({} readings)",
        trend,
        time_of_day(avg_hour.trunc() as u32),
        day,
        count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // Monday 2024-01-15 00:00 UTC
    const BASE: i64 = 1_705_276_800_000;
    const HOUR_MS: i64 = 3600 * 1000;

    /// Two weeks of hourly data: low overnight, high in the evening
    fn two_regimes() -> Vec<Reading> {
        (0..14 * 24)
            .map(|i| {
                let hour = i % 24;
                let value = match hour {
                    1..=4 => 58,
                    18..=21 => 230,
                    _ => 120,
                };
                Reading::at(format!("r{}", i), value, BASE + i as i64 * HOUR_MS)
            })
            .collect()
    }

    #[test]
    fn test_requires_minimum_readings() {
        let readings: Vec<Reading> = two_regimes().into_iter().take(49).collect();
        let err = PatternClusterer::new(Thresholds::default()).cluster(&readings).unwrap_err();
        assert!(err.to_string().contains("Need at least 50 readings"));
    }

    #[test]
    fn test_clusters_sorted_by_size() {
        let report = PatternClusterer::new(Thresholds::default())
            .cluster(&two_regimes())
            .unwrap();

        assert_eq!(report.n_clusters, 5);
        assert_eq!(report.total_readings, 14 * 24);
        assert!(report.patterns.len() <= 5);
        assert!(report
            .patterns
            .windows(2)
            .all(|w| w[0].reading_count >= w[1].reading_count));
        assert_eq!(
            report.patterns.iter().map(|p| p.reading_count).sum::<usize>(),
            14 * 24
        );
        // Regimes pull cluster means to both sides of the overall mean (128)
        assert!(report.patterns.iter().any(|p| p.avg_glucose > 128.0));
        assert!(report.patterns.iter().any(|p| p.avg_glucose < 128.0));
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let readings = two_regimes();
        let clusterer = PatternClusterer::new(Thresholds::default()).clusters(4).seed(7);
        assert_eq!(clusterer.cluster(&readings).unwrap(), clusterer.cluster(&readings).unwrap());
    }

    #[test]
    fn test_description() {
        assert_eq!(
            describe_cluster(PatternType::Low, 61.8, 3.4, "Tuesday", 42),
            "You tend to run low (avg 61 mg/dL) during overnight on Tuesdays (42 readings)"
        );
        assert_eq!(
            describe_cluster(PatternType::InRange, 120.0, 20.9, "Friday", 7),
            "You stay in range (avg 120 mg/dL) during evening on Fridays (7 readings)"
        );
        assert_eq!(time_of_day(21), "late night");
        assert_eq!(time_of_day(12), "afternoon");
    }

    #[test]
    fn test_first_mode_prefers_first_seen() {
        assert_eq!(first_mode([3, 1, 1, 3].into_iter()), 3);
        assert_eq!(first_mode([2, 5, 5].into_iter()), 5);
    }
}
