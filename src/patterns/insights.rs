//! Combined ML insights across the three pattern detectors

use super::{
    AnomalyDetector, AnomalyReport, ClusterReport, DayCorrelation, DayCorrelationAnalyzer,
    PatternClusterer, DEFAULT_CLUSTERS, DEFAULT_CONTAMINATION, DEFAULT_SEED,
};
use crate::context::Thresholds;
use crate::metrics::{AnalysisError, AnalysisResult};
use crate::storage::Reading;
use serde::Serialize;

pub const MIN_READINGS_ML_INSIGHTS: usize = 50;

/// Cluster descriptions carried into the combined insight list
const TOP_CLUSTER_INSIGHTS: usize = 3;

/// Detector tuning shared by the combined run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlOptions {
    pub clusters: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for MlOptions {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
        }
    }
}

/// A sub-analysis payload, or the reason it could not run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Ok(T),
    Err { error: String },
}

impl<T> From<AnalysisResult<T>> for Outcome<T> {
    fn from(result: AnalysisResult<T>) -> Self {
        match result {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Err { error: e.to_string() },
        }
    }
}

impl<T> Outcome<T> {
    pub fn ok(&self) -> Option<&T> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::Err { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedResults {
    pub time_patterns: Outcome<ClusterReport>,
    pub day_correlations: Outcome<DayCorrelation>,
    pub anomalies: Outcome<AnomalyReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlInsights {
    pub total_readings: usize,
    pub summary: String,
    pub insights: Vec<String>,
    pub detailed_results: DetailedResults,
}

/// Run clustering, day correlation and anomaly detection together
///
/// Sub-analyses that lack data are reported as errors inside
/// `detailed_results`; only the overall reading gate fails the call.
pub fn ml_insights(
    readings: &[Reading],
    thresholds: &Thresholds,
    options: &MlOptions,
) -> AnalysisResult<MlInsights> {
    if readings.len() < MIN_READINGS_ML_INSIGHTS {
        return Err(AnalysisError::insufficient(
            "ML pattern analysis",
            MIN_READINGS_ML_INSIGHTS,
            "readings",
            readings.len(),
        ));
    }

    let time_patterns: Outcome<_> = PatternClusterer::new(*thresholds)
        .clusters(options.clusters)
        .seed(options.seed)
        .cluster(readings)
        .into();
    let day_correlations: Outcome<_> = DayCorrelationAnalyzer::new(*thresholds).analyze(readings).into();
    let anomalies: Outcome<_> = AnomalyDetector::new(*thresholds)
        .contamination(options.contamination)
        .seed(options.seed)
        .detect(readings)
        .into();

    let mut insights = Vec::new();
    if let Some(days) = day_correlations.ok() {
        insights.extend(days.insights.iter().cloned());
    }
    if let Some(clusters) = time_patterns.ok() {
        insights.extend(
            clusters
                .patterns
                .iter()
                .take(TOP_CLUSTER_INSIGHTS)
                .map(|p| p.description.clone()),
        );
    }
    if let Some(report) = anomalies.ok() {
        insights.extend(report.insights.iter().cloned());
    }

    tracing::info!(readings = readings.len(), insights = insights.len(), "Generated ML insights");

    Ok(MlInsights {
        total_readings: readings.len(),
        summary: format!("Analyzed {} readings using machine learning", readings.len()),
        insights,
        detailed_results: DetailedResults {
            time_patterns,
            day_correlations,
            anomalies,
        },
    })
}
