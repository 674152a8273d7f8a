//! Analysis error types
//!
//! "No data" and "not enough data" are ordinary outcomes for analytics,
//! reported as tagged values so callers can degrade gracefully.

use crate::source::SourceError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors returned by metric and pattern analyses
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// No local readings for the requested window
    #[error("No data found for {0}")]
    DataUnavailable(String),

    /// A minimum-sample gate was not met
    #[error("Need at least {required} {unit} for {analysis} (found {found})")]
    InsufficientData {
        analysis: &'static str,
        required: usize,
        unit: &'static str,
        found: usize,
    },

    /// Period text could not be parsed
    #[error("Could not parse period: {0}")]
    InvalidPeriod(String),

    /// Reading store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote lookup failure
    #[error("Failed to fetch data: {0}")]
    Source(#[from] SourceError),
}

impl AnalysisError {
    pub(crate) fn insufficient(
        analysis: &'static str,
        required: usize,
        unit: &'static str,
        found: usize,
    ) -> Self {
        Self::InsufficientData {
            analysis,
            required,
            unit,
            found,
        }
    }
}

/// Result type alias for analyses
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_names_threshold() {
        let err = AnalysisError::insufficient("anomaly detection", 10, "days of data", 4);
        assert_eq!(
            err.to_string(),
            "Need at least 10 days of data for anomaly detection (found 4)"
        );
    }

    #[test]
    fn test_invalid_period_display() {
        let err = AnalysisError::InvalidPeriod("fortnight".into());
        assert_eq!(err.to_string(), "Could not parse period: fortnight");
    }
}
