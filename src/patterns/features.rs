//! Feature extraction and scaling for the ML detectors

use crate::context::Thresholds;
use crate::storage::Reading;

/// A dense row-major feature matrix
pub type Matrix = Vec<Vec<f64>>;

/// Lower bound of the glucose normalization range (mg/dL)
const GLUCOSE_FLOOR: f64 = 40.0;
/// Width of the glucose normalization range (40..400 mg/dL)
const GLUCOSE_SPAN: f64 = 360.0;
/// Previous reading must be closer than this to contribute a slope
const MAX_SLOPE_GAP_MINUTES: f64 = 30.0;
/// mg/dL per minute mapped to +-1
const SLOPE_SCALE: f64 = 5.0;

/// Per-reading feature vectors
///
/// `[hour/24, weekday/7, (glucose-40)/360, range indicator, clipped slope/5]`.
/// Readings must be ascending by time; invalid readings are skipped and
/// the returned references line up with the rows.
pub fn reading_features<'a>(readings: &'a [Reading], thresholds: &Thresholds) -> (Matrix, Vec<&'a Reading>) {
    let mut rows = Vec::with_capacity(readings.len());
    let mut kept: Vec<&Reading> = Vec::with_capacity(readings.len());

    for reading in readings.iter().filter(|r| r.is_valid()) {
        let slope = kept
            .last()
            .map(|prev| {
                let gap_min = (reading.timestamp_ms - prev.timestamp_ms) as f64 / 60_000.0;
                if gap_min > 0.0 && gap_min < MAX_SLOPE_GAP_MINUTES {
                    (reading.glucose_value - prev.glucose_value) as f64 / gap_min
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        rows.push(vec![
            reading.hour() as f64 / 24.0,
            reading.weekday() as f64 / 7.0,
            (reading.glucose_value as f64 - GLUCOSE_FLOOR) / GLUCOSE_SPAN,
            thresholds.range_indicator(reading.glucose_value) as f64,
            (slope / SLOPE_SCALE).clamp(-1.0, 1.0),
        ]);
        kept.push(reading);
    }

    (rows, kept)
}

/// Zero-mean, unit-variance column scaling
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations
    ///
    /// Constant columns get a scale of 1 so they map to 0.
    pub fn fit(data: &[Vec<f64>]) -> Self {
        let dims = data.first().map_or(0, |row| row.len());
        let n = data.len().max(1) as f64;

        let means: Vec<f64> = (0..dims)
            .map(|j| data.iter().map(|row| row[j]).sum::<f64>() / n)
            .collect();
        let scales = (0..dims)
            .map(|j| {
                let var = data.iter().map(|row| (row[j] - means[j]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std == 0.0 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { means, scales }
    }

    pub fn transform(&self, data: &[Vec<f64>]) -> Matrix {
        data.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(x, (mean, scale))| (x - mean) / scale)
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(data: &[Vec<f64>]) -> Matrix {
        Self::fit(data).transform(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Monday 2024-01-15 06:00 UTC
    const BASE: i64 = 1_705_298_400_000;
    const MIN_MS: i64 = 60_000;

    #[test]
    fn test_reading_features() {
        let readings = vec![
            Reading::at("a", 100, BASE),
            Reading::at("b", 120, BASE + 5 * MIN_MS),
            Reading::at("c", 0, BASE + 6 * MIN_MS),
            Reading::at("d", 60, BASE + 10 * MIN_MS),
            Reading::at("e", 400, BASE + 60 * MIN_MS),
        ];
        let (rows, kept) = reading_features(&readings, &Thresholds::default());

        assert_eq!(rows.len(), 4);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[2].external_id, "d");

        assert_eq!(rows[0], vec![0.25, 0.0, 60.0 / 360.0, 0.0, 0.0]);
        // +20 over 5 minutes is 4/min, scaled to 0.8
        assert!((rows[1][4] - 0.8).abs() < 1e-12);
        // -60 over 5 minutes clips to -1
        assert_eq!(rows[2][4], -1.0);
        assert_eq!(rows[2][3], -1.0);
        // 50 minute gap contributes no slope
        assert_eq!(rows[3][4], 0.0);
        assert_eq!(rows[3][2], 1.0);
        assert_eq!(rows[3][3], 1.0);
    }

    #[test]
    fn test_standard_scaler() {
        let data = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaled = StandardScaler::fit_transform(&data);

        assert_eq!(scaled[0], vec![-1.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 0.0]);
    }
}
