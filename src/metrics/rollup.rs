//! Rollups
//!
//! One "group by key, aggregate" primitive shared by every grouped view
//! (hour of day, weekday, calendar date, ISO week), so hourly, daily,
//! weekly and day-of-week numbers are always computed the same way.
//!
//! Aggregates are unrounded; views round on output.

use crate::context::Thresholds;
use crate::storage::Reading;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate of a group of glucose values (mg/dL, unrounded)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlucoseAggregate {
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: i64,
    pub max: i64,
    /// Percent of values in `[target_low, target_high]`
    pub tir_pct: f64,
    /// Percent of values below `target_low`
    pub low_pct: f64,
    /// Percent of values above `target_high`
    pub high_pct: f64,
    pub low_count: usize,
    pub high_count: usize,
}

impl GlucoseAggregate {
    /// Aggregate a non-empty value set; None when empty
    pub fn of(values: &[i64], thresholds: &Thresholds) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        let in_range = values.iter().filter(|&&v| thresholds.in_range(v)).count();
        let low_count = values.iter().filter(|&&v| thresholds.is_low(v)).count();
        let high_count = values.iter().filter(|&&v| thresholds.is_high(v)).count();

        Some(Self {
            count: values.len(),
            mean,
            std: variance.sqrt(),
            min: values.iter().copied().min().unwrap_or_default(),
            max: values.iter().copied().max().unwrap_or_default(),
            tir_pct: in_range as f64 / n * 100.0,
            low_pct: low_count as f64 / n * 100.0,
            high_pct: high_count as f64 / n * 100.0,
            low_count,
            high_count,
        })
    }

    /// max - min
    pub fn range(&self) -> i64 {
        self.max - self.min
    }
}

/// Group valid readings by `key_fn` and aggregate each group
///
/// Readings with non-positive values are skipped. Keys come back sorted.
pub fn rollup<K, F>(readings: &[Reading], thresholds: &Thresholds, key_fn: F) -> BTreeMap<K, GlucoseAggregate>
where
    K: Ord,
    F: Fn(&Reading) -> K,
{
    let mut groups: BTreeMap<K, Vec<i64>> = BTreeMap::new();

    for reading in readings.iter().filter(|r| r.is_valid()) {
        groups
            .entry(key_fn(reading))
            .or_default()
            .push(reading.glucose_value);
    }

    groups
        .into_iter()
        .filter_map(|(key, values)| GlucoseAggregate::of(&values, thresholds).map(|agg| (key, agg)))
        .collect()
}

/// Key extractors for the standard views
pub mod keys {
    use super::*;

    /// Hour of day, 0-23
    pub fn hour(reading: &Reading) -> u32 {
        reading.hour()
    }

    /// Day of week, Monday = 0
    pub fn weekday(reading: &Reading) -> u32 {
        reading.weekday()
    }

    /// Calendar date
    pub fn date(reading: &Reading) -> NaiveDate {
        reading.date()
    }

    /// ISO (year, week)
    pub fn iso_week(reading: &Reading) -> (i32, u32) {
        reading.iso_week()
    }

    /// (weekday, hour)
    pub fn weekday_hour(reading: &Reading) -> (u32, u32) {
        (reading.weekday(), reading.hour())
    }
}

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Name for a Monday = 0 weekday index
pub fn weekday_name(index: u32) -> &'static str {
    WEEKDAY_NAMES[(index % 7) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_15_2024: i64 = 1_705_276_800_000; // Monday 00:00 UTC
    const HOUR_MS: i64 = 3600 * 1000;

    fn at(hours: i64, value: i64) -> Reading {
        Reading::at(format!("r{}-{}", hours, value), value, JAN_15_2024 + hours * HOUR_MS)
    }

    #[test]
    fn test_aggregate_formulas() {
        let t = Thresholds::default();
        let agg = GlucoseAggregate::of(&[60, 100, 200, 120], &t).unwrap();

        assert_eq!(agg.count, 4);
        assert_eq!(agg.mean, 120.0);
        // population variance: (3600 + 400 + 6400 + 0) / 4
        assert!((agg.std - 2600.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!((agg.min, agg.max, agg.range()), (60, 200, 140));
        assert_eq!(agg.tir_pct, 50.0);
        assert_eq!(agg.low_pct, 25.0);
        assert_eq!(agg.high_pct, 25.0);
        assert_eq!((agg.low_count, agg.high_count), (1, 1));

        assert!(GlucoseAggregate::of(&[], &t).is_none());
    }

    #[test]
    fn test_rollup_by_hour() {
        let t = Thresholds::default();
        let readings = vec![at(1, 100), at(25, 140), at(2, 60), at(26, 0)];

        let by_hour = rollup(&readings, &t, keys::hour);
        assert_eq!(by_hour.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(by_hour[&1].mean, 120.0);
        assert_eq!(by_hour[&1].count, 2);
        // Error marker at hour 2 on day two is excluded
        assert_eq!(by_hour[&2].count, 1);
        assert_eq!(by_hour[&2].tir_pct, 0.0);
    }

    #[test]
    fn test_rollup_views_agree_on_totals() {
        let t = Thresholds::default();
        let readings: Vec<Reading> = (0..24 * 14).map(|h| at(h, 80 + (h % 150))).collect();

        let total = |m: Vec<usize>| m.into_iter().sum::<usize>();
        let by_hour = total(rollup(&readings, &t, keys::hour).values().map(|a| a.count).collect());
        let by_day = total(rollup(&readings, &t, keys::date).values().map(|a| a.count).collect());
        let by_week = total(rollup(&readings, &t, keys::iso_week).values().map(|a| a.count).collect());
        let by_weekday = total(rollup(&readings, &t, keys::weekday).values().map(|a| a.count).collect());

        assert_eq!(by_hour, readings.len());
        assert_eq!(by_day, readings.len());
        assert_eq!(by_week, readings.len());
        assert_eq!(by_weekday, readings.len());

        assert_eq!(rollup(&readings, &t, keys::date).len(), 14);
        assert_eq!(rollup(&readings, &t, keys::iso_week).len(), 2);
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name(0), "Monday");
        assert_eq!(weekday_name(6), "Sunday");
        assert_eq!(keys::weekday_hour(&at(26, 100)), (1, 2));
    }
}
