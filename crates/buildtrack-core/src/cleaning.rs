//! Robust cleaning of one building's laser readings for one day.
//!
//! A day's readings are bimodal: shots at the current roof are short, shots
//! past the building edge at the ground are long. Near-field clutter (cranes,
//! scaffolding, rain) only ever reads shorter than the true surface, so the
//! first pass is a one-sided cut below a low-percentile benchmark.

use serde::{Deserialize, Serialize};

use crate::models::TelemetrySample;
use crate::rules::ProgressRules;

/// Cleaned distances for one (building, day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedReadings {
    /// Mean of the refined roof cluster
    pub roof_distance_m: Option<f64>,
    /// Mean of the ground cluster's consensus members
    pub ground_distance_m: Option<f64>,
    /// Mean flight altitude over every reading that survived the benchmark cut
    pub flight_altitude_m: f64,
    pub sample_count: usize,
    /// Readings discarded below the benchmark
    pub rejected_below_benchmark: usize,
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    distance_m: f64,
    altitude_m: f64,
}

/// Clean a day's samples. Returns `None` for an empty day.
pub fn clean(samples: &[TelemetrySample], rules: &ProgressRules) -> Option<CleanedReadings> {
    let readings: Vec<Reading> = samples
        .iter()
        .filter(|s| s.laser_distance_m.is_finite() && s.flight_altitude_m.is_finite())
        .map(|s| Reading {
            distance_m: s.laser_distance_m,
            altitude_m: s.flight_altitude_m,
        })
        .collect();
    if readings.is_empty() {
        return None;
    }

    let mut distances: Vec<f64> = readings.iter().map(|r| r.distance_m).collect();
    distances.sort_by(|a, b| a.total_cmp(b));
    let floor = benchmark(&distances, rules.median_sample_limit) - rules.benchmark_reject_m;

    let survivors: Vec<Reading> = readings
        .iter()
        .copied()
        .filter(|r| r.distance_m >= floor)
        .collect();
    let rejected_below_benchmark = readings.len() - survivors.len();

    let d_min = survivors
        .iter()
        .map(|r| r.distance_m)
        .min_by(|a, b| a.total_cmp(b))?;

    let roof: Vec<f64> = survivors
        .iter()
        .map(|r| r.distance_m)
        .filter(|d| *d <= d_min + rules.roof_band_m)
        .collect();
    let ground: Vec<f64> = survivors
        .iter()
        .map(|r| r.distance_m)
        .filter(|d| *d >= d_min + rules.ground_gap_m)
        .collect();

    let roof = refine_roof(roof, rules);
    let flight_altitude_m = mean(&survivors.iter().map(|r| r.altitude_m).collect::<Vec<_>>())?;

    Some(CleanedReadings {
        roof_distance_m: mean(&roof),
        ground_distance_m: ground_consensus(&ground, rules.ground_consensus_m),
        flight_altitude_m,
        sample_count: samples.len(),
        rejected_below_benchmark,
    })
}

/// Benchmark of an ascending-sorted, non-empty slice: the median for small
/// sets, otherwise the 25th-percentile-ranked value.
pub fn benchmark(sorted: &[f64], median_sample_limit: usize) -> f64 {
    let n = sorted.len();
    if n <= median_sample_limit {
        let mid = n / 2;
        if n % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    } else {
        let rank = (0.25 * n as f64).ceil() as usize;
        sorted[rank.saturating_sub(1)]
    }
}

/// Iteratively drop roof readings far from the cluster mean.
///
/// A cluster with no member near its own mean has no roof reading and ends up empty.
fn refine_roof(mut roof: Vec<f64>, rules: &ProgressRules) -> Vec<f64> {
    for _ in 0..rules.roof_refine_iterations {
        let Some(center) = mean(&roof) else {
            break;
        };
        let kept: Vec<f64> = roof
            .iter()
            .copied()
            .filter(|d| (d - center).abs() <= rules.roof_refine_tolerance_m)
            .collect();
        if kept.len() == roof.len() {
            break;
        }
        roof = kept;
        if roof.is_empty() {
            break;
        }
    }
    roof
}

fn ground_consensus(ground: &[f64], tolerance_m: f64) -> Option<f64> {
    let raw_mean = mean(ground)?;
    let agreeing: Vec<f64> = ground
        .iter()
        .copied()
        .filter(|d| (d - raw_mean).abs() <= tolerance_m)
        .collect();
    mean(&agreeing)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use chrono::{TimeZone, Utc};

    fn samples(distances: &[f64], altitude_m: f64) -> Vec<TelemetrySample> {
        distances
            .iter()
            .enumerate()
            .map(|(i, d)| TelemetrySample {
                sample_id: i as i64,
                project_id: 1,
                captured_at: Utc.with_ymd_and_hms(2025, 3, 1, 2, i as u32, 0).unwrap(),
                drone_position: GeoPoint::new(30.0, 114.0),
                laser_target: None,
                laser_distance_m: *d,
                flight_altitude_m: altitude_m,
            })
            .collect()
    }

    #[test]
    fn benchmark_uses_median_for_small_sets() {
        assert_eq!(benchmark(&[42.0], 4), 42.0);
        assert_eq!(benchmark(&[10.0, 20.0, 90.0], 4), 20.0);
        assert_eq!(benchmark(&[50.0, 99.0, 100.0, 101.0], 4), 99.5);
    }

    #[test]
    fn benchmark_uses_lower_quartile_rank_for_larger_sets() {
        let sorted = [80.0, 81.0, 82.0, 100.0, 101.0, 102.0, 103.0, 104.0];
        // ceil(0.25 * 8) - 1 = 1
        assert_eq!(benchmark(&sorted, 4), 81.0);
        let sorted = [80.0, 81.0, 82.0, 100.0, 101.0];
        // ceil(1.25) - 1 = 1
        assert_eq!(benchmark(&sorted, 4), 81.0);
    }

    #[test]
    fn spurious_short_reading_is_discarded() {
        let cleaned = clean(&samples(&[100.0, 101.0, 99.0, 50.0], 120.0), &ProgressRules::default())
            .unwrap();
        assert_eq!(cleaned.rejected_below_benchmark, 1);
        let roof = cleaned.roof_distance_m.unwrap();
        assert!((roof - 100.0).abs() < 1e-9, "got {roof}");
        assert_eq!(cleaned.ground_distance_m, None);
        assert_eq!(cleaned.sample_count, 4);
    }

    #[test]
    fn bimodal_day_splits_roof_and_ground() {
        let distances = [
            60.0, 61.0, 60.5, 59.5, 75.0, 101.0, 100.0, 99.0, 100.5, 130.0,
        ];
        let cleaned = clean(&samples(&distances, 150.0), &ProgressRules::default()).unwrap();
        // benchmark = sorted[ceil(2.5) - 1] = sorted[2] = 60.5, nothing below 55.5
        assert_eq!(cleaned.rejected_below_benchmark, 0);
        let roof = cleaned.roof_distance_m.unwrap();
        assert!((roof - 60.25).abs() < 1e-9, "got {roof}");
        // ground cluster {75, 99, 100, 100.5, 101, 130}: raw mean ~100.92,
        // consensus keeps 99..101
        let ground = cleaned.ground_distance_m.unwrap();
        assert!((ground - 100.125).abs() < 1e-9, "got {ground}");
        assert_eq!(cleaned.flight_altitude_m, 150.0);
    }

    #[test]
    fn roof_refinement_drops_outlier_within_band() {
        let rules = ProgressRules::default();
        // 56.5 sits inside the roof band but far off the cluster
        let distances = [52.0, 52.2, 51.8, 52.1, 51.9, 56.5];
        let cleaned = clean(&samples(&distances, 100.0), &rules).unwrap();
        let roof = cleaned.roof_distance_m.unwrap();
        assert!((roof - 52.0).abs() < 1e-9, "got {roof}");
    }

    #[test]
    fn scattered_roof_cluster_leaves_no_roof_distance() {
        let rules = ProgressRules::default();
        // Roof band {40, 45}: both sit 2.5 m off their mean of 42.5
        let cleaned =
            clean(&samples(&[40.0, 45.0, 100.0, 100.0, 100.0, 100.0], 120.0), &rules).unwrap();
        assert_eq!(cleaned.roof_distance_m, None);
        assert_eq!(cleaned.ground_distance_m, Some(100.0));
    }

    #[test]
    fn empty_day_yields_nothing() {
        assert!(clean(&[], &ProgressRules::default()).is_none());
    }
}
