//! Tunable thresholds for the inference pipeline.

use serde::{Deserialize, Serialize};

/// Configuration for progress inference.
///
/// The defaults are the hand-tuned values used in the field. Sites with
/// unusual storey heights may need different regression and cross-check
/// tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressRules {
    /// Buffer applied to fences that do not carry their own (meters)
    pub geofence_buffer_m: f64,
    /// Sample sets at or below this size use the median as benchmark
    pub median_sample_limit: usize,
    /// Readings this far below the benchmark are discarded (meters)
    pub benchmark_reject_m: f64,
    /// Width of the roof band above the shortest reading (meters)
    pub roof_band_m: f64,
    /// Ground readings start this far above the shortest reading (meters)
    pub ground_gap_m: f64,
    /// Roof readings further than this from the cluster mean are dropped (meters)
    pub roof_refine_tolerance_m: f64,
    pub roof_refine_iterations: usize,
    /// Ground readings must lie within this of the ground mean (meters)
    pub ground_consensus_m: f64,
    /// Projected ground exceeding the measured one by more than this wins (meters)
    pub ground_contradiction_m: f64,
    /// Drops smaller than this are absorbed by the ratchet (meters)
    pub ratchet_tolerance_m: f64,
    /// Storey height when a building has no floor ruler (meters)
    pub default_floor_height_m: f64,
    /// Slack when comparing a height against a ruler entry (meters)
    pub ruler_tolerance_m: f64,
}

impl Default for ProgressRules {
    fn default() -> Self {
        Self {
            geofence_buffer_m: 20.0,
            median_sample_limit: 4,
            benchmark_reject_m: 5.0,
            roof_band_m: 5.0,
            ground_gap_m: 10.0,
            roof_refine_tolerance_m: 2.0,
            roof_refine_iterations: 3,
            ground_consensus_m: 5.0,
            ground_contradiction_m: 10.0,
            ratchet_tolerance_m: 5.0,
            default_floor_height_m: 3.0,
            ruler_tolerance_m: 0.5,
        }
    }
}

impl ProgressRules {
    /// Parse rules from JSON; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let rules = ProgressRules::from_json(r#"{"ratchet_tolerance_m": 3.0}"#).unwrap();
        assert_eq!(rules.ratchet_tolerance_m, 3.0);
        assert_eq!(rules.ground_contradiction_m, 10.0);
        assert_eq!(rules.geofence_buffer_m, 20.0);
    }
}
