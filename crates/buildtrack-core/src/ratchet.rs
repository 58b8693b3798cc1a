//! Monotonic commitment of daily estimates.
//!
//! A building does not get shorter. Small drops against the best earlier day
//! are sensor noise and are held at the earlier peak; large drops are kept
//! as measured and flagged, since they usually mean a bad fence or bad data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::height::HeightEstimate;
use crate::history::Peak;
use crate::models::{BuildingId, DailyProgressRecord, ProjectId, RatchetDecision};
use crate::rules::ProgressRules;

/// Raw estimate for one (building, day) before the ratchet runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalDay {
    pub project_id: ProjectId,
    pub building_id: BuildingId,
    pub day: NaiveDate,
    pub estimate: HeightEstimate,
    pub flight_altitude_m: f64,
    pub floor_level: i32,
    pub sample_count: usize,
}

/// Decide how a provisional day is committed against the earlier peak.
pub fn decide(
    height_m: f64,
    floor_level: i32,
    peak: Option<&Peak>,
    rules: &ProgressRules,
) -> (f64, i32, RatchetDecision) {
    let Some(peak) = peak else {
        return (height_m, floor_level, RatchetDecision::Advanced);
    };

    let drop_m = peak.height_m - height_m;
    if drop_m <= 0.0 {
        (height_m, floor_level, RatchetDecision::Advanced)
    } else if drop_m < rules.ratchet_tolerance_m {
        (
            peak.height_m,
            floor_level.max(peak.floor_level),
            RatchetDecision::Held {
                raw_height_m: height_m,
                raw_floor: floor_level,
            },
        )
    } else {
        (
            height_m,
            floor_level,
            RatchetDecision::FlaggedRegression {
                peak_height_m: peak.height_m,
                drop_m,
            },
        )
    }
}

/// Commit a provisional day.
pub fn commit(
    provisional: ProvisionalDay,
    peak: Option<&Peak>,
    rules: &ProgressRules,
) -> DailyProgressRecord {
    let (height_m, floor_level, ratchet) = decide(
        provisional.estimate.height_m,
        provisional.floor_level,
        peak,
        rules,
    );

    if let RatchetDecision::FlaggedRegression { peak_height_m, drop_m } = ratchet {
        tracing::warn!(
            building_id = provisional.building_id,
            day = %provisional.day,
            height_m,
            peak_height_m,
            drop_m,
            "large height regression committed for review"
        );
    }

    DailyProgressRecord {
        project_id: provisional.project_id,
        building_id: provisional.building_id,
        day: provisional.day,
        height_m,
        roof_distance_m: provisional.estimate.roof_distance_m,
        ground_distance_m: provisional.estimate.ground_distance_m,
        flight_altitude_m: provisional.flight_altitude_m,
        floor_level,
        ground: provisional.estimate.ground,
        ratchet,
        sample_count: provisional.sample_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(height_m: f64, floor_level: i32) -> Peak {
        Peak {
            day: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            height_m,
            floor_level,
        }
    }

    #[test]
    fn first_day_advances() {
        let rules = ProgressRules::default();
        assert_eq!(decide(12.0, 4, None, &rules), (12.0, 4, RatchetDecision::Advanced));
    }

    #[test]
    fn small_drop_is_held_at_peak() {
        let rules = ProgressRules::default();
        let (height, floor, decision) = decide(27.0, 8, Some(&peak(30.0, 10)), &rules);
        assert_eq!(height, 30.0);
        assert_eq!(floor, 10);
        assert_eq!(
            decision,
            RatchetDecision::Held {
                raw_height_m: 27.0,
                raw_floor: 8
            }
        );
    }

    #[test]
    fn large_drop_is_committed_and_flagged() {
        let rules = ProgressRules::default();
        let (height, floor, decision) = decide(25.0, 8, Some(&peak(30.0, 10)), &rules);
        assert_eq!((height, floor), (25.0, 8));
        assert_eq!(
            decision,
            RatchetDecision::FlaggedRegression {
                peak_height_m: 30.0,
                drop_m: 5.0
            }
        );
    }

    #[test]
    fn growth_advances_past_peak() {
        let rules = ProgressRules::default();
        let (height, floor, decision) = decide(33.0, 11, Some(&peak(30.0, 10)), &rules);
        assert_eq!((height, floor, decision), (33.0, 11, RatchetDecision::Advanced));
    }

    #[test]
    fn tolerance_is_configurable() {
        let rules = ProgressRules {
            ratchet_tolerance_m: 2.0,
            ..ProgressRules::default()
        };
        let (_, _, decision) = decide(27.0, 8, Some(&peak(30.0, 10)), &rules);
        assert!(matches!(decision, RatchetDecision::FlaggedRegression { .. }));
    }
}
