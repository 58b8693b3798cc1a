//! Net building height from roof and ground distances.
//!
//! The ground distance (H2) either comes from today's ground cluster or is
//! projected from the last day the ground was measured, shifted by the
//! change in flight altitude. When both exist they cross-check each other:
//! a measured ground far shorter than the projection usually bounced off an
//! intermediate structure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{GroundBasis, GroundSource};
use crate::rules::ProgressRules;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum EstimateError {
    #[error("no roof distance survived cleaning")]
    NoRoofDistance,
    #[error("no measured ground distance and no earlier basis to project from")]
    NoGroundDistance,
}

/// Inputs for one (building, day).
#[derive(Debug, Clone, Copy)]
pub struct HeightInputs {
    pub roof_distance_m: Option<f64>,
    pub measured_ground_m: Option<f64>,
    pub flight_altitude_m: f64,
    pub basis: Option<GroundBasis>,
}

/// Resolved distances and the resulting net height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightEstimate {
    pub roof_distance_m: f64,
    pub ground_distance_m: f64,
    pub height_m: f64,
    pub ground: GroundSource,
}

/// Ground distance projected from a basis to today's altitude.
pub fn projected_ground(basis: &GroundBasis, flight_altitude_m: f64) -> f64 {
    basis.ground_distance_m + (flight_altitude_m - basis.flight_altitude_m)
}

/// Pick the ground distance for the day.
pub fn resolve_ground(
    measured_m: Option<f64>,
    flight_altitude_m: f64,
    basis: Option<&GroundBasis>,
    rules: &ProgressRules,
) -> Result<(f64, GroundSource), EstimateError> {
    let projected = basis.map(|b| (b.day, projected_ground(b, flight_altitude_m)));

    match (measured_m, projected) {
        (Some(measured), Some((basis_day, theoretical))) => {
            if theoretical - measured > rules.ground_contradiction_m {
                tracing::debug!(
                    measured_m = measured,
                    projected_m = theoretical,
                    %basis_day,
                    "measured ground contradicts basis, using projection"
                );
                Ok((
                    theoretical,
                    GroundSource::Projected {
                        basis_day,
                        rejected_measurement_m: Some(measured),
                    },
                ))
            } else {
                Ok((measured, GroundSource::Measured))
            }
        }
        (Some(measured), None) => Ok((measured, GroundSource::Measured)),
        (None, Some((basis_day, theoretical))) => Ok((
            theoretical,
            GroundSource::Projected {
                basis_day,
                rejected_measurement_m: None,
            },
        )),
        (None, None) => Err(EstimateError::NoGroundDistance),
    }
}

/// Resolve H2 and compute the clamped net height `H2 - H1`.
pub fn estimate(inputs: &HeightInputs, rules: &ProgressRules) -> Result<HeightEstimate, EstimateError> {
    let (ground_distance_m, ground) = resolve_ground(
        inputs.measured_ground_m,
        inputs.flight_altitude_m,
        inputs.basis.as_ref(),
        rules,
    )?;
    let roof_distance_m = inputs.roof_distance_m.ok_or(EstimateError::NoRoofDistance)?;

    Ok(HeightEstimate {
        roof_distance_m,
        ground_distance_m,
        height_m: (ground_distance_m - roof_distance_m).max(0.0),
        ground,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn basis(ground: f64, altitude: f64) -> GroundBasis {
        GroundBasis {
            day: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            ground_distance_m: ground,
            flight_altitude_m: altitude,
        }
    }

    #[test]
    fn contradicted_measurement_falls_back_to_projection() {
        let rules = ProgressRules::default();
        let b = basis(80.0, 100.0);
        let (h2, source) = resolve_ground(Some(40.0), 110.0, Some(&b), &rules).unwrap();
        assert_eq!(h2, 90.0);
        assert_eq!(
            source,
            GroundSource::Projected {
                basis_day: b.day,
                rejected_measurement_m: Some(40.0)
            }
        );
        assert!(!source.is_measured());
    }

    #[test]
    fn agreeing_measurement_is_kept() {
        let rules = ProgressRules::default();
        let b = basis(80.0, 100.0);
        let (h2, source) = resolve_ground(Some(85.0), 110.0, Some(&b), &rules).unwrap();
        assert_eq!(h2, 85.0);
        assert_eq!(source, GroundSource::Measured);

        // Longer than projected is never treated as a reflection
        let (h2, source) = resolve_ground(Some(120.0), 110.0, Some(&b), &rules).unwrap();
        assert_eq!(h2, 120.0);
        assert!(source.is_measured());
    }

    #[test]
    fn projection_alone_is_not_fresh() {
        let rules = ProgressRules::default();
        let b = basis(80.0, 100.0);
        let (h2, source) = resolve_ground(None, 95.0, Some(&b), &rules).unwrap();
        assert_eq!(h2, 75.0);
        assert!(!source.is_measured());
    }

    #[test]
    fn no_ground_and_no_basis_is_an_error() {
        let inputs = HeightInputs {
            roof_distance_m: Some(50.0),
            measured_ground_m: None,
            flight_altitude_m: 120.0,
            basis: None,
        };
        assert_eq!(
            estimate(&inputs, &ProgressRules::default()),
            Err(EstimateError::NoGroundDistance)
        );
    }

    #[test]
    fn height_is_difference_of_distances() {
        let inputs = HeightInputs {
            roof_distance_m: Some(94.0),
            measured_ground_m: Some(101.0),
            flight_altitude_m: 120.0,
            basis: None,
        };
        let est = estimate(&inputs, &ProgressRules::default()).unwrap();
        assert_eq!(est.height_m, 7.0);
        assert!(est.ground.is_measured());
    }

    #[test]
    fn negative_height_clamps_to_zero() {
        let inputs = HeightInputs {
            roof_distance_m: Some(55.0),
            measured_ground_m: Some(50.0),
            flight_altitude_m: 120.0,
            basis: None,
        };
        let est = estimate(&inputs, &ProgressRules::default()).unwrap();
        assert_eq!(est.height_m, 0.0);
    }
}
