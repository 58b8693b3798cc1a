//! Mapping net height to a floor index.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::BuildingId;

#[derive(Debug, Error, PartialEq)]
pub enum RulerError {
    #[error("floor ruler entry {index} is not strictly above the previous one")]
    NotIncreasing { index: usize },
    #[error("floor ruler entry {index} has a non-finite or negative height")]
    InvalidHeight { index: usize },
}

/// Top-of-floor elevation for one storey.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorLevel {
    pub floor_number: i32,
    pub cumulative_height_m: f64,
}

/// Per-building calibration from height to floor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloorRuler {
    pub building_id: BuildingId,
    levels: Vec<FloorLevel>,
}

impl FloorRuler {
    /// Build a ruler; floor numbers and heights must both strictly increase.
    pub fn new(building_id: BuildingId, levels: Vec<FloorLevel>) -> Result<Self, RulerError> {
        for (index, level) in levels.iter().enumerate() {
            if !level.cumulative_height_m.is_finite() || level.cumulative_height_m < 0.0 {
                return Err(RulerError::InvalidHeight { index });
            }
            if index > 0 {
                let prev = &levels[index - 1];
                if level.floor_number <= prev.floor_number
                    || level.cumulative_height_m <= prev.cumulative_height_m
                {
                    return Err(RulerError::NotIncreasing { index });
                }
            }
        }
        Ok(Self {
            building_id,
            levels,
        })
    }

    /// Build a ruler from per-storey heights, numbering floors from 1.
    pub fn from_floor_heights(building_id: BuildingId, heights_m: &[f64]) -> Result<Self, RulerError> {
        let mut top = 0.0;
        let mut levels = Vec::with_capacity(heights_m.len());
        for (index, height) in heights_m.iter().enumerate() {
            if !height.is_finite() || *height <= 0.0 {
                return Err(RulerError::InvalidHeight { index });
            }
            top += height;
            levels.push(FloorLevel {
                floor_number: index as i32 + 1,
                cumulative_height_m: top,
            });
        }
        Self::new(building_id, levels)
    }

    pub fn levels(&self) -> &[FloorLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Floor index for a net height.
///
/// Without a ruler (or with an empty one) floors are `default_floor_height_m`
/// tall. With a ruler, the first floor whose top reaches the height within
/// `tolerance_m` wins; heights above the ruler map to its top floor.
pub fn floor_of(
    height_m: f64,
    ruler: Option<&FloorRuler>,
    default_floor_height_m: f64,
    tolerance_m: f64,
) -> i32 {
    if !height_m.is_finite() || height_m <= 0.0 {
        return 0;
    }

    match ruler.filter(|r| !r.is_empty()) {
        None => (height_m / default_floor_height_m).floor().max(0.0) as i32,
        Some(ruler) => ruler
            .levels
            .iter()
            .find(|level| level.cumulative_height_m + tolerance_m >= height_m)
            .or_else(|| ruler.levels.last())
            .map(|level| level.floor_number)
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ruler() -> FloorRuler {
        FloorRuler::new(
            1,
            vec![
                FloorLevel { floor_number: 1, cumulative_height_m: 3.5 },
                FloorLevel { floor_number: 2, cumulative_height_m: 7.0 },
                FloorLevel { floor_number: 3, cumulative_height_m: 10.5 },
            ],
        )
        .unwrap()
    }

    #[test]
    fn ruler_lookup_picks_first_reaching_floor() {
        let r = ruler();
        assert_eq!(floor_of(7.0, Some(&r), 3.0, 0.5), 2);
        assert_eq!(floor_of(7.4, Some(&r), 3.0, 0.5), 2);
        assert_eq!(floor_of(7.6, Some(&r), 3.0, 0.5), 3);
        assert_eq!(floor_of(1.0, Some(&r), 3.0, 0.5), 1);
    }

    #[test]
    fn height_above_ruler_maps_to_top_floor() {
        assert_eq!(floor_of(40.0, Some(&ruler()), 3.0, 0.5), 3);
    }

    #[test]
    fn zero_height_is_ground_floor() {
        assert_eq!(floor_of(0.0, Some(&ruler()), 3.0, 0.5), 0);
        assert_eq!(floor_of(0.0, None, 3.0, 0.5), 0);
    }

    #[test]
    fn default_storey_height_without_ruler() {
        assert_eq!(floor_of(8.9, None, 3.0, 0.5), 2);
        assert_eq!(floor_of(9.0, None, 3.0, 0.5), 3);
        let empty = FloorRuler::new(1, Vec::new()).unwrap();
        assert_eq!(floor_of(9.0, Some(&empty), 3.0, 0.5), 3);
    }

    #[test]
    fn ruler_rejects_non_increasing_levels() {
        let err = FloorRuler::new(
            1,
            vec![
                FloorLevel { floor_number: 1, cumulative_height_m: 4.0 },
                FloorLevel { floor_number: 2, cumulative_height_m: 4.0 },
            ],
        )
        .unwrap_err();
        assert_eq!(err, RulerError::NotIncreasing { index: 1 });
    }

    #[test]
    fn ruler_from_storey_heights_accumulates() {
        let r = FloorRuler::from_floor_heights(3, &[5.0, 4.0, 3.0]).unwrap();
        let tops: Vec<f64> = r.levels().iter().map(|l| l.cumulative_height_m).collect();
        assert_eq!(tops, vec![5.0, 9.0, 12.0]);
        assert_eq!(r.levels()[2].floor_number, 3);
    }
}
