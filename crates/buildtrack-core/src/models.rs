//! Core data models for construction progress inference.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;
pub type BuildingId = i64;

/// Geodetic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One laser-rangefinder reading taken with a drone photograph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub sample_id: i64,
    pub project_id: ProjectId,
    pub captured_at: DateTime<Utc>,
    /// Where the drone itself was
    pub drone_position: GeoPoint,
    /// Where the rangefinder was aimed, when the camera reported it
    #[serde(default)]
    pub laser_target: Option<GeoPoint>,
    pub laser_distance_m: f64,
    /// Absolute flight altitude at capture time
    pub flight_altitude_m: f64,
}

impl TelemetrySample {
    /// Point used for geofence matching: the laser target if known, else the drone position.
    pub fn matching_point(&self) -> GeoPoint {
        self.laser_target.unwrap_or(self.drone_position)
    }
}

/// Operator-drawn building footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingGeofence {
    pub building_id: BuildingId,
    pub project_id: ProjectId,
    pub name: String,
    /// Ordered vertices; the ring is implicitly closed
    pub polygon: Vec<GeoPoint>,
    /// Match tolerance outside the drawn footprint
    pub buffer_m: f64,
}

/// How the ground distance of a day was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroundSource {
    /// Measured today; becomes the basis for later days.
    Measured,
    /// Projected from an earlier measured day.
    Projected {
        basis_day: NaiveDate,
        /// Today's measured candidate, when one existed but contradicted the basis
        #[serde(default)]
        rejected_measurement_m: Option<f64>,
    },
}

impl GroundSource {
    pub fn is_measured(&self) -> bool {
        matches!(self, GroundSource::Measured)
    }
}

/// Outcome of the ratchet for a committed day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RatchetDecision {
    /// Raw estimate committed; at or above every earlier day.
    Advanced,
    /// Small regression absorbed; the earlier peak was committed instead.
    Held { raw_height_m: f64, raw_floor: i32 },
    /// Large regression committed as-is and surfaced for review.
    FlaggedRegression { peak_height_m: f64, drop_m: f64 },
}

/// Committed progress for one building on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProgressRecord {
    pub project_id: ProjectId,
    pub building_id: BuildingId,
    pub day: NaiveDate,
    pub height_m: f64,
    pub roof_distance_m: f64,
    pub ground_distance_m: f64,
    pub flight_altitude_m: f64,
    pub floor_level: i32,
    pub ground: GroundSource,
    pub ratchet: RatchetDecision,
    pub sample_count: usize,
}

impl DailyProgressRecord {
    pub fn is_ground_measured(&self) -> bool {
        self.ground.is_measured()
    }

    pub fn needs_review(&self) -> bool {
        matches!(self.ratchet, RatchetDecision::FlaggedRegression { .. })
    }
}

/// Last freshly measured ground distance for a building.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundBasis {
    pub day: NaiveDate,
    pub ground_distance_m: f64,
    pub flight_altitude_m: f64,
}

impl GroundBasis {
    pub fn from_record(record: &DailyProgressRecord) -> Option<Self> {
        record.is_ground_measured().then(|| Self {
            day: record.day,
            ground_distance_m: record.ground_distance_m,
            flight_altitude_m: record.flight_altitude_m,
        })
    }
}
