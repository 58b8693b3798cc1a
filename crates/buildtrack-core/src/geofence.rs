//! Matching telemetry points against building geofences.
//!
//! A laser aimed at the top of a tall building lands outside the drawn
//! footprint once projected to the ground, so matches are accepted within a
//! buffer around the polygon as well as strictly inside it.

use thiserror::Error;

use crate::models::{BuildingGeofence, BuildingId, GeoPoint};
use crate::spatial::{distance_to_boundary_m, point_in_polygon};

/// Slack for comparisons against the buffer distance.
const BUFFER_EPS_M: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum GeofenceError {
    #[error("building {building_id}: polygon has {vertices} distinct vertices, need at least 3")]
    TooFewVertices {
        building_id: BuildingId,
        vertices: usize,
    },
    #[error("building {building_id}: vertex {index} is not a finite coordinate")]
    NonFiniteVertex { building_id: BuildingId, index: usize },
    #[error("building {building_id}: buffer {buffer_m} m is not a finite non-negative distance")]
    InvalidBuffer { building_id: BuildingId, buffer_m: f64 },
    #[error("building {building_id}: boundary could not be parsed: {reason}")]
    Unparsable { building_id: BuildingId, reason: String },
}

/// Distance from `point` to the fence: 0 inside, edge distance outside.
/// `None` when the polygon has fewer than 3 vertices.
pub fn match_distance(point: GeoPoint, polygon: &[GeoPoint]) -> Option<f64> {
    if polygon.len() < 3 {
        return None;
    }
    if point_in_polygon(point, polygon) {
        return Some(0.0);
    }
    distance_to_boundary_m(point, polygon)
}

/// True when `point` is inside `polygon` or within `buffer_m` of an edge.
pub fn matches(point: GeoPoint, polygon: &[GeoPoint], buffer_m: f64) -> bool {
    match_distance(point, polygon)
        .map(|dist| dist <= buffer_m + BUFFER_EPS_M)
        .unwrap_or(false)
}

/// Check that a fence can take part in matching.
pub fn validate(fence: &BuildingGeofence) -> Result<(), GeofenceError> {
    if let Some(index) = fence.polygon.iter().position(|p| !p.is_finite()) {
        return Err(GeofenceError::NonFiniteVertex {
            building_id: fence.building_id,
            index,
        });
    }

    let vertices = distinct_vertex_count(&fence.polygon);
    if vertices < 3 {
        return Err(GeofenceError::TooFewVertices {
            building_id: fence.building_id,
            vertices,
        });
    }

    if !fence.buffer_m.is_finite() || fence.buffer_m < 0.0 {
        return Err(GeofenceError::InvalidBuffer {
            building_id: fence.building_id,
            buffer_m: fence.buffer_m,
        });
    }

    Ok(())
}

/// Vertex count ignoring a closing vertex that repeats the first.
fn distinct_vertex_count(polygon: &[GeoPoint]) -> usize {
    match (polygon.first(), polygon.last()) {
        (Some(first), Some(last)) if polygon.len() > 1 && first == last => polygon.len() - 1,
        _ => polygon.len(),
    }
}

/// Pick the buildings a point belongs to.
///
/// Containment beats buffer proximity: the point goes to the fence(s) with
/// the smallest match distance. Exact ties go to every tied building.
pub fn assign<'a>(point: GeoPoint, fences: &'a [BuildingGeofence]) -> Vec<&'a BuildingGeofence> {
    let mut best: Option<f64> = None;
    let mut winners: Vec<&BuildingGeofence> = Vec::new();

    for fence in fences {
        let Some(dist) = match_distance(point, &fence.polygon) else {
            continue;
        };
        if dist > fence.buffer_m + BUFFER_EPS_M {
            continue;
        }
        match best {
            Some(current) if dist > current => {}
            Some(current) if dist == current => winners.push(fence),
            _ => {
                best = Some(dist);
                winners.clear();
                winners.push(fence);
            }
        }
    }

    winners
}
