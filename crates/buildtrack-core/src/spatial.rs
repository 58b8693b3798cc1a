//! Local flat-earth geometry for building-sized footprints.

use crate::models::GeoPoint;

/// Meters per degree of latitude used by the local projection.
pub const METERS_PER_DEG_LAT: f64 = 111_132.92;
/// Meters per degree of longitude at the equator.
pub const METERS_PER_DEG_LON_EQUATOR: f64 = 111_412.84;

/// Meters per degree of longitude at a given latitude.
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    METERS_PER_DEG_LON_EQUATOR * lat_deg.to_radians().cos()
}

/// Project `point` into east/north meters relative to `origin`.
///
/// Adequate for footprints of a few hundred meters; larger sites need a
/// geodesic distance instead.
pub fn project_local(point: GeoPoint, origin: GeoPoint) -> (f64, f64) {
    let east = (point.lon - origin.lon) * meters_per_deg_lon(origin.lat);
    let north = (point.lat - origin.lat) * METERS_PER_DEG_LAT;
    (east, north)
}

/// Offset a point by meters north and east using the same projection.
pub fn offset_local(origin: GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let lon_scale = meters_per_deg_lon(origin.lat).max(1e-9);
    GeoPoint {
        lat: origin.lat + north_m / METERS_PER_DEG_LAT,
        lon: origin.lon + east_m / lon_scale,
    }
}

/// Even-odd ray casting. Edges run between consecutive vertices and
/// from the last vertex back to the first.
pub fn point_in_polygon(point: GeoPoint, polygon: &[GeoPoint]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = (polygon[i].lat, polygon[i].lon);
        let (yj, xj) = (polygon[j].lat, polygon[j].lon);

        if ((yi > point.lat) != (yj > point.lat))
            && (point.lon < (xj - xi) * (point.lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Distance in meters from `point` to the segment `start`-`end`.
pub fn distance_to_segment_m(point: GeoPoint, start: GeoPoint, end: GeoPoint) -> f64 {
    // Project around the query point so every edge shares one scale.
    let (ax, ay) = project_local(start, point);
    let (bx, by) = project_local(end, point);

    let sx = bx - ax;
    let sy = by - ay;
    let seg_len_sq = sx * sx + sy * sy;

    if seg_len_sq < 1e-12 {
        return (ax * ax + ay * ay).sqrt();
    }

    // t = ((P-A) . (B-A)) / |B-A|^2 with P at the origin
    let t = ((-ax * sx - ay * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = ax + t * sx;
    let dy = ay + t * sy;

    (dx * dx + dy * dy).sqrt()
}

/// Minimum distance in meters from `point` to any polygon edge.
pub fn distance_to_boundary_m(point: GeoPoint, polygon: &[GeoPoint]) -> Option<f64> {
    let n = polygon.len();
    if n < 2 {
        return None;
    }

    (0..n)
        .map(|i| distance_to_segment_m(point, polygon[i], polygon[(i + 1) % n]))
        .min_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_scales_longitude_by_latitude() {
        let origin = GeoPoint::new(60.0, 10.0);
        let (east, north) = project_local(GeoPoint::new(60.0, 11.0), origin);
        assert!((east - 55_706.42).abs() < 1.0);
        assert!(north.abs() < 1e-9);
    }

    #[test]
    fn offset_round_trips_through_projection() {
        let origin = GeoPoint::new(30.52, 114.36);
        let moved = offset_local(origin, 12.0, -7.5);
        let (east, north) = project_local(moved, origin);
        assert!((north - 12.0).abs() < 1e-6);
        assert!((east + 7.5).abs() < 1e-3);
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = GeoPoint::new(30.0, 114.0);
        let b = offset_local(a, 0.0, 100.0);
        let beyond = offset_local(a, 0.0, 130.0);
        let dist = distance_to_segment_m(beyond, a, b);
        assert!((dist - 30.0).abs() < 0.01, "got {dist}");

        let above = offset_local(a, 40.0, 50.0);
        let dist = distance_to_segment_m(above, a, b);
        assert!((dist - 40.0).abs() < 0.01, "got {dist}");
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // U shape opening north
        let o = GeoPoint::new(30.0, 114.0);
        let polygon = vec![
            o,
            offset_local(o, 0.0, 90.0),
            offset_local(o, 90.0, 90.0),
            offset_local(o, 90.0, 60.0),
            offset_local(o, 30.0, 60.0),
            offset_local(o, 30.0, 30.0),
            offset_local(o, 90.0, 30.0),
            offset_local(o, 90.0, 0.0),
        ];
        assert!(point_in_polygon(offset_local(o, 15.0, 45.0), &polygon));
        assert!(!point_in_polygon(offset_local(o, 60.0, 45.0), &polygon));
        assert!(point_in_polygon(offset_local(o, 60.0, 15.0), &polygon));
    }
}
