//! Geometry predicates over WGS84 coordinates.
//!
//! Thin wrappers around the `geo` crate, with explicit handling of
//! degenerate input. All comparisons happen in raw degrees (SRID 4326,
//! unprojected), so buffer distances are approximate away from the
//! equator.

use geo::{EuclideanDistance, Intersects, LineString, Point, Polygon};

use crate::types::{Result, UtmError};

/// Lateral corridor half-width for path deviation checks, in degrees.
pub const DEFAULT_DEVIATION_BUFFER_DEG: f64 = 0.001;

fn check_polygon(boundary: &Polygon<f64>) -> Result<()> {
    // A closed ring repeats its first coordinate, so 4 is the minimum.
    if boundary.exterior().0.len() < 4 {
        return Err(UtmError::InvalidGeometry(
            "polygon ring needs at least 3 vertices",
        ));
    }
    Ok(())
}

fn check_route(route: &LineString<f64>) -> Result<()> {
    if route.0.len() < 2 {
        return Err(UtmError::InvalidGeometry(
            "linestring needs at least 2 points",
        ));
    }
    Ok(())
}

/// Point-in-polygon containment. Points on the boundary count as contained.
pub fn zone_contains(boundary: &Polygon<f64>, position: &Point<f64>) -> Result<bool> {
    check_polygon(boundary)?;
    // Intersects rather than Contains: the latter excludes the boundary.
    Ok(boundary.intersects(position))
}

/// True if `position` lies within `buffer_deg` of the route.
pub fn within_corridor(
    route: &LineString<f64>,
    position: &Point<f64>,
    buffer_deg: f64,
) -> Result<bool> {
    check_route(route)?;
    Ok(route.euclidean_distance(position) <= buffer_deg)
}

/// Route/zone overlap test, used for pre-flight route checks.
pub fn route_crosses_zone(route: &LineString<f64>, boundary: &Polygon<f64>) -> Result<bool> {
    check_route(route)?;
    check_polygon(boundary)?;
    Ok(route.intersects(boundary))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
