//! Violation detection — a pure function of (sample, snapshot).
//!
//! Produces zero or more `Violation` records per telemetry sample. The
//! caller decides what to do with them (write to the store, fan out to
//! subscribers). There is no cross-sample state: a drone that stays inside
//! a zone keeps producing one record per sample.

use uuid::Uuid;

use crate::geometry;
use crate::snapshot::AirspaceSnapshot;
use crate::types::{TelemetrySample, Violation, ViolationKind};

/// Run every airspace rule against one sample.
///
/// A zone or path with degenerate geometry is skipped for its own check;
/// the rest of the pass continues. A single sample can legitimately yield
/// several violations (one per matching zone, plus one path deviation).
pub fn detect(
    sample: &TelemetrySample,
    snapshot: &AirspaceSnapshot,
    buffer_deg: f64,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let position = sample.position();

    for zone in snapshot.active_zones() {
        let inside = match geometry::zone_contains(&zone.boundary, &position) {
            Ok(inside) => inside,
            Err(_) => continue,
        };
        if !inside {
            continue;
        }

        let mut description = format!("Drone entered no-fly zone: {}", zone.name);
        if altitude_out_of_bounds(sample.altitude_m, zone.min_altitude_m, zone.max_altitude_m) {
            // Folded into the incursion record rather than emitted as a
            // second violation.
            description.push_str(&format!(" (altitude violation: {}m)", sample.altitude_m));
        }

        violations.push(Violation {
            id: Uuid::new_v4(),
            drone_id: sample.drone_id,
            flight_path_id: None,
            zone_id: Some(zone.id),
            kind: ViolationKind::ZoneIncursion,
            timestamp: sample.timestamp,
            latitude: sample.latitude,
            longitude: sample.longitude,
            description,
        });
    }

    // No active path means no deviation check runs at all.
    if let Some(path) = snapshot.current_path(&sample.drone_id) {
        if let Ok(false) = geometry::within_corridor(&path.route, &position, buffer_deg) {
            violations.push(Violation {
                id: Uuid::new_v4(),
                drone_id: sample.drone_id,
                flight_path_id: Some(path.id),
                zone_id: None,
                kind: ViolationKind::PathDeviation,
                timestamp: sample.timestamp,
                latitude: sample.latitude,
                longitude: sample.longitude,
                description: "Drone has deviated from approved flight path".to_string(),
            });
        }
    }

    violations
}

fn altitude_out_of_bounds(altitude_m: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_some_and(|m| altitude_m < m) || max.is_some_and(|m| altitude_m > m)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
