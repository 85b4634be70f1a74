//! Immutable point-in-time view of zones and active flight paths.
//!
//! A snapshot is built once per registry refresh and shared read-only with
//! every concurrent detection pass; it is never mutated in place, so a pass
//! can never observe a half-updated zone list.

use std::collections::HashMap;

use uuid::Uuid;

use crate::types::{FlightPath, NoFlyZone};

/// Consistent view handed to the violation detector.
#[derive(Debug, Default)]
pub struct AirspaceSnapshot {
    zones: Vec<NoFlyZone>,
    paths_by_drone: HashMap<Uuid, Vec<FlightPath>>,
}

impl AirspaceSnapshot {
    /// Build a snapshot, grouping paths by drone and dropping any that are
    /// not approved or in progress.
    pub fn new(zones: Vec<NoFlyZone>, paths: Vec<FlightPath>) -> Self {
        let mut paths_by_drone: HashMap<Uuid, Vec<FlightPath>> = HashMap::new();
        for path in paths {
            if path.status.is_active() {
                paths_by_drone.entry(path.drone_id).or_default().push(path);
            }
        }
        AirspaceSnapshot {
            zones,
            paths_by_drone,
        }
    }

    /// All zones, active or not.
    pub fn zones(&self) -> &[NoFlyZone] {
        &self.zones
    }

    /// Zones that currently participate in incursion checks.
    pub fn active_zones(&self) -> impl Iterator<Item = &NoFlyZone> {
        self.zones.iter().filter(|z| z.active)
    }

    /// The drone's current flight path: latest start time wins when several
    /// active paths exist.
    pub fn current_path(&self, drone_id: &Uuid) -> Option<&FlightPath> {
        self.paths_by_drone
            .get(drone_id)?
            .iter()
            .max_by_key(|p| p.start_time)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
