//! Zone & route registry — atomic snapshot swap over the directory.
//!
//! Readers take an `Arc` to the current snapshot and keep working against
//! it even while a refresh swaps in a new one; a detection pass never sees
//! a half-updated zone list. Refresh runs on an interval; an admin edit is
//! made visible immediately through `reload_from` (the airspace refresh
//! endpoint).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use utm_core::{AirspaceSnapshot, FlightPath, NoFlyZone};

use crate::db::AirspaceDirectory;

pub struct AirspaceRegistry {
    snapshot: RwLock<Arc<AirspaceSnapshot>>,
}

impl AirspaceRegistry {
    pub fn new() -> Self {
        AirspaceRegistry {
            snapshot: RwLock::new(Arc::new(AirspaceSnapshot::default())),
        }
    }

    /// O(1) handoff of the current immutable snapshot.
    pub fn snapshot(&self) -> Arc<AirspaceSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Build and atomically swap in a new snapshot. Safe to call while
    /// readers hold the old one.
    pub fn refresh(&self, zones: Vec<NoFlyZone>, paths: Vec<FlightPath>) {
        let next = Arc::new(AirspaceSnapshot::new(zones, paths));
        *self.snapshot.write().unwrap() = next;
    }

    /// Reload once from the directory. Keeps the previous snapshot on error.
    pub async fn reload_from(&self, directory: &dyn AirspaceDirectory) {
        let zones = match directory.active_zones().await {
            Ok(zones) => zones,
            Err(e) => {
                warn!(error = %e, "zone reload failed, keeping previous snapshot");
                return;
            }
        };
        let paths = match directory.active_paths().await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(error = %e, "path reload failed, keeping previous snapshot");
                return;
            }
        };
        debug!(zones = zones.len(), paths = paths.len(), "airspace snapshot refreshed");
        self.refresh(zones, paths);
    }

    /// Periodic refresh loop.
    pub async fn run(
        self: Arc<Self>,
        directory: Arc<dyn AirspaceDirectory>,
        interval: Duration,
    ) {
        loop {
            tokio::time::sleep(interval).await;
            self.reload_from(directory.as_ref()).await;
        }
    }
}

impl Default for AirspaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
