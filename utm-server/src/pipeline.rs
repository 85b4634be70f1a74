//! Ingestion pipeline: validate → detect → persist → broadcast.
//!
//! One `IngestPipeline` is built at startup and shared by every transport
//! (broker consumer, live sockets, direct REST submission). Each inbound
//! message is handled independently; there is no ordering or transactional
//! coupling between samples, even from the same drone.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use utm_core::{detect, FeedEvent, RawTelemetry, TelemetrySample, Violation};

use crate::db::{AirspaceDirectory, TelemetryStore};
use crate::hub::BroadcastHub;
use crate::registry::AirspaceRegistry;

/// Rejection reasons surfaced to transports. Persistence trouble is not
/// a rejection: a storage blip is logged and the event still reaches
/// live subscribers.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid telemetry: {0}")]
    InvalidInput(String),
    #[error("unknown drone: {0}")]
    UnknownDrone(Uuid),
}

/// What happened to one accepted sample.
#[derive(Debug)]
pub struct Outcome {
    pub sample: TelemetrySample,
    pub violations: Vec<Violation>,
    /// False when any durable write failed. Callers that need durability
    /// surface this; the pipeline itself never retries.
    pub persisted: bool,
}

pub struct IngestPipeline {
    directory: Arc<dyn AirspaceDirectory>,
    store: Arc<dyn TelemetryStore>,
    registry: Arc<AirspaceRegistry>,
    hub: Arc<BroadcastHub>,
    deviation_buffer_deg: f64,
}

impl IngestPipeline {
    pub fn new(
        directory: Arc<dyn AirspaceDirectory>,
        store: Arc<dyn TelemetryStore>,
        registry: Arc<AirspaceRegistry>,
        hub: Arc<BroadcastHub>,
        deviation_buffer_deg: f64,
    ) -> Self {
        IngestPipeline {
            directory,
            store,
            registry,
            hub,
            deviation_buffer_deg,
        }
    }

    pub fn directory(&self) -> &Arc<dyn AirspaceDirectory> {
        &self.directory
    }

    pub fn registry(&self) -> &Arc<AirspaceRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Process one inbound telemetry message end to end.
    ///
    /// `transport_drone_id` identifies the drone when the transport path
    /// already names it (broker topic, per-drone socket). A rejected
    /// message has no side effects at all: no rows, no broadcast.
    pub async fn submit(
        &self,
        raw: RawTelemetry,
        transport_drone_id: Option<Uuid>,
    ) -> Result<Outcome, IngestError> {
        let sample = raw
            .into_sample(transport_drone_id, Utc::now())
            .map_err(|e| IngestError::InvalidInput(e.to_string()))?;

        if self.directory.resolve_drone(sample.drone_id).await.is_none() {
            return Err(IngestError::UnknownDrone(sample.drone_id));
        }

        let snapshot = self.registry.snapshot();
        let violations = detect(&sample, &snapshot, self.deviation_buffer_deg);
        if !violations.is_empty() {
            debug!(
                drone_id = %sample.drone_id,
                count = violations.len(),
                "violations detected"
            );
        }

        let mut persisted = true;
        if let Err(e) = self.store.save_telemetry(&sample).await {
            warn!(drone_id = %sample.drone_id, error = %e, "telemetry write failed");
            persisted = false;
        }
        for violation in &violations {
            if let Err(e) = self.store.save_violation(violation).await {
                warn!(violation_id = %violation.id, error = %e, "violation write failed");
                persisted = false;
            }
        }

        // Broadcast proceeds even when the writes above failed.
        self.hub
            .publish(sample.drone_id, &FeedEvent::telemetry(sample.clone()));
        for violation in &violations {
            self.hub
                .publish(violation.drone_id, &FeedEvent::violation(violation.clone()));
        }

        Ok(Outcome {
            sample,
            violations,
            persisted,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
