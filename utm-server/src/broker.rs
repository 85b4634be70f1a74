//! Broker-style telemetry transport.
//!
//! Raw messages arrive as (topic, payload) pairs on an mpsc channel from
//! whatever broker client the deployment wires up; the consumer spawns one
//! bounded task per message, so a slow sample never stalls the rest of the
//! stream. Topic pattern: `drones/{drone_id}/telemetry`.
//!
//! The same message shape is used by `utm serve --broker-stdin` and
//! `utm replay`, which read newline-delimited `<topic> <json>` lines.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use utm_core::RawTelemetry;

use crate::pipeline::IngestPipeline;

/// One raw message from the broker subscription.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: String,
}

/// Extract the drone id from a `drones/{drone_id}/telemetry` topic.
pub fn parse_topic(topic: &str) -> Option<Uuid> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("drones"), Some(id), Some("telemetry"), None) => id.parse().ok(),
        _ => None,
    }
}

/// Parse a `<topic> <json>` line from a stdin bridge or replay file.
pub fn parse_line(line: &str) -> Option<BrokerMessage> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (topic, payload) = line.split_once(char::is_whitespace)?;
    Some(BrokerMessage {
        topic: topic.to_string(),
        payload: payload.trim().to_string(),
    })
}

/// Drain the broker channel, handling each message as an independent task
/// bounded by `max_in_flight`. Returns once the channel closes and every
/// in-flight message has finished.
pub async fn consume(
    mut rx: mpsc::Receiver<BrokerMessage>,
    pipeline: Arc<IngestPipeline>,
    max_in_flight: usize,
) {
    let limiter = Arc::new(Semaphore::new(max_in_flight));
    let mut tasks = JoinSet::new();

    while let Some(message) = rx.recv().await {
        let Ok(permit) = limiter.clone().acquire_owned().await else {
            break;
        };
        let pipeline = pipeline.clone();
        tasks.spawn(async move {
            let _permit = permit;
            handle_message(message, &pipeline).await;
        });
        // Keep the set from accumulating finished handles.
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
}

async fn handle_message(message: BrokerMessage, pipeline: &IngestPipeline) {
    let Some(drone_id) = parse_topic(&message.topic) else {
        warn!(topic = %message.topic, "unroutable broker topic");
        return;
    };

    let raw: RawTelemetry = match serde_json::from_str(&message.payload) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(topic = %message.topic, error = %e, "undecodable broker payload");
            return;
        }
    };

    match pipeline.submit(raw, Some(drone_id)).await {
        Ok(outcome) => {
            debug!(
                drone_id = %outcome.sample.drone_id,
                violations = outcome.violations.len(),
                "broker sample processed"
            );
        }
        Err(e) => warn!(topic = %message.topic, error = %e, "broker sample rejected"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
