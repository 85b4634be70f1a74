//! Wire format for inbound telemetry and outbound feed events.
//!
//! Inbound payloads are free-form JSON from broker messages or socket
//! frames. They decode into `RawTelemetry` with explicit optional fields
//! and validate into a typed `TelemetrySample` before anything else in the
//! pipeline touches them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Result, TelemetrySample, UtmError, Violation};

/// GeoJSON-style position: `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLocation {
    pub coordinates: Vec<f64>,
}

/// Raw inbound telemetry payload.
///
/// `drone_id` may be omitted when the transport already identifies the
/// drone (broker topic, per-drone socket). A missing timestamp gets the
/// receipt time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTelemetry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drone_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<WireLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RawTelemetry {
    /// Validate and promote to a typed sample.
    ///
    /// `transport_drone_id` comes from the transport path (broker topic or
    /// socket route) and is used when the payload omits `drone_id`.
    pub fn into_sample(
        self,
        transport_drone_id: Option<Uuid>,
        received_at: DateTime<Utc>,
    ) -> Result<TelemetrySample> {
        let drone_id = self
            .drone_id
            .or(transport_drone_id)
            .ok_or_else(|| UtmError::InvalidTelemetry("missing drone_id".to_string()))?;

        let location = self
            .location
            .ok_or_else(|| UtmError::InvalidTelemetry("missing location".to_string()))?;
        if location.coordinates.len() < 2 {
            return Err(UtmError::InvalidTelemetry(
                "location.coordinates needs [longitude, latitude]".to_string(),
            ));
        }
        let longitude = location.coordinates[0];
        let latitude = location.coordinates[1];
        // NaN fails both range checks, so non-finite input is rejected too.
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(UtmError::InvalidTelemetry(format!(
                "latitude out of range: {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(UtmError::InvalidTelemetry(format!(
                "longitude out of range: {longitude}"
            )));
        }

        Ok(TelemetrySample {
            drone_id,
            timestamp: self.timestamp.unwrap_or(received_at),
            latitude,
            longitude,
            altitude_m: self.altitude.unwrap_or(0.0),
            speed_mps: self.speed,
            heading_deg: self.heading,
            battery_pct: self.battery_level,
            status: self.status,
        })
    }
}

// ---------------------------------------------------------------------------
// Feed events
// ---------------------------------------------------------------------------

/// Events fanned out to live subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Telemetry {
        drone_id: Uuid,
        data: TelemetrySample,
        timestamp: DateTime<Utc>,
    },
    Violation {
        drone_id: Uuid,
        data: Violation,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    pub fn telemetry(sample: TelemetrySample) -> Self {
        FeedEvent::Telemetry {
            drone_id: sample.drone_id,
            timestamp: sample.timestamp,
            data: sample,
        }
    }

    pub fn violation(violation: Violation) -> Self {
        FeedEvent::Violation {
            drone_id: violation.drone_id,
            timestamp: violation.timestamp,
            data: violation,
        }
    }

    pub fn drone_id(&self) -> Uuid {
        match self {
            FeedEvent::Telemetry { drone_id, .. } | FeedEvent::Violation { drone_id, .. } => {
                *drone_id
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn full_payload() -> &'static str {
        r#"{
            "drone_id": "7f8a1d76-3f00-4e2b-9c6a-2f9a4f6cde01",
            "timestamp": "2025-03-01T12:00:00Z",
            "location": {"coordinates": [71.4491, 51.1694]},
            "altitude": 85.5,
            "speed": 12.0,
            "heading": 270.0,
            "battery_level": 88.0,
            "status": "in_flight"
        }"#
    }

    #[test]
    fn test_full_payload_decodes() {
        let raw: RawTelemetry = serde_json::from_str(full_payload()).unwrap();
        let sample = raw.into_sample(None, Utc::now()).unwrap();
        assert_eq!(sample.longitude, 71.4491);
        assert_eq!(sample.latitude, 51.1694);
        assert_eq!(sample.altitude_m, 85.5);
        assert_eq!(sample.status.as_deref(), Some("in_flight"));
    }

    #[test]
    fn test_defaults_substituted() {
        let raw: RawTelemetry =
            serde_json::from_str(r#"{"location": {"coordinates": [10.0, 20.0]}}"#).unwrap();
        let drone = Uuid::new_v4();
        let received = Utc::now();
        let sample = raw.into_sample(Some(drone), received).unwrap();
        assert_eq!(sample.drone_id, drone);
        assert_eq!(sample.timestamp, received);
        assert_eq!(sample.altitude_m, 0.0);
        assert!(sample.speed_mps.is_none());
    }

    #[test]
    fn test_payload_drone_id_wins_over_transport() {
        let raw: RawTelemetry = serde_json::from_str(full_payload()).unwrap();
        let sample = raw.into_sample(Some(Uuid::new_v4()), Utc::now()).unwrap();
        assert_eq!(
            sample.drone_id.to_string(),
            "7f8a1d76-3f00-4e2b-9c6a-2f9a4f6cde01"
        );
    }

    #[test]
    fn test_missing_drone_id_rejected() {
        let raw: RawTelemetry =
            serde_json::from_str(r#"{"location": {"coordinates": [10.0, 20.0]}}"#).unwrap();
        assert!(raw.into_sample(None, Utc::now()).is_err());
    }

    #[test]
    fn test_missing_location_rejected() {
        let raw: RawTelemetry = serde_json::from_str(r#"{"altitude": 10.0}"#).unwrap();
        assert!(raw.into_sample(Some(Uuid::new_v4()), Utc::now()).is_err());
    }

    #[test]
    fn test_short_coordinates_rejected() {
        let raw: RawTelemetry =
            serde_json::from_str(r#"{"location": {"coordinates": [10.0]}}"#).unwrap();
        assert!(raw.into_sample(Some(Uuid::new_v4()), Utc::now()).is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let raw: RawTelemetry =
            serde_json::from_str(r#"{"location": {"coordinates": [10.0, 91.0]}}"#).unwrap();
        assert!(raw.into_sample(Some(Uuid::new_v4()), Utc::now()).is_err());

        let raw: RawTelemetry =
            serde_json::from_str(r#"{"location": {"coordinates": [-181.0, 10.0]}}"#).unwrap();
        assert!(raw.into_sample(Some(Uuid::new_v4()), Utc::now()).is_err());
    }

    #[test]
    fn test_feed_event_tagging() {
        let raw: RawTelemetry = serde_json::from_str(full_payload()).unwrap();
        let sample = raw.into_sample(None, Utc::now()).unwrap();
        let event = FeedEvent::telemetry(sample);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "telemetry");
        assert_eq!(json["data"]["altitude_m"], 85.5);
    }
}
