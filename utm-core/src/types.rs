//! Shared types and error enum for utm-core.

use chrono::{DateTime, Utc};
use geo::{LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// All errors produced by utm-core.
#[derive(Debug, Error)]
pub enum UtmError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),
    #[error("invalid telemetry: {0}")]
    InvalidTelemetry(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, UtmError>;

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// One timestamped position/status report from a drone.
///
/// Coordinates are WGS84 degrees, altitude is meters. Immutable once
/// constructed; a sample is owned for a single pipeline pass and dropped
/// after detection and broadcast unless the store keeps a row.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySample {
    pub drone_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TelemetrySample {
    pub fn position(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

// ---------------------------------------------------------------------------
// Airspace
// ---------------------------------------------------------------------------

/// A polygonal airspace region with optional altitude bounds that drones
/// must not enter while active. Replaced wholesale on registry refresh;
/// never mutated here.
#[derive(Debug, Clone)]
pub struct NoFlyZone {
    pub id: Uuid,
    pub name: String,
    pub boundary: Polygon<f64>,
    pub min_altitude_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub active: bool,
}

/// Lifecycle status of a flight path. Transitions are owned by flight
/// request management; the detector only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Pending,
    Approved,
    Rejected,
    InProgress,
    Completed,
    Cancelled,
}

impl FlightStatus {
    /// Only approved and in-progress paths participate in deviation checks.
    pub fn is_active(self) -> bool {
        matches!(self, FlightStatus::Approved | FlightStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlightStatus::Pending => "pending",
            FlightStatus::Approved => "approved",
            FlightStatus::Rejected => "rejected",
            FlightStatus::InProgress => "in_progress",
            FlightStatus::Completed => "completed",
            FlightStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for FlightStatus {
    type Err = UtmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(FlightStatus::Pending),
            "approved" => Ok(FlightStatus::Approved),
            "rejected" => Ok(FlightStatus::Rejected),
            "in_progress" => Ok(FlightStatus::InProgress),
            "completed" => Ok(FlightStatus::Completed),
            "cancelled" => Ok(FlightStatus::Cancelled),
            other => Err(UtmError::InvalidValue(format!(
                "unknown flight status: {other}"
            ))),
        }
    }
}

/// An approved linestring route with a validity window that a drone is
/// expected to follow.
#[derive(Debug, Clone)]
pub struct FlightPath {
    pub id: Uuid,
    pub drone_id: Uuid,
    pub route: LineString<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: FlightStatus,
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ZoneIncursion,
    AltitudeBreach,
    PathDeviation,
    UnauthorizedFlight,
    Other,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::ZoneIncursion => "zone_incursion",
            ViolationKind::AltitudeBreach => "altitude_breach",
            ViolationKind::PathDeviation => "path_deviation",
            ViolationKind::UnauthorizedFlight => "unauthorized_flight",
            ViolationKind::Other => "other",
        }
    }
}

impl std::str::FromStr for ViolationKind {
    type Err = UtmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zone_incursion" => Ok(ViolationKind::ZoneIncursion),
            "altitude_breach" => Ok(ViolationKind::AltitudeBreach),
            "path_deviation" => Ok(ViolationKind::PathDeviation),
            "unauthorized_flight" => Ok(ViolationKind::UnauthorizedFlight),
            "other" => Ok(ViolationKind::Other),
            other => Err(UtmError::InvalidValue(format!(
                "unknown violation kind: {other}"
            ))),
        }
    }
}

/// A recorded rule breach tied to a specific telemetry sample.
///
/// One record per detected condition per sample — a drone that stays inside
/// a zone across N samples produces N records.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub id: Uuid,
    pub drone_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_path_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<Uuid>,
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
