//! SQLite persistence — WAL mode, 6 tables, indexed queries.
//!
//! Schema: users, drones, zones, flight_paths, telemetry, violations.
//! Zone boundaries and path routes are stored as JSON coordinate arrays
//! (`[[lon, lat], ...]`, WGS84). The rest of the server only talks to this
//! module through the collaborator traits below, so tests can substitute
//! in-memory fakes.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo::{LineString, Polygon};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use utm_core::{FlightPath, FlightStatus, NoFlyZone, TelemetrySample, Violation};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    api_token TEXT UNIQUE NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drones (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id),
    model TEXT,
    serial_number TEXT UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS zones (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    boundary TEXT NOT NULL,
    min_altitude_m REAL,
    max_altitude_m REAL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS flight_paths (
    id TEXT PRIMARY KEY,
    drone_id TEXT NOT NULL REFERENCES drones(id),
    route TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS telemetry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    drone_id TEXT NOT NULL REFERENCES drones(id),
    timestamp TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    altitude_m REAL NOT NULL,
    speed_mps REAL,
    heading_deg REAL,
    battery_pct REAL,
    status TEXT
);

CREATE TABLE IF NOT EXISTS violations (
    id TEXT PRIMARY KEY,
    drone_id TEXT NOT NULL REFERENCES drones(id),
    flight_path_id TEXT,
    zone_id TEXT,
    kind TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_telemetry_drone ON telemetry(drone_id);
CREATE INDEX IF NOT EXISTS idx_telemetry_timestamp ON telemetry(timestamp);
CREATE INDEX IF NOT EXISTS idx_violations_drone ON violations(drone_id);
CREATE INDEX IF NOT EXISTS idx_violations_kind ON violations(kind);
CREATE INDEX IF NOT EXISTS idx_paths_drone_status ON flight_paths(drone_id, status);
"#;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt stored row: {0}")]
    Corrupt(String),
    #[error("background task failed: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// Collaborator traits — the pipeline and registry only see these
// ---------------------------------------------------------------------------

/// Registered drone with its owning user.
#[derive(Debug, Clone)]
pub struct DroneRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

/// Durable-write seam used by the ingest pipeline. No internal retries:
/// a failed write is reported once and the caller decides.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn save_telemetry(&self, sample: &TelemetrySample) -> Result<(), StoreError>;
    async fn save_violation(&self, violation: &Violation) -> Result<(), StoreError>;
}

/// Read seam for drones, zones and flight paths.
#[async_trait]
pub trait AirspaceDirectory: Send + Sync {
    /// Lookup failures are logged inside the implementation and reported as
    /// "not found" — an unresolvable drone is rejected either way.
    async fn resolve_drone(&self, id: Uuid) -> Option<DroneRecord>;
    async fn active_zones(&self) -> Result<Vec<NoFlyZone>, StoreError>;
    async fn active_paths(&self) -> Result<Vec<FlightPath>, StoreError>;
}

// ---------------------------------------------------------------------------
// Database handle
// ---------------------------------------------------------------------------

/// SQLite database for airspace and telemetry data. Cheap to clone; all
/// clones share one connection behind a mutex, and the async trait impls
/// run statements on the blocking pool.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            Connection::open(path)?
        };

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    // -----------------------------------------------------------------------
    // Users & drones
    // -----------------------------------------------------------------------

    pub fn insert_user(
        &self,
        id: Uuid,
        name: &str,
        token: &str,
        is_admin: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, name, api_token, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                name,
                token,
                is_admin as i32,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn insert_drone(
        &self,
        id: Uuid,
        owner_id: Uuid,
        model: Option<&str>,
        serial_number: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO drones (id, owner_id, model, serial_number, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                owner_id.to_string(),
                model,
                serial_number,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn find_user_by_token(&self, token: &str) -> Option<UserRow> {
        let conn = self.conn.lock().unwrap();
        let (id, name, is_admin) = conn
            .query_row(
                "SELECT id, name, is_admin FROM users WHERE api_token = ?1",
                params![token],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i32>(2)?,
                    ))
                },
            )
            .optional()
            .ok()
            .flatten()?;

        Some(UserRow {
            id: id.parse().ok()?,
            name,
            is_admin: is_admin != 0,
        })
    }

    pub fn drone_record(&self, id: Uuid) -> Result<Option<DroneRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, owner_id, model, serial_number FROM drones WHERE id = ?1",
                params![id.to_string()],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, owner_id, model, serial_number)) => Ok(Some(DroneRecord {
                id: parse_uuid(&id)?,
                owner_id: parse_uuid(&owner_id)?,
                model,
                serial_number,
            })),
            None => Ok(None),
        }
    }

    pub fn owned_drone_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM drones WHERE owner_id = ?1")?;
        let rows = stmt.query_map(params![owner_id.to_string()], |r| r.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(parse_uuid(&row?)?);
        }
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Zones & flight paths
    // -----------------------------------------------------------------------

    pub fn insert_zone(&self, zone: &NoFlyZone) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO zones (id, name, boundary, min_altitude_m, max_altitude_m, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                zone.id.to_string(),
                zone.name,
                polygon_to_json(&zone.boundary),
                zone.min_altitude_m,
                zone.max_altitude_m,
                zone.active as i32,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn insert_flight_path(&self, path: &FlightPath) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO flight_paths (id, drone_id, route, start_time, end_time, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                path.id.to_string(),
                path.drone_id.to_string(),
                line_to_json(&path.route),
                path.start_time.to_rfc3339(),
                path.end_time.to_rfc3339(),
                path.status.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn load_active_zones(&self) -> Result<Vec<NoFlyZone>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, boundary, min_altitude_m, max_altitude_m, active
             FROM zones WHERE active = 1",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<f64>>(3)?,
                r.get::<_, Option<f64>>(4)?,
                r.get::<_, i32>(5)?,
            ))
        })?;

        let mut zones = Vec::new();
        for row in rows {
            let (id, name, boundary, min_alt, max_alt, active) = row?;
            zones.push(NoFlyZone {
                id: parse_uuid(&id)?,
                name,
                boundary: polygon_from_json(&boundary)?,
                min_altitude_m: min_alt,
                max_altitude_m: max_alt,
                active: active != 0,
            });
        }
        Ok(zones)
    }

    /// Approved and in-progress paths, all drones.
    pub fn load_active_paths(&self) -> Result<Vec<FlightPath>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, drone_id, route, start_time, end_time, status
             FROM flight_paths WHERE status IN ('approved', 'in_progress')",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?;

        let mut paths = Vec::new();
        for row in rows {
            let (id, drone_id, route, start, end, status) = row?;
            paths.push(FlightPath {
                id: parse_uuid(&id)?,
                drone_id: parse_uuid(&drone_id)?,
                route: line_from_json(&route)?,
                start_time: parse_time(&start)?,
                end_time: parse_time(&end)?,
                status: status
                    .parse::<FlightStatus>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            });
        }
        Ok(paths)
    }

    // -----------------------------------------------------------------------
    // Telemetry & violations
    // -----------------------------------------------------------------------

    pub fn insert_telemetry(&self, sample: &TelemetrySample) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO telemetry (drone_id, timestamp, latitude, longitude, altitude_m,
                                    speed_mps, heading_deg, battery_pct, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                sample.drone_id.to_string(),
                sample.timestamp.to_rfc3339(),
                sample.latitude,
                sample.longitude,
                sample.altitude_m,
                sample.speed_mps,
                sample.heading_deg,
                sample.battery_pct,
                sample.status
            ],
        )?;
        Ok(())
    }

    pub fn insert_violation(&self, violation: &Violation) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO violations (id, drone_id, flight_path_id, zone_id, kind, timestamp,
                                     latitude, longitude, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                violation.id.to_string(),
                violation.drone_id.to_string(),
                violation.flight_path_id.map(|id| id.to_string()),
                violation.zone_id.map(|id| id.to_string()),
                violation.kind.as_str(),
                violation.timestamp.to_rfc3339(),
                violation.latitude,
                violation.longitude,
                violation.description
            ],
        )?;
        Ok(())
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            users: self.count("users"),
            drones: self.count("drones"),
            zones: self.count("zones"),
            flight_paths: self.count("flight_paths"),
            telemetry: self.count("telemetry"),
            violations: self.count("violations"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub is_admin: bool,
}

#[derive(Debug)]
pub struct DbStats {
    pub users: i64,
    pub drones: i64,
    pub zones: i64,
    pub flight_paths: i64,
    pub telemetry: i64,
    pub violations: i64,
}

// ---------------------------------------------------------------------------
// Async trait impls — statements run on the blocking pool
// ---------------------------------------------------------------------------

#[async_trait]
impl TelemetryStore for Db {
    async fn save_telemetry(&self, sample: &TelemetrySample) -> Result<(), StoreError> {
        let db = self.clone();
        let sample = sample.clone();
        tokio::task::spawn_blocking(move || db.insert_telemetry(&sample))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn save_violation(&self, violation: &Violation) -> Result<(), StoreError> {
        let db = self.clone();
        let violation = violation.clone();
        tokio::task::spawn_blocking(move || db.insert_violation(&violation))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl AirspaceDirectory for Db {
    async fn resolve_drone(&self, id: Uuid) -> Option<DroneRecord> {
        let db = self.clone();
        match tokio::task::spawn_blocking(move || db.drone_record(id)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                tracing::warn!(drone_id = %id, error = %e, "drone lookup failed");
                None
            }
            Err(e) => {
                tracing::warn!(drone_id = %id, error = %e, "drone lookup task failed");
                None
            }
        }
    }

    async fn active_zones(&self) -> Result<Vec<NoFlyZone>, StoreError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.load_active_zones())
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn active_paths(&self) -> Result<Vec<FlightPath>, StoreError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.load_active_paths())
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Geometry codecs
// ---------------------------------------------------------------------------

fn polygon_to_json(polygon: &Polygon<f64>) -> String {
    let coords: Vec<[f64; 2]> = polygon.exterior().0.iter().map(|c| [c.x, c.y]).collect();
    serde_json::to_string(&coords).expect("coordinate array serializes")
}

fn polygon_from_json(text: &str) -> Result<Polygon<f64>, StoreError> {
    let coords: Vec<[f64; 2]> =
        serde_json::from_str(text).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let ring: Vec<(f64, f64)> = coords.iter().map(|c| (c[0], c[1])).collect();
    Ok(Polygon::new(LineString::from(ring), Vec::new()))
}

fn line_to_json(line: &LineString<f64>) -> String {
    let coords: Vec<[f64; 2]> = line.0.iter().map(|c| [c.x, c.y]).collect();
    serde_json::to_string(&coords).expect("coordinate array serializes")
}

fn line_from_json(text: &str) -> Result<LineString<f64>, StoreError> {
    let coords: Vec<[f64; 2]> =
        serde_json::from_str(text).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let points: Vec<(f64, f64)> = coords.iter().map(|c| (c[0], c[1])).collect();
    Ok(LineString::from(points))
}

fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    text.parse::<Uuid>()
        .map_err(|e| StoreError::Corrupt(format!("bad uuid {text}: {e}")))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {text}: {e}")))
}

// ---------------------------------------------------------------------------
// Seed fixtures
// ---------------------------------------------------------------------------

/// JSON fixtures loaded by `utm seed`: users, drones, zones, and paths in
/// one file. All ids are explicit.
#[derive(Debug, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub users: Vec<UserFixture>,
    #[serde(default)]
    pub drones: Vec<DroneFixture>,
    #[serde(default)]
    pub zones: Vec<ZoneFixture>,
    #[serde(default)]
    pub paths: Vec<PathFixture>,
}

#[derive(Debug, Deserialize)]
pub struct UserFixture {
    pub id: Uuid,
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct DroneFixture {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneFixture {
    pub id: Uuid,
    pub name: String,
    pub boundary: Vec<[f64; 2]>,
    #[serde(default)]
    pub min_altitude_m: Option<f64>,
    #[serde(default)]
    pub max_altitude_m: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct PathFixture {
    pub id: Uuid,
    pub drone_id: Uuid,
    pub route: Vec<[f64; 2]>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: FlightStatus,
}

fn default_true() -> bool {
    true
}

impl Db {
    /// Load a fixtures file into the database. Returns (users, drones,
    /// zones, paths) inserted.
    pub fn apply_fixtures(&self, fixtures: &Fixtures) -> Result<(usize, usize, usize, usize), StoreError> {
        for user in &fixtures.users {
            self.insert_user(user.id, &user.name, &user.token, user.is_admin)?;
        }
        for drone in &fixtures.drones {
            self.insert_drone(
                drone.id,
                drone.owner_id,
                drone.model.as_deref(),
                drone.serial_number.as_deref(),
            )?;
        }
        for zone in &fixtures.zones {
            let ring: Vec<(f64, f64)> = zone.boundary.iter().map(|c| (c[0], c[1])).collect();
            self.insert_zone(&NoFlyZone {
                id: zone.id,
                name: zone.name.clone(),
                boundary: Polygon::new(LineString::from(ring), Vec::new()),
                min_altitude_m: zone.min_altitude_m,
                max_altitude_m: zone.max_altitude_m,
                active: zone.active,
            })?;
        }
        for path in &fixtures.paths {
            let points: Vec<(f64, f64)> = path.route.iter().map(|c| (c[0], c[1])).collect();
            self.insert_flight_path(&FlightPath {
                id: path.id,
                drone_id: path.drone_id,
                route: LineString::from(points),
                start_time: path.start_time,
                end_time: path.end_time,
                status: path.status,
            })?;
        }
        Ok((
            fixtures.users.len(),
            fixtures.drones.len(),
            fixtures.zones.len(),
            fixtures.paths.len(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn test_db() -> Db {
        Db::open_memory().unwrap()
    }

    fn seed_owner(db: &Db) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let drone_id = Uuid::new_v4();
        db.insert_user(user_id, "pilot", "token-1", false).unwrap();
        db.insert_drone(drone_id, user_id, Some("M350"), Some("SN-001"))
            .unwrap();
        (user_id, drone_id)
    }

    fn square_zone(active: bool) -> NoFlyZone {
        NoFlyZone {
            id: Uuid::new_v4(),
            name: "Airport".to_string(),
            boundary: polygon![
                (x: 0.0, y: 0.0),
                (x: 0.0, y: 1.0),
                (x: 1.0, y: 1.0),
                (x: 1.0, y: 0.0),
                (x: 0.0, y: 0.0),
            ],
            min_altitude_m: Some(0.0),
            max_altitude_m: Some(120.0),
            active,
        }
    }

    #[test]
    fn test_open_memory() {
        let db = test_db();
        assert_eq!(db.count("telemetry"), 0);
    }

    #[test]
    fn test_open_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utm.db");
        let db = Db::open(path.to_str().unwrap()).unwrap();
        assert_eq!(db.count("zones"), 0);
    }

    #[test]
    fn test_user_token_lookup() {
        let db = test_db();
        let (user_id, _) = seed_owner(&db);

        let row = db.find_user_by_token("token-1").unwrap();
        assert_eq!(row.id, user_id);
        assert!(!row.is_admin);
        assert!(db.find_user_by_token("nope").is_none());
    }

    #[test]
    fn test_drone_record_roundtrip() {
        let db = test_db();
        let (user_id, drone_id) = seed_owner(&db);

        let record = db.drone_record(drone_id).unwrap().unwrap();
        assert_eq!(record.owner_id, user_id);
        assert_eq!(record.model.as_deref(), Some("M350"));
        assert!(db.drone_record(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_owned_drone_ids() {
        let db = test_db();
        let (user_id, drone_id) = seed_owner(&db);
        let second = Uuid::new_v4();
        db.insert_drone(second, user_id, None, None).unwrap();

        let mut ids = db.owned_drone_ids(user_id).unwrap();
        ids.sort();
        let mut expected = vec![drone_id, second];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_zone_geometry_roundtrip() {
        let db = test_db();
        let zone = square_zone(true);
        let zone_id = zone.id;
        db.insert_zone(&zone).unwrap();

        let zones = db.load_active_zones().unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, zone_id);
        assert_eq!(zones[0].boundary.exterior().0.len(), 5);
        assert_eq!(zones[0].max_altitude_m, Some(120.0));
    }

    #[test]
    fn test_inactive_zones_not_loaded() {
        let db = test_db();
        db.insert_zone(&square_zone(false)).unwrap();
        assert!(db.load_active_zones().unwrap().is_empty());
        assert_eq!(db.count("zones"), 1);
    }

    #[test]
    fn test_only_active_paths_loaded() {
        let db = test_db();
        let (_, drone_id) = seed_owner(&db);
        let now = Utc::now();

        for status in [
            FlightStatus::Approved,
            FlightStatus::InProgress,
            FlightStatus::Pending,
            FlightStatus::Completed,
        ] {
            db.insert_flight_path(&FlightPath {
                id: Uuid::new_v4(),
                drone_id,
                route: LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
                start_time: now,
                end_time: now,
                status,
            })
            .unwrap();
        }

        let paths = db.load_active_paths().unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.status.is_active()));
        assert_eq!(paths[0].route.0.len(), 2);
    }

    #[tokio::test]
    async fn test_async_store_seam() {
        let db = test_db();
        let (_, drone_id) = seed_owner(&db);

        let sample = TelemetrySample {
            drone_id,
            timestamp: Utc::now(),
            latitude: 51.16,
            longitude: 71.44,
            altitude_m: 40.0,
            speed_mps: Some(5.0),
            heading_deg: None,
            battery_pct: Some(90.0),
            status: None,
        };
        db.save_telemetry(&sample).await.unwrap();
        assert_eq!(db.count("telemetry"), 1);

        let violation = Violation {
            id: Uuid::new_v4(),
            drone_id,
            flight_path_id: None,
            zone_id: None,
            kind: utm_core::ViolationKind::ZoneIncursion,
            timestamp: Utc::now(),
            latitude: 51.16,
            longitude: 71.44,
            description: "Drone entered no-fly zone: Airport".to_string(),
        };
        db.save_violation(&violation).await.unwrap();
        assert_eq!(db.count("violations"), 1);
    }

    #[tokio::test]
    async fn test_resolve_drone_seam() {
        let db = test_db();
        let (_, drone_id) = seed_owner(&db);
        assert!(db.resolve_drone(drone_id).await.is_some());
        assert!(db.resolve_drone(Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn test_apply_fixtures() {
        let db = test_db();
        let fixtures: Fixtures = serde_json::from_str(
            r#"{
                "users": [{"id": "0b7f4a3e-1111-4e2b-9c6a-2f9a4f6cde01",
                           "name": "ops", "token": "ops-token", "is_admin": true}],
                "drones": [{"id": "0b7f4a3e-2222-4e2b-9c6a-2f9a4f6cde01",
                            "owner_id": "0b7f4a3e-1111-4e2b-9c6a-2f9a4f6cde01"}],
                "zones": [{"id": "0b7f4a3e-3333-4e2b-9c6a-2f9a4f6cde01",
                           "name": "Airport",
                           "boundary": [[0,0],[0,1],[1,1],[1,0],[0,0]],
                           "max_altitude_m": 120.0}],
                "paths": [{"id": "0b7f4a3e-4444-4e2b-9c6a-2f9a4f6cde01",
                           "drone_id": "0b7f4a3e-2222-4e2b-9c6a-2f9a4f6cde01",
                           "route": [[0,0],[1,1]],
                           "start_time": "2025-03-01T12:00:00Z",
                           "end_time": "2025-03-01T13:00:00Z",
                           "status": "approved"}]
            }"#,
        )
        .unwrap();

        let (users, drones, zones, paths) = db.apply_fixtures(&fixtures).unwrap();
        assert_eq!((users, drones, zones, paths), (1, 1, 1, 1));
        assert_eq!(db.load_active_zones().unwrap().len(), 1);
        assert_eq!(db.load_active_paths().unwrap().len(), 1);
        assert!(db.find_user_by_token("ops-token").unwrap().is_admin);
    }
}
