//! REST handlers: telemetry submission, pre-flight route checks, airspace
//! refresh, health and stats.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use geo::LineString;
use serde::Deserialize;
use serde_json::{json, Value};

use utm_core::{geometry, RawTelemetry};

use crate::access::{bearer_token, scope_allows, Principal};
use crate::pipeline::IngestError;
use crate::web::AppState;

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let token = bearer_token(headers.get("authorization").and_then(|v| v.to_str().ok()))?;
    state.access.authenticate(token).await
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "invalid or missing bearer token"})),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/health
pub async fn api_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "utm-server",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /api/v1/stats — table counts.
pub async fn api_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db = state.db.clone();
    let stats = tokio::task::spawn_blocking(move || db.stats()).await;
    match stats {
        Ok(stats) => Json(json!({
            "users": stats.users,
            "drones": stats.drones,
            "zones": stats.zones,
            "flight_paths": stats.flight_paths,
            "telemetry": stats.telemetry,
            "violations": stats.violations,
        })),
        Err(_) => Json(json!({"error": "stats unavailable"})),
    }
}

/// POST /api/v1/telemetry — direct submission path. Returns the violation
/// list for the accepted sample.
pub async fn api_submit_telemetry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(raw): Json<RawTelemetry>,
) -> (StatusCode, Json<Value>) {
    let Some(principal) = authenticate(&state, &headers).await else {
        return unauthorized();
    };

    if let Some(drone_id) = raw.drone_id {
        let scope = state.access.drone_scope(&principal).await;
        if !scope_allows(&scope, &drone_id) {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "drone not visible to this user"})),
            );
        }
    }

    match state.pipeline.submit(raw, None).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Telemetry data received",
                "persisted": outcome.persisted,
                "violations": outcome.violations,
            })),
        ),
        Err(IngestError::InvalidInput(message)) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
        }
        Err(IngestError::UnknownDrone(id)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("drone not found: {id}")})),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct RouteCheckRequest {
    /// `[[longitude, latitude], ...]`
    pub coordinates: Vec<[f64; 2]>,
}

/// POST /api/v1/routes/check — does a proposed route cross any active
/// no-fly zone?
pub async fn api_check_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RouteCheckRequest>,
) -> (StatusCode, Json<Value>) {
    if authenticate(&state, &headers).await.is_none() {
        return unauthorized();
    }

    if body.coordinates.len() < 2 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "route needs at least 2 points"})),
        );
    }
    let points: Vec<(f64, f64)> = body.coordinates.iter().map(|c| (c[0], c[1])).collect();
    let route = LineString::from(points);

    let snapshot = state.pipeline.registry().snapshot();
    let mut conflicts = Vec::new();
    for zone in snapshot.active_zones() {
        // A zone with degenerate geometry is skipped, same as in detection.
        if let Ok(true) = geometry::route_crosses_zone(&route, &zone.boundary) {
            conflicts.push(json!({
                "zone_id": zone.id,
                "zone_name": zone.name,
            }));
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "is_valid": conflicts.is_empty(),
            "conflicts": conflicts,
        })),
    )
}

/// POST /api/v1/airspace/refresh — admin-only immediate registry reload,
/// for use right after editing zones or paths.
pub async fn api_refresh_airspace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let Some(principal) = authenticate(&state, &headers).await else {
        return unauthorized();
    };
    if !principal.is_admin {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "admin required"})),
        );
    }

    let registry = state.pipeline.registry();
    registry
        .reload_from(state.pipeline.directory().as_ref())
        .await;
    let snapshot = registry.snapshot();

    (
        StatusCode::OK,
        Json(json!({
            "status": "refreshed",
            "zones": snapshot.zones().len(),
        })),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::hub::BroadcastHub;
    use crate::pipeline::IngestPipeline;
    use crate::registry::AirspaceRegistry;
    use crate::web::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Duration;
    use geo::polygon;
    use tower::ServiceExt;
    use utm_core::{FlightPath, FlightStatus, NoFlyZone};
    use uuid::Uuid;

    const ADMIN_TOKEN: &str = "admin-token";
    const PILOT_TOKEN: &str = "pilot-token";

    struct TestEnv {
        db: Db,
        state: Arc<AppState>,
        drone_id: Uuid,
    }

    async fn test_env() -> TestEnv {
        let db = Db::open_memory().unwrap();

        let admin = Uuid::new_v4();
        let pilot = Uuid::new_v4();
        let drone_id = Uuid::new_v4();
        db.insert_user(admin, "ops", ADMIN_TOKEN, true).unwrap();
        db.insert_user(pilot, "pilot", PILOT_TOKEN, false).unwrap();
        db.insert_drone(drone_id, pilot, Some("M350"), None).unwrap();

        db.insert_zone(&NoFlyZone {
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
            active: true,
        })
        .unwrap();
        // Approved corridor well clear of the zone, so on-route samples
        // outside the zone are clean.
        db.insert_flight_path(&FlightPath {
            id: Uuid::new_v4(),
            drone_id,
            route: LineString::from(vec![(2.0, 2.0), (3.0, 3.0)]),
            start_time: Utc::now() - Duration::minutes(5),
            end_time: Utc::now() + Duration::hours(1),
            status: FlightStatus::Approved,
        })
        .unwrap();

        let registry = Arc::new(AirspaceRegistry::new());
        registry.reload_from(&db.clone()).await;

        let pipeline = Arc::new(IngestPipeline::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            registry,
            Arc::new(BroadcastHub::new()),
            0.01,
        ));
        let state = Arc::new(AppState {
            pipeline,
            access: Arc::new(db.clone()),
            db: db.clone(),
        });
        TestEnv {
            db,
            state,
            drone_id,
        }
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn telemetry_body(drone_id: Uuid, lon: f64, lat: f64, altitude: f64) -> Value {
        json!({
            "drone_id": drone_id,
            "location": {"coordinates": [lon, lat]},
            "altitude": altitude,
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health() {
        let env = test_env().await;
        let app = build_router(env.state);
        let response = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_requires_token() {
        let env = test_env().await;
        let app = build_router(env.state);
        let response = app
            .oneshot(post(
                "/api/v1/telemetry",
                None,
                telemetry_body(env.drone_id, 0.5, 0.5, 50.0),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(env.db.count("telemetry"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_in_zone_reports_violation() {
        let env = test_env().await;
        let app = build_router(env.state.clone());
        let response = app
            .oneshot(post(
                "/api/v1/telemetry",
                Some(PILOT_TOKEN),
                telemetry_body(env.drone_id, 0.5, 0.5, 150.0),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        let violations = body["violations"].as_array().unwrap();
        // Inside the zone (with an altitude note) and off the approved
        // corridor at the same time.
        assert_eq!(violations.len(), 2);
        let incursion = violations
            .iter()
            .find(|v| v["kind"] == "zone_incursion")
            .unwrap();
        assert!(incursion["description"].as_str().unwrap().contains("altitude"));
        assert!(violations.iter().any(|v| v["kind"] == "path_deviation"));
        assert_eq!(env.db.count("telemetry"), 1);
        assert_eq!(env.db.count("violations"), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_clean_flight() {
        let env = test_env().await;
        let app = build_router(env.state);
        // Outside the zone and within the corridor.
        let response = app
            .oneshot(post(
                "/api/v1/telemetry",
                Some(PILOT_TOKEN),
                telemetry_body(env.drone_id, 2.5, 2.50005, 50.0),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert!(body["violations"].as_array().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_foreign_drone_forbidden() {
        let env = test_env().await;
        let app = build_router(env.state);
        let response = app
            .oneshot(post(
                "/api/v1/telemetry",
                Some(PILOT_TOKEN),
                telemetry_body(Uuid::new_v4(), 0.5, 0.5, 50.0),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_unknown_drone_not_found() {
        let env = test_env().await;
        let app = build_router(env.state);
        // Admin scope passes the visibility check; the directory rejects.
        let response = app
            .oneshot(post(
                "/api/v1/telemetry",
                Some(ADMIN_TOKEN),
                telemetry_body(Uuid::new_v4(), 0.5, 0.5, 50.0),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(env.db.count("telemetry"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_out_of_range_rejected() {
        let env = test_env().await;
        let app = build_router(env.state);
        let response = app
            .oneshot(post(
                "/api/v1/telemetry",
                Some(ADMIN_TOKEN),
                telemetry_body(env.drone_id, 0.5, 91.0, 50.0),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_check_route_flags_zone_crossing() {
        let env = test_env().await;
        let app = build_router(env.state.clone());
        let response = app
            .oneshot(post(
                "/api/v1/routes/check",
                Some(PILOT_TOKEN),
                json!({"coordinates": [[-1.0, 0.5], [2.0, 0.5]]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["is_valid"], false);
        assert_eq!(body["conflicts"][0]["zone_name"], "Airport");

        let app = build_router(env.state);
        let response = app
            .oneshot(post(
                "/api/v1/routes/check",
                Some(PILOT_TOKEN),
                json!({"coordinates": [[-1.0, 2.0], [2.0, 2.0]]}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["is_valid"], true);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_check_route_too_short() {
        let env = test_env().await;
        let app = build_router(env.state);
        let response = app
            .oneshot(post(
                "/api/v1/routes/check",
                Some(PILOT_TOKEN),
                json!({"coordinates": [[0.0, 0.0]]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_airspace_refresh_admin_only() {
        let env = test_env().await;

        let app = build_router(env.state.clone());
        let response = app
            .oneshot(post("/api/v1/airspace/refresh", Some(PILOT_TOKEN), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Add a zone behind the registry's back, then refresh as admin.
        env.db
            .insert_zone(&NoFlyZone {
                id: Uuid::new_v4(),
                name: "Stadium".to_string(),
                boundary: polygon![
                    (x: 10.0, y: 10.0),
                    (x: 10.0, y: 11.0),
                    (x: 11.0, y: 11.0),
                    (x: 11.0, y: 10.0),
                    (x: 10.0, y: 10.0),
                ],
                min_altitude_m: None,
                max_altitude_m: None,
                active: true,
            })
            .unwrap();

        let app = build_router(env.state.clone());
        let response = app
            .oneshot(post("/api/v1/airspace/refresh", Some(ADMIN_TOKEN), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["zones"], 2);
        assert_eq!(env.state.pipeline.registry().snapshot().zones().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stats_counts() {
        let env = test_env().await;
        let app = build_router(env.state);
        let response = app
            .oneshot(Request::builder().uri("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["users"], 2);
        assert_eq!(body["drones"], 1);
        assert_eq!(body["zones"], 1);
    }
}
