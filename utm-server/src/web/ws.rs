//! WebSocket transports: the live subscriber feed and per-drone ingest
//! sockets.
//!
//! Authentication happens before the upgrade (`?token=` query parameter,
//! as socket clients cannot always set headers). A subscriber that
//! disconnects is removed from the hub immediately; a send failure mid-
//! session does the same through hub reaping.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use utm_core::RawTelemetry;

use crate::access::{scope_allows, Principal};
use crate::hub::DroneScope;
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct WsAuth {
    token: Option<String>,
}

async fn ws_principal(state: &AppState, auth: &WsAuth) -> Option<Principal> {
    let token = auth.token.as_deref()?;
    state.access.authenticate(token).await
}

// ---------------------------------------------------------------------------
// Subscriber feed
// ---------------------------------------------------------------------------

/// GET /ws/feed?token=... — live telemetry and violation events for every
/// drone the caller may observe.
pub async fn feed_ws(
    State(state): State<Arc<AppState>>,
    Query(auth): Query<WsAuth>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(principal) = ws_principal(&state, &auth).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let scope = state.access.drone_scope(&principal).await;
    info!(user = %principal.name, "feed subscriber connecting");
    ws.on_upgrade(move |socket| feed_session(state, socket, scope))
}

async fn feed_session(state: Arc<AppState>, socket: WebSocket, scope: DroneScope) {
    let hub = state.pipeline.hub().clone();
    let (subscriber_id, mut events) = hub.subscribe(&scope);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = answer_command(&text) {
                            if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    hub.unsubscribe(subscriber_id);
    debug!(subscriber = subscriber_id, "feed subscriber disconnected");
}

/// Keep-alive commands from feed clients; only `ping` is understood.
fn answer_command(text: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("command")?.as_str()? == "ping" {
        return Some(json!({
            "type": "pong",
            "timestamp": Utc::now().to_rfc3339(),
        }));
    }
    None
}

// ---------------------------------------------------------------------------
// Per-drone ingest socket
// ---------------------------------------------------------------------------

/// GET /ws/drones/:drone_id?token=... — a drone (or its operator) streams
/// telemetry frames and receives per-frame violation results.
pub async fn drone_ws(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<Uuid>,
    Query(auth): Query<WsAuth>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(principal) = ws_principal(&state, &auth).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let scope = state.access.drone_scope(&principal).await;
    if !scope_allows(&scope, &drone_id) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if state.pipeline.directory().resolve_drone(drone_id).await.is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    info!(user = %principal.name, %drone_id, "ingest socket connecting");
    ws.on_upgrade(move |socket| ingest_session(state, socket, drone_id))
}

async fn ingest_session(state: Arc<AppState>, mut socket: WebSocket, drone_id: Uuid) {
    while let Some(incoming) = socket.recv().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<RawTelemetry>(&text) {
            Ok(raw) => match state.pipeline.submit(raw, Some(drone_id)).await {
                Ok(outcome) => json!({
                    "status": "ok",
                    "violations": outcome.violations,
                }),
                Err(e) => json!({
                    "status": "error",
                    "message": e.to_string(),
                }),
            },
            Err(e) => json!({
                "status": "error",
                "message": format!("invalid telemetry frame: {e}"),
            }),
        };

        if socket.send(Message::Text(reply.to_string())).await.is_err() {
            break;
        }
    }
    debug!(%drone_id, "ingest socket closed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
