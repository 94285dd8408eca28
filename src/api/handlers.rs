//! API route handlers.
//!
//! Request handling logic for the wildfire fusion platform's endpoint
//! table (telemetry, detections, missions, triangulation, spread
//! prediction, tasks) plus the operational `/health` / `/readiness` /
//! `/metrics` trio, grounded in the teacher's Prometheus-text `get_metrics`
//! handler shape.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bus::EventBus;
use crate::dispatch::DispatchCoordinator;
use crate::error::AppError;
use crate::models::{
    Detection, DetectionInput, Mission, MissionInput, Task, TaskInput, Telemetry, TelemetryInput,
    Track, TriangulateRequest, TriangulateResponse,
};
use crate::spread::simulate_spread;
use crate::store::{MissionUpdate, Store};
use crate::stream::StreamRegistry;
use crate::track::TrackStore;
use crate::triangulation::TriangulationEngine;
use crate::AppConfig;

// ============================================================================
// Shared state
// ============================================================================

/// Request counters backing the `/metrics` text snapshot. Not a full
/// Prometheus exposition (histograms, labels) since that's an
/// external-collaborator concern; a minimal gauge/counter set grounded in
/// the teacher's `get_metrics` handler.
#[derive(Default)]
pub struct Metrics {
    pub telemetry_ingested_total: AtomicU64,
    pub detections_total: AtomicU64,
    pub missions_created_total: AtomicU64,
    pub tasks_created_total: AtomicU64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub tracks: Arc<TrackStore>,
    pub dispatch: Arc<DispatchCoordinator>,
    pub stream: Arc<StreamRegistry>,
    pub config: Arc<AppConfig>,
    pub metrics: Arc<Metrics>,
    pub started_at: DateTime<Utc>,
}

/// Lets `stream::ws_events` (which only needs the registry) run as a
/// handler on a router whose state type is the full [`AppState`].
impl axum::extract::FromRef<AppState> for Arc<StreamRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.stream.clone()
    }
}

fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, 1000)
}

// ============================================================================
// Telemetry
// ============================================================================

pub async fn create_telemetry(
    State(state): State<AppState>,
    Json(input): Json<TelemetryInput>,
) -> Result<Json<Telemetry>, AppError> {
    let record = state.store.create_telemetry(input).await?;
    state.metrics.telemetry_ingested_total.fetch_add(1, Ordering::Relaxed);
    let _ = state.bus.publish(
        "telemetry",
        serde_json::json!({ "type": "telemetry_created", "telemetry": &record }),
    );
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    pub device_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

pub async fn list_telemetry(
    State(state): State<AppState>,
    Query(q): Query<TelemetryQuery>,
) -> Result<Json<Vec<Telemetry>>, AppError> {
    let limit = clamp_limit(q.limit, 100);
    // The store only filters by device_id; pull a wider window and apply
    // the time-range filter here, then re-truncate to the requested limit.
    let fetch_limit = (limit * 4).max(200).min(1000);
    let mut rows = state
        .store
        .list_telemetry(q.device_id.as_deref(), fetch_limit)
        .await?;
    rows.retain(|t| q.start_time.is_none_or(|s| t.timestamp >= s) && q.end_time.is_none_or(|e| t.timestamp <= e));
    rows.truncate(limit as usize);
    Ok(Json(rows))
}

pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.store.list_devices().await?))
}

pub async fn latest_telemetry(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Telemetry>, AppError> {
    let rows = state.store.list_telemetry(Some(&device_id), 1).await?;
    rows.into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no telemetry for device {device_id}")))
}

// ============================================================================
// Detections
// ============================================================================

pub async fn create_detection(
    State(state): State<AppState>,
    Json(input): Json<DetectionInput>,
) -> Result<Json<Detection>, AppError> {
    let detection = state.dispatch.record_detection(input).await?;
    state.metrics.detections_total.fetch_add(1, Ordering::Relaxed);
    Ok(Json(detection))
}

pub async fn list_tracks(State(state): State<AppState>) -> Json<Vec<Track>> {
    Json(state.tracks.snapshot())
}

// ============================================================================
// Missions
// ============================================================================

pub async fn create_mission(
    State(state): State<AppState>,
    Json(input): Json<MissionInput>,
) -> Result<Json<Mission>, AppError> {
    let mission = state.dispatch.create_mission(input).await?;
    state.metrics.missions_created_total.fetch_add(1, Ordering::Relaxed);
    Ok(Json(mission))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn list_missions(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Mission>>, AppError> {
    let limit = clamp_limit(q.limit, 100);
    Ok(Json(state.store.list_missions(limit).await?))
}

pub async fn update_mission(
    State(state): State<AppState>,
    Path(mission_id): Path<String>,
    Json(update): Json<MissionUpdate>,
) -> Result<Json<Mission>, AppError> {
    let mission = state.dispatch.update_mission(&mission_id, update).await?;
    Ok(Json(mission))
}

// ============================================================================
// Triangulation
// ============================================================================

pub async fn triangulate(
    State(_state): State<AppState>,
    Json(req): Json<TriangulateRequest>,
) -> Result<Json<TriangulateResponse>, AppError> {
    let observation_count = req.observations.len();
    let max_distance_km = req.max_distance_km.unwrap_or(50.0);
    let min_confidence = req.min_confidence.unwrap_or(0.0);
    let observations = req.observations;

    let start = std::time::Instant::now();
    let mut results = tokio::task::spawn_blocking(move || {
        TriangulationEngine::new(max_distance_km).triangulate(&observations)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;
    let processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    results.retain(|r| r.confidence >= min_confidence);
    let success = !results.is_empty();

    Ok(Json(TriangulateResponse {
        results,
        success,
        error_message: None,
        observation_count,
        processing_time_ms,
    }))
}

// ============================================================================
// Spread prediction
// ============================================================================

pub async fn simulate_spread(
    State(_state): State<AppState>,
    Json(params): Json<crate::models::SpreadParameters>,
) -> Result<Json<crate::models::SpreadResult>, AppError> {
    let result = tokio::task::spawn_blocking(move || simulate_spread(&params))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(result))
}

// ============================================================================
// Tasks
// ============================================================================

pub async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>, AppError> {
    let task = state.store.create_task(input).await?;
    state.metrics.tasks_created_total.fetch_add(1, Ordering::Relaxed);
    Ok(Json(task))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let limit = clamp_limit(q.limit, 100);
    Ok(Json(state.store.list_tasks(limit).await?))
}

// ============================================================================
// Operational endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health — liveness only: the process is up and answering requests.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct ReadinessResponse {
    status: &'static str,
    store: &'static str,
    redis: &'static str,
    mqtt: &'static str,
}

/// GET /readiness — checks the store is actually reachable (a cheap
/// listing call) and that the bus is constructed. Redis/MQTT are
/// external-collaborator concerns and are reported `not_configured`
/// rather than probed.
pub async fn readiness(State(state): State<AppState>) -> Response {
    match state.store.list_devices().await {
        Ok(_) => Json(ReadinessResponse {
            status: "ready",
            store: state.store.backend_name(),
            redis: "not_configured",
            mqtt: "not_configured",
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "readiness check failed: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    store: state.store.backend_name(),
                    redis: "not_configured",
                    mqtt: "not_configured",
                }),
            )
                .into_response()
        }
    }
}

/// GET /metrics — a minimal Prometheus-text snapshot, not full exposition
/// format (no histograms/labels); grounded in the teacher's `get_metrics`
/// handler shape.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0);
    let m = &state.metrics;

    let mut body = String::with_capacity(512);
    body.push_str("# HELP fireline_telemetry_ingested_total Telemetry reports ingested\n");
    body.push_str("# TYPE fireline_telemetry_ingested_total counter\n");
    body.push_str(&format!(
        "fireline_telemetry_ingested_total {}\n",
        m.telemetry_ingested_total.load(Ordering::Relaxed)
    ));

    body.push_str("# HELP fireline_detections_total Detections recorded\n");
    body.push_str("# TYPE fireline_detections_total counter\n");
    body.push_str(&format!("fireline_detections_total {}\n", m.detections_total.load(Ordering::Relaxed)));

    body.push_str("# HELP fireline_missions_created_total Missions created (manual or auto)\n");
    body.push_str("# TYPE fireline_missions_created_total counter\n");
    body.push_str(&format!(
        "fireline_missions_created_total {}\n",
        m.missions_created_total.load(Ordering::Relaxed)
    ));

    body.push_str("# HELP fireline_tasks_created_total Tasks created\n");
    body.push_str("# TYPE fireline_tasks_created_total counter\n");
    body.push_str(&format!("fireline_tasks_created_total {}\n", m.tasks_created_total.load(Ordering::Relaxed)));

    body.push_str("# HELP fireline_stream_clients Currently connected websocket clients\n");
    body.push_str("# TYPE fireline_stream_clients gauge\n");
    body.push_str(&format!("fireline_stream_clients {}\n", state.stream.client_count()));

    body.push_str("# HELP fireline_uptime_seconds Process uptime in seconds\n");
    body.push_str("# TYPE fireline_uptime_seconds gauge\n");
    body.push_str(&format!("fireline_uptime_seconds {uptime}\n"));

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
