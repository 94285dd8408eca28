//! API route tables.
//!
//! Mirrors the teacher's split between the versioned API surface and a
//! handful of unversioned operational endpoints (there: `/api/v1/*` plus a
//! legacy `/health`; here: `/api/v1/*` plus `/health`, `/readiness`,
//! `/metrics`, `/ws/events`).

use axum::routing::{get, patch, post};
use axum::Router;

use super::handlers::{self, AppState};
use crate::stream;

/// `/api/v1/*` — the core domain surface from the endpoint table.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/telemetry", post(handlers::create_telemetry).get(handlers::list_telemetry))
        .route("/telemetry/devices", get(handlers::list_devices))
        .route("/telemetry/devices/:id/latest", get(handlers::latest_telemetry))
        .route("/detections", post(handlers::create_detection))
        .route("/detections/tracks", get(handlers::list_tracks))
        .route("/missions", post(handlers::create_mission).get(handlers::list_missions))
        .route("/missions/:mission_id", patch(handlers::update_mission))
        .route("/triangulation/triangulate", post(handlers::triangulate))
        .route("/prediction/simulate", post(handlers::simulate_spread))
        .route("/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .with_state(state)
}

/// Unversioned operational endpoints: liveness, readiness, metrics, and
/// the live event stream.
pub fn operational_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/readiness", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .route("/ws/events", get(stream::ws_events))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::AppConfig;
    use crate::dispatch::DispatchCoordinator;
    use crate::store::memory::InMemoryStore;
    use crate::stream::StreamRegistry;
    use crate::track::TrackStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let tracks = Arc::new(TrackStore::new());
        let dispatch = Arc::new(DispatchCoordinator::new(
            store.clone(),
            bus.clone(),
            tracks.clone(),
            CancellationToken::new(),
        ));
        AppState {
            store,
            bus,
            tracks,
            dispatch,
            stream: Arc::new(StreamRegistry::new()),
            config: Arc::new(AppConfig::default()),
            metrics: Arc::new(handlers::Metrics::default()),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn health_returns_200() {
        let app = super::operational_routes(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_returns_200_with_a_working_store() {
        let app = super::operational_routes(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/readiness").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_missions_returns_200_when_empty() {
        let app = super::api_routes(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/missions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_mission_patch_returns_404() {
        let app = super::api_routes(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/missions/does-not-exist")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
