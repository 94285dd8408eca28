//! REST + WebSocket API for the fusion platform.
//!
//! Grounded in the teacher's `api` module shape (`create_app` building a
//! layered `Router`, a shared-state struct, routes split into their own
//! file) but re-pointed at the wildfire domain's endpoint table instead of
//! the drilling dashboard's. The `AppError` type (`error.rs`) takes over
//! the teacher's `ApiError` role.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;

use crate::bus::EventBus;
use crate::config::AppConfig;
use crate::dispatch::DispatchCoordinator;
use crate::store::Store;
use crate::stream::StreamRegistry;
use crate::track::TrackStore;
use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the shared state and full router for a given store backend.
/// Split out from the binary entrypoint so integration tests can build
/// the same app in-process via `tower::ServiceExt::oneshot`. Returns the
/// `StreamRegistry` alongside the router so the binary entrypoint can
/// spawn the heartbeat loop against the exact instance real `/ws/events`
/// clients register with, rather than a second, disconnected one.
pub fn build(
    store: Arc<dyn Store>,
    config: Arc<AppConfig>,
    shutdown: CancellationToken,
) -> (Router, Arc<StreamRegistry>) {
    let bus = Arc::new(EventBus::new());
    let tracks = Arc::new(TrackStore::new());
    let dispatch = Arc::new(DispatchCoordinator::new(
        store.clone(),
        bus.clone(),
        tracks.clone(),
        shutdown,
    ));
    let stream = Arc::new(StreamRegistry::new());
    subscribe_stream_to_bus(&bus, &stream);

    let state = AppState {
        store,
        bus,
        tracks,
        dispatch,
        stream: stream.clone(),
        config,
        metrics: Arc::new(handlers::Metrics::default()),
        started_at: Utc::now(),
    };

    (create_app(state), stream)
}

/// Forwards every `detections`/`missions`/`telemetry` event published on
/// the bus to connected `/ws/events` clients, mirroring the reference's
/// direct call from its handlers into `_broadcast_event` — here the bus
/// and the websocket registry are separate components, wired together
/// once at startup instead of handlers reaching into both.
fn subscribe_stream_to_bus(bus: &EventBus, stream: &Arc<StreamRegistry>) {
    for topic in ["telemetry", "detections", "missions"] {
        let stream = stream.clone();
        bus.subscribe(
            topic,
            Arc::new(move |_topic, payload| {
                let stream = stream.clone();
                Box::pin(async move { stream.broadcast(payload) })
            }),
        );
    }
}

/// Assembles the router from an already-constructed [`AppState`] — the
/// seam integration tests use to exercise the app without a live server.
pub fn create_app(state: AppState) -> Router {
    let cors = if state.config.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::operational_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
