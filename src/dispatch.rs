//! Dispatch coordinator.
//!
//! Combines what the reference splits across `detections.py` (track
//! correlation, auto-mission synthesis) and `missions.py` (manual mission
//! creation, the pending→active→completed lifecycle timer) into one
//! owner of the shared state those handlers mutate. Resolves the
//! module-level `TRACKS` dict / closed-over `RECENT_MISSIONS` deque
//! design flaw: every dependency is an explicit `Arc` handle passed in at
//! construction, so a coordinator (and its background lifecycle tasks)
//! can be stood up fresh per test.

use crate::bus::EventBus;
use crate::error::AppError;
use crate::models::{Detection, DetectionInput, Mission, MissionInput, MissionStatus, TrackPosition};
use crate::store::{MissionUpdate, Store};
use crate::track::TrackStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Detections at or above this confidence trigger an automatic mission.
const AUTO_MISSION_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Delay before a mission transitions `pending` -> `active`.
const MISSION_ACTIVATE_AFTER: Duration = Duration::from_secs(5);

/// Further delay (from activation) before `active` -> `completed`.
const MISSION_COMPLETE_AFTER: Duration = Duration::from_secs(10);

pub struct DispatchCoordinator {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    tracks: Arc<TrackStore>,
    shutdown: CancellationToken,
}

impl DispatchCoordinator {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>, tracks: Arc<TrackStore>, shutdown: CancellationToken) -> Self {
        Self { store, bus, tracks, shutdown }
    }

    /// Persists a detection, appends it to its source's track, broadcasts
    /// `detection_created`, and — for a wildfire-signal detection at or
    /// above [`AUTO_MISSION_CONFIDENCE_THRESHOLD`] — synthesizes an
    /// `ember_damp` / `high` priority mission at the detection's location.
    pub async fn record_detection(&self, input: DetectionInput) -> Result<Detection, AppError> {
        let kind = input.kind.clone();
        let confidence = input.confidence;
        let (lat, lon) = (input.lat, input.lon);
        let source_id = input.source_id.clone();
        let timestamp = input.timestamp;
        let alt = input.alt;

        let detection = self.store.create_detection(input).await?;

        self.tracks.record(
            &source_id,
            TrackPosition { lat, lon, alt, timestamp },
        );

        self.publish(
            "detections",
            json!({
                "type": "detection_created",
                "detection": {
                    "id": detection.id,
                    "type": kind,
                    "lat": lat,
                    "lon": lon,
                    "confidence": confidence,
                    "timestamp": timestamp,
                    "source_id": source_id,
                }
            }),
        );

        let is_wildfire_signal = matches!(kind.as_str(), "fire" | "hotspot" | "smoke");
        if is_wildfire_signal && confidence >= AUTO_MISSION_CONFIDENCE_THRESHOLD {
            let auto_input = MissionInput {
                mission_id: None,
                kind: "ember_damp".to_string(),
                priority: crate::models::MissionPriority::High,
                description: Some("AUTO: respond to detection".to_string()),
                lat,
                lng: lon,
                radius: 200.0,
                waypoints: None,
                assets: None,
                estimated_duration: None,
            };
            if let Err(e) = self.create_mission(auto_input).await {
                warn!(error = %e, "auto-mission synthesis failed");
            }
        }

        Ok(detection)
    }

    /// Creates a mission (manual or auto-synthesized), broadcasts
    /// `mission_created`, and schedules its lifecycle advance task.
    pub async fn create_mission(&self, input: MissionInput) -> Result<Mission, AppError> {
        let mission = self.store.create_mission(input).await?;

        self.publish(
            "missions",
            json!({ "type": "mission_created", "mission": &mission }),
        );

        self.spawn_lifecycle(mission.mission_id.clone());
        Ok(mission)
    }

    /// Applies a PATCH to a mission, enforcing the forward-only status
    /// state machine (`proposed -> pending -> active -> {completed|failed}`)
    /// and the `progress=100 => status=completed` invariant before the
    /// update reaches the store.
    pub async fn update_mission(&self, mission_id: &str, update: MissionUpdate) -> Result<Mission, AppError> {
        let current = self.store.get_mission(mission_id).await?;
        let update = validate_mission_update(current.status, update)?;
        let mission = self.store.update_mission(mission_id, update).await?;
        self.publish("missions", json!({ "type": "mission_updated", "mission": &mission }));
        Ok(mission)
    }

    fn publish(&self, topic: &str, payload: serde_json::Value) {
        if let Err(e) = self.bus.publish(topic, payload) {
            warn!(error = %e, topic, "event rejected by validator");
        }
    }

    /// `pending` -> `active` at +5s, `active` -> `completed` (progress 100)
    /// at +15s total, mirroring the reference `_advance()` asyncio task.
    /// Bails out silently if the mission is gone or the coordinator is
    /// shutting down, matching the reference's broad `except Exception: pass`.
    fn spawn_lifecycle(&self, mission_id: String) {
        let store = self.store.clone();
        let bus = self.bus.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(MISSION_ACTIVATE_AFTER) => {}
            }

            let update = MissionUpdate {
                status: Some(MissionStatus::Active),
                ..Default::default()
            };
            match store.update_mission(&mission_id, update).await {
                Ok(mission) => {
                    let _ = bus.publish(
                        "missions",
                        json!({ "type": "mission_updated", "id": mission_id, "status": "active", "mission": mission }),
                    );
                }
                Err(_) => return,
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(MISSION_COMPLETE_AFTER) => {}
            }

            let update = MissionUpdate {
                status: Some(MissionStatus::Completed),
                progress: Some(100),
                ..Default::default()
            };
            if let Ok(mission) = store.update_mission(&mission_id, update).await {
                let _ = bus.publish(
                    "missions",
                    json!({ "type": "mission_updated", "id": mission_id, "status": "completed", "progress": 100, "mission": mission }),
                );
            }
        });
    }
}

/// Rejects a non-forward status transition (`failed` is reachable from any
/// non-terminal status regardless of ordinal) and reconciles `progress`
/// with `status`: `progress=100` forces `status=completed` when no status
/// was given, and is rejected outright when paired with any other status.
fn validate_mission_update(current: MissionStatus, mut update: MissionUpdate) -> Result<MissionUpdate, AppError> {
    if update.progress == Some(100) {
        match update.status {
            Some(MissionStatus::Completed) => {}
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "progress=100 requires status=completed, got status={other}"
                )));
            }
            None => update.status = Some(MissionStatus::Completed),
        }
    }

    if let Some(next) = update.status {
        if next != current && !current.can_advance_to(next) {
            return Err(AppError::Validation(format!(
                "mission status cannot move from {current} to {next}"
            )));
        }
    }

    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MissionPriority;
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;

    fn coordinator() -> (DispatchCoordinator, CancellationToken) {
        let token = CancellationToken::new();
        let coordinator = DispatchCoordinator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
            Arc::new(TrackStore::new()),
            token.clone(),
        );
        (coordinator, token)
    }

    fn detection_input(kind: &str, confidence: f64) -> DetectionInput {
        DetectionInput {
            id: uuid::Uuid::new_v4(),
            kind: kind.to_string(),
            confidence,
            lat: 34.1,
            lon: -118.3,
            alt: None,
            timestamp: Utc::now(),
            source_id: "drone-1".to_string(),
            image_refs: vec![],
            heat_index: None,
            wind_vector: None,
        }
    }

    #[tokio::test]
    async fn high_confidence_fire_detection_synthesizes_a_mission() {
        let (coordinator, _token) = coordinator();
        coordinator.record_detection(detection_input("fire", 0.9)).await.unwrap();

        let missions = coordinator.store.list_missions(10).await.unwrap();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].kind, "ember_damp");
        assert_eq!(missions[0].priority, MissionPriority::High);
    }

    #[tokio::test]
    async fn low_confidence_detection_does_not_synthesize_a_mission() {
        let (coordinator, _token) = coordinator();
        coordinator.record_detection(detection_input("fire", 0.2)).await.unwrap();

        let missions = coordinator.store.list_missions(10).await.unwrap();
        assert!(missions.is_empty());
    }

    #[tokio::test]
    async fn non_wildfire_detection_type_does_not_synthesize_a_mission() {
        let (coordinator, _token) = coordinator();
        coordinator.record_detection(detection_input("animal", 0.95)).await.unwrap();

        let missions = coordinator.store.list_missions(10).await.unwrap();
        assert!(missions.is_empty());
    }

    #[tokio::test]
    async fn detection_appends_to_the_source_track() {
        let (coordinator, _token) = coordinator();
        coordinator.record_detection(detection_input("smoke", 0.4)).await.unwrap();

        let track = coordinator.tracks.get("drone-1").unwrap();
        assert_eq!(track.positions.len(), 1);
    }

    #[tokio::test]
    async fn cancelling_shutdown_stops_pending_lifecycle_advances() {
        let (coordinator, token) = coordinator();
        let input = MissionInput {
            mission_id: Some("m-lifecycle".to_string()),
            kind: "patrol".to_string(),
            priority: MissionPriority::Medium,
            description: None,
            lat: 1.0,
            lng: 2.0,
            radius: 200.0,
            waypoints: None,
            assets: None,
            estimated_duration: None,
        };
        coordinator.create_mission(input).await.unwrap();
        token.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mission = coordinator.store.get_mission("m-lifecycle").await.unwrap();
        assert_eq!(mission.status, MissionStatus::Pending);
    }

    fn mission_input(mission_id: &str) -> MissionInput {
        MissionInput {
            mission_id: Some(mission_id.to_string()),
            kind: "patrol".to_string(),
            priority: MissionPriority::Medium,
            description: None,
            lat: 1.0,
            lng: 2.0,
            radius: 200.0,
            waypoints: None,
            assets: None,
            estimated_duration: None,
        }
    }

    #[tokio::test]
    async fn update_mission_rejects_a_backward_status_transition() {
        let (coordinator, _token) = coordinator();
        coordinator.create_mission(mission_input("m-backward")).await.unwrap();
        coordinator
            .update_mission("m-backward", MissionUpdate { status: Some(MissionStatus::Active), ..Default::default() })
            .await
            .unwrap();

        let result = coordinator
            .update_mission("m-backward", MissionUpdate { status: Some(MissionStatus::Pending), ..Default::default() })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let mission = coordinator.store.get_mission("m-backward").await.unwrap();
        assert_eq!(mission.status, MissionStatus::Active);
    }

    #[tokio::test]
    async fn update_mission_allows_failed_from_any_non_terminal_status() {
        let (coordinator, _token) = coordinator();
        coordinator.create_mission(mission_input("m-failed")).await.unwrap();

        let mission = coordinator
            .update_mission("m-failed", MissionUpdate { status: Some(MissionStatus::Failed), ..Default::default() })
            .await
            .unwrap();

        assert_eq!(mission.status, MissionStatus::Failed);
    }

    #[tokio::test]
    async fn update_mission_forces_completed_status_when_progress_reaches_100() {
        let (coordinator, _token) = coordinator();
        coordinator.create_mission(mission_input("m-progress")).await.unwrap();

        let mission = coordinator
            .update_mission("m-progress", MissionUpdate { progress: Some(100), ..Default::default() })
            .await
            .unwrap();

        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.progress, 100);
    }

    #[tokio::test]
    async fn update_mission_rejects_progress_100_with_a_mismatched_status() {
        let (coordinator, _token) = coordinator();
        coordinator.create_mission(mission_input("m-mismatch")).await.unwrap();

        let result = coordinator
            .update_mission(
                "m-mismatch",
                MissionUpdate { status: Some(MissionStatus::Active), progress: Some(100), ..Default::default() },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
