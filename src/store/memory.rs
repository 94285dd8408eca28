//! In-memory `Store` backend — no live Postgres required. Used by tests
//! and minimal deployments, following the shape of the teacher's
//! `InMemoryDAL`.

use super::{MissionUpdate, Store};
use crate::error::AppError;
use crate::models::{
    Alert, AlertStatus, Detection, DetectionInput, EnvironmentalCell, Mission, MissionInput,
    MissionPriority, MissionStatus, Task, TaskInput, TaskStatus, Telemetry, TelemetryInput,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    telemetry: RwLock<Vec<Telemetry>>,
    detections: RwLock<Vec<Detection>>,
    missions: RwLock<Vec<Mission>>,
    alerts: RwLock<Vec<Alert>>,
    env_cells: RwLock<HashMap<String, EnvironmentalCell>>,
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_telemetry(&self, input: TelemetryInput) -> Result<Telemetry, AppError> {
        let record = Telemetry {
            id: Uuid::new_v4(),
            device_id: input.device_id,
            timestamp: input.timestamp,
            latitude: input.latitude,
            longitude: input.longitude,
            altitude: input.altitude,
            yaw: input.yaw,
            pitch: input.pitch,
            roll: input.roll,
            speed: input.speed,
            battery_level: input.battery_level,
            sensors: input.sensors,
            status: input.status,
            comms_rssi: input.comms_rssi,
            temperature: input.temperature,
            created_at: Utc::now(),
        };
        self.telemetry
            .write()
            .map_err(|e| AppError::Internal(e.to_string()))?
            .push(record.clone());
        Ok(record)
    }

    async fn list_telemetry(&self, device_id: Option<&str>, limit: i64) -> Result<Vec<Telemetry>, AppError> {
        let store = self.telemetry.read().map_err(|e| AppError::Internal(e.to_string()))?;
        let mut rows: Vec<Telemetry> = store
            .iter()
            .filter(|t| device_id.is_none_or(|d| t.device_id == d))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn list_devices(&self) -> Result<Vec<String>, AppError> {
        let store = self.telemetry.read().map_err(|e| AppError::Internal(e.to_string()))?;
        let mut devices: Vec<String> = store.iter().map(|t| t.device_id.clone()).collect();
        devices.sort();
        devices.dedup();
        Ok(devices)
    }

    async fn create_detection(&self, input: DetectionInput) -> Result<Detection, AppError> {
        let metadata = input
            .heat_index
            .map(|h| serde_json::json!({ "heat_index": h }))
            .unwrap_or(serde_json::Value::Null);

        let record = Detection {
            id: input.id,
            device_id: input.source_id,
            timestamp: input.timestamp,
            kind: input.kind,
            latitude: Some(input.lat),
            longitude: Some(input.lon),
            bearing: None,
            confidence: input.confidence,
            media_ref: input.image_refs.first().cloned(),
            source: "edge".to_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.detections
            .write()
            .map_err(|e| AppError::Internal(e.to_string()))?
            .push(record.clone());
        Ok(record)
    }

    async fn list_detections(&self, limit: i64) -> Result<Vec<Detection>, AppError> {
        let store = self.detections.read().map_err(|e| AppError::Internal(e.to_string()))?;
        let mut rows: Vec<Detection> = store.iter().cloned().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn create_mission(&self, input: MissionInput) -> Result<Mission, AppError> {
        let mission_id = input.mission_id.unwrap_or_else(|| {
            format!("auto-{}-{}", Utc::now().timestamp_millis(), &Uuid::new_v4().simple().to_string()[..6])
        });

        let mut missions = self.missions.write().map_err(|e| AppError::Internal(e.to_string()))?;
        if missions.iter().any(|m| m.mission_id == mission_id) {
            return Err(AppError::DuplicateMission(mission_id));
        }

        let now = Utc::now();
        let record = Mission {
            id: Uuid::new_v4(),
            mission_id,
            kind: input.kind,
            priority: input.priority,
            description: input.description,
            status: MissionStatus::Pending,
            lat: input.lat,
            lng: input.lng,
            radius: input.radius,
            waypoints: input.waypoints,
            assets: input.assets,
            progress: 0,
            estimated_duration: input.estimated_duration,
            created_at: now,
            updated_at: now,
        };
        missions.push(record.clone());
        Ok(record)
    }

    async fn get_mission(&self, mission_id: &str) -> Result<Mission, AppError> {
        let missions = self.missions.read().map_err(|e| AppError::Internal(e.to_string()))?;
        missions
            .iter()
            .find(|m| m.mission_id == mission_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("mission {mission_id} not found")))
    }

    async fn list_missions(&self, limit: i64) -> Result<Vec<Mission>, AppError> {
        let missions = self.missions.read().map_err(|e| AppError::Internal(e.to_string()))?;
        let mut rows: Vec<Mission> = missions.iter().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn update_mission(&self, mission_id: &str, update: MissionUpdate) -> Result<Mission, AppError> {
        let mut missions = self.missions.write().map_err(|e| AppError::Internal(e.to_string()))?;
        let record = missions
            .iter_mut()
            .find(|m| m.mission_id == mission_id)
            .ok_or_else(|| AppError::NotFound(format!("mission {mission_id} not found")))?;

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(progress) = update.progress {
            record.progress = progress;
        }
        if let Some(description) = update.description {
            record.description = Some(description);
        }
        if let Some(duration) = update.estimated_duration {
            record.estimated_duration = Some(duration);
        }
        record.updated_at = Utc::now();

        Ok(record.clone())
    }

    async fn create_alert(&self, alert: Alert) -> Result<Alert, AppError> {
        self.alerts
            .write()
            .map_err(|e| AppError::Internal(e.to_string()))?
            .push(alert.clone());
        Ok(alert)
    }

    async fn list_alerts(&self, status: Option<AlertStatus>, limit: i64) -> Result<Vec<Alert>, AppError> {
        let alerts = self.alerts.read().map_err(|e| AppError::Internal(e.to_string()))?;
        let mut rows: Vec<Alert> = alerts
            .iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn acknowledge_alert(&self, id: Uuid, acknowledged_by: &str) -> Result<Alert, AppError> {
        let mut alerts = self.alerts.write().map_err(|e| AppError::Internal(e.to_string()))?;
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("alert {id} not found")))?;
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(acknowledged_by.to_string());
        alert.acknowledged_at = Some(Utc::now());
        Ok(alert.clone())
    }

    async fn upsert_env_cell(&self, cell: EnvironmentalCell) -> Result<EnvironmentalCell, AppError> {
        let mut cells = self.env_cells.write().map_err(|e| AppError::Internal(e.to_string()))?;
        cells.insert(cell.h3_index.clone(), cell.clone());
        Ok(cell)
    }

    async fn get_env_cell(&self, h3_index: &str) -> Result<EnvironmentalCell, AppError> {
        let cells = self.env_cells.read().map_err(|e| AppError::Internal(e.to_string()))?;
        cells
            .get(h3_index)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("env cell {h3_index} not found")))
    }

    async fn create_task(&self, input: TaskInput) -> Result<Task, AppError> {
        let task_id = input
            .task_id
            .unwrap_or_else(|| format!("task-{}", &Uuid::new_v4().simple().to_string()[..8]));
        let record = Task {
            id: Uuid::new_v4(),
            task_id,
            device_id: input.device_id,
            kind: input.kind,
            waypoints: input.waypoints,
            parameters: input.parameters,
            status: TaskStatus::Pending,
            assigned_by: input.assigned_by,
            created_at: Utc::now(),
            deadline: input.deadline,
            completed_at: None,
        };
        self.tasks
            .write()
            .map_err(|e| AppError::Internal(e.to_string()))?
            .push(record.clone());
        Ok(record)
    }

    async fn list_tasks(&self, limit: i64) -> Result<Vec<Task>, AppError> {
        let tasks = self.tasks.read().map_err(|e| AppError::Internal(e.to_string()))?;
        let mut rows: Vec<Task> = tasks.iter().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry_input() -> TelemetryInput {
        TelemetryInput {
            device_id: "drone-1".to_string(),
            timestamp: Utc::now(),
            latitude: 1.0,
            longitude: 2.0,
            altitude: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            speed: 0.0,
            battery_level: 90.0,
            sensors: vec![],
            status: Default::default(),
            comms_rssi: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn create_and_list_telemetry_roundtrips() {
        let store = InMemoryStore::new();
        store.create_telemetry(telemetry_input()).await.unwrap();
        let rows = store.list_telemetry(Some("drone-1"), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_mission_id_is_rejected() {
        let store = InMemoryStore::new();
        let input = MissionInput {
            mission_id: Some("m-1".to_string()),
            kind: "ember_damp".to_string(),
            priority: MissionPriority::High,
            description: None,
            lat: 1.0,
            lng: 2.0,
            radius: 200.0,
            waypoints: None,
            assets: None,
            estimated_duration: None,
        };
        store.create_mission(input.clone()).await.unwrap();
        let result = store.create_mission(input).await;
        assert!(matches!(result, Err(AppError::DuplicateMission(_))));
    }

    #[tokio::test]
    async fn update_mission_applies_partial_fields() {
        let store = InMemoryStore::new();
        let input = MissionInput {
            mission_id: Some("m-2".to_string()),
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
        store.create_mission(input).await.unwrap();

        let updated = store
            .update_mission(
                "m-2",
                MissionUpdate {
                    status: Some(MissionStatus::Active),
                    progress: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, MissionStatus::Active);
        assert_eq!(updated.progress, 50);
    }

    #[tokio::test]
    async fn create_task_generates_an_id_when_absent() {
        let store = InMemoryStore::new();
        let task = store
            .create_task(TaskInput {
                task_id: None,
                device_id: "drone-1".to_string(),
                kind: crate::models::TaskKind::Patrol,
                waypoints: vec![],
                parameters: Default::default(),
                assigned_by: "api".to_string(),
                deadline: None,
            })
            .await
            .unwrap();
        assert!(task.task_id.starts_with("task-"));
        assert_eq!(task.status, TaskStatus::Pending);

        let tasks = store.list_tasks(10).await.unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
