//! Pluggable persistence backend.
//!
//! Generalizes the teacher's `PersistenceLayer` trait (see
//! `storage::persistence` in the reference repo) from a single
//! advisory/ML-report shape to the wildfire domain's telemetry,
//! detections, missions, alerts, and environmental cells. Two
//! implementations exist: [`memory::InMemoryStore`] for tests and minimal
//! deployments, and [`postgres::PostgresStore`] for production.

pub mod memory;
pub mod postgres;

use crate::error::AppError;
use crate::models::{
    Alert, Detection, DetectionInput, EnvironmentalCell, Mission, MissionInput, Task, TaskInput, Telemetry,
    TelemetryInput,
};
use async_trait::async_trait;
use uuid::Uuid;

/// A partial update to an existing mission, per the reference PATCH
/// endpoint's optional fields.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct MissionUpdate {
    pub status: Option<crate::models::MissionStatus>,
    pub progress: Option<i32>,
    pub description: Option<String>,
    pub estimated_duration: Option<i32>,
}

/// Storage backend for the fusion platform's persisted records.
///
/// Implementations must be thread-safe (`Send + Sync`) for shared access
/// across API handlers and background dispatch tasks.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_telemetry(&self, input: TelemetryInput) -> Result<Telemetry, AppError>;
    async fn list_telemetry(&self, device_id: Option<&str>, limit: i64) -> Result<Vec<Telemetry>, AppError>;
    async fn list_devices(&self) -> Result<Vec<String>, AppError>;

    async fn create_detection(&self, input: DetectionInput) -> Result<Detection, AppError>;
    async fn list_detections(&self, limit: i64) -> Result<Vec<Detection>, AppError>;

    async fn create_mission(&self, input: MissionInput) -> Result<Mission, AppError>;
    async fn get_mission(&self, mission_id: &str) -> Result<Mission, AppError>;
    async fn list_missions(&self, limit: i64) -> Result<Vec<Mission>, AppError>;
    async fn update_mission(&self, mission_id: &str, update: MissionUpdate) -> Result<Mission, AppError>;

    async fn create_alert(&self, alert: Alert) -> Result<Alert, AppError>;
    async fn list_alerts(&self, status: Option<crate::models::AlertStatus>, limit: i64) -> Result<Vec<Alert>, AppError>;
    async fn acknowledge_alert(&self, id: Uuid, acknowledged_by: &str) -> Result<Alert, AppError>;

    async fn upsert_env_cell(&self, cell: EnvironmentalCell) -> Result<EnvironmentalCell, AppError>;
    async fn get_env_cell(&self, h3_index: &str) -> Result<EnvironmentalCell, AppError>;

    async fn create_task(&self, input: TaskInput) -> Result<Task, AppError>;
    async fn list_tasks(&self, limit: i64) -> Result<Vec<Task>, AppError>;

    /// Backend name for logging and the `/readiness` response.
    fn backend_name(&self) -> &'static str;
}
