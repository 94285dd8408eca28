//! Shared data structures for the wildfire fusion platform.
//!
//! - Telemetry: device position/health reports from robots and drones
//! - Detections: smoke/flame/heat observations from edge or cloud processing
//! - Tracks: the in-memory correlator's view of a source's observation history
//! - Triangulation: bearing observations and localization results
//! - Risk / Spread: environmental cells, risk scores, spread simulation I/O
//! - Missions / Tasks: coordinated dispatch records
//! - Alerts: operator-facing notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Online,
    Offline,
    Error,
    Maintenance,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Error => write!(f, "error"),
            DeviceStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    pub unit: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// A telemetry report from a device (robot, drone, fixed sensor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub speed: f64,
    pub battery_level: f64,
    pub sensors: Vec<SensorReading>,
    pub status: DeviceStatus,
    pub comms_rssi: Option<f64>,
    pub temperature: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryInput {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub speed: f64,
    pub battery_level: f64,
    #[serde(default)]
    pub sensors: Vec<SensorReading>,
    #[serde(default)]
    pub status: DeviceStatus,
    pub comms_rssi: Option<f64>,
    pub temperature: Option<f64>,
}

// ============================================================================
// Detections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindVector {
    pub speed_mps: f64,
    pub direction_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionInput {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    #[serde(default)]
    pub image_refs: Vec<String>,
    pub heat_index: Option<f64>,
    pub wind_vector: Option<WindVector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bearing: Option<f64>,
    pub confidence: f64,
    pub media_ref: Option<String>,
    pub source: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Track correlator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub track_id: Uuid,
    pub source_id: String,
    pub positions: Vec<TrackPosition>,
    pub classification: Option<String>,
    pub confidence: Option<f64>,
}

// ============================================================================
// Triangulation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationMethod {
    Simple,
    Ransac,
    LeastSquares,
}

/// A single device's bearing reading toward a detected target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearingObservation {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub device_latitude: f64,
    pub device_longitude: f64,
    #[serde(default)]
    pub device_altitude: f64,
    /// Degrees from north.
    pub camera_heading: f64,
    /// Degrees from horizontal.
    pub camera_pitch: f64,
    /// Degrees from north to target.
    pub bearing: f64,
    pub confidence: f64,
    pub detection_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulationResult {
    pub result_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub confidence: f64,
    pub uncertainty_meters: f64,
    pub observation_ids: Vec<String>,
    pub method: TriangulationMethod,
    pub quality_metrics: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulateRequest {
    pub observations: Vec<BearingObservation>,
    pub max_distance_km: Option<f64>,
    pub min_confidence: Option<f64>,
    pub preferred_method: Option<TriangulationMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulateResponse {
    pub results: Vec<TriangulationResult>,
    pub success: bool,
    pub error_message: Option<String>,
    pub observation_count: usize,
    pub processing_time_ms: f64,
}

// ============================================================================
// Risk
// ============================================================================

/// Environmental conditions for one grid cell, as used by the risk and
/// spread engines. Anderson 13 fuel model indexed 1-13.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature_c: f64,
    pub relative_humidity: f64,
    pub wind_speed_mps: f64,
    pub wind_direction_deg: f64,
    pub fuel_moisture: f64,
    pub soil_moisture: f64,
    pub fuel_model: u8,
    pub slope_deg: f64,
    pub aspect_deg: f64,
    pub canopy_cover: f64,
    pub elevation_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalCell {
    pub id: Uuid,
    pub h3_index: String,
    pub timestamp: DateTime<Utc>,
    pub conditions: EnvironmentalConditions,
    pub risk_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRequest {
    pub conditions: EnvironmentalConditions,
    /// History of recent ignitions/lightning nearby; drives the "history"
    /// term in heuristic mode and the normalized features in trained mode.
    #[serde(default)]
    pub recent_lightning: u32,
    #[serde(default)]
    pub recent_ignitions: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    Heuristic,
    Trained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: f64,
    pub mode: RiskMode,
    pub confidence: f64,
    pub contributing_factors: std::collections::HashMap<String, f64>,
    pub calibrated: bool,
}

// ============================================================================
// Spread simulation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FireLineType {
    Dozer,
    Hand,
    WetLine,
    Backfire,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FireLineStatus {
    Planned,
    UnderConstruction,
    Completed,
    Breached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireLine {
    pub line_id: Uuid,
    pub name: Option<String>,
    pub geometry: Vec<Point>,
    pub width_meters: f64,
    #[serde(rename = "type")]
    pub kind: FireLineType,
    pub status: FireLineStatus,
    pub effectiveness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadParameters {
    pub ignition_points: Vec<Point>,
    pub conditions: EnvironmentalConditions,
    #[serde(default)]
    pub fire_lines: Vec<FireLine>,
    pub simulation_hours: u32,
    pub time_step_minutes: f64,
    pub monte_carlo_runs: u32,
    #[serde(default)]
    pub custom_parameters: std::collections::HashMap<String, f64>,
    /// Fixes the RNG seed for reproducible test runs. `None` uses the
    /// process-wide thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Isochrone {
    pub hours_from_start: u32,
    pub geometry: Vec<Point>,
    pub area_hectares: f64,
    pub perimeter_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadConfidence {
    pub overall_confidence: f64,
    pub weather_confidence: f64,
    pub fuel_confidence: f64,
    pub terrain_confidence: f64,
    pub confidence_factors: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadResult {
    pub simulation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub isochrones: Vec<Isochrone>,
    pub perimeter: Vec<Point>,
    pub total_area_hectares: f64,
    pub max_spread_rate_mph: f64,
    pub simulation_duration_hours: f64,
    pub statistics: std::collections::HashMap<String, f64>,
    pub confidence: SpreadConfidence,
}

// ============================================================================
// Missions / Tasks
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissionPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Declaration order is the forward-progress order: `proposed < pending <
/// active < completed`. `failed` is reachable from any non-terminal status
/// regardless of ordinal, so comparisons against it are handled as a
/// special case rather than by its position in this list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Proposed,
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

impl MissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }

    /// Whether a transition from `self` to `next` is a legal forward move:
    /// strictly increasing ordinal, or a move to `Failed` from any
    /// non-terminal status.
    pub fn can_advance_to(self, next: MissionStatus) -> bool {
        if next == MissionStatus::Failed {
            return !self.is_terminal();
        }
        next > self
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionStatus::Proposed => write!(f, "proposed"),
            MissionStatus::Pending => write!(f, "pending"),
            MissionStatus::Active => write!(f, "active"),
            MissionStatus::Completed => write!(f, "completed"),
            MissionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub mission_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: MissionPriority,
    pub description: Option<String>,
    pub status: MissionStatus,
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
    pub waypoints: Option<serde_json::Value>,
    pub assets: Option<serde_json::Value>,
    pub progress: i32,
    pub estimated_duration: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionInput {
    pub mission_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub priority: MissionPriority,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_mission_radius")]
    pub radius: f64,
    pub waypoints: Option<serde_json::Value>,
    pub assets: Option<serde_json::Value>,
    pub estimated_duration: Option<i32>,
}

fn default_mission_radius() -> f64 {
    200.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Patrol,
    Hold,
    BuildLine,
    SurveySmoke,
    EmergencyReturn,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_id: String,
    pub device_id: String,
    pub kind: TaskKind,
    pub waypoints: Vec<Point>,
    pub parameters: std::collections::HashMap<String, f64>,
    pub status: TaskStatus,
    pub assigned_by: String,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub task_id: Option<String>,
    pub device_id: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub waypoints: Vec<Point>,
    #[serde(default)]
    pub parameters: std::collections::HashMap<String, f64>,
    #[serde(default = "default_assigned_by")]
    pub assigned_by: String,
    pub deadline: Option<DateTime<Utc>>,
}

fn default_assigned_by() -> String {
    "api".to_string()
}

// ============================================================================
// Alerts (supplemental — see SPEC_FULL.md §3)
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SmokeDetected,
    FireDetected,
    DeviceOffline,
    LowBattery,
    CommsLost,
    Emergency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub latitude: f64,
    pub longitude: f64,
    pub device_id: Option<String>,
    pub detection_id: Option<Uuid>,
    pub status: AlertStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Event bus payloads
// ============================================================================

/// Envelope published on the in-process event bus and mirrored to the
/// live websocket stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}
