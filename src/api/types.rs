//! API request and response types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::datasets::{Area, Dataset};
use crate::task::{TaskRecord, TaskStatus};

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One calculation module as listed to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct CmInfo {
    /// Stable registry name, used in task URLs
    pub name: String,

    /// Human-facing display name
    pub pretty_name: String,

    /// The module's parameter schema, verbatim
    pub schema: Value,
}

/// Response of the CM list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CmListResponse {
    pub cms: Vec<CmInfo>,
}

/// Response after submitting a task.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: Uuid,
}

/// Task snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshotResponse {
    pub task_id: Uuid,

    /// Name of the owning calculation module
    pub cm_name: String,

    pub status: TaskStatus,

    /// Result document, present once the task succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Captured execution error, present once the task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the download endpoint currently serves a file for this task
    pub download_available: bool,

    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskRecord> for TaskSnapshotResponse {
    fn from(record: TaskRecord) -> Self {
        let download_available = record.download_available();
        Self {
            task_id: record.id,
            cm_name: record.cm_name,
            status: record.status,
            result: record.result,
            error: record.error,
            download_available,
            submitted_at: record.submitted_at,
            updated_at: record.updated_at,
        }
    }
}

/// Response after deleting a task.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteTaskResponse {
    pub task_id: Uuid,
    pub deleted: bool,
}

/// Response of the dataset list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetListResponse {
    pub datasets: Vec<Dataset>,
}

/// Response of the selection-areas endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AreaListResponse {
    pub areas: Vec<Area>,
}
