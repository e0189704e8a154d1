//! Calculation task lifecycle: records, store, execution pool, dispatcher.

pub mod artifact;
pub mod dispatcher;
pub mod executor;
pub mod store;

pub use artifact::{ArtifactRef, ArtifactStore};
pub use dispatcher::TaskDispatcher;
pub use executor::ExecutionPool;
pub use store::{create_task_store, StoreError, TaskStore, TaskStoreKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Status of a calculation task.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Success
///                   \-> Failed
/// ```
/// Transitions are strictly monotonic; `Success` and `Failed` are terminal.
/// The store rejects every other transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// A worker is executing the calculation
    Running,
    /// Finished with a result document
    Success,
    /// Finished with a captured execution error
    Failed,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    ///
    /// # Property
    /// `is_terminal() => !can_transition_to(anything)`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Success)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A calculation task as held by the store.
///
/// Readers always see a consistent snapshot: `result` is present iff the
/// status is `Success` and `error` iff `Failed`; `artifact` only accompanies
/// `Success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    /// Name of the owning calculation module
    pub cm_name: String,
    /// Parameter object the task was submitted with
    pub params: Value,
    pub status: TaskStatus,
    /// Result document, present iff `status == Success`
    pub result: Option<Value>,
    /// Captured execution error, present iff `status == Failed`
    pub error: Option<String>,
    /// Downloadable file produced by the run, if any
    pub artifact: Option<ArtifactRef>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Fresh pending record for a submission.
    pub fn new(id: Uuid, cm_name: &str, params: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            cm_name: cm_name.to_string(),
            params,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            artifact: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    /// Whether the task finished with a downloadable file.
    pub fn download_available(&self) -> bool {
        self.status == TaskStatus::Success && self.artifact.is_some()
    }
}
