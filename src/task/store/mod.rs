//! Task storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (default, non-persistent)
//! - `sqlite`: SQLite database (persistent across restarts)
//!
//! Every mutation is an atomic snapshot update: a reader never observes a
//! result or artifact without the matching status. The store is also the
//! monotonicity guard: transitions outside the task state machine fail with
//! [`StoreError::InvalidTransition`].

mod memory;
mod sqlite;

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use super::{ArtifactRef, TaskRecord, TaskStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {0} already exists")]
    AlreadyExists(Uuid),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Task store trait - implemented by all storage backends.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Insert a fresh pending record.
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Snapshot of a single task.
    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError>;

    /// All tasks, ordered by submission time descending.
    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Transition `pending -> running`.
    async fn mark_running(&self, id: Uuid) -> Result<(), StoreError>;

    /// Transition `running -> success`, attaching the result document and
    /// the artifact reference in the same snapshot.
    async fn mark_success(
        &self,
        id: Uuid,
        result: Value,
        artifact: Option<ArtifactRef>,
    ) -> Result<(), StoreError>;

    /// Transition `running -> failed`, capturing the execution error.
    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), StoreError>;

    /// Remove a task and return its final record. Deletion is not
    /// idempotent: removing an unknown id is an error.
    async fn remove(&self, id: Uuid) -> Result<TaskRecord, StoreError>;

    /// Remove terminal tasks not updated since `cutoff`; returns the
    /// removed records so callers can release their artifacts.
    async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskRecord>, StoreError>;
}

/// Task store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStoreKind {
    #[default]
    Memory,
    Sqlite,
}

impl TaskStoreKind {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sqlite" | "db" => Self::Sqlite,
            "memory" => Self::Memory,
            _ => Self::default(),
        }
    }
}

/// Create a task store based on type and configuration.
pub async fn create_task_store(
    kind: TaskStoreKind,
    data_dir: &Path,
) -> Result<Box<dyn TaskStore>, StoreError> {
    match kind {
        TaskStoreKind::Memory => Ok(Box::new(InMemoryTaskStore::new())),
        TaskStoreKind::Sqlite => {
            let store = SqliteTaskStore::new(data_dir.join("tasks.db")).await?;
            Ok(Box::new(store))
        }
    }
}

/// Shared transition guard for store implementations.
pub(crate) fn check_transition(
    record: &TaskRecord,
    to: TaskStatus,
) -> Result<(), StoreError> {
    if record.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: record.id,
            from: record.status,
            to,
        })
    }
}
