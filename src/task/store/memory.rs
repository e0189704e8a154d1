//! In-memory task store (non-persistent).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{check_transition, StoreError, TaskStore};
use crate::task::{ArtifactRef, TaskRecord, TaskStatus};

#[derive(Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Apply a checked transition under the write lock.
    async fn transition<F>(&self, id: Uuid, to: TaskStatus, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.write().await;
        let record = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        check_transition(record, to)?;
        record.status = to;
        apply(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        tasks.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut tasks: Vec<TaskRecord> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(tasks)
    }

    async fn mark_running(&self, id: Uuid) -> Result<(), StoreError> {
        self.transition(id, TaskStatus::Running, |_| {}).await
    }

    async fn mark_success(
        &self,
        id: Uuid,
        result: Value,
        artifact: Option<ArtifactRef>,
    ) -> Result<(), StoreError> {
        self.transition(id, TaskStatus::Success, |record| {
            record.result = Some(result);
            record.artifact = artifact;
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), StoreError> {
        self.transition(id, TaskStatus::Failed, |record| {
            record.error = Some(error);
        })
        .await
    }

    async fn remove(&self, id: Uuid) -> Result<TaskRecord, StoreError> {
        self.tasks
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound(id))
    }

    async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let mut tasks = self.tasks.write().await;
        let expired: Vec<Uuid> = tasks
            .values()
            .filter(|record| record.status.is_terminal() && record.updated_at < cutoff)
            .map(|record| record.id)
            .collect();
        let mut purged = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(record) = tasks.remove(&id) {
                purged.push(record);
            }
        }
        Ok(purged)
    }
}
