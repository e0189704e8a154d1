//! Task dispatcher: the seam between the HTTP surface and CM execution.
//!
//! `submit` validates and records a task, then hands a worker future to the
//! execution pool and returns the id immediately. The spawned worker is the
//! only writer of its record; the routes only ever read snapshots.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cm::{CalculationModule, CmError, CmRegistry};
use crate::error::ApiError;

use super::store::StoreError;
use super::{ArtifactRef, ArtifactStore, ExecutionPool, TaskRecord, TaskStatus, TaskStore};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::unknown_task(id),
            StoreError::InvalidTransition { id, from, to } => {
                ApiError::Conflict(format!("task {} cannot move {} -> {}", id, from, to))
            }
            StoreError::AlreadyExists(id) => {
                ApiError::Conflict(format!("task {} already exists", id))
            }
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

pub struct TaskDispatcher {
    registry: Arc<CmRegistry>,
    store: Arc<dyn TaskStore>,
    artifacts: ArtifactStore,
    pool: ExecutionPool,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<CmRegistry>,
        store: Arc<dyn TaskStore>,
        artifacts: ArtifactStore,
        pool: ExecutionPool,
    ) -> Self {
        Self {
            registry,
            store,
            artifacts,
            pool,
        }
    }

    /// Validate a submission, record it as `pending` and queue its worker.
    ///
    /// Unknown CM name is `NotFound`; schema violations are `Validation` and
    /// leave no trace in the store. Execution failures never surface here,
    /// they land in the task record.
    pub async fn submit(self: &Arc<Self>, cm_name: &str, params: Value) -> Result<Uuid, ApiError> {
        let module = self
            .registry
            .get(cm_name)
            .ok_or_else(|| ApiError::unknown_cm(cm_name))?;
        module
            .schema()
            .validate(&params)
            .map_err(ApiError::Validation)?;

        let record = TaskRecord::new(Uuid::new_v4(), cm_name, params.clone());
        let id = record.id;
        self.store.create(record).await?;

        let dispatcher = self.clone();
        self.pool
            .spawn(id, async move {
                dispatcher.run_task(id, module, params).await;
            })
            .await;

        info!(task_id = %id, cm = %cm_name, "task submitted");
        Ok(id)
    }

    /// Snapshot of a task, or `NotFound`.
    pub async fn status(&self, id: Uuid) -> Result<TaskRecord, ApiError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ApiError::unknown_task(id))
    }

    /// Artifact reference of a finished task. Only `success` tasks with a
    /// stored file qualify; everything else is `NotAvailable`.
    pub async fn download_ref(&self, id: Uuid) -> Result<ArtifactRef, ApiError> {
        let record = self.status(id).await?;
        if record.status != TaskStatus::Success {
            return Err(ApiError::NotAvailable(id.to_string()));
        }
        record
            .artifact
            .ok_or_else(|| ApiError::NotAvailable(id.to_string()))
    }

    /// Artifact reference plus an open handle for streaming.
    pub async fn download(&self, id: Uuid) -> Result<(ArtifactRef, tokio::fs::File), ApiError> {
        let artifact = self.download_ref(id).await?;
        let file = self.artifacts.open(&artifact).await?;
        Ok((artifact, file))
    }

    /// Delete a task: abort its worker if still live, drop the record and
    /// release its artifact files. Deleting an unknown id (including a second
    /// delete of the same id) is `NotFound`.
    pub async fn delete(&self, id: Uuid) -> Result<TaskRecord, ApiError> {
        if self.pool.abort(id).await {
            debug!(task_id = %id, "aborted worker of deleted task");
        }
        let record = self.store.remove(id).await?;
        self.artifacts.remove(id).await?;
        info!(task_id = %id, cm = %record.cm_name, "task deleted");
        Ok(record)
    }

    /// Worker body. Runs on the execution pool under a concurrency permit.
    async fn run_task(&self, id: Uuid, module: Arc<dyn CalculationModule>, params: Value) {
        match self.store.mark_running(id).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                // Deleted between submission and pickup.
                return;
            }
            Err(e) => {
                warn!(task_id = %id, "could not mark task running: {}", e);
                return;
            }
        }
        debug!(task_id = %id, cm = %module.name(), "task running");

        match self.execute(id, module.as_ref(), &params).await {
            Ok((result, artifact)) => {
                if let Err(e) = self.store.mark_success(id, result, artifact).await {
                    warn!(task_id = %id, "could not record task success: {}", e);
                }
            }
            Err(e) => {
                info!(task_id = %id, "task failed: {}", e);
                if let Err(e) = self.store.mark_failed(id, e.to_string()).await {
                    warn!(task_id = %id, "could not record task failure: {}", e);
                }
            }
        }
    }

    async fn execute(
        &self,
        id: Uuid,
        module: &dyn CalculationModule,
        params: &Value,
    ) -> Result<(Value, Option<ArtifactRef>), CmError> {
        let outcome = module.execute(id, params).await?;
        let artifact = match outcome.artifact {
            Some(artifact) => Some(self.artifacts.store(id, &artifact).await?),
            None => None,
        };
        let result = serde_json::to_value(&outcome.output)
            .map_err(|e| CmError::Calculation(format!("result serialization failed: {}", e)))?;
        Ok((result, artifact))
    }

    /// Purge terminal tasks not updated within the retention window, together
    /// with their artifact files.
    pub async fn sweep_expired(&self, retention: Duration) {
        let window = match chrono::Duration::from_std(retention) {
            Ok(window) => window,
            Err(_) => return,
        };
        let cutoff = chrono::Utc::now() - window;
        match self.store.purge_terminal_older_than(cutoff).await {
            Ok(purged) => {
                for record in &purged {
                    if let Err(e) = self.artifacts.remove(record.id).await {
                        warn!(task_id = %record.id, "failed to remove purged artifacts: {}", e);
                    }
                }
                if !purged.is_empty() {
                    info!(count = purged.len(), "purged expired tasks");
                }
            }
            Err(e) => warn!("retention sweep failed: {}", e),
        }
    }

    /// Background retention loop, spawned only when a retention window is
    /// configured.
    pub fn start_retention_sweep(
        self: &Arc<Self>,
        retention: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        info!(hours = retention.as_secs() / 3600, "task retention sweep enabled");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                dispatcher.sweep_expired(retention).await;
            }
        })
    }
}
