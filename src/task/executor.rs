//! Bounded worker pool for calculation-module execution.
//!
//! Submissions return immediately; the pool caps how many workers hold a
//! permit at once, so a burst of submissions queues instead of saturating
//! the host.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct ExecutionPool {
    width: usize,
    permits: Arc<Semaphore>,
    workers: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
}

impl ExecutionPool {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            permits: Arc::new(Semaphore::new(width)),
            workers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Queue a worker for a task. The worker starts once a permit frees up;
    /// this call itself never waits on pool width.
    pub async fn spawn<F>(&self, id: Uuid, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let workers = self.workers.clone();

        // The map lock is held across the spawn so the handle is registered
        // before the worker can attempt its own removal.
        let mut guard = self.workers.write().await;
        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            work.await;
            workers.write().await.remove(&id);
        });
        guard.insert(id, handle);
    }

    /// Abort the worker for a task, whether queued or mid-execution.
    /// Returns false when no worker is registered for the id.
    pub async fn abort(&self, id: Uuid) -> bool {
        match self.workers.write().await.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, id: Uuid) -> bool {
        self.workers.read().await.contains_key(&id)
    }

    pub async fn active_count(&self) -> usize {
        self.workers.read().await.len()
    }
}
