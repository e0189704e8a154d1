//! SQLite-based task store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, TaskStore};
use crate::task::{ArtifactRef, TaskRecord, TaskStatus};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    cm_name TEXT NOT NULL,
    params TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    result TEXT,
    error TEXT,
    artifact TEXT,
    submitted_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_submitted_at ON tasks(submitted_at DESC);
"#;

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(format!("failed to create store dir: {}", e)))?;
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| StoreError::Backend(format!("failed to open database: {}", e)))?;
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::Backend(format!("failed to run schema: {}", e)))?;
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Load the current status of a task inside a blocking section.
    fn current_status(conn: &Connection, id: Uuid) -> Result<TaskStatus, StoreError> {
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match status {
            Some(s) => Ok(parse_status(&s)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn guard_transition(conn: &Connection, id: Uuid, to: TaskStatus) -> Result<(), StoreError> {
        let from = Self::current_status(conn, id)?;
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition { id, from, to })
        }
    }
}

fn parse_status(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "success" => TaskStatus::Success,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let id_str: String = row.get(0)?;
    let params_json: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let result_json: Option<String> = row.get(4)?;
    let artifact_json: Option<String> = row.get(6)?;
    let submitted_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(TaskRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        cm_name: row.get(1)?,
        params: serde_json::from_str(&params_json).unwrap_or(Value::Null),
        status: parse_status(&status_str),
        result: result_json.and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get(5)?,
        artifact: artifact_json.and_then(|s| serde_json::from_str(&s).ok()),
        submitted_at: parse_timestamp(&submitted_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

const SELECT_COLUMNS: &str =
    "id, cm_name, params, status, result, error, artifact, submitted_at, updated_at";

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create(&self, record: TaskRecord) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let exists: bool = conn
                .prepare("SELECT 1 FROM tasks WHERE id = ?1")
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .exists(params![record.id.to_string()])
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if exists {
                return Err(StoreError::AlreadyExists(record.id));
            }

            let params_json = record.params.to_string();
            conn.execute(
                "INSERT INTO tasks (id, cm_name, params, status, submitted_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.cm_name,
                    params_json,
                    record.status.to_string(),
                    record.submitted_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", SELECT_COLUMNS),
                params![id.to_string()],
                row_to_record,
            )
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM tasks ORDER BY submitted_at DESC",
                    SELECT_COLUMNS
                ))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let tasks = stmt
                .query_map([], row_to_record)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(tasks)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn mark_running(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::guard_transition(&conn, id, TaskStatus::Running)?;
            conn.execute(
                "UPDATE tasks SET status = 'running', updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn mark_success(
        &self,
        id: Uuid,
        result: Value,
        artifact: Option<ArtifactRef>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::guard_transition(&conn, id, TaskStatus::Success)?;
            let artifact_json = match &artifact {
                Some(a) => Some(
                    serde_json::to_string(a)
                        .map_err(|e| StoreError::Backend(e.to_string()))?,
                ),
                None => None,
            };
            conn.execute(
                "UPDATE tasks SET status = 'success', result = ?2, artifact = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    result.to_string(),
                    artifact_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::guard_transition(&conn, id, TaskStatus::Failed)?;
            conn.execute(
                "UPDATE tasks SET status = 'failed', error = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), error, Utc::now().to_rfc3339()],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn remove(&self, id: Uuid) -> Result<TaskRecord, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let record = conn
                .query_row(
                    &format!("SELECT {} FROM tasks WHERE id = ?1", SELECT_COLUMNS),
                    params![id.to_string()],
                    row_to_record,
                )
                .optional()
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .ok_or(StoreError::NotFound(id))?;
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(record)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }

    async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM tasks WHERE status IN ('success', 'failed')",
                    SELECT_COLUMNS
                ))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let terminal: Vec<TaskRecord> = stmt
                .query_map([], row_to_record)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            // Timestamp comparison happens here, not in SQL, so the string
            // encoding of the column never affects the cutoff.
            let mut purged = Vec::new();
            for record in terminal {
                if record.updated_at < cutoff {
                    conn.execute(
                        "DELETE FROM tasks WHERE id = ?1",
                        params![record.id.to_string()],
                    )
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                    purged.push(record);
                }
            }
            Ok(purged)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store(dir: &std::path::Path) -> SqliteTaskStore {
        SqliteTaskStore::new(dir.join("tasks.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_with_result_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let record = TaskRecord::new(Uuid::new_v4(), "cm_heat_demand", json!({"threshold": 5.0}));
        let id = record.id;
        store.create(record).await.unwrap();
        store.mark_running(id).await.unwrap();

        let artifact = ArtifactRef {
            path: dir.path().join("out.geojson"),
            filename: "out.geojson".to_string(),
            content_type: "application/geo+json".to_string(),
            size: 9,
            sha256: "00".repeat(32),
        };
        store
            .mark_success(id, json!({"values": {"Total potential (GWh)": 3.0}}), Some(artifact))
            .await
            .unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Success);
        assert_eq!(loaded.cm_name, "cm_heat_demand");
        assert_eq!(loaded.params["threshold"], 5.0);
        assert_eq!(
            loaded.result.unwrap()["values"]["Total potential (GWh)"],
            3.0
        );
        let artifact = loaded.artifact.unwrap();
        assert_eq!(artifact.filename, "out.geojson");
        assert_eq!(artifact.size, 9);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = store(dir.path()).await;
            let record = TaskRecord::new(Uuid::new_v4(), "multiply_raster", json!({"factor": 3}));
            let id = record.id;
            store.create(record).await.unwrap();
            id
        };

        let reopened = store(dir.path()).await;
        let loaded = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.cm_name, "multiply_raster");
        assert_eq!(loaded.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_transitions_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let record = TaskRecord::new(Uuid::new_v4(), "cm_buildingload", json!({}));
        let id = record.id;
        store.create(record).await.unwrap();

        assert!(matches!(
            store.mark_success(id, json!({}), None).await,
            Err(StoreError::InvalidTransition { .. })
        ));

        store.mark_running(id).await.unwrap();
        store.mark_failed(id, "boom".to_string()).await.unwrap();
        assert!(matches!(
            store.mark_running(id).await,
            Err(StoreError::InvalidTransition { .. })
        ));

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_remove_returns_record_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let record = TaskRecord::new(Uuid::new_v4(), "cm_buildingload", json!({}));
        let id = record.id;
        store.create(record).await.unwrap();

        assert_eq!(store.remove(id).await.unwrap().id, id);
        assert!(matches!(
            store.remove(id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_respects_status_and_age() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let pending = TaskRecord::new(Uuid::new_v4(), "cm_buildingload", json!({}));
        store.create(pending.clone()).await.unwrap();

        let done = TaskRecord::new(Uuid::new_v4(), "cm_buildingload", json!({}));
        let done_id = done.id;
        store.create(done).await.unwrap();
        store.mark_running(done_id).await.unwrap();
        store.mark_success(done_id, json!({}), None).await.unwrap();

        let purged = store
            .purge_terminal_older_than(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(purged.is_empty());

        let purged = store
            .purge_terminal_older_than(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, done_id);
        assert!(store.get(pending.id).await.unwrap().is_some());
    }
}
