//! Calculation-module route handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{Json, Response};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::ApiError;
use crate::task::{ArtifactRef, TaskRecord};

use super::routes::AppState;
use super::types::{
    CmInfo, CmListResponse, DeleteTaskResponse, SubmitTaskResponse, TaskSnapshotResponse,
};

/// List the registered calculation modules with their parameter schemas.
pub async fn list_cms(State(state): State<Arc<AppState>>) -> Json<CmListResponse> {
    let cms = state
        .registry
        .list()
        .into_iter()
        .map(|module| CmInfo {
            name: module.name().to_string(),
            pretty_name: module.pretty_name().to_string(),
            schema: module.schema().document().clone(),
        })
        .collect();
    Json(CmListResponse { cms })
}

/// Submit a task to a calculation module. The body is the parameter object.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<SubmitTaskResponse>, ApiError> {
    let task_id = state.dispatcher.submit(&name, params).await?;
    Ok(Json(SubmitTaskResponse { task_id }))
}

/// Fetch a task snapshot.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path((name, task_id)): Path<(String, Uuid)>,
) -> Result<Json<TaskSnapshotResponse>, ApiError> {
    let record = owned_task(&state, &name, task_id).await?;
    Ok(Json(record.into()))
}

/// Delete a task, aborting its worker if still live.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path((name, task_id)): Path<(String, Uuid)>,
) -> Result<Json<DeleteTaskResponse>, ApiError> {
    owned_task(&state, &name, task_id).await?;
    state.dispatcher.delete(task_id).await?;
    Ok(Json(DeleteTaskResponse {
        task_id,
        deleted: true,
    }))
}

/// Stream a task's artifact. The route also answers `HEAD`, returning the
/// headers without opening the file.
pub async fn download_task(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path((name, task_id)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    owned_task(&state, &name, task_id).await?;

    if method == Method::HEAD {
        let artifact = state.dispatcher.download_ref(task_id).await?;
        return artifact_response(&artifact, Body::empty());
    }

    let (artifact, file) = state.dispatcher.download(task_id).await?;
    let stream = ReaderStream::new(file);
    artifact_response(&artifact, Body::from_stream(stream))
}

/// Resolve a task and check it belongs to the CM named in the path. A task
/// reached through the wrong CM's URL does not exist as far as the client
/// can tell.
async fn owned_task(
    state: &AppState,
    cm_name: &str,
    task_id: Uuid,
) -> Result<TaskRecord, ApiError> {
    let record = state.dispatcher.status(task_id).await?;
    if record.cm_name != cm_name {
        return Err(ApiError::unknown_task(task_id));
    }
    Ok(record)
}

fn artifact_response(artifact: &ArtifactRef, body: Body) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &artifact.content_type)
        .header(header::CONTENT_LENGTH, artifact.size)
        .header(header::ETAG, format!("\"{}\"", artifact.sha256))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        )
        .body(body)
        .map_err(|e| ApiError::Internal(format!("failed to build download response: {}", e)))
}
