//! Dataset catalog route handlers.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::datasets::{CatalogError, LayerName};
use crate::error::ApiError;

use super::routes::AppState;
use super::types::{AreaListResponse, DatasetListResponse};

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::UnknownDataset(id) => ApiError::NotFound(format!("dataset '{}'", id)),
            CatalogError::UnknownVariable { dataset, variable } => {
                ApiError::NotFound(format!("variable '{}' of dataset '{}'", variable, dataset))
            }
            CatalogError::UnknownPeriod { dataset, period } => {
                ApiError::NotFound(format!("time period '{}' of dataset '{}'", period, dataset))
            }
            CatalogError::NoLegend(layer) => {
                ApiError::NotFound(format!("legend for layer '{}'", layer))
            }
            CatalogError::Parse(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Full dataset inventory.
pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<DatasetListResponse> {
    Json(DatasetListResponse {
        datasets: state.catalog.list().to_vec(),
    })
}

/// Selection-area levels.
pub async fn list_areas(State(state): State<Arc<AppState>>) -> Json<AreaListResponse> {
    Json(AreaListResponse {
        areas: state.catalog.areas().to_vec(),
    })
}

/// Query parameters of the layer-name endpoint.
#[derive(Debug, Deserialize)]
pub struct LayerNameQuery {
    pub variable: Option<String>,
    pub time_period: Option<String>,
}

/// Resolve a dataset to its renderable layer name, as plain text.
pub async fn layer_name(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LayerNameQuery>,
) -> Result<String, ApiError> {
    let layer = state.catalog.layer_name(
        &id,
        query.variable.as_deref(),
        query.time_period.as_deref(),
    )?;
    Ok(layer.to_string())
}

/// Legend of a renderable layer. Dataset legends come from the catalog,
/// `cm/...` legends from the owning task's result document.
pub async fn legend(
    State(state): State<Arc<AppState>>,
    Path(layer_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let raw = layer_name.trim_start_matches('/');
    let layer =
        LayerName::from_str(raw).map_err(|_| ApiError::NotFound(format!("layer '{}'", raw)))?;

    match &layer {
        LayerName::Cm { cm_name, task_id } => {
            let record = state.dispatcher.status(*task_id).await?;
            if record.cm_name != *cm_name {
                return Err(ApiError::unknown_task(task_id));
            }
            let legend = record
                .result
                .as_ref()
                .and_then(|result| result.get("legend"))
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("legend for layer '{}'", raw)))?;
            Ok(Json(legend))
        }
        other => Ok(Json(state.catalog.legend(other)?.clone())),
    }
}
