//! Calculation modules (CMs).
//!
//! A CM is a named energy-simulation backend: it declares a parameter schema,
//! receives a validated parameter object and produces a result document
//! (named values, chart series, renderable layers, an optional legend) plus
//! an optional downloadable file. CMs never talk HTTP themselves; the task
//! dispatcher runs them on the worker pool and captures their outcome into
//! the task record.

pub mod buildingload;
pub mod heat_demand;
pub mod multiply;
pub mod registry;
pub mod schema;

pub use buildingload::BuildingLoad;
pub use heat_demand::HeatDemand;
pub use multiply::MultiplyRaster;
pub use registry::CmRegistry;
pub use schema::{ParameterSchema, SchemaError};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Worker-side execution error. Never surfaces to the submitting client;
/// the dispatcher captures it into the task record's error detail.
#[derive(Debug, Error)]
pub enum CmError {
    /// Parameters passed the schema but are unusable for this calculation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The calculation itself failed.
    #[error("calculation failed: {0}")]
    Calculation(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Result document of a CM run.
///
/// Mirrors the document the map frontend consumes: `values` are named
/// indicators; `graphs` are chart definitions; `geofiles` map display names
/// to renderable layer names; `legend` describes the symbology of the
/// produced layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmOutput {
    pub values: Map<String, Value>,
    pub graphs: Vec<Value>,
    pub geofiles: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Value>,
}

impl CmOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named indicator to the `values` section.
    pub fn add_value(&mut self, label: &str, value: impl Into<Value>) {
        self.values.insert(label.to_string(), value.into());
    }

    /// Add a chart definition to the `graphs` section.
    pub fn add_graph(&mut self, graph: Value) {
        self.graphs.push(graph);
    }

    /// Reference a renderable layer under a display name.
    pub fn add_geofile(&mut self, name: &str, layer_name: &str) {
        self.geofiles
            .insert(name.to_string(), Value::String(layer_name.to_string()));
    }
}

/// A downloadable file produced by a CM run.
#[derive(Debug, Clone)]
pub struct CmArtifact {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl CmArtifact {
    pub fn new(filename: &str, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        }
    }
}

/// Everything a finished CM run hands back to the dispatcher.
#[derive(Debug, Clone)]
pub struct CmOutcome {
    pub output: CmOutput,
    pub artifact: Option<CmArtifact>,
}

impl CmOutcome {
    pub fn new(output: CmOutput) -> Self {
        Self {
            output,
            artifact: None,
        }
    }

    pub fn with_artifact(output: CmOutput, artifact: CmArtifact) -> Self {
        Self {
            output,
            artifact: Some(artifact),
        }
    }
}

/// A named calculation backend.
#[async_trait]
pub trait CalculationModule: Send + Sync {
    /// Stable registry name, e.g. `cm_heat_demand`.
    fn name(&self) -> &str;

    /// Human-facing display name.
    fn pretty_name(&self) -> &str;

    /// Parameter schema submissions are validated against.
    fn schema(&self) -> &ParameterSchema;

    /// Whether a successful run yields a downloadable file.
    fn produces_artifact(&self) -> bool;

    /// Run the calculation. `params` has already passed schema validation;
    /// `task_id` names the owning task so produced layers can reference it.
    async fn execute(&self, task_id: Uuid, params: &Value) -> Result<CmOutcome, CmError>;
}

/// Fetch a required numeric parameter from a validated parameter object.
pub(crate) fn require_f64(params: &Value, key: &str) -> Result<f64, CmError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| CmError::InvalidInput(format!("missing numeric parameter '{}'", key)))
}

pub(crate) fn require_i64(params: &Value, key: &str) -> Result<i64, CmError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| CmError::InvalidInput(format!("missing integer parameter '{}'", key)))
}

pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, CmError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CmError::InvalidInput(format!("missing string parameter '{}'", key)))
}

/// Build a bar-chart definition in the document shape the frontend renders.
pub(crate) fn bar_graph(x_label: &str, y_label: &str, labels: &[String], data: &[f64]) -> Value {
    serde_json::json!({
        "xLabel": x_label,
        "yLabel": y_label,
        "type": "bar",
        "data": {
            "labels": labels,
            "datasets": [{
                "label": y_label,
                "backgroundColor": ["#3e95cd"],
                "data": data,
            }],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_document_shape() {
        let mut output = CmOutput::new();
        output.add_value("Total potential (GWh)", 12.5);
        output.add_graph(bar_graph(
            "Zone",
            "GWh",
            &["AT13".to_string()],
            &[12.5],
        ));
        output.add_geofile("Qualifying areas", "cm/cm_heat_demand/abc");

        let doc = serde_json::to_value(&output).unwrap();
        assert_eq!(doc["values"]["Total potential (GWh)"], 12.5);
        assert_eq!(doc["graphs"][0]["type"], "bar");
        assert_eq!(doc["geofiles"]["Qualifying areas"], "cm/cm_heat_demand/abc");
        assert!(doc.get("legend").is_none());
    }

    #[test]
    fn test_bar_graph_aligns_labels_and_data() {
        let graph = bar_graph(
            "Month",
            "kWh",
            &["Jan".to_string(), "Feb".to_string()],
            &[10.0, 20.0],
        );
        assert_eq!(graph["data"]["labels"].as_array().unwrap().len(), 2);
        assert_eq!(
            graph["data"]["datasets"][0]["data"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }
}
