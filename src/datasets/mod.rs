//! Dataset catalog: the read-side inventory of the mapping platform.
//!
//! The catalog describes the datasets the map can render (rasters and
//! vectors, their variables and time periods, their legends) and the
//! selection-area levels. It ships embedded in the binary and can be
//! refreshed from a remote dataset server at startup; an unreachable remote
//! only logs a warning and leaves the embedded inventory in place.

pub mod client;
pub mod layers;

pub use client::DatasetServerClient;
pub use layers::{LayerName, LayerNameError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const CATALOG_JSON: &str = include_str!("catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog document is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("dataset '{dataset}' has no variable '{variable}'")]
    UnknownVariable { dataset: String, variable: String },

    #[error("dataset '{dataset}' has no time period '{period}'")]
    UnknownPeriod { dataset: String, period: String },

    #[error("no legend for layer '{0}'")]
    NoLegend(String),
}

/// A selection-area level offered to the frontend, e.g. NUTS3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub title: String,
}

/// A known region code with its display name and centroid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub title: String,
    pub lon: f64,
    pub lat: f64,
}

/// One renderable dataset.
///
/// `area_values` are per-region sample aggregates used by the calculation
/// modules; they are catalog-internal and never serialized to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub title: String,
    pub is_raster: bool,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub time_periods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variable_legends: BTreeMap<String, Value>,
    #[serde(default, skip_serializing)]
    pub area_values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetCatalog {
    #[serde(default)]
    areas: Vec<Area>,
    #[serde(default)]
    regions: Vec<Region>,
    datasets: Vec<Dataset>,
}

impl DatasetCatalog {
    /// Catalog compiled into the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(CATALOG_JSON)?)
    }

    pub fn list(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn get(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id == id)
    }

    pub fn region(&self, code: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.code == code)
    }

    /// Per-region sample values of a dataset, for CM consumption.
    pub fn area_values(&self, id: &str) -> Option<&BTreeMap<String, f64>> {
        self.get(id).map(|d| &d.area_values)
    }

    /// Resolve a dataset to its renderable layer name.
    ///
    /// A missing variable falls back to the dataset's first variable, a
    /// missing time period to its most recent one. Supplying a variable or
    /// period the dataset does not declare is an error.
    pub fn layer_name(
        &self,
        id: &str,
        variable: Option<&str>,
        time_period: Option<&str>,
    ) -> Result<LayerName, CatalogError> {
        let dataset = self
            .get(id)
            .ok_or_else(|| CatalogError::UnknownDataset(id.to_string()))?;

        let variable = match variable {
            Some(v) => {
                if !dataset.variables.iter().any(|known| known == v) {
                    return Err(CatalogError::UnknownVariable {
                        dataset: id.to_string(),
                        variable: v.to_string(),
                    });
                }
                Some(v.to_string())
            }
            None => dataset.variables.first().cloned(),
        };

        let time_period = match time_period {
            Some(p) => {
                if !dataset.time_periods.iter().any(|known| known == p) {
                    return Err(CatalogError::UnknownPeriod {
                        dataset: id.to_string(),
                        period: p.to_string(),
                    });
                }
                Some(p.to_string())
            }
            None => dataset.time_periods.last().cloned(),
        };

        // A period is only addressable underneath a variable.
        let time_period = if variable.is_some() { time_period } else { None };

        Ok(if dataset.is_raster {
            LayerName::Raster {
                dataset: id.to_string(),
                variable,
                time_period,
            }
        } else {
            LayerName::Vector {
                dataset: id.to_string(),
                variable,
                time_period,
            }
        })
    }

    /// Legend of a dataset layer. `cm/...` layers are resolved from the
    /// owning task's result, not here.
    pub fn legend(&self, layer: &LayerName) -> Result<&Value, CatalogError> {
        let (dataset_id, variable) = match layer {
            LayerName::Raster {
                dataset, variable, ..
            }
            | LayerName::Vector {
                dataset, variable, ..
            } => (dataset, variable),
            other => return Err(CatalogError::NoLegend(other.to_string())),
        };

        let dataset = self
            .get(dataset_id)
            .ok_or_else(|| CatalogError::UnknownDataset(dataset_id.clone()))?;
        if let Some(variable) = variable {
            if let Some(legend) = dataset.variable_legends.get(variable) {
                return Ok(legend);
            }
        }
        dataset
            .legend
            .as_ref()
            .ok_or_else(|| CatalogError::NoLegend(layer.to_string()))
    }

    /// Fold remote dataset metadata into the catalog. Remote entries win on
    /// shared ids, but embedded sample values survive when the remote entry
    /// carries none.
    pub fn merge(&mut self, remote: Vec<Dataset>) {
        for dataset in remote {
            match self.datasets.iter_mut().find(|d| d.id == dataset.id) {
                Some(existing) => {
                    let samples = std::mem::take(&mut existing.area_values);
                    *existing = dataset;
                    if existing.area_values.is_empty() {
                        existing.area_values = samples;
                    }
                }
                None => self.datasets.push(dataset),
            }
        }
    }
}
