//! District-heating potential.
//!
//! Filters the catalog's per-area yearly heat demand by a threshold: areas at
//! or above it count towards the district-heating potential. Reports the
//! total potential against the total demand, a per-area bar graph and a
//! legend for the produced layer, and writes the qualifying areas as a
//! GeoJSON download.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::datasets::layers::LayerName;
use crate::datasets::DatasetCatalog;

use super::schema::{ParameterSchema, SchemaError};
use super::{
    bar_graph, require_f64, CalculationModule, CmArtifact, CmError, CmOutcome, CmOutput,
};

const SCHEMA: &str = include_str!("schemas/cm_heat_demand.json");

/// Dataset the per-area demand figures come from.
const DEMAND_DATASET: &str = "heat_density_total";

/// Plasma-like color ramp for the potential legend, dark to bright.
const LEGEND_COLORS: [(f64, f64, f64); 4] = [
    (13.0, 8.0, 135.0),
    (156.0, 23.0, 158.0),
    (237.0, 121.0, 83.0),
    (240.0, 249.0, 33.0),
];

pub struct HeatDemand {
    schema: ParameterSchema,
    catalog: Arc<DatasetCatalog>,
}

impl HeatDemand {
    pub fn new(catalog: Arc<DatasetCatalog>) -> Result<Self, SchemaError> {
        Ok(Self {
            schema: ParameterSchema::compile(SCHEMA)?,
            catalog,
        })
    }
}

#[async_trait]
impl CalculationModule for HeatDemand {
    fn name(&self) -> &str {
        "cm_heat_demand"
    }

    fn pretty_name(&self) -> &str {
        "District heating potential"
    }

    fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    fn produces_artifact(&self) -> bool {
        true
    }

    async fn execute(&self, task_id: Uuid, params: &Value) -> Result<CmOutcome, CmError> {
        let threshold = require_f64(params, "threshold")?;
        let selected: Vec<&str> = params
            .get("areas")
            .and_then(Value::as_array)
            .map(|areas| areas.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let demands = self.catalog.area_values(DEMAND_DATASET).ok_or_else(|| {
            CmError::Calculation(format!("dataset '{}' missing from the catalog", DEMAND_DATASET))
        })?;

        let mut considered: Vec<(&str, f64)> = demands
            .iter()
            .filter(|(code, _)| selected.is_empty() || selected.contains(&code.as_str()))
            .map(|(code, demand)| (code.as_str(), *demand))
            .collect();
        if considered.is_empty() {
            return Err(CmError::InvalidInput(
                "none of the selected areas is known".to_string(),
            ));
        }
        considered.sort_by(|a, b| b.1.total_cmp(&a.1));

        let total_demand: f64 = considered.iter().map(|(_, demand)| demand).sum();
        let qualifying: Vec<(&str, f64)> = considered
            .iter()
            .filter(|(_, demand)| *demand >= threshold)
            .copied()
            .collect();
        let total_potential: f64 = qualifying.iter().map(|(_, demand)| demand).sum();

        let layer = LayerName::cm(self.name(), task_id);

        let mut output = CmOutput::new();
        output.add_value("Total heat demand (GWh)", round2(total_demand));
        output.add_value("Total potential (GWh)", round2(total_potential));
        output.add_value("Qualifying areas", qualifying.len() as u64);
        if !qualifying.is_empty() {
            let labels: Vec<String> = qualifying.iter().map(|(code, _)| code.to_string()).collect();
            let potentials: Vec<f64> = qualifying.iter().map(|(_, demand)| *demand).collect();
            output.add_graph(bar_graph(
                "Area",
                "Potential (GWh)",
                &labels,
                &potentials,
            ));
            output.add_geofile("areas", &layer.to_string());
            output.legend = Some(potential_legend(&potentials));
        }

        let artifact = CmArtifact::new(
            "potential_areas.geojson",
            "application/geo+json",
            self.qualifying_geojson(&qualifying).to_string().into_bytes(),
        );
        Ok(CmOutcome::with_artifact(output, artifact))
    }
}

impl HeatDemand {
    /// FeatureCollection of the qualifying areas, one point feature per area
    /// (null geometry when the catalog knows no centroid for the code).
    fn qualifying_geojson(&self, qualifying: &[(&str, f64)]) -> Value {
        let features: Vec<Value> = qualifying
            .iter()
            .map(|(code, potential)| {
                let (geometry, title) = match self.catalog.region(code) {
                    Some(region) => (
                        json!({"type": "Point", "coordinates": [region.lon, region.lat]}),
                        Value::String(region.title.clone()),
                    ),
                    None => (Value::Null, Value::Null),
                };
                json!({
                    "type": "Feature",
                    "geometry": geometry,
                    "properties": {
                        "code": code,
                        "title": title,
                        "potential_gwh": round2(*potential),
                    },
                })
            })
            .collect();
        json!({"type": "FeatureCollection", "features": features})
    }
}

/// Legend for the potential layer: linear breaks over the observed range.
fn potential_legend(potentials: &[f64]) -> Value {
    let min = potentials.iter().copied().fold(f64::INFINITY, f64::min);
    let max = potentials.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let classes = LEGEND_COLORS.len();
    let step = if max > min {
        (max - min) / classes as f64
    } else {
        1.0
    };

    let symbology: Vec<Value> = LEGEND_COLORS
        .iter()
        .enumerate()
        .map(|(i, (red, green, blue))| {
            let value = min + step * i as f64;
            json!({
                "red": red,
                "green": green,
                "blue": blue,
                "opacity": 0.8,
                "value": round2(value),
                "label": format!("≥ {} GWh", value.round() as i64),
            })
        })
        .collect();

    json!({
        "name": "Potential district heating areas",
        "type": "custom",
        "symbology": symbology,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
