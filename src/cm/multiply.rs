//! Zonal statistics of a raster dataset scaled by an integer factor.
//!
//! `count` reports how many areas contributed; the other indicators are
//! multiplied by the factor. Produces no downloadable file.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::datasets::DatasetCatalog;

use super::schema::{ParameterSchema, SchemaError};
use super::{require_i64, require_str, CalculationModule, CmError, CmOutcome, CmOutput};

const SCHEMA: &str = include_str!("schemas/multiply_raster.json");

/// Indicators that scale with the factor. `count` never does.
const SCALED_STATS: [&str; 4] = ["min", "max", "mean", "median"];

pub struct MultiplyRaster {
    schema: ParameterSchema,
    catalog: Arc<DatasetCatalog>,
}

impl MultiplyRaster {
    pub fn new(catalog: Arc<DatasetCatalog>) -> Result<Self, SchemaError> {
        Ok(Self {
            schema: ParameterSchema::compile(SCHEMA)?,
            catalog,
        })
    }
}

#[async_trait]
impl CalculationModule for MultiplyRaster {
    fn name(&self) -> &str {
        "multiply_raster"
    }

    fn pretty_name(&self) -> &str {
        "Multiply raster statistics"
    }

    fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    fn produces_artifact(&self) -> bool {
        false
    }

    async fn execute(&self, _task_id: Uuid, params: &Value) -> Result<CmOutcome, CmError> {
        let factor = require_i64(params, "factor")? as f64;
        let dataset_id = require_str(params, "dataset")?;

        let dataset = self
            .catalog
            .get(dataset_id)
            .ok_or_else(|| CmError::InvalidInput(format!("unknown dataset '{}'", dataset_id)))?;
        if !dataset.is_raster {
            return Err(CmError::InvalidInput(format!(
                "dataset '{}' is not a raster",
                dataset_id
            )));
        }

        let values = self
            .catalog
            .area_values(dataset_id)
            .filter(|values| !values.is_empty())
            .ok_or_else(|| {
                CmError::Calculation(format!("dataset '{}' has no sample values", dataset_id))
            })?;

        let mut samples: Vec<f64> = values.values().copied().collect();
        samples.sort_by(f64::total_cmp);

        let count = samples.len();
        let min = samples[0];
        let max = samples[count - 1];
        let mean = samples.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 1 {
            samples[count / 2]
        } else {
            (samples[count / 2 - 1] + samples[count / 2]) / 2.0
        };

        let mut output = CmOutput::new();
        for (stat, value) in SCALED_STATS.iter().copied().zip([min, max, mean, median]) {
            output.add_value(stat, round2(value * factor));
        }
        output.add_value("count", count as u64);
        Ok(CmOutcome::new(output))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module() -> MultiplyRaster {
        let catalog = Arc::new(DatasetCatalog::embedded().unwrap());
        MultiplyRaster::new(catalog).unwrap()
    }

    #[tokio::test]
    async fn test_factor_scales_all_but_count() {
        let module = module();
        let base = module
            .execute(
                Uuid::new_v4(),
                &json!({"factor": 1, "dataset": "heat_density_total"}),
            )
            .await
            .unwrap();
        let doubled = module
            .execute(
                Uuid::new_v4(),
                &json!({"factor": 2, "dataset": "heat_density_total"}),
            )
            .await
            .unwrap();

        for stat in SCALED_STATS {
            let single = base.output.values[stat].as_f64().unwrap();
            let twice = doubled.output.values[stat].as_f64().unwrap();
            assert!((twice - 2.0 * single).abs() < 0.011, "{} not scaled", stat);
        }
        assert_eq!(base.output.values["count"], doubled.output.values["count"]);
    }

    #[tokio::test]
    async fn test_median_between_min_and_max() {
        let module = module();
        let outcome = module
            .execute(Uuid::new_v4(), &module.schema().defaults())
            .await
            .unwrap();
        let values = &outcome.output.values;
        let min = values["min"].as_f64().unwrap();
        let max = values["max"].as_f64().unwrap();
        let median = values["median"].as_f64().unwrap();
        assert!(min <= median && median <= max);
    }

    #[tokio::test]
    async fn test_no_artifact_declared_or_produced() {
        let module = module();
        assert!(!module.produces_artifact());
        let outcome = module
            .execute(Uuid::new_v4(), &module.schema().defaults())
            .await
            .unwrap();
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_unknown_dataset_is_invalid_input() {
        let module = module();
        let err = module
            .execute(Uuid::new_v4(), &json!({"factor": 2, "dataset": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CmError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_vector_dataset_is_rejected() {
        let module = module();
        let err = module
            .execute(
                Uuid::new_v4(),
                &json!({"factor": 2, "dataset": "electricity_generation"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CmError::InvalidInput(_)));
    }
}
