//! Building heat-load estimation.
//!
//! Computes the yearly useful heat demand and peak load of a single building
//! from its size, type and construction period, splits the demand over the
//! months of a degree-day profile and ships the profile as a CSV download.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::schema::{ParameterSchema, SchemaError};
use super::{
    bar_graph, require_f64, require_i64, require_str, CalculationModule, CmArtifact, CmError,
    CmOutcome, CmOutput,
};

const SCHEMA: &str = include_str!("schemas/cm_buildingload.json");

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Share of the yearly heating demand falling into each month, derived from
/// a central-European heating-degree-day profile. Sums to 1.
const MONTHLY_DEMAND_SHARE: [f64; 12] = [
    0.170, 0.140, 0.115, 0.070, 0.025, 0.005, 0.000, 0.000, 0.020, 0.085, 0.140, 0.230,
];

/// Specific useful heat demand in kWh/(m²·a) by building type and
/// construction period. Periods are keyed by their last year.
fn specific_demand(building_type: &str, construction_year: i64) -> Option<f64> {
    let periods: &[(i64, f64)] = match building_type {
        "SFH" => &[
            (1944, 180.0),
            (1979, 160.0),
            (1999, 120.0),
            (2009, 90.0),
            (i64::MAX, 60.0),
        ],
        "MFH" => &[
            (1944, 150.0),
            (1979, 135.0),
            (1999, 105.0),
            (2009, 80.0),
            (i64::MAX, 50.0),
        ],
        "AB" => &[
            (1944, 130.0),
            (1979, 120.0),
            (1999, 95.0),
            (2009, 70.0),
            (i64::MAX, 45.0),
        ],
        "TH" => &[
            (1944, 165.0),
            (1979, 150.0),
            (1999, 110.0),
            (2009, 85.0),
            (i64::MAX, 55.0),
        ],
        _ => return None,
    };
    periods
        .iter()
        .find(|(until, _)| construction_year <= *until)
        .map(|(_, kwh)| *kwh)
}

/// Equivalent full-load hours used to derive the peak load.
fn full_load_hours(building_type: &str) -> f64 {
    match building_type {
        "SFH" | "TH" => 2100.0,
        _ => 1800.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct BuildingLoad {
    schema: ParameterSchema,
}

impl BuildingLoad {
    pub fn new() -> Result<Self, SchemaError> {
        Ok(Self {
            schema: ParameterSchema::compile(SCHEMA)?,
        })
    }
}

#[async_trait]
impl CalculationModule for BuildingLoad {
    fn name(&self) -> &str {
        "cm_buildingload"
    }

    fn pretty_name(&self) -> &str {
        "Building heat load"
    }

    fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    fn produces_artifact(&self) -> bool {
        true
    }

    async fn execute(&self, _task_id: Uuid, params: &Value) -> Result<CmOutcome, CmError> {
        let floor_area = require_f64(params, "gross floor area")?;
        let stories = require_i64(params, "number of stories")?;
        let building_type = require_str(params, "building type")?;
        let construction_year = require_i64(params, "construction year")?;
        let heated_share = require_f64(params, "heated share")?;

        let specific = specific_demand(building_type, construction_year).ok_or_else(|| {
            CmError::InvalidInput(format!("unknown building type '{}'", building_type))
        })?;

        let heated_area = floor_area * stories as f64 * heated_share;
        let yearly_demand_kwh = heated_area * specific;
        let peak_load_kw = yearly_demand_kwh / full_load_hours(building_type);

        let monthly_kwh: Vec<f64> = MONTHLY_DEMAND_SHARE
            .iter()
            .map(|share| round2(yearly_demand_kwh * share))
            .collect();

        let mut output = CmOutput::new();
        output.add_value("Heated gross floor area (m²)", round2(heated_area));
        output.add_value("Specific heat demand (kWh/m²)", specific);
        output.add_value(
            "Yearly heat demand (MWh)",
            round2(yearly_demand_kwh / 1000.0),
        );
        output.add_value("Peak load (kW)", round2(peak_load_kw));
        let month_labels: Vec<String> = MONTHS.iter().map(|m| m.to_string()).collect();
        output.add_graph(bar_graph(
            "Month",
            "Heat demand (kWh)",
            &month_labels,
            &monthly_kwh,
        ));

        let artifact = CmArtifact::new(
            "monthly_load_profile.csv",
            "text/csv",
            load_profile_csv(&monthly_kwh).into_bytes(),
        );
        Ok(CmOutcome::with_artifact(output, artifact))
    }
}

fn load_profile_csv(monthly_kwh: &[f64]) -> String {
    let mut csv = String::from("month,heat_demand_kwh\n");
    for (month, demand) in MONTHS.iter().zip(monthly_kwh) {
        csv.push_str(&format!("{},{:.2}\n", month, demand));
    }
    csv
}
