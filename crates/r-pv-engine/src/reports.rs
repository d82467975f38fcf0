//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "JSON report export for calculation results."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::{fs, path::Path};

use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    api::{SystemOutput, WeatherData},
    errors::Result,
    performance::HourlySeries,
    sizing::SizingStatus,
    CalculationResult,
};

#[derive(Debug)]
pub struct ReportExporter<'a> {
    result: &'a CalculationResult,
}

impl<'a> ReportExporter<'a> {
    pub fn new(result: &'a CalculationResult) -> Self {
        Self { result }
    }

    pub fn export_all(&self, output_dir: &Path) -> Result<()> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir)?;
        }

        let timestamp = self.result.timestamp.to_rfc3339();
        let version = self.result.engine_version.as_str();
        let id = self.result.calculation_id;

        let system = SystemAnalysisReport {
            summary: SystemOutput::from(self.result),
            sizing_status: &self.result.sizing_status,
            hourly: &self.result.performance.hourly,
        };
        let weather = WeatherData {
            summary: self.result.weather.clone(),
            monthly_energy: self.result.performance.monthly_energy.clone(),
        };

        write_json(
            output_dir.join("system_analysis.json"),
            &ReportEnvelope::new(&timestamp, version, id, system_analysis_schema(), &system),
        )?;
        write_json(
            output_dir.join("financial_metrics.json"),
            &ReportEnvelope::new(
                &timestamp,
                version,
                id,
                financial_metrics_schema(),
                &self.result.financial,
            ),
        )?;
        write_json(
            output_dir.join("weather_data.json"),
            &ReportEnvelope::new(&timestamp, version, id, weather_data_schema(), &weather),
        )?;

        info!("Reports exported to {}", output_dir.display());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SystemAnalysisReport<'a> {
    #[serde(flatten)]
    summary: SystemOutput,
    sizing_status: &'a SizingStatus,
    hourly: &'a HourlySeries,
}

#[derive(Debug, Serialize)]
struct ReportEnvelope<'a, T: Serialize> {
    timestamp: &'a str,
    engine_version: &'a str,
    calculation_id: Uuid,
    schema: serde_json::Value,
    data: &'a T,
}

impl<'a, T: Serialize> ReportEnvelope<'a, T> {
    fn new(
        timestamp: &'a str,
        engine_version: &'a str,
        calculation_id: Uuid,
        schema: serde_json::Value,
        data: &'a T,
    ) -> Self {
        Self {
            timestamp,
            engine_version,
            calculation_id,
            schema,
            data,
        }
    }
}

fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn number_array(len: usize) -> serde_json::Value {
    json!({"type": "array", "items": {"type": "number"}, "minItems": len, "maxItems": len})
}

fn system_analysis_schema() -> serde_json::Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "SystemAnalysisReport",
        "type": "object",
        "properties": {
            "annual_energy": {"type": "number"},
            "peak_dc_power": {"type": "number"},
            "peak_ac_power": {"type": "number"},
            "performance_ratio": {"type": "number"},
            "capacity_factor": {"type": "number"},
            "specific_yield": {"type": "number"},
            "modules_per_string": {"type": "integer", "minimum": 1},
            "strings_per_inverter": {"type": "integer", "minimum": 1},
            "number_of_inverters": {"type": "integer", "minimum": 1},
            "total_modules": {"type": "integer", "minimum": 1},
            "dc_ac_ratio": {"type": "number"},
            "system_size": {"type": "number"},
            "min_design_temp": {"type": "number"},
            "max_design_temp": {"type": "number"},
            "daily_energy": number_array(365),
            "monthly_energy": number_array(12),
            "hourly_profile": number_array(24),
            "sizing_status": {
                "type": "object",
                "properties": {
                    "status": {"enum": ["ok", "undersized", "oversized"]},
                    "message": {"type": "string"},
                    "warnings": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["status", "message", "warnings"]
            },
            "hourly": {
                "type": "object",
                "properties": {
                    "effective_irradiance": number_array(8760),
                    "cell_temperature": number_array(8760),
                    "dc_power": number_array(8760),
                    "ac_power": number_array(8760)
                },
                "required": ["effective_irradiance", "cell_temperature", "dc_power", "ac_power"]
            }
        },
        "required": [
            "annual_energy",
            "peak_dc_power",
            "peak_ac_power",
            "performance_ratio",
            "capacity_factor",
            "specific_yield",
            "modules_per_string",
            "strings_per_inverter",
            "number_of_inverters",
            "dc_ac_ratio",
            "daily_energy",
            "monthly_energy",
            "sizing_status"
        ]
    })
}

fn financial_metrics_schema() -> serde_json::Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "FinancialMetricsReport",
        "type": "object",
        "properties": {
            "annual_savings": {"type": "number"},
            "simple_payback": {"type": ["number", "null"]},
            "lcoe": {"type": ["number", "null"]},
            "net_present_value": {"type": "number"},
            "co2_savings": {"type": "number"},
            "cumulative_cash_flow": {"type": "array", "items": {"type": "number"}, "minItems": 2},
            "annual_cash_flows": {"type": "array", "items": {"type": "number"}},
            "net_cost": {"type": "number"},
            "cost_breakdown": {
                "type": "object",
                "properties": {
                    "module": {"type": "number"},
                    "inverter": {"type": "number"},
                    "balance_of_system": {"type": "number"},
                    "installation": {"type": "number"},
                    "soft_costs": {"type": "number"},
                    "land": {"type": "number"},
                    "total_installed": {"type": "number"},
                    "total": {"type": "number"}
                },
                "required": ["total_installed", "total"]
            }
        },
        "required": [
            "annual_savings",
            "simple_payback",
            "lcoe",
            "net_present_value",
            "co2_savings",
            "cumulative_cash_flow"
        ]
    })
}

fn weather_data_schema() -> serde_json::Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "WeatherDataReport",
        "type": "object",
        "properties": {
            "source": {"type": "string"},
            "monthly_ghi": number_array(12),
            "monthly_temperature": number_array(12),
            "monthly_wind_speed": number_array(12),
            "monthly_energy": number_array(12),
            "annual_ghi": {"type": "number"},
            "hourly_detail": {"type": "boolean"},
            "utc_offset": {"type": "number"}
        },
        "required": ["source", "monthly_ghi", "monthly_temperature", "monthly_energy"]
    })
}
