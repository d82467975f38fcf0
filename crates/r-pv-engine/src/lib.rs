//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "PV performance, sizing and financial modeling engine."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
pub mod api;
pub mod catalog;
pub mod errors;
pub mod financial;
pub mod geometry;
pub mod io;
pub mod model;
pub mod performance;
pub mod reports;
pub mod sizing;
pub mod solar;
pub mod temperature;
pub mod weather;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    api::ResolvedRequest,
    financial::{FinancialAnalyzer, FinancialInputs, FinancialResult},
    geometry::{ArrayGeometryResolver, ArrayLayout, ResolverSettings},
    model::{ArrayConfiguration, Inverter, Module, SiteLocation, SystemType},
    performance::{PerformanceProfile, PerformanceSimulator, SimulationSettings},
    reports::ReportExporter,
    sizing::{SizingStatus, SizingThresholds, SizingValidator},
    weather::{WeatherSeries, WeatherSummary},
};

pub use api::{CalculationRequest, CalculationResponse, CalculationService};
pub use catalog::DeviceCatalog;
pub use errors::{PvEngineError, Result};

/// Version stamped into every result and report.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tunables shared by every calculation of a process.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineSettings {
    pub resolver: ResolverSettings,
    pub simulation: SimulationSettings,
    pub thresholds: SizingThresholds,
}

/// Everything one calculation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub calculation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub engine_version: String,
    pub location: SiteLocation,
    pub module: Module,
    pub inverter: Inverter,
    pub system_type: SystemType,
    pub array: ArrayConfiguration,
    pub layout: ArrayLayout,
    pub performance: PerformanceProfile,
    pub sizing_status: SizingStatus,
    pub financial: FinancialResult,
    pub weather: WeatherSummary,
}

impl CalculationResult {
    pub fn exporter(&self) -> ReportExporter<'_> {
        ReportExporter::new(self)
    }
}

/// Run layout, simulation, sizing and finance for a resolved request.
///
/// Synchronous CPU work; weather must already be fetched.
pub fn calculate_with_weather(
    request: &ResolvedRequest,
    weather: &WeatherSeries,
    settings: &EngineSettings,
) -> Result<CalculationResult> {
    weather.validate()?;

    info!("Resolving array layout...");
    let layout = ArrayGeometryResolver::new(&request.module, &request.inverter, settings.resolver)
        .resolve(request.intent, request.gcr)?;
    let array = ArrayConfiguration {
        modules_per_string: layout.modules_per_string,
        strings_per_inverter: layout.strings_per_inverter,
        number_of_inverters: layout.number_of_inverters,
        tilt: request.tilt,
        azimuth: request.azimuth,
        gcr: request.gcr,
        mount_type: request.mount_type,
        temperature_model: request.temperature_model,
    };

    info!(
        total_modules = array.total_modules(),
        inverters = array.number_of_inverters,
        "Simulating hourly performance..."
    );
    let simulation = SimulationSettings {
        losses: request.losses,
        ..settings.simulation
    };
    let performance = PerformanceSimulator::new(
        &request.module,
        &request.inverter,
        &array,
        &request.location,
        simulation,
    )
    .run(weather)?;

    info!("Validating sizing...");
    let sizing_status = SizingValidator::new(&request.module, &request.inverter, settings.thresholds)
        .evaluate(layout.target_kw, &array, &performance, &layout.warnings);

    info!("Running financial analysis...");
    let financial = FinancialAnalyzer::analyze(&FinancialInputs {
        annual_energy: performance.annual_energy,
        system_kw: performance.dc_nameplate_kw,
        ..request.financial
    })?;

    Ok(CalculationResult {
        calculation_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        engine_version: ENGINE_VERSION.to_owned(),
        location: request.location.clone(),
        module: request.module.clone(),
        inverter: request.inverter.clone(),
        system_type: request.system_type,
        array,
        layout,
        performance,
        sizing_status,
        financial,
        weather: weather.summary(),
    })
}
