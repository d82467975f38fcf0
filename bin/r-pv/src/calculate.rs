//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Calculation and weather commands."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use r_pv_common::AppConfig;
use r_pv_engine::{
    io::load_request,
    model::SiteLocation,
    weather::{fetch_weather, WeatherProvider},
    CalculationRequest, CalculationResponse, CalculationService, PvEngineError,
};
use r_pv_providers::{
    design_conditions_from_config, geocoder_from_config, weather_provider_from_config,
    FileWeatherProvider,
};
use tracing::info;

use crate::{context, print_json};

#[derive(Debug, Args)]
pub struct CalculateArgs {
    /// Request document (JSON or YAML); `-` reads standard input.
    #[arg(long, value_name = "FILE")]
    request: PathBuf,

    /// Write system, financial and weather reports to this directory.
    #[arg(long = "output-dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Weather file to use instead of the configured provider.
    #[arg(long, value_name = "FILE")]
    weather: Option<PathBuf>,

    /// Skip reverse geocoding of the site.
    #[arg(long = "no-geocode")]
    no_geocode: bool,

    /// Use the configured design temperatures instead of a site lookup.
    #[arg(long = "no-design-lookup")]
    no_design_lookup: bool,
}

#[derive(Debug, Args)]
pub struct WeatherArgs {
    #[arg(long, allow_negative_numbers = true)]
    latitude: f64,

    #[arg(long, allow_negative_numbers = true)]
    longitude: f64,

    /// Weather file to use instead of the configured provider.
    #[arg(long, value_name = "FILE")]
    weather: Option<PathBuf>,
}

fn provider(override_file: Option<&Path>, config: &AppConfig) -> Result<Arc<dyn WeatherProvider>> {
    match override_file {
        Some(path) => Ok(Arc::new(FileWeatherProvider::new(path))),
        None => weather_provider_from_config(&config.weather),
    }
}

fn read_request(path: &Path) -> Result<CalculationRequest> {
    if path.as_os_str() == "-" {
        let mut data = String::new();
        std::io::stdin()
            .read_to_string(&mut data)
            .context("failed to read request from stdin")?;
        return Ok(CalculationRequest::parse(&data)?);
    }
    load_request(path).with_context(|| format!("failed to load request {}", path.display()))
}

/// Prints the response document; any failure prints the failure document
/// and exits non-zero.
pub async fn run(args: CalculateArgs, config: &AppConfig) -> Result<()> {
    match calculate(&args, config).await {
        Ok(response) => print_json(&response),
        Err(err) => {
            print_json(&failure_document(&err))?;
            Err(err.context("calculation failed"))
        }
    }
}

async fn calculate(args: &CalculateArgs, config: &AppConfig) -> Result<CalculationResponse> {
    let request = read_request(&args.request)?;
    let catalog = Arc::new(context::catalog(&config.catalog)?);
    let weather = provider(args.weather.as_deref(), config)?;

    let mut service = CalculationService::new(catalog, weather, context::engine_settings(config))
        .with_fetch_policy(context::fetch_policy(config));
    if !args.no_geocode {
        if let Some(geocoder) = geocoder_from_config(&config.geocoding)? {
            service = service.with_geocoder(geocoder, config.geocoding.timeout);
        }
    }
    if !args.no_design_lookup {
        if let Some(source) = design_conditions_from_config(&config.design_conditions)? {
            service = service.with_design_conditions(source, config.design_conditions.timeout);
        }
    }

    let result = service.calculate(&request).await?;
    if let Some(dir) = &args.output_dir {
        result
            .exporter()
            .export_all(dir)
            .with_context(|| format!("failed to export reports to {}", dir.display()))?;
    }
    info!(
        calculation_id = %result.calculation_id,
        annual_energy = result.performance.annual_energy,
        status = %result.sizing_status.status,
        "calculation complete"
    );
    Ok(CalculationResponse::from(&result))
}

/// Failure document for any error; the kind comes from the engine error in
/// the chain, setup failures without one are configuration errors.
fn failure_document(err: &anyhow::Error) -> CalculationResponse {
    let message = format!("{err:#}");
    let response = match err.chain().find_map(|cause| cause.downcast_ref::<PvEngineError>()) {
        Some(engine) => CalculationResponse::failure(engine),
        None => CalculationResponse::failure(&PvEngineError::Configuration(message.clone())),
    };
    CalculationResponse {
        error: Some(message),
        ..response
    }
}

pub async fn weather(args: WeatherArgs, config: &AppConfig) -> Result<()> {
    let location = SiteLocation::new(args.latitude, args.longitude)?;
    let provider = provider(args.weather.as_deref(), config)?;
    let series = fetch_weather(provider.as_ref(), &location, context::fetch_policy(config)).await?;
    print_json(&series.summary())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_kind_under_context() {
        let err = anyhow::Error::from(PvEngineError::invalid_input("malformed request: eof"))
            .context("failed to load request r.json");
        let response = failure_document(&err);
        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("invalid_input"));
        assert!(response.error.unwrap().starts_with("failed to load request r.json"));
    }

    #[test]
    fn setup_errors_are_configuration_failures() {
        let response = failure_document(&anyhow::anyhow!("catalog file unreadable"));
        assert_eq!(response.error_kind.as_deref(), Some("configuration"));
        assert_eq!(response.error.as_deref(), Some("catalog file unreadable"));
    }
}
