//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Weather data, reverse geocoding and design temperature providers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! External collaborators of the engine: weather sources, reverse
//! geocoding and site design temperatures. Each implements a trait defined
//! by `r-pv-engine`.

pub mod design;
pub mod errors;
pub mod file;
pub mod geocoding;
pub mod nrel;
pub mod synthetic;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use r_pv_common::{DesignConditionsConfig, GeocodingConfig, WeatherConfig, WeatherProviderKind};
use r_pv_engine::{
    api::{DesignConditions, ReverseGeocoder},
    weather::WeatherProvider,
};
use tracing::info;

pub use design::AshraeDesignConditions;
pub use errors::ProviderError;
pub use file::FileWeatherProvider;
pub use geocoding::NominatimGeocoder;
pub use nrel::{parse_psm3, NrelPsm3Provider, NrelSettings, Psm3Table};
pub use synthetic::SyntheticWeatherProvider;

/// Build the weather provider selected by configuration.
pub fn weather_provider_from_config(config: &WeatherConfig) -> Result<Arc<dyn WeatherProvider>> {
    let provider: Arc<dyn WeatherProvider> = match config.provider {
        WeatherProviderKind::Nrel => {
            let settings =
                NrelSettings::from_config(config).context("NREL weather provider misconfigured")?;
            Arc::new(NrelPsm3Provider::new(settings).context("failed to build HTTP client")?)
        }
        WeatherProviderKind::File => {
            let path = config
                .file
                .clone()
                .ok_or_else(|| anyhow!("weather.provider = \"file\" requires weather.file"))?;
            Arc::new(FileWeatherProvider::new(path))
        }
        WeatherProviderKind::Synthetic => Arc::new(SyntheticWeatherProvider::new(config.seed)),
    };
    info!(provider = provider.name(), "weather provider ready");
    Ok(provider)
}

/// Build the reverse geocoder, or `None` when geocoding is disabled.
pub fn geocoder_from_config(config: &GeocodingConfig) -> Result<Option<Arc<dyn ReverseGeocoder>>> {
    if !config.enabled {
        return Ok(None);
    }
    let geocoder = NominatimGeocoder::new(config).context("failed to build geocoding client")?;
    Ok(Some(Arc::new(geocoder)))
}

/// Build the design temperature source, or `None` when lookups are disabled.
pub fn design_conditions_from_config(
    config: &DesignConditionsConfig,
) -> Result<Option<Arc<dyn DesignConditions>>> {
    if !config.enabled {
        return Ok(None);
    }
    let source =
        AshraeDesignConditions::new(config).context("failed to build design conditions client")?;
    Ok(Some(Arc::new(source)))
}
