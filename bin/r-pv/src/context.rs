//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Builds engine inputs from the loaded configuration."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use r_pv_common::{AppConfig, CatalogConfig};
use r_pv_engine::{
    geometry::{DesignTemperatures, ResolverSettings},
    io::load_catalog, performance::SimulationSettings,
    performance::SystemLosses, sizing::SizingThresholds, weather::FetchPolicy, DeviceCatalog,
    EngineSettings,
};
use tracing::debug;

pub fn catalog(config: &CatalogConfig) -> Result<DeviceCatalog> {
    let mut catalog = load_catalog(config.path.as_deref(), config.replace_embedded)
        .context("failed to load device catalog")?;
    catalog
        .select_defaults(
            config.default_module.as_deref(),
            config.default_inverter.as_deref(),
        )
        .context("catalog defaults are not in the catalog")?;
    debug!(
        modules = catalog.modules().count(),
        inverters = catalog.inverters().count(),
        "device catalog loaded"
    );
    Ok(catalog)
}

pub fn engine_settings(config: &AppConfig) -> EngineSettings {
    let losses = &config.simulation.losses;
    EngineSettings {
        resolver: ResolverSettings {
            overdrive: config.sizing.overdrive,
            design: DesignTemperatures {
                min: config.sizing.min_design_temperature,
                max: config.sizing.max_design_temperature,
            },
        },
        simulation: SimulationSettings {
            albedo: config.simulation.albedo,
            losses: SystemLosses {
                soiling: losses.soiling,
                mismatch: losses.mismatch,
                wiring: losses.wiring,
                shading: losses.shading,
            },
        },
        thresholds: SizingThresholds {
            tolerance_kw: config.sizing.tolerance_kw,
            dc_ac_min: config.sizing.dc_ac_min,
            dc_ac_max: config.sizing.dc_ac_max,
            ..SizingThresholds::default()
        },
    }
}

pub fn fetch_policy(config: &AppConfig) -> FetchPolicy {
    FetchPolicy {
        timeout: config.weather.timeout,
        retries: config.weather.retries,
    }
}
