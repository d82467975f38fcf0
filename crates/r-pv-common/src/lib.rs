//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the PV modeling runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the R-PV workspace.
//! This crate exposes configuration loading and logging utilities consumed
//! by the engine, the providers and the command line front end.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, CatalogConfig, DesignConditionsConfig, GeocodingConfig, LoadedAppConfig, LoggingConfig, LossesConfig,
    SimulationConfig, SizingConfig, WeatherConfig, WeatherProviderKind,
};
pub use logging::{init_tracing, LogFormat};
