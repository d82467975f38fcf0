//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the PV modeling runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_weather_provider() -> WeatherProviderKind {
    WeatherProviderKind::Nrel
}

fn default_nrel_base_url() -> String {
    "https://developer.nrel.gov/api/nsrdb/v2/solar".to_owned()
}

fn default_nrel_api_key_env() -> String {
    "R_PV_NREL_API_KEY".to_owned()
}

fn default_nrel_dataset() -> String {
    "tmy".to_owned()
}

fn default_weather_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_weather_retries() -> u32 {
    1
}

fn default_synthetic_seed() -> u64 {
    0x50_4C_41_52u64
}

fn default_geocoding_enabled() -> bool {
    true
}

fn default_geocoding_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_owned()
}

fn default_geocoding_user_agent() -> String {
    concat!("r-pv/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_geocoding_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_design_conditions_enabled() -> bool {
    true
}

fn default_design_conditions_base_url() -> String {
    "https://ashrae-meteo.info/v2.0".to_owned()
}

fn default_ashrae_version() -> String {
    "2021".to_owned()
}

fn default_design_conditions_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_overdrive() -> f64 {
    0.2
}

fn default_min_design_temperature() -> f64 {
    -3.7
}

fn default_max_design_temperature() -> f64 {
    45.0
}

fn default_dc_ac_min() -> f64 {
    1.0
}

fn default_dc_ac_max() -> f64 {
    1.3
}

fn default_size_tolerance_kw() -> f64 {
    1.0
}

fn default_albedo() -> f64 {
    0.2
}

fn default_soiling() -> f64 {
    2.0
}

fn default_mismatch() -> f64 {
    2.0
}

fn default_wiring() -> f64 {
    2.0
}

/// Primary configuration object for the R-PV runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub design_conditions: DesignConditionsConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "R_PV_CONFIG";

    /// Load configuration from disk, respecting the `R_PV_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        self.weather.validate()?;
        self.design_conditions.validate()?;
        self.sizing.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Where module and inverter reference data comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Optional JSON or YAML catalog file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Use the file instead of the embedded catalog rather than merging over it.
    #[serde(default)]
    pub replace_embedded: bool,
    #[serde(default)]
    pub default_module: Option<String>,
    #[serde(default)]
    pub default_inverter: Option<String>,
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.replace_embedded && self.path.is_none() {
            return Err(anyhow!(
                "catalog.replace_embedded requires catalog.path to be set"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeatherProviderKind {
    #[default]
    Nrel,
    File,
    Synthetic,
}

impl std::str::FromStr for WeatherProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nrel" => Ok(WeatherProviderKind::Nrel),
            "file" => Ok(WeatherProviderKind::File),
            "synthetic" => Ok(WeatherProviderKind::Synthetic),
            other => Err(format!("unknown weather provider: {}", other)),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_provider")]
    pub provider: WeatherProviderKind,
    #[serde(default = "default_nrel_base_url")]
    pub base_url: String,
    /// API key; when absent the variable named by `api_key_env` is consulted.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_nrel_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_nrel_dataset")]
    pub dataset: String,
    #[serde(default = "default_weather_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_weather_retries")]
    pub retries: u32,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_synthetic_seed")]
    pub seed: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: default_weather_provider(),
            base_url: default_nrel_base_url(),
            api_key: None,
            api_key_env: default_nrel_api_key_env(),
            email: None,
            dataset: default_nrel_dataset(),
            timeout: default_weather_timeout(),
            retries: default_weather_retries(),
            file: None,
            seed: default_synthetic_seed(),
        }
    }
}

impl WeatherConfig {
    /// Resolve the NREL API key from configuration or the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(anyhow!("weather.timeout must be at least one second"));
        }
        if self.retries > 3 {
            return Err(anyhow!(
                "weather.retries must not exceed 3 (got {})",
                self.retries
            ));
        }
        if self.provider == WeatherProviderKind::File && self.file.is_none() {
            return Err(anyhow!("weather.provider = \"file\" requires weather.file"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_enabled")]
    pub enabled: bool,
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,
    #[serde(default = "default_geocoding_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocoding_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: default_geocoding_enabled(),
            base_url: default_geocoding_base_url(),
            user_agent: default_geocoding_user_agent(),
            timeout: default_geocoding_timeout(),
        }
    }
}

/// Site design temperatures from the ASHRAE climatic design conditions
/// service; the `[sizing]` fallbacks apply when disabled or unreachable.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignConditionsConfig {
    #[serde(default = "default_design_conditions_enabled")]
    pub enabled: bool,
    #[serde(default = "default_design_conditions_base_url")]
    pub base_url: String,
    /// Edition of the design conditions tables (2009, 2013, 2017 or 2021).
    #[serde(default = "default_ashrae_version")]
    pub ashrae_version: String,
    #[serde(default = "default_design_conditions_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for DesignConditionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_design_conditions_enabled(),
            base_url: default_design_conditions_base_url(),
            ashrae_version: default_ashrae_version(),
            timeout: default_design_conditions_timeout(),
        }
    }
}

impl DesignConditionsConfig {
    pub fn validate(&self) -> Result<()> {
        if !["2009", "2013", "2017", "2021"].contains(&self.ashrae_version.as_str()) {
            return Err(anyhow!(
                "design_conditions.ashrae_version must be 2009, 2013, 2017 or 2021 (got {})",
                self.ashrae_version
            ));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("design_conditions.timeout must be at least one second"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Fraction by which the array may exceed an inverter's DC rating.
    #[serde(default = "default_overdrive")]
    pub overdrive: f64,
    /// Coldest ambient used for string Voc when no site data is available (°C).
    #[serde(default = "default_min_design_temperature")]
    pub min_design_temperature: f64,
    /// Hottest ambient used for string Vmp when no site data is available (°C).
    #[serde(default = "default_max_design_temperature")]
    pub max_design_temperature: f64,
    #[serde(default = "default_dc_ac_min")]
    pub dc_ac_min: f64,
    #[serde(default = "default_dc_ac_max")]
    pub dc_ac_max: f64,
    #[serde(default = "default_size_tolerance_kw")]
    pub tolerance_kw: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            overdrive: default_overdrive(),
            min_design_temperature: default_min_design_temperature(),
            max_design_temperature: default_max_design_temperature(),
            dc_ac_min: default_dc_ac_min(),
            dc_ac_max: default_dc_ac_max(),
            tolerance_kw: default_size_tolerance_kw(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.overdrive) {
            return Err(anyhow!(
                "sizing.overdrive must lie in [0, 1] (got {})",
                self.overdrive
            ));
        }
        if !(-60.0..=25.0).contains(&self.min_design_temperature) {
            return Err(anyhow!(
                "sizing.min_design_temperature must lie in [-60, 25] °C (got {})",
                self.min_design_temperature
            ));
        }
        if !(0.0..=70.0).contains(&self.max_design_temperature)
            || self.max_design_temperature <= self.min_design_temperature
        {
            return Err(anyhow!(
                "sizing.max_design_temperature must lie in [0, 70] °C above the minimum (got {})",
                self.max_design_temperature
            ));
        }
        if !(self.dc_ac_min > 0.0 && self.dc_ac_min < self.dc_ac_max) {
            return Err(anyhow!(
                "sizing DC:AC band [{}, {}] is not a valid range",
                self.dc_ac_min,
                self.dc_ac_max
            ));
        }
        if !(self.tolerance_kw.is_finite() && self.tolerance_kw >= 0.0) {
            return Err(anyhow!("sizing.tolerance_kw must be non-negative"));
        }
        Ok(())
    }
}

/// Loss percentages applied to the DC side of the array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LossesConfig {
    #[serde(default = "default_soiling")]
    pub soiling: f64,
    #[serde(default = "default_mismatch")]
    pub mismatch: f64,
    #[serde(default = "default_wiring")]
    pub wiring: f64,
    #[serde(default)]
    pub shading: f64,
}

impl Default for LossesConfig {
    fn default() -> Self {
        Self {
            soiling: default_soiling(),
            mismatch: default_mismatch(),
            wiring: default_wiring(),
            shading: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_albedo")]
    pub albedo: f64,
    #[serde(default)]
    pub losses: LossesConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            albedo: default_albedo(),
            losses: LossesConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.albedo) {
            return Err(anyhow!(
                "simulation.albedo must lie in [0, 1] (got {})",
                self.albedo
            ));
        }
        let losses = [
            ("soiling", self.losses.soiling),
            ("mismatch", self.losses.mismatch),
            ("wiring", self.losses.wiring),
            ("shading", self.losses.shading),
        ];
        for (name, value) in losses {
            if !(0.0..100.0).contains(&value) {
                return Err(anyhow!(
                    "simulation.losses.{} must lie in [0, 100) percent (got {})",
                    name,
                    value
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().expect("empty config parses");
        assert_eq!(config.weather.provider, WeatherProviderKind::Nrel);
        assert_eq!(config.weather.timeout, Duration::from_secs(30));
        assert_eq!(config.weather.retries, 1);
        assert_eq!(config.sizing.overdrive, 0.2);
        assert_eq!(config.simulation.losses, LossesConfig::default());
        assert_eq!(config.logging.format, LogFormat::StructuredJson);
    }

    #[test]
    fn parses_sections() {
        let config: AppConfig = r#"
            [logging]
            format = "pretty"

            [weather]
            provider = "synthetic"
            timeout = 10
            seed = 42

            [sizing]
            overdrive = 0.1
            min_design_temperature = -10.0

            [simulation]
            albedo = 0.25
            [simulation.losses]
            soiling = 3.0
        "#
        .parse()
        .expect("config parses");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.weather.provider, WeatherProviderKind::Synthetic);
        assert_eq!(config.weather.timeout, Duration::from_secs(10));
        assert_eq!(config.weather.seed, 42);
        assert_eq!(config.sizing.overdrive, 0.1);
        assert_eq!(config.simulation.losses.soiling, 3.0);
        assert_eq!(config.simulation.losses.mismatch, 2.0);
    }

    #[test]
    fn file_provider_requires_path() {
        let err = r#"
            [weather]
            provider = "file"
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("weather.file"));
    }

    #[test]
    fn design_conditions_defaults_and_validation() {
        let config: AppConfig = r#"
            [design_conditions]
            enabled = false

            [sizing]
            max_design_temperature = 40.0
        "#
        .parse()
        .expect("config parses");
        assert!(!config.design_conditions.enabled);
        assert_eq!(config.design_conditions.ashrae_version, "2021");
        assert_eq!(config.sizing.min_design_temperature, -3.7);
        assert_eq!(config.sizing.max_design_temperature, 40.0);

        let err = r#"
            [design_conditions]
            ashrae_version = "1999"
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("ashrae_version"));

        let err = r#"
            [sizing]
            min_design_temperature = 10.0
            max_design_temperature = 5.0
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("max_design_temperature"));
    }

    #[test]
    fn rejects_inverted_dc_ac_band() {
        let err = r#"
            [sizing]
            dc_ac_min = 1.4
            dc_ac_max = 1.2
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("DC:AC"));
    }

    #[test]
    fn provider_kind_from_str() {
        assert_eq!(
            "Synthetic".parse::<WeatherProviderKind>().unwrap(),
            WeatherProviderKind::Synthetic
        );
        assert!("satellite".parse::<WeatherProviderKind>().is_err());
    }
}
