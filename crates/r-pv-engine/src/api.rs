//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Calculation request/response contract and the async calculation service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Request and response documents exchanged with presentation layers.
//!
//! Requests arrive loosely typed (numbers may be sent as strings, most
//! fields are optional) and are resolved against the catalog and engine
//! settings into a [`ResolvedRequest`] before any computation starts.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    calculate_with_weather,
    catalog::DeviceCatalog,
    errors::{PvEngineError, Result},
    financial::{
        CostComponents, FinancialInputs, FinancialResult, InstalledCost, MaintenanceCost,
    },
    geometry::{polygon_area, ArrayGeometryResolver, DesignTemperatures, SizingIntent},
    io::parse_document,
    model::{Inverter, Module, SiteLocation, SizingMethod, SystemType},
    performance::SystemLosses,
    sizing::SizingStatus,
    temperature::{MountType, TemperatureModel, TemperatureModelFamily},
    weather::{fetch_weather, FetchPolicy, WeatherProvider, WeatherSummary},
    CalculationResult, EngineSettings,
};

const DEFAULT_TILT: f64 = 30.0;
const DEFAULT_AZIMUTH: f64 = 180.0;
const DEFAULT_GCR: f64 = 0.4;

/// Numbers that may arrive as JSON numbers or numeric strings.
mod lenient {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| Error::custom("number out of range")),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| Error::custom(format!("'{s}' is not a number"))),
            Some(other) => Err(Error::custom(format!("expected a number, got {other}"))),
        }
    }
}

/// A calculation request as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationRequest {
    pub sizing_method: Option<String>,
    /// kW DC
    #[serde(deserialize_with = "lenient::option")]
    pub system_size: Option<f64>,
    /// m²
    #[serde(deserialize_with = "lenient::option")]
    pub area: Option<f64>,
    /// `[latitude, longitude]` vertices of the footprint.
    pub polygon: Option<Vec<[f64; 2]>>,
    #[serde(deserialize_with = "lenient::option")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "lenient::option")]
    pub longitude: Option<f64>,
    #[serde(deserialize_with = "lenient::option")]
    pub tilt: Option<f64>,
    #[serde(deserialize_with = "lenient::option")]
    pub azimuth: Option<f64>,
    #[serde(deserialize_with = "lenient::option")]
    pub gcr: Option<f64>,
    pub module: Option<String>,
    pub inverter: Option<String>,
    pub system_type: Option<String>,
    pub temp_model: Option<String>,
    pub mount_type: Option<String>,
    /// $ for the whole system, before credits.
    #[serde(deserialize_with = "lenient::option")]
    pub installed_cost: Option<f64>,
    pub cost_components: Option<CostComponents>,
    /// $/kWh
    #[serde(deserialize_with = "lenient::option")]
    pub electricity_rate: Option<f64>,
    /// %
    #[serde(deserialize_with = "lenient::option")]
    pub federal_tax_credit: Option<f64>,
    /// %
    #[serde(deserialize_with = "lenient::option")]
    pub state_tax_credit: Option<f64>,
    /// %
    #[serde(deserialize_with = "lenient::option")]
    pub interest_rate: Option<f64>,
    /// years
    #[serde(deserialize_with = "lenient::option")]
    pub project_life: Option<f64>,
    #[serde(deserialize_with = "lenient::option")]
    pub maintenance_cost: Option<f64>,
    /// `flat` ($/yr, the default when a cost is given) or `per-kw` ($/kW-yr).
    pub maintenance_basis: Option<String>,
    /// %/yr
    #[serde(deserialize_with = "lenient::option")]
    pub degradation: Option<f64>,
    /// %/yr
    #[serde(deserialize_with = "lenient::option")]
    pub price_escalation: Option<f64>,
    /// $
    #[serde(deserialize_with = "lenient::option")]
    pub land_cost: Option<f64>,
    /// Loss percentages; engine defaults when absent.
    pub losses: Option<SystemLosses>,
}

/// A request with every default applied and every name looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub location: SiteLocation,
    pub intent: SizingIntent,
    pub module: Module,
    pub inverter: Inverter,
    pub tilt: f64,
    pub azimuth: f64,
    pub gcr: f64,
    pub system_type: SystemType,
    pub mount_type: MountType,
    pub temperature_model: TemperatureModel,
    pub losses: SystemLosses,
    /// Energy and system size are filled in after simulation.
    pub financial: FinancialInputs,
}

impl CalculationRequest {
    /// Parse a JSON or YAML request; malformed documents are invalid input.
    pub fn parse(data: &str) -> Result<Self> {
        parse_document(data).map_err(|err| match err {
            PvEngineError::SerializationFailed(e) => {
                PvEngineError::invalid_input(format!("malformed request: {e}"))
            }
            PvEngineError::YamlSerializationFailed(e) => {
                PvEngineError::invalid_input(format!("malformed request: {e}"))
            }
            other => other,
        })
    }

    pub fn resolve(&self, catalog: &DeviceCatalog, settings: &EngineSettings) -> Result<ResolvedRequest> {
        let latitude = required("latitude", self.latitude)?;
        let longitude = required("longitude", self.longitude)?;
        let location = SiteLocation::new(latitude, longitude)?;

        let method = match non_empty(&self.sizing_method) {
            Some(key) => key.parse::<SizingMethod>().map_err(|_| {
                PvEngineError::invalid_input(format!(
                    "unknown sizing_method '{key}'; expected system-size or area"
                ))
            })?,
            None => SizingMethod::default(),
        };
        let intent = match method {
            SizingMethod::SystemSize => SizingIntent::SystemSize {
                kw: required("system_size", self.system_size)?,
            },
            SizingMethod::Area => match (self.area, &self.polygon) {
                (Some(m2), _) => SizingIntent::Area { m2 },
                (None, Some(vertices)) => SizingIntent::Area {
                    m2: polygon_area(vertices)?,
                },
                (None, None) => {
                    return Err(PvEngineError::invalid_input(
                        "area sizing needs either area or polygon",
                    ))
                }
            },
        };

        let tilt = bounded("tilt", self.tilt.unwrap_or(DEFAULT_TILT), 0.0, 90.0)?;
        let azimuth = bounded("azimuth", self.azimuth.unwrap_or(DEFAULT_AZIMUTH), 0.0, 360.0)?;
        let gcr = self.gcr.unwrap_or(DEFAULT_GCR);

        let module = match non_empty(&self.module) {
            Some(name) => catalog.get_module(name)?,
            None => catalog.default_module(),
        }
        .clone();
        let inverter = match non_empty(&self.inverter) {
            Some(name) => catalog.get_inverter(name)?,
            None => catalog.default_inverter(),
        }
        .clone();

        let system_type = match non_empty(&self.system_type) {
            Some(key) => key.parse::<SystemType>().map_err(|_| {
                PvEngineError::invalid_input(format!(
                    "unknown system_type '{key}'; expected ground-mounted, roof-based, floating or agrivoltaics"
                ))
            })?,
            None => SystemType::default(),
        };
        let family = match non_empty(&self.temp_model) {
            Some(key) => key.to_ascii_lowercase().parse::<TemperatureModelFamily>().map_err(|_| {
                PvEngineError::Configuration(format!(
                    "unknown temperature model '{key}'; expected sapm or pvsyst"
                ))
            })?,
            None => TemperatureModelFamily::default(),
        };
        let mount_type = match non_empty(&self.mount_type) {
            Some(key) => MountType::parse_key(key)?,
            None => system_type.default_mount(family),
        };
        let temperature_model = TemperatureModel::resolve(family, mount_type)?;

        ArrayGeometryResolver::new(&module, &inverter, settings.resolver).sizing_target(intent, gcr)?;

        let losses = self.losses.unwrap_or(settings.simulation.losses);
        losses.validate()?;
        let financial = self.financial_inputs()?;
        financial.validate()?;

        Ok(ResolvedRequest {
            location,
            intent,
            module,
            inverter,
            tilt,
            azimuth,
            gcr,
            system_type,
            mount_type,
            temperature_model,
            losses,
            financial,
        })
    }

    fn financial_inputs(&self) -> Result<FinancialInputs> {
        let defaults = FinancialInputs::default();
        let percent = |value: Option<f64>, default: f64| value.map_or(default, |v| v / 100.0);

        let installed_cost = match (self.installed_cost, self.cost_components) {
            (Some(amount), _) => InstalledCost::LumpSum { amount },
            (None, Some(components)) => InstalledCost::Itemized(components),
            (None, None) => InstalledCost::Estimated,
        };
        let maintenance = match (self.maintenance_cost, non_empty(&self.maintenance_basis)) {
            (None, _) => MaintenanceCost::default(),
            (Some(amount), None | Some("flat")) => MaintenanceCost::Flat(amount),
            (Some(amount), Some("per-kw" | "per_kw")) => MaintenanceCost::PerKw(amount),
            (Some(_), Some(other)) => {
                return Err(PvEngineError::invalid_input(format!(
                    "unknown maintenance_basis '{other}'; expected flat or per-kw"
                )))
            }
        };
        let project_life = match self.project_life {
            None => defaults.project_life,
            Some(years) if years.is_finite() && years.fract() == 0.0 && (1.0..=100.0).contains(&years) => {
                years as u32
            }
            Some(years) => {
                return Err(PvEngineError::invalid_input(format!(
                    "project_life must be a whole number of years in 1..=100 (got {years})"
                )))
            }
        };

        Ok(FinancialInputs {
            installed_cost,
            electricity_rate: self.electricity_rate.unwrap_or(defaults.electricity_rate),
            degradation: percent(self.degradation, defaults.degradation),
            price_escalation: percent(self.price_escalation, defaults.price_escalation),
            maintenance,
            interest_rate: percent(self.interest_rate, defaults.interest_rate),
            project_life,
            federal_tax_credit: percent(self.federal_tax_credit, defaults.federal_tax_credit),
            state_tax_credit: percent(self.state_tax_credit, defaults.state_tax_credit),
            land_cost: self.land_cost.unwrap_or(defaults.land_cost),
            ..defaults
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required(field: &str, value: Option<f64>) -> Result<f64> {
    value.ok_or_else(|| PvEngineError::invalid_input(format!("{field} is required")))
}

fn bounded(field: &str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(PvEngineError::invalid_input(format!(
            "{field} must lie in [{min}, {max}] degrees (got {value})"
        )))
    }
}

/// System performance block of the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemOutput {
    /// kWh
    pub annual_energy: f64,
    /// kW
    pub peak_dc_power: f64,
    /// kW
    pub peak_ac_power: f64,
    pub performance_ratio: f64,
    pub capacity_factor: f64,
    /// kWh/kWp
    pub specific_yield: f64,
    pub modules_per_string: u32,
    pub strings_per_inverter: u32,
    pub number_of_inverters: u32,
    pub total_modules: u32,
    pub dc_ac_ratio: f64,
    /// m²
    pub total_module_area: f64,
    /// m²
    pub module_area: f64,
    pub module_type: String,
    pub inverter_type: String,
    /// Realized DC nameplate (kW).
    pub system_size: f64,
    /// Size implied by the request (kW).
    pub target_system_size: f64,
    /// Footprint supplied or needed (m²).
    pub required_area: f64,
    /// Per inverter (W AC).
    pub inverter_power: f64,
    /// Per module (W).
    pub module_power: f64,
    pub daily_energy: Vec<f64>,
    pub monthly_energy: Vec<f64>,
    pub hourly_profile: Vec<f64>,
    /// kWh
    pub clipped_energy: f64,
    /// kWh/m²
    pub annual_poa: f64,
    pub mean_effective_irradiance: f64,
    pub mean_cell_temperature: f64,
    pub tilt: f64,
    pub azimuth: f64,
    pub gcr: f64,
    pub mount_type: MountType,
    pub temp_model: TemperatureModelFamily,
    /// °C ambient
    pub min_design_temp: f64,
    /// °C ambient
    pub max_design_temp: f64,
}

impl From<&CalculationResult> for SystemOutput {
    fn from(result: &CalculationResult) -> Self {
        let perf = &result.performance;
        let array = &result.array;
        Self {
            annual_energy: perf.annual_energy,
            peak_dc_power: perf.peak_dc_power,
            peak_ac_power: perf.peak_ac_power,
            performance_ratio: perf.performance_ratio,
            capacity_factor: perf.capacity_factor,
            specific_yield: perf.specific_yield,
            modules_per_string: array.modules_per_string,
            strings_per_inverter: array.strings_per_inverter,
            number_of_inverters: array.number_of_inverters,
            total_modules: array.total_modules(),
            dc_ac_ratio: array.dc_ac_ratio(&result.module, &result.inverter),
            total_module_area: array.total_module_area(&result.module),
            module_area: result.module.area,
            module_type: result.module.name.clone(),
            inverter_type: result.inverter.name.clone(),
            system_size: perf.dc_nameplate_kw,
            target_system_size: result.layout.target_kw,
            required_area: result.layout.footprint_area,
            inverter_power: result.inverter.pac,
            module_power: result.module.power,
            daily_energy: perf.daily_energy.clone(),
            monthly_energy: perf.monthly_energy.clone(),
            hourly_profile: perf.hour_of_day_profile.clone(),
            clipped_energy: perf.clipped_energy,
            annual_poa: perf.annual_poa,
            mean_effective_irradiance: perf.mean_effective_irradiance,
            mean_cell_temperature: perf.mean_cell_temperature,
            tilt: array.tilt,
            azimuth: array.azimuth,
            gcr: array.gcr,
            mount_type: array.mount_type,
            temp_model: array.temperature_model.family(),
            min_design_temp: result.layout.design_temperatures.min,
            max_design_temp: result.layout.design_temperatures.max,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Weather summary plus the monthly energy it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    #[serde(flatten)]
    pub summary: WeatherSummary,
    pub monthly_energy: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_analysis: Option<SystemOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_metrics: Option<FinancialResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_data: Option<WeatherData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_info: Option<LocationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizing_status: Option<SizingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl CalculationResponse {
    pub fn failure(err: &PvEngineError) -> Self {
        Self {
            success: false,
            system_analysis: None,
            financial_metrics: None,
            weather_data: None,
            location_info: None,
            sizing_status: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_owned()),
        }
    }
}

impl From<&CalculationResult> for CalculationResponse {
    fn from(result: &CalculationResult) -> Self {
        Self {
            success: true,
            system_analysis: Some(SystemOutput::from(result)),
            financial_metrics: Some(result.financial.clone()),
            weather_data: Some(WeatherData {
                summary: result.weather.clone(),
                monthly_energy: result.performance.monthly_energy.clone(),
            }),
            location_info: Some(LocationInfo {
                city: result.location.city.clone(),
                country: result.location.country.clone(),
            }),
            sizing_status: Some(result.sizing_status.clone()),
            error: None,
            error_kind: None,
        }
    }
}

/// City and country of a coordinate, each possibly unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceName {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Best-effort reverse geocoding; `None` when the place cannot be named.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn place_name(&self, location: &SiteLocation) -> Option<PlaceName>;
}

/// Best-effort site design temperatures; `None` falls back to the
/// configured defaults.
#[async_trait]
pub trait DesignConditions: Send + Sync {
    async fn design_temperatures(&self, location: &SiteLocation) -> Option<DesignTemperatures>;
}

/// Fetches weather, names the place and runs the calculation pipeline.
///
/// Cheap to share behind an `Arc`; every request is independent.
pub struct CalculationService {
    catalog: Arc<DeviceCatalog>,
    weather: Arc<dyn WeatherProvider>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    geocode_timeout: Duration,
    design_conditions: Option<Arc<dyn DesignConditions>>,
    design_timeout: Duration,
    fetch_policy: FetchPolicy,
    settings: EngineSettings,
}

impl CalculationService {
    pub fn new(
        catalog: Arc<DeviceCatalog>,
        weather: Arc<dyn WeatherProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            weather,
            geocoder: None,
            geocode_timeout: Duration::from_secs(5),
            design_conditions: None,
            design_timeout: Duration::from_secs(10),
            fetch_policy: FetchPolicy::default(),
            settings,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>, timeout: Duration) -> Self {
        self.geocoder = Some(geocoder);
        self.geocode_timeout = timeout;
        self
    }

    pub fn with_design_conditions(
        mut self,
        source: Arc<dyn DesignConditions>,
        timeout: Duration,
    ) -> Self {
        self.design_conditions = Some(source);
        self.design_timeout = timeout;
        self
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub async fn calculate(&self, request: &CalculationRequest) -> Result<CalculationResult> {
        let mut resolved = request.resolve(&self.catalog, &self.settings)?;
        info!(
            latitude = resolved.location.latitude,
            longitude = resolved.location.longitude,
            module = %resolved.module.name,
            inverter = %resolved.inverter.name,
            provider = self.weather.name(),
            "Fetching weather..."
        );
        let (weather, place, design) = tokio::join!(
            fetch_weather(self.weather.as_ref(), &resolved.location, self.fetch_policy),
            self.place_name(&resolved.location),
            self.design_temperatures(&resolved.location)
        );
        let weather = weather?;
        let place = place.unwrap_or_default();
        resolved.location = resolved.location.with_place(place.city, place.country);

        let mut settings = self.settings;
        if let Some(design) = design {
            settings.resolver.design = design;
        }
        calculate_with_weather(&resolved, &weather, &settings)
    }

    /// Like [`Self::calculate`], folding failures into the response document.
    pub async fn handle(&self, request: &CalculationRequest) -> CalculationResponse {
        match self.calculate(request).await {
            Ok(result) => CalculationResponse::from(&result),
            Err(err) => {
                warn!(error = %err, kind = err.kind(), "calculation failed");
                CalculationResponse::failure(&err)
            }
        }
    }

    async fn design_temperatures(&self, location: &SiteLocation) -> Option<DesignTemperatures> {
        let source = self.design_conditions.as_ref()?;
        let fallback = self.settings.resolver.design;
        match tokio::time::timeout(self.design_timeout, source.design_temperatures(location)).await {
            Ok(Some(design)) if design.is_plausible() => Some(design),
            Ok(Some(design)) => {
                warn!(
                    min = design.min,
                    max = design.max,
                    fallback_min = fallback.min,
                    fallback_max = fallback.max,
                    "implausible design temperatures ignored"
                );
                None
            }
            Ok(None) => None,
            Err(_) => {
                warn!(
                    timeout_secs = self.design_timeout.as_secs_f64(),
                    fallback_min = fallback.min,
                    fallback_max = fallback.max,
                    "design temperature lookup timed out"
                );
                None
            }
        }
    }

    async fn place_name(&self, location: &SiteLocation) -> Option<PlaceName> {
        let geocoder = self.geocoder.as_ref()?;
        match tokio::time::timeout(self.geocode_timeout, geocoder.place_name(location)).await {
            Ok(place) => place,
            Err(_) => {
                warn!(
                    timeout_secs = self.geocode_timeout.as_secs_f64(),
                    "reverse geocoding timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::{WeatherSeries, WindSpeed};

    fn catalog() -> DeviceCatalog {
        DeviceCatalog::embedded().unwrap()
    }

    fn base_request() -> CalculationRequest {
        CalculationRequest {
            latitude: Some(39.74),
            longitude: Some(-104.99),
            system_size: Some(5.0),
            ..CalculationRequest::default()
        }
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let request = CalculationRequest::parse(
            r#"{"latitude": "23.81", "longitude": 90.41, "system_size": "7.5", "tilt": "", "gcr": null}"#,
        )
        .unwrap();
        assert_eq!(request.latitude, Some(23.81));
        assert_eq!(request.system_size, Some(7.5));
        assert_eq!(request.tilt, None);
        assert_eq!(request.gcr, None);
    }

    #[test]
    fn non_numeric_values_are_invalid_input() {
        for body in [
            r#"{"latitude": "north", "longitude": 1}"#,
            r#"{"latitude": true, "longitude": 1}"#,
            r#"{"latitude": [1], "longitude": 1}"#,
        ] {
            let err = CalculationRequest::parse(body).unwrap_err();
            assert!(matches!(err, PvEngineError::InvalidInput(_)), "{body}: {err}");
        }
    }

    #[test]
    fn defaults_are_applied() {
        let resolved = base_request()
            .resolve(&catalog(), &EngineSettings::default())
            .unwrap();
        assert_eq!(resolved.tilt, 30.0);
        assert_eq!(resolved.azimuth, 180.0);
        assert_eq!(resolved.gcr, 0.4);
        assert_eq!(resolved.module.name, "Generic Mono PERC 72-Cell 400W");
        assert_eq!(resolved.mount_type, MountType::OpenRackGlassPolymer);
        assert_eq!(resolved.financial.project_life, 25);
        assert_eq!(resolved.financial.maintenance, MaintenanceCost::PerKw(15.0));
        assert_eq!(resolved.intent, SizingIntent::SystemSize { kw: 5.0 });
    }

    #[test]
    fn percentages_become_fractions() {
        let request = CalculationRequest {
            interest_rate: Some(4.0),
            federal_tax_credit: Some(30.0),
            degradation: Some(0.5),
            maintenance_cost: Some(120.0),
            ..base_request()
        };
        let financial = request
            .resolve(&catalog(), &EngineSettings::default())
            .unwrap()
            .financial;
        assert!((financial.interest_rate - 0.04).abs() < 1e-12);
        assert!((financial.federal_tax_credit - 0.30).abs() < 1e-12);
        assert!((financial.degradation - 0.005).abs() < 1e-12);
        assert_eq!(financial.maintenance, MaintenanceCost::Flat(120.0));
    }

    #[test]
    fn roof_systems_default_to_close_mount() {
        let request = CalculationRequest {
            system_type: Some("roof-based".into()),
            ..base_request()
        };
        let resolved = request.resolve(&catalog(), &EngineSettings::default()).unwrap();
        assert_eq!(resolved.mount_type, MountType::CloseMountGlassGlass);

        let pvsyst = CalculationRequest {
            temp_model: Some("pvsyst".into()),
            ..request
        };
        let resolved = pvsyst.resolve(&catalog(), &EngineSettings::default()).unwrap();
        assert_eq!(resolved.mount_type, MountType::Insulated);
    }

    #[test]
    fn mount_from_other_family_is_configuration_error() {
        let request = CalculationRequest {
            temp_model: Some("pvsyst".into()),
            mount_type: Some("open_rack_glass_glass".into()),
            ..base_request()
        };
        let err = request.resolve(&catalog(), &EngineSettings::default()).unwrap_err();
        assert!(matches!(err, PvEngineError::Configuration(_)));
    }

    #[test]
    fn missing_coordinates_and_sizes_are_invalid_input() {
        let settings = EngineSettings::default();
        let no_lat = CalculationRequest {
            latitude: None,
            ..base_request()
        };
        assert!(matches!(
            no_lat.resolve(&catalog(), &settings),
            Err(PvEngineError::InvalidInput(_))
        ));
        let area_without_area = CalculationRequest {
            sizing_method: Some("area".into()),
            ..base_request()
        };
        assert!(matches!(
            area_without_area.resolve(&catalog(), &settings),
            Err(PvEngineError::InvalidInput(_))
        ));
        let unknown_module = CalculationRequest {
            module: Some("Nope 1W".into()),
            ..base_request()
        };
        assert!(matches!(
            unknown_module.resolve(&catalog(), &settings),
            Err(PvEngineError::NotFound { .. })
        ));
    }

    #[test]
    fn polygon_drives_area_sizing() {
        let request = CalculationRequest {
            sizing_method: Some("area".into()),
            polygon: Some(vec![[0.0, 0.0], [0.0, 0.001], [0.001, 0.001], [0.001, 0.0]]),
            latitude: Some(0.0),
            longitude: Some(0.0),
            ..CalculationRequest::default()
        };
        let resolved = request.resolve(&catalog(), &EngineSettings::default()).unwrap();
        match resolved.intent {
            SizingIntent::Area { m2 } => assert!(m2 > 12_000.0 && m2 < 12_800.0),
            other => panic!("unexpected intent {other:?}"),
        }
    }

    struct StaticWeather;

    #[async_trait]
    impl WeatherProvider for StaticWeather {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, _location: &SiteLocation) -> Result<WeatherSeries> {
            Ok(WeatherSeries {
                monthly_ghi: vec![
                    120.0, 130.0, 160.0, 175.0, 185.0, 170.0, 160.0, 155.0, 145.0, 140.0, 120.0,
                    115.0,
                ],
                monthly_temperature: vec![
                    19.0, 22.0, 27.0, 30.0, 30.0, 29.0, 29.0, 29.0, 29.0, 28.0, 24.0, 20.0,
                ],
                wind_speed: WindSpeed::Monthly(vec![2.0; 12]),
                hourly: None,
                source: "static".into(),
                utc_offset: None,
            })
        }
    }

    struct FixedPlace;

    #[async_trait]
    impl ReverseGeocoder for FixedPlace {
        async fn place_name(&self, _location: &SiteLocation) -> Option<PlaceName> {
            Some(PlaceName {
                city: Some("Dhaka".into()),
                country: Some("Bangladesh".into()),
            })
        }
    }

    #[tokio::test]
    async fn service_builds_a_full_response() {
        let service = CalculationService::new(
            Arc::new(catalog()),
            Arc::new(StaticWeather),
            EngineSettings::default(),
        )
        .with_geocoder(Arc::new(FixedPlace), Duration::from_secs(1));
        let request = CalculationRequest {
            latitude: Some(23.81),
            longitude: Some(90.41),
            ..base_request()
        };
        let response = service.handle(&request).await;
        assert!(response.success, "{:?}", response.error);
        let system = response.system_analysis.unwrap();
        assert_eq!(system.total_modules, 14);
        assert_eq!(system.monthly_energy.len(), 12);
        assert_eq!(response.location_info.unwrap().city.as_deref(), Some("Dhaka"));

        let json = serde_json::to_value(service.handle(&request).await).unwrap();
        assert!(json["financial_metrics"]["net_present_value"].is_number());
        assert_eq!(json["sizing_status"]["status"], "ok");
    }

    struct DownWeather;

    #[async_trait]
    impl WeatherProvider for DownWeather {
        fn name(&self) -> &str {
            "down"
        }

        async fn fetch(&self, _location: &SiteLocation) -> Result<WeatherSeries> {
            Err(PvEngineError::WeatherUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn invalid_input_is_reported_before_weather_is_fetched() {
        let service = CalculationService::new(
            Arc::new(catalog()),
            Arc::new(DownWeather),
            EngineSettings::default(),
        );
        for request in [
            CalculationRequest {
                gcr: Some(0.0),
                ..base_request()
            },
            CalculationRequest {
                system_size: Some(-5.0),
                ..base_request()
            },
            CalculationRequest {
                system_size: Some(5.0e9),
                ..base_request()
            },
            CalculationRequest {
                electricity_rate: Some(f64::NAN),
                ..base_request()
            },
            CalculationRequest {
                federal_tax_credit: Some(80.0),
                state_tax_credit: Some(40.0),
                ..base_request()
            },
        ] {
            let response = service.handle(&request).await;
            assert_eq!(
                response.error_kind.as_deref(),
                Some("invalid_input"),
                "{request:?}: {:?}",
                response.error
            );
        }

        let response = service.handle(&base_request()).await;
        assert_eq!(response.error_kind.as_deref(), Some("weather_unavailable"));
    }

    struct FixedDesign(DesignTemperatures);

    #[async_trait]
    impl DesignConditions for FixedDesign {
        async fn design_temperatures(&self, _location: &SiteLocation) -> Option<DesignTemperatures> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn site_design_temperatures_are_reported() {
        let service = CalculationService::new(
            Arc::new(catalog()),
            Arc::new(StaticWeather),
            EngineSettings::default(),
        )
        .with_design_conditions(
            Arc::new(FixedDesign(DesignTemperatures {
                min: -21.5,
                max: 33.0,
            })),
            Duration::from_secs(1),
        );
        let system = service.handle(&base_request()).await.system_analysis.unwrap();
        assert_eq!(system.min_design_temp, -21.5);
        assert_eq!(system.max_design_temp, 33.0);

        let implausible = CalculationService::new(
            Arc::new(catalog()),
            Arc::new(StaticWeather),
            EngineSettings::default(),
        )
        .with_design_conditions(
            Arc::new(FixedDesign(DesignTemperatures { min: 40.0, max: 10.0 })),
            Duration::from_secs(1),
        );
        let system = implausible.handle(&base_request()).await.system_analysis.unwrap();
        assert_eq!(system.min_design_temp, -3.7);
        assert_eq!(system.max_design_temp, 45.0);
    }

    #[tokio::test]
    async fn failures_carry_error_kind() {
        let service = CalculationService::new(
            Arc::new(catalog()),
            Arc::new(StaticWeather),
            EngineSettings::default(),
        );
        let request = CalculationRequest {
            gcr: Some(0.0),
            ..base_request()
        };
        let response = service.handle(&request).await;
        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("invalid_input"));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("system_analysis").is_none());
    }
}
