//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Reference data and array description types for the PV engine."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::errors::{PvEngineError, Result};
use crate::temperature::{MountType, TemperatureModel};

/// PV module electrical and physical ratings at standard test conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Rated power (W).
    pub power: f64,
    pub voc: f64,
    pub isc: f64,
    pub vmpp: f64,
    pub impp: f64,
    /// Physical area (m²).
    pub area: f64,
    #[serde(default = "default_material")]
    pub material: String,
    /// Temperature coefficient of maximum power (%/°C, negative for silicon).
    pub temp_coeff_pmax: f64,
    /// Temperature coefficient of open-circuit voltage (%/°C).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_coeff_voc: Option<f64>,
}

fn default_material() -> String {
    "Not specified".to_owned()
}

impl Module {
    /// Open-circuit voltage corrected to the given cell temperature.
    pub fn voc_at(&self, cell_temperature: f64) -> Option<f64> {
        self.temp_coeff_voc
            .map(|beta| self.voc * (1.0 + beta / 100.0 * (cell_temperature - 25.0)))
    }

    /// Maximum-power voltage at the given cell temperature, scaled with the
    /// power coefficient.
    pub fn vmpp_at(&self, cell_temperature: f64) -> f64 {
        self.vmpp * (1.0 + self.temp_coeff_pmax / 100.0 * (cell_temperature - 25.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inverter {
    pub name: String,
    /// AC power rating (W).
    pub pac: f64,
    /// DC power rating (W).
    pub pdc: f64,
    pub vdc_min: f64,
    pub vdc_max: f64,
    pub idc_max: f64,
    /// Conversion efficiency (%); derived from `pac / pdc` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
}

impl Inverter {
    pub fn efficiency_pct(&self) -> f64 {
        self.efficiency.unwrap_or(self.pac / self.pdc * 100.0)
    }
}

/// Geographic site of the installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl SiteLocation {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PvEngineError::invalid_input(format!(
                "latitude must lie in [-90, 90] (got {latitude})"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PvEngineError::invalid_input(format!(
                "longitude must lie in [-180, 180] (got {longitude})"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            city: None,
            country: None,
        })
    }

    pub fn with_place(mut self, city: Option<String>, country: Option<String>) -> Self {
        self.city = city;
        self.country = country;
        self
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SystemType {
    #[default]
    GroundMounted,
    RoofBased,
    Floating,
    Agrivoltaics,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SizingMethod {
    #[default]
    SystemSize,
    Area,
}

/// Resolved physical layout of the array together with its thermal model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayConfiguration {
    pub modules_per_string: u32,
    pub strings_per_inverter: u32,
    pub number_of_inverters: u32,
    pub tilt: f64,
    pub azimuth: f64,
    pub gcr: f64,
    pub mount_type: MountType,
    pub temperature_model: TemperatureModel,
}

impl ArrayConfiguration {
    pub fn total_modules(&self) -> u32 {
        self.modules_per_string * self.strings_per_inverter * self.number_of_inverters
    }

    pub fn modules_per_inverter(&self) -> u32 {
        self.modules_per_string * self.strings_per_inverter
    }

    /// DC nameplate of the whole array (kW).
    pub fn dc_nameplate_kw(&self, module: &Module) -> f64 {
        f64::from(self.total_modules()) * module.power / 1000.0
    }

    /// Combined AC rating of all inverters (kW).
    pub fn ac_rating_kw(&self, inverter: &Inverter) -> f64 {
        f64::from(self.number_of_inverters) * inverter.pac / 1000.0
    }

    pub fn dc_ac_ratio(&self, module: &Module, inverter: &Inverter) -> f64 {
        let ac = self.ac_rating_kw(inverter);
        if ac > 0.0 {
            self.dc_nameplate_kw(module) / ac
        } else {
            f64::INFINITY
        }
    }

    pub fn string_vmpp(&self, module: &Module) -> f64 {
        f64::from(self.modules_per_string) * module.vmpp
    }

    pub fn total_module_area(&self, module: &Module) -> f64 {
        f64::from(self.total_modules()) * module.area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temperature::TemperatureModelFamily;

    #[test]
    fn site_location_bounds() {
        assert!(SiteLocation::new(23.81, 90.41).is_ok());
        assert!(matches!(
            SiteLocation::new(91.0, 0.0),
            Err(PvEngineError::InvalidInput(_))
        ));
        assert!(matches!(
            SiteLocation::new(0.0, f64::NAN),
            Err(PvEngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn inverter_efficiency_falls_back_to_rating_ratio() {
        let inverter = Inverter {
            name: "inv".into(),
            pac: 4800.0,
            pdc: 5000.0,
            vdc_min: 100.0,
            vdc_max: 500.0,
            idc_max: 20.0,
            efficiency: None,
        };
        assert!((inverter.efficiency_pct() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn array_totals() {
        let module = Module {
            name: "m".into(),
            power: 400.0,
            voc: 49.0,
            isc: 10.2,
            vmpp: 41.0,
            impp: 9.5,
            area: 2.0,
            material: default_material(),
            temp_coeff_pmax: -0.35,
            temp_coeff_voc: None,
        };
        let inverter = Inverter {
            name: "inv".into(),
            pac: 5000.0,
            pdc: 5200.0,
            vdc_min: 150.0,
            vdc_max: 500.0,
            idc_max: 20.0,
            efficiency: None,
        };
        let array = ArrayConfiguration {
            modules_per_string: 7,
            strings_per_inverter: 2,
            number_of_inverters: 1,
            tilt: 30.0,
            azimuth: 180.0,
            gcr: 0.4,
            mount_type: MountType::OpenRackGlassPolymer,
            temperature_model: TemperatureModel::resolve(
                TemperatureModelFamily::Sapm,
                MountType::OpenRackGlassPolymer,
            )
            .unwrap(),
        };
        assert_eq!(array.total_modules(), 14);
        assert!((array.dc_nameplate_kw(&module) - 5.6).abs() < 1e-9);
        assert!((array.dc_ac_ratio(&module, &inverter) - 1.12).abs() < 1e-9);
        assert!((array.total_module_area(&module) - 28.0).abs() < 1e-9);
        assert_eq!(module.voc_at(-10.0), None);
        assert_eq!("roof-based".parse::<SystemType>().unwrap(), SystemType::RoofBased);
    }
}
