//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Cell temperature models (SAPM and PVsyst) and their parameter tables."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Cell temperature models.
//!
//! Two families are supported. SAPM estimates the module back-surface
//! temperature from an exponential wind dependence and adds a conduction
//! offset; PVsyst uses a heat-loss factor split into constant and
//! wind-driven parts. Parameters are keyed by [`MountType`], a closed set,
//! so a lookup can only fail when the mount belongs to the other family.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::errors::{PvEngineError, Result};
use crate::model::SystemType;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TemperatureModelFamily {
    #[default]
    Sapm,
    Pvsyst,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MountType {
    OpenRackGlassGlass,
    CloseMountGlassGlass,
    OpenRackGlassPolymer,
    InsulatedBackGlassPolymer,
    Freestanding,
    Insulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SapmParameters {
    pub a: f64,
    pub b: f64,
    pub delta_t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PvsystParameters {
    pub u_c: f64,
    pub u_v: f64,
}

impl MountType {
    pub fn family(self) -> TemperatureModelFamily {
        match self {
            MountType::Freestanding | MountType::Insulated => TemperatureModelFamily::Pvsyst,
            _ => TemperatureModelFamily::Sapm,
        }
    }

    pub fn sapm_parameters(self) -> Option<SapmParameters> {
        let (a, b, delta_t) = match self {
            MountType::OpenRackGlassGlass => (-3.47, -0.0594, 3.0),
            MountType::CloseMountGlassGlass => (-2.98, -0.0471, 1.0),
            MountType::OpenRackGlassPolymer => (-3.56, -0.0750, 3.0),
            MountType::InsulatedBackGlassPolymer => (-2.81, -0.0455, 0.0),
            MountType::Freestanding | MountType::Insulated => return None,
        };
        Some(SapmParameters { a, b, delta_t })
    }

    pub fn pvsyst_parameters(self) -> Option<PvsystParameters> {
        match self {
            MountType::Freestanding => Some(PvsystParameters { u_c: 29.0, u_v: 0.0 }),
            MountType::Insulated => Some(PvsystParameters { u_c: 15.0, u_v: 0.0 }),
            _ => None,
        }
    }

    /// Mount types valid for the given family, in table order.
    pub fn for_family(family: TemperatureModelFamily) -> Vec<MountType> {
        MountType::iter().filter(|m| m.family() == family).collect()
    }

    /// Parse a mount-type key, reporting unknown keys as configuration errors.
    pub fn parse_key(key: &str) -> Result<Self> {
        key.trim().parse().map_err(|_| {
            PvEngineError::Configuration(format!(
                "unknown mount type '{}'; expected one of: {}",
                key,
                MountType::iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }
}

impl SystemType {
    /// Default mount for this installation style under the given model family.
    pub fn default_mount(self, family: TemperatureModelFamily) -> MountType {
        match (family, self) {
            (TemperatureModelFamily::Sapm, SystemType::RoofBased) => {
                MountType::CloseMountGlassGlass
            }
            (TemperatureModelFamily::Sapm, _) => MountType::OpenRackGlassPolymer,
            (TemperatureModelFamily::Pvsyst, SystemType::RoofBased) => MountType::Insulated,
            (TemperatureModelFamily::Pvsyst, _) => MountType::Freestanding,
        }
    }
}

/// A temperature model with its coefficients bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum TemperatureModel {
    Sapm(SapmParameters),
    Pvsyst(PvsystParameters),
}

impl TemperatureModel {
    /// Bind the coefficients for `mount` under `family`.
    pub fn resolve(family: TemperatureModelFamily, mount: MountType) -> Result<Self> {
        let model = match family {
            TemperatureModelFamily::Sapm => mount.sapm_parameters().map(TemperatureModel::Sapm),
            TemperatureModelFamily::Pvsyst => {
                mount.pvsyst_parameters().map(TemperatureModel::Pvsyst)
            }
        };
        model.ok_or_else(|| {
            PvEngineError::Configuration(format!(
                "mount type '{}' is not defined for the {} temperature model (supported: {})",
                mount,
                family,
                MountType::for_family(family)
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }

    pub fn family(&self) -> TemperatureModelFamily {
        match self {
            TemperatureModel::Sapm(_) => TemperatureModelFamily::Sapm,
            TemperatureModel::Pvsyst(_) => TemperatureModelFamily::Pvsyst,
        }
    }

    /// Cell temperature (°C) for ambient °C, plane-of-array W/m² and wind m/s.
    pub fn cell_temperature(&self, ambient_c: f64, irradiance_wm2: f64, wind_ms: f64) -> f64 {
        match *self {
            TemperatureModel::Sapm(SapmParameters { a, b, delta_t }) => {
                let back = irradiance_wm2 * (a + b * wind_ms).exp() + ambient_c;
                back + irradiance_wm2 / 1000.0 * delta_t
            }
            TemperatureModel::Pvsyst(PvsystParameters { u_c, u_v }) => {
                ambient_c + irradiance_wm2 / (u_c + u_v * wind_ms)
            }
        }
    }
}

/// One-shot cell temperature lookup for a mount/family pair.
pub fn cell_temperature(
    ambient_c: f64,
    irradiance_wm2: f64,
    wind_ms: f64,
    mount_type: MountType,
    family: TemperatureModelFamily,
) -> Result<f64> {
    Ok(TemperatureModel::resolve(family, mount_type)?.cell_temperature(
        ambient_c,
        irradiance_wm2,
        wind_ms,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn sapm_open_rack_glass_polymer_reference_point() {
        // E=1000, ws=1: back = 1000*exp(-3.635) + 25
        let t = cell_temperature(
            25.0,
            1000.0,
            1.0,
            MountType::OpenRackGlassPolymer,
            TemperatureModelFamily::Sapm,
        )
        .unwrap();
        let expected = 1000.0 * (-3.56f64 - 0.0750).exp() + 25.0 + 3.0;
        assert!((t - expected).abs() < EPSILON);
        assert!(t > 50.0 && t < 60.0);
    }

    #[test]
    fn pvsyst_insulated_runs_hotter_than_freestanding() {
        let free = cell_temperature(
            20.0,
            800.0,
            2.0,
            MountType::Freestanding,
            TemperatureModelFamily::Pvsyst,
        )
        .unwrap();
        let insulated = cell_temperature(
            20.0,
            800.0,
            2.0,
            MountType::Insulated,
            TemperatureModelFamily::Pvsyst,
        )
        .unwrap();
        assert!((free - (20.0 + 800.0 / 29.0)).abs() < EPSILON);
        assert!((insulated - (20.0 + 800.0 / 15.0)).abs() < EPSILON);
        assert!(insulated > free);
    }

    #[test]
    fn no_irradiance_means_ambient() {
        for mount in MountType::iter() {
            let t = cell_temperature(12.5, 0.0, 3.0, mount, mount.family()).unwrap();
            assert!((t - 12.5).abs() < EPSILON, "{mount}");
        }
    }

    #[test]
    fn mismatched_family_is_configuration_error() {
        let err = TemperatureModel::resolve(TemperatureModelFamily::Pvsyst, MountType::OpenRackGlassGlass)
            .unwrap_err();
        assert!(matches!(err, PvEngineError::Configuration(_)));
        assert!(err.to_string().contains("freestanding"));

        let err = MountType::parse_key("water_surface").unwrap_err();
        assert!(matches!(err, PvEngineError::Configuration(_)));
    }

    #[test]
    fn system_type_defaults() {
        assert_eq!(
            SystemType::RoofBased.default_mount(TemperatureModelFamily::Sapm),
            MountType::CloseMountGlassGlass
        );
        assert_eq!(
            SystemType::Floating.default_mount(TemperatureModelFamily::Sapm),
            MountType::OpenRackGlassPolymer
        );
        assert_eq!(
            SystemType::RoofBased.default_mount(TemperatureModelFamily::Pvsyst),
            MountType::Insulated
        );
        assert_eq!(
            SystemType::Agrivoltaics.default_mount(TemperatureModelFamily::Pvsyst),
            MountType::Freestanding
        );
        assert_eq!(
            MountType::parse_key("close_mount_glass_glass").unwrap(),
            MountType::CloseMountGlassGlass
        );
    }
}
