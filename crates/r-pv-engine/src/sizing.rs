//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Advisory sizing status and module/inverter compatibility check."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::warn;

use crate::errors::{PvEngineError, Result};
use crate::model::{ArrayConfiguration, Inverter, Module};
use crate::performance::PerformanceProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SizingState {
    Ok,
    Undersized,
    Oversized,
}

/// Advisory outcome of comparing the requested and realized array size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingStatus {
    pub status: SizingState,
    pub message: String,
    pub desired_kw: f64,
    pub realized_kw: f64,
    pub dc_ac_ratio: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingThresholds {
    /// Allowed gap between desired and realized DC size (kW).
    pub tolerance_kw: f64,
    pub dc_ac_min: f64,
    pub dc_ac_max: f64,
    /// Clipped share of annual energy above which a warning is raised.
    pub clipping_fraction: f64,
}

impl Default for SizingThresholds {
    fn default() -> Self {
        Self {
            tolerance_kw: 1.0,
            dc_ac_min: 1.0,
            dc_ac_max: 1.3,
            clipping_fraction: 0.03,
        }
    }
}

pub struct SizingValidator<'a> {
    module: &'a Module,
    inverter: &'a Inverter,
    thresholds: SizingThresholds,
}

impl<'a> SizingValidator<'a> {
    pub fn new(module: &'a Module, inverter: &'a Inverter, thresholds: SizingThresholds) -> Self {
        Self {
            module,
            inverter,
            thresholds,
        }
    }

    /// Never fails; problems are reported in the status and its warnings.
    pub fn evaluate(
        &self,
        desired_kw: f64,
        array: &ArrayConfiguration,
        profile: &PerformanceProfile,
        resolver_warnings: &[String],
    ) -> SizingStatus {
        let t = &self.thresholds;
        let nameplate_kw = array.dc_nameplate_kw(self.module);
        let inverter_dc_kw = f64::from(array.number_of_inverters) * self.inverter.pdc / 1000.0;
        let ac_kw = array.ac_rating_kw(self.inverter);
        let realized_kw = nameplate_kw.min(inverter_dc_kw);
        let dc_ac_ratio = array.dc_ac_ratio(self.module, self.inverter);

        let (status, message) = if nameplate_kw > inverter_dc_kw && realized_kw < desired_kw - t.tolerance_kw {
            (
                SizingState::Undersized,
                format!(
                    "Usable DC capacity {realized_kw:.2} kW is below the requested {desired_kw:.2} kW: \
                     limited by the inverter DC limit ({inverter_dc_kw:.2} kW across {} inverter(s))",
                    array.number_of_inverters
                ),
            )
        } else if realized_kw < desired_kw - t.tolerance_kw {
            (
                SizingState::Undersized,
                format!(
                    "Realized {realized_kw:.2} kW is below the requested {desired_kw:.2} kW due to the \
                     string/inverter configuration"
                ),
            )
        } else if realized_kw > desired_kw + t.tolerance_kw {
            (
                SizingState::Oversized,
                format!(
                    "Realized {realized_kw:.2} kW exceeds the requested {desired_kw:.2} kW due to the \
                     string/inverter configuration"
                ),
            )
        } else if ac_kw < desired_kw / t.dc_ac_max {
            (
                SizingState::Undersized,
                format!(
                    "Inverter AC limit of {ac_kw:.2} kW is too small for a {desired_kw:.2} kW array"
                ),
            )
        } else {
            (
                SizingState::Ok,
                format!(
                    "Sizing is appropriate: {realized_kw:.2} kW DC on {} inverter(s)",
                    array.number_of_inverters
                ),
            )
        };

        let mut warnings: Vec<String> = resolver_warnings.to_vec();
        if dc_ac_ratio < t.dc_ac_min || dc_ac_ratio > t.dc_ac_max {
            warnings.push(format!(
                "DC:AC ratio {dc_ac_ratio:.2} is outside the recommended {:.1}-{:.1} range",
                t.dc_ac_min, t.dc_ac_max
            ));
        }
        if profile.annual_energy > 0.0
            && profile.clipped_energy > t.clipping_fraction * profile.annual_energy
        {
            warnings.push(format!(
                "inverter clipping removes {:.0} kWh/yr ({:.1}% of delivered energy)",
                profile.clipped_energy,
                profile.clipped_energy / profile.annual_energy * 100.0
            ));
        }
        if profile.capacity_factor > 1.0 {
            warnings.push(format!(
                "capacity factor {:.3} exceeds 1; check the weather data",
                profile.capacity_factor
            ));
        }
        if profile.performance_ratio > 1.0 {
            warnings.push(format!(
                "performance ratio {:.3} exceeds 1; check the weather data",
                profile.performance_ratio
            ));
        }
        for warning in &warnings {
            warn!(%warning, "sizing advisory");
        }

        SizingStatus {
            status,
            message,
            desired_kw,
            realized_kw,
            dc_ac_ratio,
            warnings,
        }
    }
}

/// Quick verdict on whether an inverter model suits a system size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityCheck {
    pub status: SizingState,
    pub message: String,
    pub number_of_inverters: u32,
}

/// Inverter count and over/undersizing verdict for `system_size_kw` of DC.
///
/// The verdict judges one inverter against the whole array: it is
/// undersized when the array needs more than one unit of this model.
pub fn check_compatibility(
    module: &Module,
    inverter: &Inverter,
    system_size_kw: f64,
) -> Result<CompatibilityCheck> {
    if !system_size_kw.is_finite() || system_size_kw <= 0.0 {
        return Err(PvEngineError::invalid_input(format!(
            "system_size must be a positive finite number (got {system_size_kw})"
        )));
    }
    let system_w = system_size_kw * 1000.0;
    let number_of_inverters = (system_w / inverter.pac).ceil() as u32;
    let (status, message) = if inverter.pac > system_w * 1.3 {
        (
            SizingState::Oversized,
            format!(
                "Inverter is oversized. Consider using a smaller inverter for {system_size_kw}kW system."
            ),
        )
    } else if inverter.pac < system_w * 0.8 {
        (
            SizingState::Undersized,
            format!(
                "Inverter is undersized. Need {number_of_inverters} inverters for {system_size_kw}kW system."
            ),
        )
    } else {
        (
            SizingState::Ok,
            format!(
                "Sizing is appropriate. Using {number_of_inverters} inverter(s) with {} modules of {:.0} W.",
                (system_w / module.power).ceil() as u32,
                module.power
            ),
        )
    };
    Ok(CompatibilityCheck {
        status,
        message,
        number_of_inverters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::HourlySeries;
    use crate::temperature::{MountType, TemperatureModel, TemperatureModelFamily};

    fn module() -> Module {
        Module {
            name: "m".into(),
            power: 400.0,
            voc: 49.0,
            isc: 10.2,
            vmpp: 41.0,
            impp: 9.5,
            area: 2.0,
            material: "mono-Si".into(),
            temp_coeff_pmax: -0.35,
            temp_coeff_voc: None,
        }
    }

    fn inverter() -> Inverter {
        Inverter {
            name: "i".into(),
            pac: 5000.0,
            pdc: 5200.0,
            vdc_min: 150.0,
            vdc_max: 500.0,
            idc_max: 20.0,
            efficiency: Some(96.8),
        }
    }

    fn array(mps: u32, spi: u32, inverters: u32) -> ArrayConfiguration {
        let mount = MountType::OpenRackGlassPolymer;
        ArrayConfiguration {
            modules_per_string: mps,
            strings_per_inverter: spi,
            number_of_inverters: inverters,
            tilt: 30.0,
            azimuth: 180.0,
            gcr: 0.4,
            mount_type: mount,
            temperature_model: TemperatureModel::resolve(TemperatureModelFamily::Sapm, mount)
                .unwrap(),
        }
    }

    fn profile(annual: f64, clipped: f64, cf: f64, pr: f64) -> PerformanceProfile {
        PerformanceProfile {
            hourly: HourlySeries {
                effective_irradiance: Vec::new(),
                cell_temperature: Vec::new(),
                dc_power: Vec::new(),
                ac_power: Vec::new(),
            },
            daily_energy: Vec::new(),
            monthly_energy: Vec::new(),
            hour_of_day_profile: Vec::new(),
            annual_energy: annual,
            peak_dc_power: 0.0,
            peak_ac_power: 0.0,
            annual_poa: 0.0,
            clipped_energy: clipped,
            dc_nameplate_kw: 0.0,
            capacity_factor: cf,
            performance_ratio: pr,
            specific_yield: 0.0,
            mean_effective_irradiance: 0.0,
            mean_cell_temperature: 0.0,
        }
    }

    #[test]
    fn five_kw_layout_is_ok() {
        let (module, inverter) = (module(), inverter());
        let validator = SizingValidator::new(&module, &inverter, SizingThresholds::default());
        // 14 modules = 5.6 kW, capped at 5.2 kW inverter DC.
        let status = validator.evaluate(5.0, &array(7, 2, 1), &profile(8000.0, 10.0, 0.18, 0.8), &[]);
        assert_eq!(status.status, SizingState::Ok);
        assert!((status.realized_kw - 5.2).abs() < 1e-9);
        assert!(status.warnings.is_empty(), "{:?}", status.warnings);
    }

    #[test]
    fn inverter_dc_limit_is_named() {
        let (module, inverter) = (module(), inverter());
        let validator = SizingValidator::new(&module, &inverter, SizingThresholds::default());
        let status = validator.evaluate(10.0, &array(10, 2, 1), &profile(8000.0, 0.0, 0.18, 0.8), &[]);
        assert_eq!(status.status, SizingState::Undersized);
        assert!(status.message.contains("inverter DC limit"));
        assert!(status.warnings.iter().any(|w| w.contains("DC:AC")));
    }

    #[test]
    fn configuration_overshoot_is_oversized() {
        let (module, inverter) = (module(), inverter());
        let validator = SizingValidator::new(&module, &inverter, SizingThresholds::default());
        let status = validator.evaluate(2.0, &array(7, 1, 2), &profile(8000.0, 0.0, 0.18, 0.8), &[]);
        assert_eq!(status.status, SizingState::Oversized);
        assert!(status.message.contains("configuration"));
        assert_eq!(status.status.to_string(), "oversized");
    }

    #[test]
    fn clipping_and_implausible_metrics_warn() {
        let (module, inverter) = (module(), inverter());
        let validator = SizingValidator::new(&module, &inverter, SizingThresholds::default());
        let status = validator.evaluate(
            5.0,
            &array(7, 2, 1),
            &profile(8000.0, 800.0, 1.2, 1.1),
            &["cold string".to_owned()],
        );
        assert_eq!(status.warnings.len(), 4, "{:?}", status.warnings);
        assert_eq!(status.warnings[0], "cold string");
    }

    #[test]
    fn compatibility_verdicts() {
        let (module, inverter) = (module(), inverter());
        let ok = check_compatibility(&module, &inverter, 5.0).unwrap();
        assert_eq!(ok.status, SizingState::Ok);
        assert_eq!(ok.number_of_inverters, 1);

        let oversized = check_compatibility(&module, &inverter, 3.0).unwrap();
        assert_eq!(oversized.status, SizingState::Oversized);

        let many = check_compatibility(&module, &inverter, 23.0).unwrap();
        assert_eq!(many.status, SizingState::Undersized);
        assert_eq!(many.number_of_inverters, 5);
        assert!(many.message.contains("Need 5 inverters"), "{}", many.message);

        // Within 80 % of the array a single unit still passes.
        let edge = check_compatibility(&module, &inverter, 6.0).unwrap();
        assert_eq!(edge.status, SizingState::Ok);
        assert_eq!(edge.number_of_inverters, 2);

        assert!(matches!(
            check_compatibility(&module, &inverter, 0.0),
            Err(PvEngineError::InvalidInput(_))
        ));
    }
}
