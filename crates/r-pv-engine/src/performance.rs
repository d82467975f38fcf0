//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Hourly DC/AC simulation over a representative year."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Hourly performance simulation.
//!
//! Each of the 8760 hours goes through transposition, soiling, the thermal
//! model, the module power model, array losses and finally the inverter,
//! which clips on both its DC input and its AC output.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PvEngineError, Result};
use crate::model::{ArrayConfiguration, Inverter, Module, SiteLocation};
use crate::solar::{erbs, solar_position, transpose_isotropic, SolarPosition};
use crate::weather::{
    representative_year, HourStamp, WeatherSeries, DAYS_PER_YEAR, HOURS_PER_DAY, HOURS_PER_YEAR,
    MONTHS,
};

/// Array loss percentages, combined multiplicatively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemLosses {
    pub soiling: f64,
    pub mismatch: f64,
    pub wiring: f64,
    pub shading: f64,
}

impl Default for SystemLosses {
    fn default() -> Self {
        Self {
            soiling: 2.0,
            mismatch: 2.0,
            wiring: 2.0,
            shading: 0.0,
        }
    }
}

impl SystemLosses {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("soiling", self.soiling),
            ("mismatch", self.mismatch),
            ("wiring", self.wiring),
            ("shading", self.shading),
        ] {
            if !value.is_finite() || !(0.0..100.0).contains(&value) {
                return Err(PvEngineError::invalid_input(format!(
                    "{name} loss must lie in [0, 100) percent (got {value})"
                )));
            }
        }
        Ok(())
    }

    /// Fraction of plane-of-array irradiance reaching the cells.
    pub fn soiling_factor(&self) -> f64 {
        1.0 - self.soiling / 100.0
    }

    /// Fraction of module DC output reaching the inverters.
    pub fn array_factor(&self) -> f64 {
        (1.0 - self.mismatch / 100.0) * (1.0 - self.wiring / 100.0) * (1.0 - self.shading / 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub albedo: f64,
    pub losses: SystemLosses,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            albedo: 0.2,
            losses: SystemLosses::default(),
        }
    }
}

/// Per-hour intermediate values, each 8760 long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    /// Plane-of-array irradiance after soiling (W/m²).
    pub effective_irradiance: Vec<f64>,
    /// °C
    pub cell_temperature: Vec<f64>,
    /// Array DC output after losses, before inverter clipping (kW).
    pub dc_power: Vec<f64>,
    /// kW
    pub ac_power: Vec<f64>,
}

/// Result of a one-year simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceProfile {
    pub hourly: HourlySeries,
    /// kWh per day, 365 entries.
    pub daily_energy: Vec<f64>,
    /// kWh per month, 12 entries.
    pub monthly_energy: Vec<f64>,
    /// Mean AC output for each hour of the day (kW), 24 entries.
    pub hour_of_day_profile: Vec<f64>,
    /// kWh
    pub annual_energy: f64,
    /// kW
    pub peak_dc_power: f64,
    /// kW
    pub peak_ac_power: f64,
    /// Annual plane-of-array irradiation before soiling (kWh/m²).
    pub annual_poa: f64,
    /// Energy lost to inverter DC and AC limits (kWh).
    pub clipped_energy: f64,
    pub dc_nameplate_kw: f64,
    pub capacity_factor: f64,
    pub performance_ratio: f64,
    /// kWh/kWp
    pub specific_yield: f64,
    /// Mean over lit hours (W/m²).
    pub mean_effective_irradiance: f64,
    /// Mean over lit hours (°C).
    pub mean_cell_temperature: f64,
}

/// What one inverter delivers for a given DC input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverterOutput {
    /// W
    pub ac: f64,
    /// Power lost to the DC and AC limits (W).
    pub clipped: f64,
}

pub struct PerformanceSimulator<'a> {
    module: &'a Module,
    inverter: &'a Inverter,
    array: &'a ArrayConfiguration,
    location: &'a SiteLocation,
    settings: SimulationSettings,
}

impl<'a> PerformanceSimulator<'a> {
    pub fn new(
        module: &'a Module,
        inverter: &'a Inverter,
        array: &'a ArrayConfiguration,
        location: &'a SiteLocation,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            module,
            inverter,
            array,
            location,
            settings,
        }
    }

    /// DC output of one module (W), never negative.
    pub fn module_dc(&self, irradiance_wm2: f64, cell_temperature: f64) -> f64 {
        let thermal = 1.0 + self.module.temp_coeff_pmax / 100.0 * (cell_temperature - 25.0);
        (self.module.power * irradiance_wm2 / 1000.0 * thermal).max(0.0)
    }

    /// Clip DC input at `pdc`, convert, then clip AC at `pac`.
    pub fn inverter_output(&self, dc_watts: f64) -> InverterOutput {
        let efficiency = self.inverter.efficiency_pct() / 100.0;
        let ac = (dc_watts.min(self.inverter.pdc) * efficiency).min(self.inverter.pac);
        InverterOutput {
            ac,
            clipped: (dc_watts * efficiency - ac).max(0.0),
        }
    }

    /// Array DC and AC power (W) for an effective irradiance and cell temperature.
    pub fn array_power(&self, irradiance_wm2: f64, cell_temperature: f64) -> (f64, InverterOutput) {
        let modules = f64::from(self.array.total_modules());
        let inverters = f64::from(self.array.number_of_inverters.max(1));
        let dc = self.module_dc(irradiance_wm2, cell_temperature)
            * modules
            * self.settings.losses.array_factor();
        let per_inverter = self.inverter_output(dc / inverters);
        (
            dc,
            InverterOutput {
                ac: per_inverter.ac * inverters,
                clipped: per_inverter.clipped * inverters,
            },
        )
    }

    pub fn run(&self, weather: &WeatherSeries) -> Result<PerformanceProfile> {
        weather.validate()?;
        if self.array.total_modules() == 0 || self.array.number_of_inverters == 0 {
            return Err(PvEngineError::Sizing(
                "array has no modules or no inverters".into(),
            ));
        }

        let stamps: Vec<HourStamp> = representative_year().collect();
        let utc_offset = weather.utc_offset_for(self.location.longitude);
        let positions: Vec<SolarPosition> = stamps
            .iter()
            .map(|s| {
                solar_position(
                    self.location.latitude,
                    self.location.longitude,
                    s.day_of_year(),
                    s.mid_hour(),
                    utc_offset,
                )
            })
            .collect();
        let ghi = hourly_ghi(weather, &stamps, &positions);

        let mut hourly = HourlySeries {
            effective_irradiance: Vec::with_capacity(HOURS_PER_YEAR),
            cell_temperature: Vec::with_capacity(HOURS_PER_YEAR),
            dc_power: Vec::with_capacity(HOURS_PER_YEAR),
            ac_power: Vec::with_capacity(HOURS_PER_YEAR),
        };
        let mut daily_energy = vec![0.0; DAYS_PER_YEAR];
        let mut monthly_energy = vec![0.0; MONTHS];
        let mut hour_of_day = vec![0.0; HOURS_PER_DAY];
        let mut annual_poa_wh = 0.0;
        let mut clipped_wh = 0.0;
        let mut lit_hours = 0usize;
        let mut lit_irradiance = 0.0;
        let mut lit_temperature = 0.0;

        for (stamp, position) in stamps.iter().zip(&positions) {
            let ghi_h = ghi[stamp.index];
            let (dni, dhi) = match &weather.hourly {
                Some(detail) => (detail.dni[stamp.index], detail.dhi[stamp.index]),
                None => {
                    let parts = erbs(ghi_h, position, stamp.day_of_year());
                    (parts.dni, parts.dhi)
                }
            };
            let poa = transpose_isotropic(
                position,
                dni,
                dhi,
                ghi_h,
                self.array.tilt,
                self.array.azimuth,
                self.settings.albedo,
            )
            .total();
            let effective = poa * self.settings.losses.soiling_factor();

            let (ambient, wind) = match &weather.hourly {
                Some(detail) => (
                    detail.air_temperature[stamp.index],
                    detail.wind_speed[stamp.index],
                ),
                None => (
                    weather.monthly_temperature[stamp.month],
                    weather.wind_speed.at(stamp),
                ),
            };
            let cell_temperature = self
                .array
                .temperature_model
                .cell_temperature(ambient, effective, wind);

            let (dc, output) = self.array_power(effective, cell_temperature);
            let ac_kw = output.ac / 1000.0;

            annual_poa_wh += poa;
            clipped_wh += output.clipped;
            daily_energy[stamp.day] += ac_kw;
            monthly_energy[stamp.month] += ac_kw;
            hour_of_day[stamp.hour] += ac_kw;
            if effective > 0.0 {
                lit_hours += 1;
                lit_irradiance += effective;
                lit_temperature += cell_temperature;
            }

            hourly.effective_irradiance.push(effective);
            hourly.cell_temperature.push(cell_temperature);
            hourly.dc_power.push(dc / 1000.0);
            hourly.ac_power.push(ac_kw);
        }

        let annual_energy: f64 = monthly_energy.iter().sum();
        let dc_nameplate_kw = self.array.dc_nameplate_kw(self.module);
        let annual_poa = annual_poa_wh / 1000.0;
        let specific_yield = annual_energy / dc_nameplate_kw;
        let performance_ratio = if annual_poa > 0.0 {
            specific_yield / annual_poa
        } else {
            0.0
        };
        let (mean_effective_irradiance, mean_cell_temperature) = if lit_hours > 0 {
            (
                lit_irradiance / lit_hours as f64,
                lit_temperature / lit_hours as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let profile = PerformanceProfile {
            daily_energy,
            monthly_energy,
            hour_of_day_profile: hour_of_day
                .into_iter()
                .map(|kwh| kwh / DAYS_PER_YEAR as f64)
                .collect(),
            annual_energy,
            peak_dc_power: hourly.dc_power.iter().copied().fold(0.0, f64::max),
            peak_ac_power: hourly.ac_power.iter().copied().fold(0.0, f64::max),
            annual_poa,
            clipped_energy: clipped_wh / 1000.0,
            dc_nameplate_kw,
            capacity_factor: annual_energy / (dc_nameplate_kw * HOURS_PER_YEAR as f64),
            performance_ratio,
            specific_yield,
            mean_effective_irradiance,
            mean_cell_temperature,
            hourly,
        };
        debug!(
            annual_energy = profile.annual_energy,
            annual_poa = profile.annual_poa,
            clipped_energy = profile.clipped_energy,
            "performance simulated"
        );
        Ok(profile)
    }
}

/// Hourly GHI (W/m²), taken from the hourly block or spread from monthly totals
/// in proportion to the cosine of the solar zenith.
fn hourly_ghi(weather: &WeatherSeries, stamps: &[HourStamp], positions: &[SolarPosition]) -> Vec<f64> {
    if let Some(detail) = &weather.hourly {
        return detail.ghi.clone();
    }
    let weights: Vec<f64> = positions.iter().map(|p| p.cos_zenith().max(0.0)).collect();
    let mut month_weight = [0.0; MONTHS];
    for stamp in stamps {
        month_weight[stamp.month] += weights[stamp.index];
    }
    stamps
        .iter()
        .map(|stamp| {
            let total = month_weight[stamp.month];
            if total > 0.0 {
                weather.monthly_ghi[stamp.month] * 1000.0 * weights[stamp.index] / total
            } else {
                0.0
            }
        })
        .collect()
}
