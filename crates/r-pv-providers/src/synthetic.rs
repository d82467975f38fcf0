//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Seeded synthetic weather year for offline runs."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::f64::consts::PI;

use async_trait::async_trait;
use r_pv_engine::{
    errors::PvEngineError,
    model::SiteLocation,
    solar::{erbs, extraterrestrial_normal, nominal_utc_offset, solar_position},
    weather::{representative_year, HourlyWeather, WeatherProvider, WeatherSeries, HOURS_PER_YEAR},
};
use rand::prelude::*;
use rand_distr::Normal;
use tracing::debug;

/// Generates a plausible, reproducible weather year for any site.
///
/// Clear-sky irradiance follows the sun for the given coordinates and is
/// attenuated by a seeded daily cloudiness draw. Temperature has a seasonal
/// swing that grows with latitude plus a diurnal cycle and gaussian noise.
#[derive(Debug, Clone)]
pub struct SyntheticWeatherProvider {
    seed: u64,
}

impl SyntheticWeatherProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn generate(&self, location: &SiteLocation) -> r_pv_engine::Result<WeatherSeries> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ site_hash(location));
        let temperature_noise = normal(0.0, 1.0)?;
        let wind_noise = normal(0.0, 1.0)?;
        let cloudiness = normal(0.78, 0.15)?;

        let latitude = location.latitude;
        let south = latitude < 0.0;
        // Annual mean and half-swing of air temperature.
        let mean_temperature = 27.0 - 0.4 * latitude.abs();
        let swing = 2.0 + 0.25 * latitude.abs();

        let mut hourly = HourlyWeather {
            ghi: Vec::with_capacity(HOURS_PER_YEAR),
            dni: Vec::with_capacity(HOURS_PER_YEAR),
            dhi: Vec::with_capacity(HOURS_PER_YEAR),
            air_temperature: Vec::with_capacity(HOURS_PER_YEAR),
            wind_speed: Vec::with_capacity(HOURS_PER_YEAR),
        };

        let zone = nominal_utc_offset(location.longitude);
        let mut clearness = 0.0;
        for stamp in representative_year() {
            if stamp.hour == 0 {
                clearness = cloudiness.sample(&mut rng).clamp(0.2, 1.0);
            }
            let doy = stamp.day_of_year();
            let position = solar_position(latitude, location.longitude, doy, stamp.mid_hour(), zone);

            let ghi = if position.is_above_horizon() {
                let clear_sky = 0.75 * extraterrestrial_normal(doy) * position.cos_zenith().powf(1.15);
                clear_sky * clearness
            } else {
                0.0
            };
            let split = erbs(ghi, &position, doy);

            // Coldest around day 15 in the north, day 196 in the south.
            let season_phase = 2.0 * PI * (f64::from(doy) - if south { 196.0 } else { 15.0 }) / 365.0;
            let diurnal_phase = 2.0 * PI * (stamp.mid_hour() - 15.0) / 24.0;
            let temperature = mean_temperature - swing * season_phase.cos()
                + 4.0 * diurnal_phase.cos()
                + temperature_noise.sample(&mut rng);

            hourly.ghi.push(ghi);
            hourly.dni.push(split.dni);
            hourly.dhi.push(split.dhi);
            hourly.air_temperature.push(temperature);
            hourly
                .wind_speed
                .push((3.0 + wind_noise.sample(&mut rng)).max(0.0));
        }

        debug!(seed = self.seed, latitude, "synthetic weather generated");
        Ok(WeatherSeries::from_hourly(hourly, format!("synthetic:{:#x}", self.seed))?
            .with_utc_offset(zone))
    }
}

fn normal(mean: f64, std_dev: f64) -> r_pv_engine::Result<Normal<f64>> {
    Normal::new(mean, std_dev)
        .map_err(|err| PvEngineError::Configuration(format!("synthetic weather: {err}")))
}

/// Mix the coordinates into the seed so nearby sites still differ.
fn site_hash(location: &SiteLocation) -> u64 {
    let lat = (location.latitude * 1e4).round() as i64 as u64;
    let lon = (location.longitude * 1e4).round() as i64 as u64;
    lat.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ lon.rotate_left(29)
}

#[async_trait]
impl WeatherProvider for SyntheticWeatherProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch(&self, location: &SiteLocation) -> r_pv_engine::Result<WeatherSeries> {
        self.generate(location)
    }
}
