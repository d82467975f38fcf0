//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Solar position, irradiance decomposition and plane-of-array transposition."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Solar geometry for the hourly simulation.
//!
//! Positions follow the NOAA general solar position equations evaluated in
//! the local standard time of the weather data. Global
//! horizontal irradiance is split into beam and diffuse parts with the Erbs
//! correlation and transposed onto the array plane with the isotropic sky
//! model plus ground reflection.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Solar constant (W/m²).
pub const SOLAR_CONSTANT: f64 = 1367.0;

/// Zenith angle beyond which beam irradiance is not resolved (degrees).
const MAX_BEAM_ZENITH_DEG: f64 = 87.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Elevation above the horizon (degrees, negative below).
    pub altitude_deg: f64,
    /// Clockwise from north (degrees).
    pub azimuth_deg: f64,
    pub zenith_deg: f64,
}

impl SolarPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.altitude_deg > 0.0
    }

    pub fn cos_zenith(&self) -> f64 {
        self.zenith_deg.to_radians().cos()
    }

    /// Cosine of the angle between the sun and the normal of a tilted surface,
    /// zero when the sun is below the horizon or behind the surface.
    pub fn incidence_cosine(&self, surface_tilt_deg: f64, surface_azimuth_deg: f64) -> f64 {
        if !self.is_above_horizon() {
            return 0.0;
        }
        let alt = self.altitude_deg.to_radians();
        let az = self.azimuth_deg.to_radians();
        let beta = surface_tilt_deg.to_radians();
        let gamma = surface_azimuth_deg.to_radians();

        let cos_theta = beta.sin() * gamma.sin() * alt.cos() * az.sin()
            + beta.sin() * gamma.cos() * alt.cos() * az.cos()
            + beta.cos() * alt.sin();
        cos_theta.max(0.0)
    }
}

/// Nominal standard-time zone of a longitude (hours east of UTC).
pub fn nominal_utc_offset(longitude_deg: f64) -> f64 {
    (longitude_deg / 15.0).round()
}

/// Sun position for `day_of_year` (1..=365) at `hour` (fractional, standard
/// time of the zone `utc_offset` hours east of UTC).
pub fn solar_position(
    latitude_deg: f64,
    longitude_deg: f64,
    day_of_year: u32,
    hour: f64,
    utc_offset: f64,
) -> SolarPosition {
    let gamma = 2.0 * PI * (f64::from(day_of_year) - 1.0 + (hour - 12.0) / 24.0) / 365.0;

    let eqtime_minutes = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let time_offset = eqtime_minutes + 4.0 * longitude_deg - 60.0 * utc_offset;
    let true_solar_minutes = hour * 60.0 + time_offset;
    let hour_angle = (true_solar_minutes / 4.0 - 180.0).to_radians();

    let lat = latitude_deg.to_radians();
    let cos_zenith = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos())
        .clamp(-1.0, 1.0);
    let zenith = cos_zenith.acos();

    let sin_az = -decl.cos() * hour_angle.sin();
    let cos_az = decl.sin() * lat.cos() - decl.cos() * lat.sin() * hour_angle.cos();
    let azimuth = sin_az.atan2(cos_az).to_degrees().rem_euclid(360.0);

    let zenith_deg = zenith.to_degrees();
    SolarPosition {
        altitude_deg: 90.0 - zenith_deg,
        azimuth_deg: azimuth,
        zenith_deg,
    }
}

/// Extraterrestrial normal irradiance for the day of year (W/m²).
pub fn extraterrestrial_normal(day_of_year: u32) -> f64 {
    SOLAR_CONSTANT * (1.0 + 0.033 * (2.0 * PI * f64::from(day_of_year) / 365.0).cos())
}

/// Beam-normal and diffuse-horizontal components of a GHI value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Decomposition {
    pub dni: f64,
    pub dhi: f64,
}

/// Erbs diffuse-fraction correlation.
pub fn erbs(ghi: f64, position: &SolarPosition, day_of_year: u32) -> Decomposition {
    if ghi <= 0.0 {
        return Decomposition::default();
    }
    if position.zenith_deg >= MAX_BEAM_ZENITH_DEG {
        return Decomposition { dni: 0.0, dhi: ghi };
    }
    let cos_z = position.cos_zenith();
    let kt = (ghi / (extraterrestrial_normal(day_of_year) * cos_z)).clamp(0.0, 1.0);
    let diffuse_fraction = if kt <= 0.22 {
        1.0 - 0.09 * kt
    } else if kt <= 0.80 {
        0.9511 - 0.1604 * kt + 4.388 * kt.powi(2) - 16.638 * kt.powi(3) + 12.336 * kt.powi(4)
    } else {
        0.165
    };
    let dhi = ghi * diffuse_fraction;
    Decomposition {
        dni: (ghi - dhi) / cos_z,
        dhi,
    }
}

/// Irradiance components on the array plane (W/m²).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaneOfArray {
    pub beam: f64,
    pub sky_diffuse: f64,
    pub ground_reflected: f64,
}

impl PlaneOfArray {
    pub fn total(&self) -> f64 {
        self.beam + self.sky_diffuse + self.ground_reflected
    }
}

/// Isotropic-sky transposition onto a surface with the given tilt and azimuth.
pub fn transpose_isotropic(
    position: &SolarPosition,
    dni: f64,
    dhi: f64,
    ghi: f64,
    tilt_deg: f64,
    azimuth_deg: f64,
    albedo: f64,
) -> PlaneOfArray {
    let cos_tilt = tilt_deg.to_radians().cos();
    let beam = if position.is_above_horizon() {
        dni * position.incidence_cosine(tilt_deg, azimuth_deg)
    } else {
        0.0
    };
    PlaneOfArray {
        beam,
        sky_diffuse: dhi * (1.0 + cos_tilt) / 2.0,
        ground_reflected: ghi * albedo * (1.0 - cos_tilt) / 2.0,
    }
}
