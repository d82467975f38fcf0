//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Sizing intent to module/string/inverter layout resolution."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Array geometry resolution.
//!
//! A sizing intent (target DC power or footprint area) is turned into a
//! module count, then modules are grouped into strings whose maximum-power
//! voltage sits inside the inverter's DC window, and strings are spread over
//! as few inverters as the current and power limits allow.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PvEngineError, Result};
use crate::model::{Inverter, Module};

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Most modules a single calculation lays out.
pub const MAX_MODULES: u32 = 10_000_000;

/// Cell temperature rise over ambient assumed for the hot-weather Vmp check (°C).
const HOT_CELL_RISE: f64 = 25.0;

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum SizingIntent {
    SystemSize { kw: f64 },
    Area { m2: f64 },
}

/// Site ambient extremes used for string voltage checks (°C).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesignTemperatures {
    /// Heating design dry bulb (99.6 %); bounds string Voc.
    pub min: f64,
    /// Cooling design dry bulb (0.4 %); bounds string Vmp.
    pub max: f64,
}

impl Default for DesignTemperatures {
    fn default() -> Self {
        Self {
            min: -3.7,
            max: 45.0,
        }
    }
}

impl DesignTemperatures {
    pub fn is_plausible(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min < self.max
            && (-90.0..=60.0).contains(&self.min)
            && (-40.0..=70.0).contains(&self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    /// Fraction the array may exceed an inverter's DC rating by.
    pub overdrive: f64,
    pub design: DesignTemperatures,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            overdrive: 0.2,
            design: DesignTemperatures::default(),
        }
    }
}

/// DC size, footprint and module count implied by a sizing intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingTarget {
    /// kW
    pub target_kw: f64,
    /// m²
    pub footprint_area: f64,
    pub modules: u32,
}

/// Module/string/inverter counts for one sizing intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayLayout {
    /// DC size implied by the intent (kW).
    pub target_kw: f64,
    /// Footprint supplied, or required for the target size (m²).
    pub footprint_area: f64,
    /// Modules needed to meet the intent before string rounding.
    pub requested_modules: u32,
    pub modules_per_string: u32,
    pub strings_per_inverter: u32,
    pub number_of_inverters: u32,
    #[serde(default)]
    pub design_temperatures: DesignTemperatures,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ArrayLayout {
    pub fn total_modules(&self) -> u32 {
        self.modules_per_string * self.strings_per_inverter * self.number_of_inverters
    }
}

pub struct ArrayGeometryResolver<'a> {
    module: &'a Module,
    inverter: &'a Inverter,
    settings: ResolverSettings,
}

impl<'a> ArrayGeometryResolver<'a> {
    pub fn new(module: &'a Module, inverter: &'a Inverter, settings: ResolverSettings) -> Self {
        Self {
            module,
            inverter,
            settings,
        }
    }

    /// Check `intent` and `gcr` and convert between size and footprint,
    /// without searching for a layout.
    pub fn sizing_target(&self, intent: SizingIntent, gcr: f64) -> Result<SizingTarget> {
        if !gcr.is_finite() || gcr <= 0.0 || gcr > 1.0 {
            return Err(PvEngineError::invalid_input(format!(
                "ground coverage ratio must lie in (0, 1] (got {gcr})"
            )));
        }
        match intent {
            SizingIntent::SystemSize { kw } => {
                require_positive("system_size", kw)?;
                let exact_modules = kw * 1000.0 / self.module.power;
                Ok(SizingTarget {
                    target_kw: kw,
                    footprint_area: exact_modules * self.module.area / gcr,
                    modules: module_count("system_size", exact_modules.ceil())?,
                })
            }
            SizingIntent::Area { m2 } => {
                require_positive("area", m2)?;
                let modules = module_count("area", (m2 * gcr / self.module.area).floor())?;
                if modules == 0 {
                    return Err(PvEngineError::Sizing(format!(
                        "a {m2:.1} m² footprint at gcr {gcr} cannot hold a single {:.2} m² module",
                        self.module.area
                    )));
                }
                Ok(SizingTarget {
                    target_kw: f64::from(modules) * self.module.power / 1000.0,
                    footprint_area: m2,
                    modules,
                })
            }
        }
    }

    pub fn resolve(&self, intent: SizingIntent, gcr: f64) -> Result<ArrayLayout> {
        let SizingTarget {
            target_kw,
            footprint_area,
            modules: requested_modules,
        } = self.sizing_target(intent, gcr)?;

        let mut warnings = Vec::new();
        let (min_mps, max_mps) = self.string_length_window(&mut warnings)?;
        let preferred = (f64::from(requested_modules).sqrt().ceil() as u32).clamp(min_mps, max_mps);

        let best = (min_mps..=max_mps)
            .filter_map(|mps| self.allocate(requested_modules, mps))
            .min_by_key(|candidate| {
                (
                    candidate.number_of_inverters,
                    candidate.total() - requested_modules,
                    candidate.modules_per_string.abs_diff(preferred),
                )
            })
            .ok_or_else(|| {
                PvEngineError::Sizing(format!(
                    "no string of {min_mps}..={max_mps} '{}' modules fits within the current \
                     ({:.1} A) and power ({:.0} W) limits of '{}'",
                    self.module.name, self.inverter.idc_max, self.inverter.pdc, self.inverter.name
                ))
            })?;

        let hot_vmpp = self.module.vmpp_at(self.settings.design.max + HOT_CELL_RISE);
        let hot_string = hot_vmpp * f64::from(best.modules_per_string);
        if hot_string < self.inverter.vdc_min {
            warnings.push(format!(
                "string maximum-power voltage at {:.1} °C ambient ({hot_string:.0} V for {} modules) \
                 falls below the inverter minimum of {:.0} V",
                self.settings.design.max, best.modules_per_string, self.inverter.vdc_min
            ));
        }

        debug!(
            target_kw,
            requested_modules,
            modules_per_string = best.modules_per_string,
            strings_per_inverter = best.strings_per_inverter,
            number_of_inverters = best.number_of_inverters,
            "array layout resolved"
        );

        Ok(ArrayLayout {
            target_kw,
            footprint_area,
            requested_modules,
            modules_per_string: best.modules_per_string,
            strings_per_inverter: best.strings_per_inverter,
            number_of_inverters: best.number_of_inverters,
            design_temperatures: self.settings.design,
            warnings,
        })
    }

    /// Feasible string lengths from the inverter's DC voltage window.
    pub fn string_length_window(&self, warnings: &mut Vec<String>) -> Result<(u32, u32)> {
        let min_mps = ((self.inverter.vdc_min / self.module.vmpp).ceil() as u32).max(1);
        let max_mps = (self.inverter.vdc_max / self.module.vmpp).floor() as u32;
        if min_mps > max_mps {
            return Err(PvEngineError::Sizing(format!(
                "no string length of '{}' (Vmpp {:.1} V) falls inside the [{:.0}, {:.0}] V window of '{}'",
                self.module.name,
                self.module.vmpp,
                self.inverter.vdc_min,
                self.inverter.vdc_max,
                self.inverter.name
            )));
        }

        let Some(cold_voc) = self.module.voc_at(self.settings.design.min) else {
            return Ok((min_mps, max_mps));
        };
        let cold_limit = (self.inverter.vdc_max / cold_voc).floor() as u32;
        if cold_limit >= min_mps {
            Ok((min_mps, max_mps.min(cold_limit)))
        } else {
            warnings.push(format!(
                "string open-circuit voltage at {:.1} °C ({:.0} V for {min_mps} modules) exceeds \
                 the inverter maximum of {:.0} V",
                self.settings.design.min,
                cold_voc * f64::from(min_mps),
                self.inverter.vdc_max
            ));
            Ok((min_mps, max_mps))
        }
    }

    fn allocate(&self, modules: u32, modules_per_string: u32) -> Option<Candidate> {
        let string_power = f64::from(modules_per_string) * self.module.power;
        let by_current = (self.inverter.idc_max / self.module.impp).floor() as u32;
        let by_power =
            (self.inverter.pdc * (1.0 + self.settings.overdrive) / string_power).floor() as u32;
        let max_strings = by_current.min(by_power);
        if max_strings == 0 {
            return None;
        }
        let strings = modules.div_ceil(modules_per_string);
        let inverters_needed = strings.div_ceil(max_strings);
        let strings_per_inverter = strings.div_ceil(inverters_needed);
        let number_of_inverters = modules.div_ceil(modules_per_string * strings_per_inverter);
        Some(Candidate {
            modules_per_string,
            strings_per_inverter,
            number_of_inverters,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    modules_per_string: u32,
    strings_per_inverter: u32,
    number_of_inverters: u32,
}

impl Candidate {
    fn total(&self) -> u32 {
        self.modules_per_string * self.strings_per_inverter * self.number_of_inverters
    }
}

fn require_positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PvEngineError::invalid_input(format!(
            "{field} must be a positive finite number (got {value})"
        )))
    }
}

fn module_count(field: &str, modules: f64) -> Result<u32> {
    if modules > f64::from(MAX_MODULES) {
        return Err(PvEngineError::invalid_input(format!(
            "{field} needs {modules:.0} modules, more than the {MAX_MODULES} one calculation supports"
        )));
    }
    Ok(modules as u32)
}

/// Area (m²) of a polygon given as `[latitude, longitude]` vertices.
///
/// Vertices are projected to spherical Web Mercator before applying the
/// shoelace formula, so the result carries Mercator scale distortion.
pub fn polygon_area(vertices: &[[f64; 2]]) -> Result<f64> {
    if vertices.len() < 3 {
        return Err(PvEngineError::invalid_input(format!(
            "a polygon needs at least 3 vertices (got {})",
            vertices.len()
        )));
    }
    let mut projected = Vec::with_capacity(vertices.len());
    for [lat, lon] in vertices {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() >= 90.0 || lon.abs() > 180.0 {
            return Err(PvEngineError::invalid_input(format!(
                "polygon vertex [{lat}, {lon}] is not a valid coordinate"
            )));
        }
        projected.push(web_mercator(*lat, *lon));
    }
    let twice_area: f64 = projected
        .iter()
        .zip(projected.iter().cycle().skip(1))
        .map(|((x1, y1), (x2, y2))| x1 * y2 - x2 * y1)
        .sum();
    Ok(twice_area.abs() / 2.0)
}

fn web_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}
