//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Sizing, area and mount-type helper commands."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use indexmap::IndexMap;
use r_pv_common::AppConfig;
use r_pv_engine::{
    geometry::polygon_area,
    io::load_document,
    sizing::check_compatibility,
    temperature::{MountType, TemperatureModelFamily},
};
use serde_json::json;

use crate::{context, print_json};

#[derive(Debug, Args)]
pub struct CheckSizingArgs {
    /// DC system size in kW.
    #[arg(long = "system-size", value_name = "KW")]
    system_size: f64,

    /// Module name; the catalog default when omitted.
    #[arg(long)]
    module: Option<String>,

    /// Inverter name; the catalog default when omitted.
    #[arg(long)]
    inverter: Option<String>,
}

#[derive(Debug, Args)]
pub struct AreaArgs {
    /// JSON or YAML file holding `[[lat, lon], ...]`.
    #[arg(long, value_name = "FILE", conflicts_with = "point")]
    polygon: Option<PathBuf>,

    /// Vertex as `lat,lon`; repeat for each corner.
    #[arg(long, value_name = "LAT,LON", allow_negative_numbers = true)]
    point: Vec<String>,
}

#[derive(Debug, Args)]
pub struct MountTypesArgs {
    /// Restrict the listing to one model (sapm or pvsyst).
    #[arg(long)]
    model: Option<TemperatureModelFamily>,
}

pub fn check_sizing(args: CheckSizingArgs, config: &AppConfig) -> Result<()> {
    let catalog = context::catalog(&config.catalog)?;
    let module = match &args.module {
        Some(name) => catalog.get_module(name)?,
        None => catalog.default_module(),
    };
    let inverter = match &args.inverter {
        Some(name) => catalog.get_inverter(name)?,
        None => catalog.default_inverter(),
    };
    let check = check_compatibility(module, inverter, args.system_size)?;
    print_json(&check)
}

fn parse_point(raw: &str) -> Result<[f64; 2]> {
    let Some((lat, lon)) = raw.split_once(',') else {
        bail!("vertex '{raw}' must be written as lat,lon");
    };
    let lat = lat.trim().parse().with_context(|| format!("bad latitude in '{raw}'"))?;
    let lon = lon.trim().parse().with_context(|| format!("bad longitude in '{raw}'"))?;
    Ok([lat, lon])
}

pub fn area(args: AreaArgs) -> Result<()> {
    let vertices: Vec<[f64; 2]> = match &args.polygon {
        Some(path) => load_document(path)
            .with_context(|| format!("failed to read polygon {}", path.display()))?,
        None => args
            .point
            .iter()
            .map(|raw| parse_point(raw))
            .collect::<Result<Vec<_>>>()?,
    };
    let area = polygon_area(&vertices)?;
    print_json(&json!({ "vertices": vertices.len(), "area_m2": area }))
}

pub fn mount_types(args: MountTypesArgs) -> Result<()> {
    let families = match args.model {
        Some(family) => vec![family],
        None => vec![TemperatureModelFamily::Sapm, TemperatureModelFamily::Pvsyst],
    };
    let listing: IndexMap<String, Vec<String>> = families
        .into_iter()
        .map(|family| {
            let mounts = MountType::for_family(family)
                .iter()
                .map(ToString::to_string)
                .collect();
            (family.to_string(), mounts)
        })
        .collect();
    print_json(&listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_parse_with_negative_longitudes() {
        assert_eq!(parse_point("39.7, -104.9").unwrap(), [39.7, -104.9]);
        assert!(parse_point("39.7").is_err());
        assert!(parse_point("north,-104").is_err());
    }
}
