//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Catalog listing and lookup commands."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::Result;
use r_pv_common::AppConfig;

use crate::{context, print_json};

pub fn list_modules(config: &AppConfig) -> Result<()> {
    let catalog = context::catalog(&config.catalog)?;
    print_json(&catalog.list_modules())
}

pub fn list_inverters(config: &AppConfig) -> Result<()> {
    let catalog = context::catalog(&config.catalog)?;
    print_json(&catalog.list_inverters())
}

pub fn show_module(config: &AppConfig, name: &str) -> Result<()> {
    let catalog = context::catalog(&config.catalog)?;
    print_json(&catalog.module_details(name)?)
}

pub fn show_inverter(config: &AppConfig, name: &str) -> Result<()> {
    let catalog = context::catalog(&config.catalog)?;
    print_json(&catalog.inverter_details(name)?)
}
