//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Read-only module and inverter reference catalog."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PvEngineError, Result};
use crate::model::{Inverter, Module};

const EMBEDDED_CATALOG: &str = include_str!("../data/catalog.json");

/// On-disk shape of a catalog file (JSON or YAML).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub inverters: Vec<Inverter>,
    #[serde(default)]
    pub default_module: Option<String>,
    #[serde(default)]
    pub default_inverter: Option<String>,
}

/// Ordered inventory of names plus the recommended selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceListing {
    pub names: Vec<String>,
    pub default_index: usize,
}

/// Module detail view; the catalog entry carries every displayed field.
pub type ModuleDetails = Module;

/// Inverter view with efficiency always resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterDetails {
    pub name: String,
    pub pac: f64,
    pub pdc: f64,
    pub vdc_min: f64,
    pub vdc_max: f64,
    pub idc_max: f64,
    pub efficiency: f64,
}

impl From<&Inverter> for InverterDetails {
    fn from(inverter: &Inverter) -> Self {
        Self {
            name: inverter.name.clone(),
            pac: inverter.pac,
            pdc: inverter.pdc,
            vdc_min: inverter.vdc_min,
            vdc_max: inverter.vdc_max,
            idc_max: inverter.idc_max,
            efficiency: inverter.efficiency_pct(),
        }
    }
}

/// Module and inverter specifications, looked up by name.
///
/// Built once at start-up and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    modules: IndexMap<String, Module>,
    inverters: IndexMap<String, Inverter>,
    default_module: usize,
    default_inverter: usize,
}

impl DeviceCatalog {
    /// Catalog compiled into the engine.
    pub fn embedded() -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(EMBEDDED_CATALOG)?;
        Self::from_document(document)
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self> {
        let mut catalog = Self {
            modules: IndexMap::new(),
            inverters: IndexMap::new(),
            default_module: 0,
            default_inverter: 0,
        };
        for module in document.modules {
            validate_module(&module)?;
            if catalog.modules.contains_key(&module.name) {
                return Err(PvEngineError::Configuration(format!(
                    "duplicate module '{}' in catalog",
                    module.name
                )));
            }
            catalog.modules.insert(module.name.clone(), module);
        }
        for inverter in document.inverters {
            validate_inverter(&inverter)?;
            if catalog.inverters.contains_key(&inverter.name) {
                return Err(PvEngineError::Configuration(format!(
                    "duplicate inverter '{}' in catalog",
                    inverter.name
                )));
            }
            catalog.inverters.insert(inverter.name.clone(), inverter);
        }
        if catalog.modules.is_empty() || catalog.inverters.is_empty() {
            return Err(PvEngineError::Configuration(
                "catalog must contain at least one module and one inverter".into(),
            ));
        }
        catalog.select_defaults(
            document.default_module.as_deref(),
            document.default_inverter.as_deref(),
        )?;
        Ok(catalog)
    }

    /// Overlay `document` on this catalog: same names replace, new names append.
    pub fn merge(mut self, document: CatalogDocument) -> Result<Self> {
        for module in document.modules {
            validate_module(&module)?;
            debug!(module = %module.name, "catalog module merged");
            self.modules.insert(module.name.clone(), module);
        }
        for inverter in document.inverters {
            validate_inverter(&inverter)?;
            debug!(inverter = %inverter.name, "catalog inverter merged");
            self.inverters.insert(inverter.name.clone(), inverter);
        }
        self.select_defaults(
            document.default_module.as_deref(),
            document.default_inverter.as_deref(),
        )?;
        Ok(self)
    }

    /// Change the recommended entries; `None` keeps the current choice.
    pub fn select_defaults(&mut self, module: Option<&str>, inverter: Option<&str>) -> Result<()> {
        if let Some(name) = module {
            self.default_module = self
                .modules
                .get_index_of(name)
                .ok_or_else(|| not_found("module", name))?;
        }
        if let Some(name) = inverter {
            self.default_inverter = self
                .inverters
                .get_index_of(name)
                .ok_or_else(|| not_found("inverter", name))?;
        }
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Result<&Module> {
        self.modules.get(name).ok_or_else(|| not_found("module", name))
    }

    pub fn get_inverter(&self, name: &str) -> Result<&Inverter> {
        self.inverters
            .get(name)
            .ok_or_else(|| not_found("inverter", name))
    }

    pub fn module_details(&self, name: &str) -> Result<ModuleDetails> {
        self.get_module(name).cloned()
    }

    pub fn inverter_details(&self, name: &str) -> Result<InverterDetails> {
        self.get_inverter(name).map(InverterDetails::from)
    }

    pub fn default_module(&self) -> &Module {
        &self.modules[self.default_module]
    }

    pub fn default_inverter(&self) -> &Inverter {
        &self.inverters[self.default_inverter]
    }

    pub fn list_modules(&self) -> DeviceListing {
        DeviceListing {
            names: self.modules.keys().cloned().collect(),
            default_index: self.default_module,
        }
    }

    pub fn list_inverters(&self) -> DeviceListing {
        DeviceListing {
            names: self.inverters.keys().cloned().collect(),
            default_index: self.default_inverter,
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn inverters(&self) -> impl Iterator<Item = &Inverter> {
        self.inverters.values()
    }
}

fn not_found(kind: &'static str, name: &str) -> PvEngineError {
    PvEngineError::NotFound {
        kind,
        name: name.to_owned(),
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn validate_module(module: &Module) -> Result<()> {
    let ratings = [
        ("power", module.power),
        ("voc", module.voc),
        ("isc", module.isc),
        ("vmpp", module.vmpp),
        ("impp", module.impp),
        ("area", module.area),
    ];
    if let Some((field, value)) = ratings.iter().find(|(_, v)| !positive(*v)) {
        return Err(PvEngineError::Configuration(format!(
            "module '{}' has non-positive {field} ({value})",
            module.name
        )));
    }
    if module.vmpp >= module.voc || module.impp > module.isc {
        return Err(PvEngineError::Configuration(format!(
            "module '{}' has a maximum-power point outside its open-circuit/short-circuit ratings",
            module.name
        )));
    }
    if !module.temp_coeff_pmax.is_finite() {
        return Err(PvEngineError::Configuration(format!(
            "module '{}' has a non-finite temperature coefficient",
            module.name
        )));
    }
    Ok(())
}

fn validate_inverter(inverter: &Inverter) -> Result<()> {
    let ratings = [
        ("pac", inverter.pac),
        ("pdc", inverter.pdc),
        ("vdc_min", inverter.vdc_min),
        ("vdc_max", inverter.vdc_max),
        ("idc_max", inverter.idc_max),
    ];
    if let Some((field, value)) = ratings.iter().find(|(_, v)| !positive(*v)) {
        return Err(PvEngineError::Configuration(format!(
            "inverter '{}' has non-positive {field} ({value})",
            inverter.name
        )));
    }
    if inverter.vdc_min >= inverter.vdc_max {
        return Err(PvEngineError::Configuration(format!(
            "inverter '{}' has an empty DC voltage window [{}, {}]",
            inverter.name, inverter.vdc_min, inverter.vdc_max
        )));
    }
    if let Some(efficiency) = inverter.efficiency {
        if !(efficiency > 0.0 && efficiency <= 100.0) {
            return Err(PvEngineError::Configuration(format!(
                "inverter '{}' efficiency must lie in (0, 100] (got {efficiency})",
                inverter.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_loads_with_defaults() {
        let catalog = DeviceCatalog::embedded().unwrap();
        let modules = catalog.list_modules();
        let inverters = catalog.list_inverters();
        assert!(modules.names.len() >= 5);
        assert_eq!(
            modules.names[modules.default_index],
            catalog.default_module().name
        );
        assert_eq!(catalog.default_module().vmpp, 41.0);
        assert_eq!(catalog.default_inverter().pac, 5000.0);
        assert_eq!(
            inverters.names[inverters.default_index],
            "Generic String 5.0kW"
        );
    }

    #[test]
    fn unknown_names_are_not_found() {
        let catalog = DeviceCatalog::embedded().unwrap();
        let err = catalog.get_module("Acme 9000W").unwrap_err();
        assert!(matches!(err, PvEngineError::NotFound { kind: "module", .. }));
        let err = catalog.get_inverter("Acme Inverter").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn inverter_details_resolve_missing_efficiency() {
        let catalog = DeviceCatalog::embedded().unwrap();
        let details = catalog.inverter_details("Generic Central 250kW").unwrap();
        assert!((details.efficiency - 250_000.0 / 256_000.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn merge_replaces_and_appends() {
        let catalog = DeviceCatalog::embedded().unwrap();
        let before = catalog.list_modules().names.len();
        let mut replacement = catalog.default_module().clone();
        replacement.area = 1.95;
        let mut extra = replacement.clone();
        extra.name = "Site Special 400W".into();
        let merged = catalog
            .merge(CatalogDocument {
                modules: vec![replacement, extra],
                default_module: Some("Site Special 400W".into()),
                ..CatalogDocument::default()
            })
            .unwrap();
        assert_eq!(merged.list_modules().names.len(), before + 1);
        assert_eq!(merged.get_module("Generic Mono PERC 72-Cell 400W").unwrap().area, 1.95);
        assert_eq!(merged.default_module().name, "Site Special 400W");
    }

    #[test]
    fn rejects_duplicates_and_bad_windows() {
        let catalog = DeviceCatalog::embedded().unwrap();
        let module = catalog.default_module().clone();
        let mut inverter = catalog.default_inverter().clone();
        let err = DeviceCatalog::from_document(CatalogDocument {
            modules: vec![module.clone(), module.clone()],
            inverters: vec![inverter.clone()],
            ..CatalogDocument::default()
        })
        .unwrap_err();
        assert!(matches!(err, PvEngineError::Configuration(_)));

        inverter.vdc_min = inverter.vdc_max;
        let err = DeviceCatalog::from_document(CatalogDocument {
            modules: vec![module],
            inverters: vec![inverter],
            ..CatalogDocument::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("voltage window"));
    }
}
