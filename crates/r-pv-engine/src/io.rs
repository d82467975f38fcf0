//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "JSON/YAML document loading for catalogs, requests and weather."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::{fs, path::Path};

use serde::de::DeserializeOwned;

use crate::{
    api::CalculationRequest,
    catalog::{CatalogDocument, DeviceCatalog},
    errors::{PvEngineError, Result},
    weather::WeatherSeries,
};

/// Parse a document as JSON when it starts with `{` or `[`, YAML otherwise.
pub fn parse_document<T: DeserializeOwned>(data: &str) -> Result<T> {
    let trimmed = data.trim_start();
    let value = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(data)?
    } else {
        serde_yaml::from_str(data).map_err(PvEngineError::YamlSerializationFailed)?
    };
    Ok(value)
}

pub fn load_document<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let data = fs::read_to_string(path)?;
    parse_document(&data)
}

pub fn load_catalog_document(path: impl AsRef<Path>) -> Result<CatalogDocument> {
    load_document(path)
}

/// Embedded catalog, optionally merged with or replaced by a catalog file.
pub fn load_catalog(path: Option<&Path>, replace_embedded: bool) -> Result<DeviceCatalog> {
    match path {
        None => DeviceCatalog::embedded(),
        Some(path) => {
            let document = load_catalog_document(path)?;
            if replace_embedded {
                DeviceCatalog::from_document(document)
            } else {
                DeviceCatalog::embedded()?.merge(document)
            }
        }
    }
}

pub fn load_request(path: impl AsRef<Path>) -> Result<CalculationRequest> {
    let data = fs::read_to_string(path)?;
    CalculationRequest::parse(&data)
}

pub fn load_weather_series(path: impl AsRef<Path>) -> Result<WeatherSeries> {
    let series: WeatherSeries = load_document(path)?;
    series.validate()?;
    Ok(series)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn yaml_catalog_merges_over_embedded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "modules:\n  - name: Yard Panel 410W\n    power: 410\n    voc: 49.5\n    isc: 10.4\n    \
             vmpp: 41.4\n    impp: 9.9\n    area: 2.0\n    temp_coeff_pmax: -0.34\n\
             default_module: Yard Panel 410W\n"
        )
        .unwrap();
        let catalog = load_catalog(Some(file.path()), false).unwrap();
        assert_eq!(catalog.default_module().name, "Yard Panel 410W");
        assert_eq!(catalog.default_module().material, "Not specified");
        assert!(catalog.get_inverter("Generic String 5.0kW").is_ok());
    }

    #[test]
    fn replacing_with_modules_only_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"modules": [{{"name": "Solo", "power": 300, "voc": 40, "isc": 9.5, "vmpp": 33, "impp": 9.1, "area": 1.6, "temp_coeff_pmax": -0.4}}]}}"#
        )
        .unwrap();
        let err = load_catalog(Some(file.path()), true).unwrap_err();
        assert!(matches!(err, PvEngineError::Configuration(_)));
    }

    #[test]
    fn weather_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"monthly_ghi": [1, 2, 3], "monthly_temperature": [], "wind_speed": {{"resolution": "monthly", "values": []}}}}"#
        )
        .unwrap();
        assert!(matches!(
            load_weather_series(file.path()),
            Err(PvEngineError::DataQuality(_))
        ));
    }
}
