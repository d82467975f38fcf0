//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Weather provider reading a local weather file."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use r_pv_engine::{
    io::parse_document,
    model::SiteLocation,
    weather::{WeatherProvider, WeatherSeries},
};
use tracing::debug;

use crate::{errors::ProviderError, nrel::parse_psm3};

/// Serves the same weather year for every site.
///
/// `.csv` files are read as PSM3 downloads; anything else must be a
/// serialized `WeatherSeries` in JSON or YAML.
#[derive(Debug, Clone)]
pub struct FileWeatherProvider {
    path: PathBuf,
    label: String,
}

impl FileWeatherProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_csv(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }
}

#[async_trait]
impl WeatherProvider for FileWeatherProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self, location: &SiteLocation) -> r_pv_engine::Result<WeatherSeries> {
        debug!(
            path = %self.path.display(),
            latitude = location.latitude,
            longitude = location.longitude,
            "reading weather file"
        );
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(ProviderError::from)?;

        let mut series = if self.is_csv() {
            parse_psm3(&data)?.into_series(self.label.clone())?
        } else {
            parse_document::<WeatherSeries>(&data)?
        };
        if series.source.is_empty() {
            series.source = self.label.clone();
        }
        series.validate()?;
        Ok(series)
    }
}
