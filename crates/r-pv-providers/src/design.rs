//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Best-effort site design temperatures from the ASHRAE climatic design conditions service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use r_pv_common::DesignConditionsConfig;
use r_pv_engine::{api::DesignConditions, geometry::DesignTemperatures, model::SiteLocation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{ProviderError, Result};

const HEATING_DRY_BULB: &str = "heating_DB_99.6";
const COOLING_DRY_BULB: &str = "cooling_DB_MCWB_0.4_DB";

#[derive(Debug, Default, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    meteo_stations: Vec<serde_json::Map<String, Value>>,
}

/// Looks up the nearest station's heating and cooling design dry bulbs.
#[derive(Debug, Clone)]
pub struct AshraeDesignConditions {
    client: Client,
    places: Url,
    parameters: Url,
    version: String,
}

impl AshraeDesignConditions {
    pub fn new(config: &DesignConditionsConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            places: Url::parse(&format!("{base}/request_places.php"))?,
            parameters: Url::parse(&format!("{base}/request_meteo_parametres.php"))?,
            version: config.ashrae_version.clone(),
        })
    }

    pub async fn lookup(&self, location: &SiteLocation) -> Result<DesignTemperatures> {
        let places = self
            .post(
                &self.places,
                &[
                    ("lat", location.latitude.to_string()),
                    ("long", location.longitude.to_string()),
                    ("number", "10".to_owned()),
                    ("ashrae_version", self.version.clone()),
                ],
            )
            .await?;
        let wmo = nearest_station(&places)?;
        debug!(%wmo, "nearest design conditions station");

        let parameters = self
            .post(
                &self.parameters,
                &[
                    ("wmo", wmo),
                    ("ashrae_version", self.version.clone()),
                    ("si_ip", "SI".to_owned()),
                ],
            )
            .await?;
        parse_design_temperatures(&parameters)
    }

    async fn post(&self, url: &Url, form: &[(&str, String)]) -> Result<String> {
        let response = self.client.post(url.clone()).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn first_station(body: &str) -> Result<serde_json::Map<String, Value>> {
    let parsed: StationsResponse = serde_json::from_str(body.trim_start_matches('\u{feff}'))?;
    parsed
        .meteo_stations
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::parse("no design conditions station near the site"))
}

fn nearest_station(body: &str) -> Result<String> {
    let station = first_station(body)?;
    match station.get("wmo") {
        Some(Value::String(wmo)) if !wmo.trim().is_empty() => Ok(wmo.trim().to_owned()),
        Some(Value::Number(wmo)) => Ok(wmo.to_string()),
        _ => Err(ProviderError::parse("station entry carries no WMO number")),
    }
}

/// The service reports temperatures as strings or numbers.
fn temperature(station: &serde_json::Map<String, Value>, key: &str) -> Result<f64> {
    let value = match station.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProviderError::parse(format!("station has no usable '{key}'")))
}

fn parse_design_temperatures(body: &str) -> Result<DesignTemperatures> {
    let station = first_station(body)?;
    Ok(DesignTemperatures {
        min: temperature(&station, HEATING_DRY_BULB)?,
        max: temperature(&station, COOLING_DRY_BULB)?,
    })
}

#[async_trait]
impl DesignConditions for AshraeDesignConditions {
    async fn design_temperatures(&self, location: &SiteLocation) -> Option<DesignTemperatures> {
        match self.lookup(location).await {
            Ok(design) => {
                debug!(min = design.min, max = design.max, "site design temperatures");
                Some(design)
            }
            Err(err) => {
                warn!(error = %err, "design temperature lookup failed; using configured defaults");
                None
            }
        }
    }
}
