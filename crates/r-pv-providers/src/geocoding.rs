//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Best-effort reverse geocoding against a Nominatim service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use r_pv_common::GeocodingConfig;
use r_pv_engine::{
    api::{PlaceName, ReverseGeocoder},
    model::SiteLocation,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{ProviderError, Result};

#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    country: Option<String>,
}

impl From<Address> for PlaceName {
    fn from(address: Address) -> Self {
        PlaceName {
            city: address
                .city
                .or(address.town)
                .or(address.village)
                .or(address.municipality),
            country: address.country,
        }
    }
}

/// Names a coordinate through the Nominatim `/reverse` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: Url,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        let endpoint = Url::parse(&format!("{}/reverse", config.base_url.trim_end_matches('/')))?;
        Ok(Self { client, endpoint })
    }

    pub async fn lookup(&self, location: &SiteLocation) -> Result<PlaceName> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("format", "jsonv2".to_owned()),
                ("lat", location.latitude.to_string()),
                ("lon", location.longitude.to_string()),
                ("zoom", "10".to_owned()),
                ("accept-language", "en".to_owned()),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_reverse(&body)
    }
}

fn parse_reverse(body: &str) -> Result<PlaceName> {
    let parsed: ReverseResponse = serde_json::from_str(body)?;
    Ok(parsed.address.map(PlaceName::from).unwrap_or_default())
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn place_name(&self, location: &SiteLocation) -> Option<PlaceName> {
        match self.lookup(location).await {
            Ok(place) => {
                debug!(city = ?place.city, country = ?place.country, "reverse geocoded site");
                Some(place)
            }
            Err(err) => {
                warn!(error = %err, "reverse geocoding failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn town_is_used_when_city_is_absent() {
        let place = parse_reverse(
            r#"{"display_name": "x", "address": {"town": "Savar", "country": "Bangladesh"}}"#,
        )
        .unwrap();
        assert_eq!(place.city.as_deref(), Some("Savar"));
        assert_eq!(place.country.as_deref(), Some("Bangladesh"));
    }

    #[test]
    fn open_ocean_yields_empty_place() {
        let place = parse_reverse(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert_eq!(place, PlaceName::default());
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let geocoder = NominatimGeocoder::new(&GeocodingConfig::default()).unwrap();
        assert_eq!(
            geocoder.endpoint.as_str(),
            "https://nominatim.openstreetmap.org/reverse"
        );
    }
}
