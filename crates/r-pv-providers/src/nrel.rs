//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "NREL NSRDB PSM3 weather download and CSV parsing."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use r_pv_common::WeatherConfig;
use r_pv_engine::{
    model::SiteLocation,
    weather::{HourlyWeather, WeatherProvider, WeatherSeries, DAYS_IN_MONTH, HOURS_PER_DAY, HOURS_PER_YEAR},
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::errors::{ProviderError, Result};

const TYPICAL_YEAR_DATASETS: [&str; 3] = ["tmy", "tgy", "tdy"];

const ATTRIBUTES: [&str; 9] = [
    "air_temperature",
    "dew_point",
    "dhi",
    "dni",
    "ghi",
    "surface_albedo",
    "surface_pressure",
    "wind_direction",
    "wind_speed",
];

/// Connection settings for the NSRDB API.
#[derive(Debug, Clone)]
pub struct NrelSettings {
    pub base_url: String,
    pub api_key: String,
    pub email: String,
    /// Dataset name, e.g. `tmy` or a year such as `2019`.
    pub dataset: String,
    pub full_name: String,
    pub affiliation: String,
    pub timeout: Duration,
}

impl NrelSettings {
    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            ProviderError::Credentials(format!(
                "no NREL API key configured (set weather.api_key or {})",
                config.api_key_env
            ))
        })?;
        let email = config
            .email
            .clone()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| ProviderError::Credentials("weather.email is required by NREL".into()))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            email,
            dataset: config.dataset.clone(),
            full_name: "r-pv".to_owned(),
            affiliation: "r-pv".to_owned(),
            timeout: config.timeout,
        })
    }

    fn is_typical_year(&self) -> bool {
        let dataset = self.dataset.to_lowercase();
        TYPICAL_YEAR_DATASETS
            .iter()
            .any(|prefix| dataset.contains(prefix))
    }

    /// Download endpoint for the dataset; single years pick the satellite
    /// coverage by longitude.
    pub fn endpoint(&self, longitude: f64) -> Result<Url> {
        let file = if self.is_typical_year() {
            "psm3-tmy-download.csv"
        } else if -16.0 < longitude && longitude < 91.0 {
            "msg-iodc-download.csv"
        } else if (91.0..182.0).contains(&longitude) {
            "himawari-download.csv"
        } else {
            "psm3-download.csv"
        };
        let url = Url::parse(&format!("{}/{}", self.base_url.trim_end_matches('/'), file))?;
        Ok(url)
    }

    pub fn query(&self, location: &SiteLocation) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.clone()),
            ("full_name", self.full_name.clone()),
            ("email", self.email.clone()),
            ("affiliation", self.affiliation.clone()),
            ("reason", "pv performance modeling".to_owned()),
            ("mailing_list", "false".to_owned()),
            (
                "wkt",
                format!("POINT({:.4} {:.4})", location.longitude, location.latitude),
            ),
            ("names", self.dataset.clone()),
            ("attributes", ATTRIBUTES.join(",")),
            ("leap_day", "false".to_owned()),
            ("utc", "false".to_owned()),
            ("interval", "60".to_owned()),
        ]
    }
}

/// Weather provider backed by the NSRDB Physical Solar Model (PSM3).
#[derive(Debug, Clone)]
pub struct NrelPsm3Provider {
    client: Client,
    settings: NrelSettings,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

impl NrelPsm3Provider {
    pub fn new(settings: NrelSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &NrelSettings {
        &self.settings
    }

    async fn download(&self, location: &SiteLocation) -> Result<String> {
        let url = self.settings.endpoint(location.longitude)?;
        debug!(endpoint = %url, dataset = %self.settings.dataset, "requesting PSM3 data");
        let response = self
            .client
            .get(url)
            .query(&self.settings.query(location))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .filter(|parsed| !parsed.errors.is_empty())
                .map(|parsed| parsed.errors.join("; "))
                .unwrap_or(body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: message,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl WeatherProvider for NrelPsm3Provider {
    fn name(&self) -> &str {
        "nrel-psm3"
    }

    async fn fetch(&self, location: &SiteLocation) -> r_pv_engine::Result<WeatherSeries> {
        let body = self.download(location).await?;
        let table = parse_psm3(&body)?;
        info!(
            latitude = ?table.metadata.latitude,
            longitude = ?table.metadata.longitude,
            elevation = ?table.metadata.elevation,
            time_zone = ?table.metadata.time_zone,
            "PSM3 data parsed"
        );
        table.into_series(format!("nrel-psm3:{}", self.settings.dataset))
    }
}

/// Site header of a PSM3 file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Psm3Metadata {
    pub source: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Hours east of UTC of the local standard time the rows are stamped in.
    pub time_zone: Option<f64>,
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Psm3Table {
    pub metadata: Psm3Metadata,
    pub hourly: HourlyWeather,
}

impl Psm3Table {
    /// Weather series whose hours keep the zone declared in the file header.
    pub fn into_series(self, source: impl Into<String>) -> r_pv_engine::Result<WeatherSeries> {
        let series = WeatherSeries::from_hourly(self.hourly, source)?;
        Ok(match self.metadata.time_zone {
            Some(zone) => series.with_utc_offset(zone),
            None => series,
        })
    }
}

struct Columns {
    month: usize,
    day: usize,
    hour: usize,
    ghi: usize,
    dni: usize,
    dhi: usize,
    temperature: usize,
    wind_speed: usize,
}

impl Columns {
    fn locate(header: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|column| column.eq_ignore_ascii_case(name))
                .ok_or_else(|| ProviderError::parse(format!("PSM3 column '{name}' missing")))
        };
        Ok(Self {
            month: find("Month")?,
            day: find("Day")?,
            hour: find("Hour")?,
            ghi: find("GHI")?,
            dni: find("DNI")?,
            dhi: find("DHI")?,
            temperature: find("Temperature")?,
            wind_speed: find("Wind Speed")?,
        })
    }
}

fn field<'a>(record: &'a csv::StringRecord, index: usize, line: usize) -> Result<&'a str> {
    record
        .get(index)
        .ok_or_else(|| ProviderError::parse(format!("row {line} is missing column {index}")))
}

fn number(record: &csv::StringRecord, index: usize, line: usize) -> Result<f64> {
    let raw = field(record, index, line)?;
    raw.parse::<f64>()
        .map_err(|_| ProviderError::parse(format!("row {line}: '{raw}' is not a number")))
}

fn whole(record: &csv::StringRecord, index: usize, line: usize) -> Result<usize> {
    let raw = field(record, index, line)?;
    raw.parse::<usize>()
        .map_err(|_| ProviderError::parse(format!("row {line}: '{raw}' is not a whole number")))
}

/// Position of (month 1..=12, day 1..=31, hour 0..=23) in a 365-day year.
fn hour_index(month: usize, day: usize, hour: usize) -> Option<usize> {
    if !(1..=12).contains(&month) || hour >= HOURS_PER_DAY {
        return None;
    }
    let days_in_month = DAYS_IN_MONTH[month - 1];
    if day == 0 || day > days_in_month {
        return None;
    }
    let day_of_year: usize = DAYS_IN_MONTH[..month - 1].iter().sum::<usize>() + day - 1;
    Some(day_of_year * HOURS_PER_DAY + hour)
}

/// Parse a PSM3 CSV document: two metadata lines, a column header, then
/// hourly rows. February 29 is dropped; every hour of a 365-day year must
/// be present exactly once.
pub fn parse_psm3(body: &str) -> Result<Psm3Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let mut records = reader.records();

    let mut next = |what: &str| -> Result<csv::StringRecord> {
        records
            .next()
            .transpose()?
            .ok_or_else(|| ProviderError::parse(format!("PSM3 document ends before the {what}")))
    };
    let names = next("metadata header")?;
    let values = next("metadata values")?;
    let header = next("column header")?;
    let metadata = parse_metadata(&names, &values);
    let columns = Columns::locate(&header)?;

    let mut hourly = HourlyWeather {
        ghi: vec![0.0; HOURS_PER_YEAR],
        dni: vec![0.0; HOURS_PER_YEAR],
        dhi: vec![0.0; HOURS_PER_YEAR],
        air_temperature: vec![0.0; HOURS_PER_YEAR],
        wind_speed: vec![0.0; HOURS_PER_YEAR],
    };
    let mut seen = vec![false; HOURS_PER_YEAR];

    for (offset, record) in records.enumerate() {
        let record = record?;
        let line = offset + 4;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let month = whole(&record, columns.month, line)?;
        let day = whole(&record, columns.day, line)?;
        let hour = whole(&record, columns.hour, line)?;
        if month == 2 && day == 29 {
            continue;
        }
        let index = hour_index(month, day, hour).ok_or_else(|| {
            ProviderError::parse(format!("row {line}: invalid timestamp {month}/{day} {hour}h"))
        })?;
        if seen[index] {
            return Err(ProviderError::parse(format!(
                "row {line}: duplicate hour {month}/{day} {hour}h"
            )));
        }
        seen[index] = true;
        hourly.ghi[index] = number(&record, columns.ghi, line)?;
        hourly.dni[index] = number(&record, columns.dni, line)?;
        hourly.dhi[index] = number(&record, columns.dhi, line)?;
        hourly.air_temperature[index] = number(&record, columns.temperature, line)?;
        hourly.wind_speed[index] = number(&record, columns.wind_speed, line)?;
    }

    let missing = seen.iter().filter(|present| !**present).count();
    if missing > 0 {
        return Err(ProviderError::parse(format!(
            "PSM3 document covers {} of {HOURS_PER_YEAR} hours",
            HOURS_PER_YEAR - missing
        )));
    }
    Ok(Psm3Table { metadata, hourly })
}

fn parse_metadata(names: &csv::StringRecord, values: &csv::StringRecord) -> Psm3Metadata {
    let lookup = |key: &str| {
        names
            .iter()
            .position(|name| name == key)
            .and_then(|idx| values.get(idx))
            .filter(|value| !value.is_empty())
    };
    Psm3Metadata {
        source: lookup("Source").map(str::to_owned),
        latitude: lookup("Latitude").and_then(|v| v.parse().ok()),
        longitude: lookup("Longitude").and_then(|v| v.parse().ok()),
        time_zone: lookup("Time Zone").and_then(|v| v.parse().ok()),
        elevation: lookup("Elevation").and_then(|v| v.parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dataset: &str) -> NrelSettings {
        NrelSettings {
            base_url: "https://developer.nrel.gov/api/nsrdb/v2/solar/".into(),
            api_key: "DEMO_KEY".into(),
            email: "ops@example.com".into(),
            dataset: dataset.into(),
            full_name: "r-pv".into(),
            affiliation: "r-pv".into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn typical_year_uses_tmy_endpoint() {
        let url = settings("tmy-2020").endpoint(90.4).unwrap();
        assert_eq!(
            url.as_str(),
            "https://developer.nrel.gov/api/nsrdb/v2/solar/psm3-tmy-download.csv"
        );
    }

    #[test]
    fn single_years_choose_coverage_by_longitude() {
        let nrel = settings("2019");
        assert!(nrel.endpoint(10.0).unwrap().path().ends_with("msg-iodc-download.csv"));
        assert!(nrel.endpoint(139.7).unwrap().path().ends_with("himawari-download.csv"));
        assert!(nrel.endpoint(91.0).unwrap().path().ends_with("himawari-download.csv"));
        assert!(nrel.endpoint(-104.9).unwrap().path().ends_with("psm3-download.csv"));
        assert!(nrel.endpoint(-16.0).unwrap().path().ends_with("psm3-download.csv"));
    }

    #[test]
    fn query_carries_point_and_attributes() {
        let location = SiteLocation::new(39.7392, -104.9903).unwrap();
        let query = settings("tmy").query(&location);
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("wkt"), Some("POINT(-104.9903 39.7392)"));
        assert_eq!(get("leap_day"), Some("false"));
        assert_eq!(get("interval"), Some("60"));
        assert!(get("attributes").unwrap().contains("wind_speed"));
    }

    #[test]
    fn hour_index_skips_nothing_in_a_common_year() {
        assert_eq!(hour_index(1, 1, 0), Some(0));
        assert_eq!(hour_index(3, 1, 0), Some(59 * 24));
        assert_eq!(hour_index(12, 31, 23), Some(HOURS_PER_YEAR - 1));
        assert_eq!(hour_index(2, 30, 0), None);
        assert_eq!(hour_index(13, 1, 0), None);
    }

    #[test]
    fn missing_columns_are_reported() {
        let body = "Source,Latitude\nNSRDB,39.7\nYear,Month,Day,Hour,GHI\n";
        let err = parse_psm3(body).unwrap_err();
        assert!(err.to_string().contains("DNI"));
    }

    #[test]
    fn fractional_time_zones_are_read() {
        let names = csv::StringRecord::from(vec!["Source", "Latitude", "Longitude", "Time Zone"]);
        let values = csv::StringRecord::from(vec!["NSRDB", "28.61", "77.21", "5.5"]);
        let metadata = parse_metadata(&names, &values);
        assert_eq!(metadata.time_zone, Some(5.5));
        assert_eq!(metadata.longitude, Some(77.21));
    }

    #[test]
    fn truncated_documents_are_rejected() {
        let err = parse_psm3("Source,Latitude\n").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }
}
