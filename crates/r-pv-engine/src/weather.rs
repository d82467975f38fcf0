//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Weather series contract, validation and the provider seam."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{PvEngineError, Result};
use crate::model::SiteLocation;

pub const MONTHS: usize = 12;
pub const DAYS_PER_YEAR: usize = 365;
pub const HOURS_PER_DAY: usize = 24;
pub const HOURS_PER_YEAR: usize = DAYS_PER_YEAR * HOURS_PER_DAY;
pub const DAYS_IN_MONTH: [usize; MONTHS] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Position of one simulated hour within the representative (non-leap) year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourStamp {
    /// Index into the 8760-hour series.
    pub index: usize,
    /// Zero-based month.
    pub month: usize,
    /// Zero-based day of year.
    pub day: usize,
    pub hour: usize,
}

impl HourStamp {
    pub fn day_of_year(&self) -> u32 {
        self.day as u32 + 1
    }

    /// Midpoint of the hour interval, in local standard time.
    pub fn mid_hour(&self) -> f64 {
        self.hour as f64 + 0.5
    }
}

/// Every hour of the representative year, in order.
pub fn representative_year() -> impl Iterator<Item = HourStamp> {
    DAYS_IN_MONTH
        .iter()
        .enumerate()
        .flat_map(|(month, days)| std::iter::repeat(month).take(*days))
        .enumerate()
        .flat_map(|(day, month)| {
            (0..HOURS_PER_DAY).map(move |hour| HourStamp {
                index: day * HOURS_PER_DAY + hour,
                month,
                day,
                hour,
            })
        })
}

/// Hourly meteorological detail for a full year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyWeather {
    /// W/m², hourly mean.
    pub ghi: Vec<f64>,
    pub dni: Vec<f64>,
    pub dhi: Vec<f64>,
    /// °C
    pub air_temperature: Vec<f64>,
    /// m/s
    pub wind_speed: Vec<f64>,
}

impl HourlyWeather {
    fn validate(&self) -> Result<()> {
        let columns = [
            ("ghi", &self.ghi),
            ("dni", &self.dni),
            ("dhi", &self.dhi),
            ("air_temperature", &self.air_temperature),
            ("wind_speed", &self.wind_speed),
        ];
        for (name, values) in columns {
            if values.len() != HOURS_PER_YEAR {
                return Err(PvEngineError::data_quality(format!(
                    "hourly {name} has {} values, expected {HOURS_PER_YEAR}",
                    values.len()
                )));
            }
            ensure_finite(name, values)?;
        }
        for (name, values) in [("ghi", &self.ghi), ("dni", &self.dni), ("dhi", &self.dhi)] {
            if let Some(idx) = values.iter().position(|v| *v < 0.0) {
                return Err(PvEngineError::data_quality(format!(
                    "hourly {name} is negative at hour {idx}"
                )));
            }
        }
        if let Some(idx) = self.wind_speed.iter().position(|v| *v < 0.0) {
            return Err(PvEngineError::data_quality(format!(
                "hourly wind_speed is negative at hour {idx}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", content = "values", rename_all = "lowercase")]
pub enum WindSpeed {
    Monthly(Vec<f64>),
    Hourly(Vec<f64>),
}

impl WindSpeed {
    pub fn at(&self, stamp: &HourStamp) -> f64 {
        match self {
            WindSpeed::Monthly(values) => values[stamp.month],
            WindSpeed::Hourly(values) => values[stamp.index],
        }
    }

    /// Mean wind speed per month.
    pub fn monthly_means(&self) -> Vec<f64> {
        match self {
            WindSpeed::Monthly(values) => values.clone(),
            WindSpeed::Hourly(values) => monthly_aggregate(values, Aggregate::Mean),
        }
    }
}

/// Weather input for one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSeries {
    /// Monthly global horizontal irradiation totals (kWh/m²).
    pub monthly_ghi: Vec<f64>,
    /// Monthly mean air temperature (°C).
    pub monthly_temperature: Vec<f64>,
    pub wind_speed: WindSpeed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<HourlyWeather>,
    #[serde(default)]
    pub source: String,
    /// Hours east of UTC that the hourly stamps are expressed in; the
    /// longitude's nominal zone when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<f64>,
}

impl WeatherSeries {
    /// Derive the monthly view from a full hourly year.
    pub fn from_hourly(hourly: HourlyWeather, source: impl Into<String>) -> Result<Self> {
        hourly.validate()?;
        let monthly_ghi = monthly_aggregate(&hourly.ghi, Aggregate::Sum)
            .into_iter()
            .map(|wh| wh / 1000.0)
            .collect();
        let monthly_temperature = monthly_aggregate(&hourly.air_temperature, Aggregate::Mean);
        Ok(Self {
            monthly_ghi,
            monthly_temperature,
            wind_speed: WindSpeed::Hourly(hourly.wind_speed.clone()),
            hourly: Some(hourly),
            source: source.into(),
            utc_offset: None,
        })
    }

    /// Stamp the series with the standard-time zone its hours are expressed in.
    pub fn with_utc_offset(mut self, hours: f64) -> Self {
        self.utc_offset = Some(hours);
        self
    }

    /// Zone used to place the series' hours against the sun at `longitude`.
    pub fn utc_offset_for(&self, longitude: f64) -> f64 {
        self.utc_offset
            .unwrap_or_else(|| crate::solar::nominal_utc_offset(longitude))
    }

    /// Reject incomplete or non-physical data instead of zero-filling it.
    pub fn validate(&self) -> Result<()> {
        if self.monthly_ghi.len() != MONTHS {
            return Err(PvEngineError::data_quality(format!(
                "monthly_ghi has {} entries, expected {MONTHS}",
                self.monthly_ghi.len()
            )));
        }
        if self.monthly_temperature.len() != MONTHS {
            return Err(PvEngineError::data_quality(format!(
                "monthly_temperature has {} entries, expected {MONTHS}",
                self.monthly_temperature.len()
            )));
        }
        ensure_finite("monthly_ghi", &self.monthly_ghi)?;
        ensure_finite("monthly_temperature", &self.monthly_temperature)?;
        if let Some(month) = self.monthly_ghi.iter().position(|v| *v < 0.0) {
            return Err(PvEngineError::data_quality(format!(
                "monthly_ghi is negative in month {}",
                month + 1
            )));
        }
        match &self.wind_speed {
            WindSpeed::Monthly(values) if values.len() != MONTHS => {
                return Err(PvEngineError::data_quality(format!(
                    "monthly wind speed has {} entries, expected {MONTHS}",
                    values.len()
                )))
            }
            WindSpeed::Hourly(values) if values.len() != HOURS_PER_YEAR => {
                return Err(PvEngineError::data_quality(format!(
                    "hourly wind speed has {} entries, expected {HOURS_PER_YEAR}",
                    values.len()
                )))
            }
            WindSpeed::Monthly(values) | WindSpeed::Hourly(values) => {
                ensure_finite("wind_speed", values)?;
                if values.iter().any(|v| *v < 0.0) {
                    return Err(PvEngineError::data_quality("wind speed is negative"));
                }
            }
        }
        if let Some(offset) = self.utc_offset {
            if !offset.is_finite() || !(-12.0..=14.0).contains(&offset) {
                return Err(PvEngineError::data_quality(format!(
                    "utc_offset must lie in [-12, 14] hours (got {offset})"
                )));
            }
        }
        if let Some(hourly) = &self.hourly {
            hourly.validate()?;
        }
        Ok(())
    }

    pub fn annual_ghi(&self) -> f64 {
        self.monthly_ghi.iter().sum()
    }

    pub fn summary(&self) -> WeatherSummary {
        WeatherSummary {
            source: self.source.clone(),
            monthly_ghi: self.monthly_ghi.clone(),
            monthly_temperature: self.monthly_temperature.clone(),
            monthly_wind_speed: self.wind_speed.monthly_means(),
            annual_ghi: self.annual_ghi(),
            hourly_detail: self.hourly.is_some(),
            utc_offset: self.utc_offset,
        }
    }
}

/// Compact weather view returned with calculation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub source: String,
    pub monthly_ghi: Vec<f64>,
    pub monthly_temperature: Vec<f64>,
    pub monthly_wind_speed: Vec<f64>,
    pub annual_ghi: f64,
    pub hourly_detail: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<f64>,
}

fn ensure_finite(name: &str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(PvEngineError::data_quality(format!(
            "{name} contains a non-finite value at index {idx}"
        ))),
        None => Ok(()),
    }
}

#[derive(Clone, Copy)]
enum Aggregate {
    Sum,
    Mean,
}

fn monthly_aggregate(hourly: &[f64], aggregate: Aggregate) -> Vec<f64> {
    let mut totals = vec![0.0; MONTHS];
    let mut counts = vec![0usize; MONTHS];
    for stamp in representative_year() {
        if let Some(value) = hourly.get(stamp.index) {
            totals[stamp.month] += value;
            counts[stamp.month] += 1;
        }
    }
    match aggregate {
        Aggregate::Sum => totals,
        Aggregate::Mean => totals
            .into_iter()
            .zip(counts)
            .map(|(total, count)| if count > 0 { total / count as f64 } else { 0.0 })
            .collect(),
    }
}

/// Source of weather data for a site.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, location: &SiteLocation) -> Result<WeatherSeries>;
}

/// Timeout and retry policy around a provider call.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 1,
        }
    }
}

/// Fetch and validate weather under `policy`.
///
/// Transport failures and timeouts are retried; data-quality failures are
/// returned as-is since a second attempt would see the same data.
pub async fn fetch_weather(
    provider: &dyn WeatherProvider,
    location: &SiteLocation,
    policy: FetchPolicy,
) -> Result<WeatherSeries> {
    let attempts = policy.retries + 1;
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, provider.fetch(location)).await {
            Ok(Ok(series)) => {
                series.validate()?;
                info!(
                    provider = provider.name(),
                    attempt,
                    annual_ghi = series.annual_ghi(),
                    "weather data fetched"
                );
                return Ok(series);
            }
            Ok(Err(err @ PvEngineError::DataQuality(_))) => return Err(err),
            Ok(Err(err)) => {
                warn!(provider = provider.name(), attempt, error = %err, "weather fetch failed");
                last_error = match err {
                    PvEngineError::WeatherUnavailable(reason) => reason,
                    other => other.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    attempt,
                    timeout_secs = policy.timeout.as_secs_f64(),
                    "weather fetch timed out"
                );
                last_error = format!("timed out after {:?}", policy.timeout);
            }
        }
    }
    Err(PvEngineError::WeatherUnavailable(format!(
        "{} failed after {} attempt(s): {}",
        provider.name(),
        attempts,
        last_error
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn flat_series(monthly_ghi: f64, temperature: f64) -> WeatherSeries {
        WeatherSeries {
            monthly_ghi: vec![monthly_ghi; MONTHS],
            monthly_temperature: vec![temperature; MONTHS],
            wind_speed: WindSpeed::Monthly(vec![1.0; MONTHS]),
            hourly: None,
            source: "test".into(),
            utc_offset: None,
        }
    }

    #[test]
    fn representative_year_has_8760_ordered_hours() {
        let stamps: Vec<_> = representative_year().collect();
        assert_eq!(stamps.len(), HOURS_PER_YEAR);
        assert!(stamps.iter().enumerate().all(|(i, s)| s.index == i));
        assert_eq!(stamps[31 * 24].month, 1);
        assert_eq!(stamps.last().map(|s| (s.month, s.day, s.hour)), Some((11, 364, 23)));
    }

    #[test]
    fn short_monthly_series_is_rejected() {
        let mut series = flat_series(150.0, 20.0);
        series.monthly_ghi.pop();
        assert!(matches!(series.validate(), Err(PvEngineError::DataQuality(_))));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut series = flat_series(150.0, 20.0);
        series.monthly_temperature[4] = f64::NAN;
        let err = series.validate().unwrap_err();
        assert!(err.to_string().contains("monthly_temperature"));
    }

    #[test]
    fn hourly_series_aggregates_to_months() {
        let hourly = HourlyWeather {
            ghi: vec![100.0; HOURS_PER_YEAR],
            dni: vec![0.0; HOURS_PER_YEAR],
            dhi: vec![100.0; HOURS_PER_YEAR],
            air_temperature: vec![18.0; HOURS_PER_YEAR],
            wind_speed: vec![2.0; HOURS_PER_YEAR],
        };
        let series = WeatherSeries::from_hourly(hourly, "test").unwrap();
        assert!((series.monthly_ghi[0] - 31.0 * 24.0 * 0.1).abs() < 1e-9);
        assert!((series.monthly_ghi[1] - 28.0 * 24.0 * 0.1).abs() < 1e-9);
        assert!((series.monthly_temperature[6] - 18.0).abs() < 1e-9);
        assert_eq!(series.summary().monthly_wind_speed, vec![2.0; MONTHS]);
        series.validate().unwrap();
    }

    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl WeatherProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self, _location: &SiteLocation) -> Result<WeatherSeries> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(PvEngineError::WeatherUnavailable("connection reset".into()))
            } else {
                Ok(flat_series(120.0, 15.0))
            }
        }
    }

    #[tokio::test]
    async fn single_retry_recovers_from_one_failure() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 1,
        };
        let location = SiteLocation::new(10.0, 10.0).unwrap();
        let series = fetch_weather(&provider, &location, FetchPolicy::default())
            .await
            .unwrap();
        assert_eq!(series.source, "test");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_is_weather_unavailable() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 5,
        };
        let location = SiteLocation::new(10.0, 10.0).unwrap();
        let err = fetch_weather(&provider, &location, FetchPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PvEngineError::WeatherUnavailable(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        let message = err.to_string();
        assert_eq!(message.matches("weather data unavailable").count(), 1, "{message}");
        assert!(message.ends_with("connection reset"), "{message}");
    }

    #[test]
    fn utc_offset_outside_real_zones_is_rejected() {
        let series = flat_series(150.0, 20.0).with_utc_offset(5.5);
        series.validate().unwrap();
        assert_eq!(series.utc_offset_for(90.0), 5.5);
        assert_eq!(flat_series(150.0, 20.0).utc_offset_for(-104.99), -7.0);
        assert!(matches!(
            flat_series(150.0, 20.0).with_utc_offset(15.0).validate(),
            Err(PvEngineError::DataQuality(_))
        ));
    }

    struct SlowProvider;

    #[async_trait]
    impl WeatherProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, _location: &SiteLocation) -> Result<WeatherSeries> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(flat_series(120.0, 15.0))
        }
    }

    #[tokio::test]
    async fn timeout_maps_to_weather_unavailable() {
        let location = SiteLocation::new(10.0, 10.0).unwrap();
        let policy = FetchPolicy {
            timeout: Duration::from_millis(20),
            retries: 0,
        };
        let err = fetch_weather(&SlowProvider, &location, policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
