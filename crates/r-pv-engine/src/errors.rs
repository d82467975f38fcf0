//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error taxonomy shared by the PV modeling engine."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PvEngineError>;

#[derive(Debug, Error)]
pub enum PvEngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{kind} '{name}' not found in catalog")]
    NotFound { kind: &'static str, name: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no feasible array configuration: {0}")]
    Sizing(String),
    #[error("weather data rejected: {0}")]
    DataQuality(String),
    #[error("weather data unavailable: {0}")]
    WeatherUnavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationFailed(#[from] serde_json::Error),
    #[error("yaml serialization error: {0}")]
    YamlSerializationFailed(#[from] serde_yaml::Error),
}

impl PvEngineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn data_quality(message: impl Into<String>) -> Self {
        Self::DataQuality(message.into())
    }

    /// Stable machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound { .. } => "not_found",
            Self::Configuration(_) => "configuration",
            Self::Sizing(_) => "sizing",
            Self::DataQuality(_) => "data_quality",
            Self::WeatherUnavailable(_) => "weather_unavailable",
            Self::Io(_) | Self::SerializationFailed(_) | Self::YamlSerializationFailed(_) => {
                "internal"
            }
        }
    }
}
