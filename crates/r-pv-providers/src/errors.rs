//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Provider error type and its mapping into engine errors."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use r_pv_engine::PvEngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failures raised while talking to or parsing an external source.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed payload: {0}")]
    Parse(String),
    #[error("missing credentials: {0}")]
    Credentials(String),
}

impl ProviderError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

impl From<ProviderError> for PvEngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Csv(_) | ProviderError::Parse(_) => {
                PvEngineError::DataQuality(err.to_string())
            }
            ProviderError::Credentials(_) => PvEngineError::Configuration(err.to_string()),
            _ => PvEngineError::WeatherUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_become_data_quality() {
        let err: PvEngineError = ProviderError::parse("no header").into();
        assert_eq!(err.kind(), "data_quality");
    }

    #[test]
    fn status_failures_become_unavailable() {
        let err: PvEngineError = ProviderError::Status {
            status: 503,
            body: "busy".into(),
        }
        .into();
        assert_eq!(err.kind(), "weather_unavailable");
        assert!(err.to_string().contains("503"));
    }
}
