use crate::location::{Coordinates, DEFAULT_LOCATION_TIMEOUT};
use capture_protocol::{LinkPreconditions, PeerAddress, SessionTimeouts, DEFAULT_MAX_PAYLOAD_BYTES};
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const PEER_ADDRESS_VAR: &str = "URBANSIGHT_PEER_ADDRESS";
pub const CLASSIFIER_URL_VAR: &str = "URBANSIGHT_CLASSIFIER_URL";
pub const METADATA_URL_VAR: &str = "URBANSIGHT_METADATA_URL";
pub const LATITUDE_VAR: &str = "URBANSIGHT_LATITUDE";
pub const LONGITUDE_VAR: &str = "URBANSIGHT_LONGITUDE";
pub const HTTP_TIMEOUT_VAR: &str = "URBANSIGHT_HTTP_TIMEOUT_SECS";
pub const READ_TIMEOUT_VAR: &str = "URBANSIGHT_READ_TIMEOUT_SECS";
pub const MAX_PAYLOAD_VAR: &str = "URBANSIGHT_MAX_PAYLOAD_BYTES";
pub const RADIO_ENABLED_VAR: &str = "URBANSIGHT_RADIO_ENABLED";
pub const PEER_PAIRED_VAR: &str = "URBANSIGHT_PEER_PAIRED";
pub const LOCATION_TIMEOUT_VAR: &str = "URBANSIGHT_LOCATION_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Everything a capture transaction needs from the environment.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub peer_address: PeerAddress,
    pub classifier_url: Url,
    pub metadata_url: Url,
    /// Location reported when no live location source is wired in
    pub fixed_location: Option<Coordinates>,
    pub http_timeout: Duration,
    pub session_timeouts: SessionTimeouts,
    pub max_payload_bytes: usize,
    pub location_timeout: Duration,
    pub preconditions: LinkPreconditions,
}

impl CaptureConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let require =
            |var: &str| get(var).ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()));

        let peer_address = PeerAddress::from(require(PEER_ADDRESS_VAR)?.trim());
        let classifier_url = parse_url(CLASSIFIER_URL_VAR, &require(CLASSIFIER_URL_VAR)?)?;
        let metadata_url = parse_url(METADATA_URL_VAR, &require(METADATA_URL_VAR)?)?;

        let fixed_location = match (get(LATITUDE_VAR), get(LONGITUDE_VAR)) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(
                parse_number(LATITUDE_VAR, &lat)?,
                parse_number(LONGITUDE_VAR, &lon)?,
            )),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar(LONGITUDE_VAR.to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar(LATITUDE_VAR.to_string())),
        };

        let http_timeout = match get(HTTP_TIMEOUT_VAR) {
            Some(value) => Duration::from_secs(parse_positive(HTTP_TIMEOUT_VAR, &value)?),
            None => Duration::from_secs(30),
        };

        let mut session_timeouts = SessionTimeouts::default();
        if let Some(value) = get(READ_TIMEOUT_VAR) {
            session_timeouts.read = Duration::from_secs(parse_positive(READ_TIMEOUT_VAR, &value)?);
        }

        let max_payload_bytes = match get(MAX_PAYLOAD_VAR) {
            Some(value) => parse_positive(MAX_PAYLOAD_VAR, &value)?,
            None => DEFAULT_MAX_PAYLOAD_BYTES,
        };

        let location_timeout = match get(LOCATION_TIMEOUT_VAR) {
            Some(value) => Duration::from_secs(parse_positive(LOCATION_TIMEOUT_VAR, &value)?),
            None => DEFAULT_LOCATION_TIMEOUT,
        };

        let preconditions = LinkPreconditions {
            radio_enabled: parse_flag(RADIO_ENABLED_VAR, get(RADIO_ENABLED_VAR))?,
            peer_paired: parse_flag(PEER_PAIRED_VAR, get(PEER_PAIRED_VAR))?,
        };

        Ok(Self {
            peer_address,
            classifier_url,
            metadata_url,
            fixed_location,
            http_timeout,
            session_timeouts,
            max_payload_bytes,
            location_timeout,
            preconditions,
        })
    }
}

fn parse_url(var: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

fn parse_number<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Timeouts and size limits; zero would make every capture fail.
fn parse_positive<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse_number(var, value)?;
    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

fn parse_flag(var: &str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(true);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Load configuration with helpful error messages for development
pub fn load_config() -> Result<CaptureConfig, ConfigError> {
    match CaptureConfig::load() {
        Ok(config) => {
            log::info!(
                "Loaded capture configuration for peer {}",
                config.peer_address
            );
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Create a .env file in the project root with:");
            log::error!("{}=...", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}
