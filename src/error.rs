use crate::config::ConfigError;
use capture_protocol::{ConnectionError, ProtocolError, SessionError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdgeError>;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures that end a capture transaction.
///
/// Classification, location and submission problems never show up here; they
/// degrade to fallback values instead.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Failed to send trigger: {0}")]
    Trigger(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
