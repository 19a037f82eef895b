//! Error types for adapters.

use meshwatch_core::SinkError;
use thiserror::Error;

/// Errors that can occur when talking to an external telemetry service.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The service answered but did not accept the update.
    #[error("Update rejected: {0}")]
    Rejected(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The adapter could not be constructed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(feature = "thingspeak")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

impl From<AdapterError> for SinkError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout => SinkError::Timeout,
            AdapterError::Rejected(body) => SinkError::Rejected(body),
            other => SinkError::Request(other.to_string()),
        }
    }
}
