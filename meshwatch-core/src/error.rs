//! Error types for the aggregator.

use std::time::Duration;

use thiserror::Error;

/// Invalid aggregator settings, reported before anything starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The root node id must be positive.
    #[error("root node id must be nonzero")]
    InvalidRoot,

    /// A duration setting was zero.
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },

    /// A ring buffer or queue capacity was zero.
    #[error("{name} capacity must be greater than zero")]
    ZeroCapacity { name: &'static str },

    /// Sweeping less often than the threshold would delay offline detection
    /// by more than one threshold.
    #[error("sweep interval {interval:?} must be shorter than offline threshold {threshold:?}")]
    SweepTooSlow {
        interval: Duration,
        threshold: Duration,
    },
}

/// Failure reported by an external telemetry sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("sink rejected the update: {0}")]
    Rejected(String),

    #[error("request timed out")]
    Timeout,
}

/// A viewer command that could not be accepted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not a command message")]
    NotACommand,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}
