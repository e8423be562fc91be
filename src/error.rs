//! Error types for queueserve operations.
//!
//! Defines error types for the subsystems outside the scheduler core:
//! - Configuration loading and validation
//! - Wire protocol decoding
//!
//! Queue and worker pool errors live next to their types in
//! [`crate::scheduler`].

use thiserror::Error;

/// Errors that can occur while building the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The scheduling policy name is not recognized.
    #[error("Unknown scheduling policy '{0}' (expected FIFO or SJN)")]
    UnknownPolicy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while reading or writing protocol records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A timespec field is negative or its nanoseconds are out of range.
    #[error("Invalid timespec in request {id}: secs={secs}, nanos={nanos}")]
    InvalidTimespec { id: u64, secs: i64, nanos: i64 },
}
