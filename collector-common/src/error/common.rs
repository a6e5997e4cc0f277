//! Failure modes shared by the collector crates.
//!
//! Store access, outbound HTTP and configuration fail the same way no matter
//! which provider is being collected. Crate-specific errors wrap these with
//! `#[from]` and inherit their retry classification.

use std::time::Duration;
use thiserror::Error;

/// Metric store failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DatabaseError {
    /// Statement rejected by the server
    #[error("Query failed: {0}")]
    Query(String),

    /// Server unreachable or the connection dropped mid-batch
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// No pooled connection became free within the acquire timeout
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
                DatabaseError::Connection(err.to_string())
            }
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

/// A provider request that never produced a status line.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Sent but the exchange broke, e.g. a truncated body
    #[error("Request failed: {0}")]
    Request(String),

    /// Rejected before sending (bad URL, bad header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Settings that make a run impossible. Never retried.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Provider credential absent from both settings and environment
    #[error("Environment variable not set: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigurationError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
