//! Shared building blocks for the metrics collector: the error taxonomy used
//! for retry decisions and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{
    retry_with_backoff, ConfigurationError, DatabaseError, ErrorCategory, ErrorClassification,
    NetworkError,
};
