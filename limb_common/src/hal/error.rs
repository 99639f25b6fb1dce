//! HAL error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// A caller-supplied value is out of range. Raised before any bus write.
    #[error("Invalid argument: {what} [{value}] is out of range")]
    InvalidArgument {
        /// Name of the offending parameter
        what: &'static str,
        /// The rejected value
        value: i64,
    },

    /// Bus open/write/read failure or a malformed response.
    #[error("Hardware I/O failure: {0}")]
    HardwareIoFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Operation did not finish within its deadline
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl HalError {
    /// Shorthand for an out-of-range argument.
    pub fn invalid(what: &'static str, value: impl Into<i64>) -> Self {
        Self::InvalidArgument {
            what,
            value: value.into(),
        }
    }

    /// Shorthand for an I/O failure.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::HardwareIoFailure(msg.into())
    }
}

impl From<ConfigError> for HalError {
    fn from(e: ConfigError) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for HalError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::HardwareIoFailure(format!("bus lock poisoned: {e}"))
    }
}
