//! Configuration errors.

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Configuration file error: {0}")]
    FileError(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Underlying config crate error
    #[error("Configuration error: {0}")]
    ConfigCrateError(#[from] config::ConfigError),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this is an invalid value error.
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::InvalidValue { .. })
    }
}
