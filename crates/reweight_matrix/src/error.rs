//! Design matrix construction errors.

use infra_store::StoreError;
use reweight_core::types::{DesignError, GeographicLevel, MicrodataError, TargetError};
use thiserror::Error;

/// Errors from target loading and design matrix construction.
///
/// Per-target problems (no value for the year, no compute strategy, a
/// failing column) are not errors: the target is skipped with a warning.
/// What remains here is fatal for the run.
///
/// # Examples
///
/// ```
/// use reweight_matrix::MatrixError;
///
/// let err = MatrixError::unknown_area_code("K03000001");
/// assert!(err.is_unknown_area_code());
/// assert!(format!("{}", err).contains("K03000001"));
/// ```
#[derive(Error, Debug)]
pub enum MatrixError {
    /// Area code whose country cannot be determined
    #[error("Unknown area code: {0}")]
    UnknownAreaCode(String),

    /// Household country that cannot be parsed
    #[error("Household {household} has unknown country '{value}'")]
    UnknownHouseholdCountry {
        /// Household index
        household: usize,
        /// Raw value
        value: String,
    },

    /// A target provider failed to produce its targets
    #[error("Target provider '{provider}' failed: {message}")]
    ProviderFailed {
        /// Provider name
        provider: String,
        /// Failure detail
        message: String,
    },

    /// Local design requested at a level without per-area weight rows
    #[error("{0} is not a local geographic level")]
    NonLocalLevel(GeographicLevel),

    /// Adjustment cannot be applied
    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// Target parsing or validation error
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Microdata collaborator error
    #[error(transparent)]
    Microdata(#[from] MicrodataError),

    /// Shape or value error in an assembled design
    #[error(transparent)]
    Design(#[from] DesignError),

    /// Reading a target file failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MatrixError {
    /// Create an unknown area code error.
    pub fn unknown_area_code(code: impl Into<String>) -> Self {
        Self::UnknownAreaCode(code.into())
    }

    /// Create a provider failure.
    pub fn provider_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid adjustment error.
    pub fn invalid_adjustment(message: impl Into<String>) -> Self {
        Self::InvalidAdjustment(message.into())
    }

    /// Check if this is a non-local level error.
    pub fn is_non_local_level(&self) -> bool {
        matches!(self, Self::NonLocalLevel(_))
    }

    /// Check if this is an unknown area code error.
    pub fn is_unknown_area_code(&self) -> bool {
        matches!(self, Self::UnknownAreaCode(_))
    }

    /// Check if this is a provider failure.
    pub fn is_provider_failed(&self) -> bool {
        matches!(self, Self::ProviderFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_design_error() {
        let err: MatrixError = DesignError::shape_mismatch("mapping columns", 3, 2).into();
        assert!(matches!(err, MatrixError::Design(_)));
        assert!(format!("{}", err).contains("mapping columns"));
    }

    #[test]
    fn test_provider_failed() {
        let err = MatrixError::provider_failed("csv", "missing column 'value'");
        assert!(err.is_provider_failed());
        assert!(!err.is_unknown_area_code());
    }

    #[test]
    fn test_non_local_level_message() {
        let err = MatrixError::NonLocalLevel(GeographicLevel::Region);
        assert!(err.is_non_local_level());
        assert_eq!(format!("{}", err), "region is not a local geographic level");
    }
}
