//! Error types for the calibration data model.
//!
//! This module provides:
//! - `TargetError`: Errors from target construction and code parsing
//! - `MicrodataError`: Errors raised by the microdata collaborator
//! - `DesignError`: Shape and value violations in design matrices and masks

use thiserror::Error;

/// Target construction and parsing errors.
///
/// # Examples
/// ```
/// use reweight_core::types::TargetError;
///
/// let err = TargetError::InvalidBand {
///     name: "hmrc/income_band".to_string(),
///     lower: 50_000.0,
///     upper: 12_570.0,
/// };
/// assert!(format!("{}", err).contains("hmrc/income_band"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    /// Target has an empty name
    #[error("Target name must not be empty")]
    EmptyName,

    /// A yearly value is NaN or infinite
    #[error("Target {name} has a non-finite value for {year}")]
    NonFiniteValue {
        /// Target name
        name: String,
        /// Year of the offending value
        year: i32,
    },

    /// Lower bound is not below the upper bound
    #[error("Target {name} has an empty band [{lower}, {upper})")]
    InvalidBand {
        /// Target name
        name: String,
        /// Lower bound (inclusive)
        lower: f64,
        /// Upper bound (exclusive)
        upper: f64,
    },

    /// A code string could not be parsed
    #[error("Unknown {kind}: '{value}'")]
    UnknownCode {
        /// What was being parsed, e.g. "unit"
        kind: &'static str,
        /// The rejected input
        value: String,
    },
}

impl TargetError {
    /// Create an unknown-code error.
    pub fn unknown_code(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownCode {
            kind,
            value: value.into(),
        }
    }

    /// Check if this is a parse error.
    pub fn is_unknown_code(&self) -> bool {
        matches!(self, Self::UnknownCode { .. })
    }
}

/// Errors raised by a [`Microdata`](crate::types::Microdata) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MicrodataError {
    /// Variable is not known to the simulation
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Array length does not match the entity count
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// What was being checked
        what: String,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Household geography is not available at the requested level
    #[error("No household geography at level {0}")]
    MissingGeography(String),

    /// Any other collaborator failure
    #[error("Microdata error: {0}")]
    Other(String),
}

impl MicrodataError {
    /// Create an unknown-variable error.
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::UnknownVariable(name.into())
    }

    /// Create a length-mismatch error.
    pub fn length_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Check if this is an unknown-variable error.
    pub fn is_unknown_variable(&self) -> bool {
        matches!(self, Self::UnknownVariable(_))
    }
}

/// Shape or value violations in a design matrix, target array or mask.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DesignError {
    /// Two arrays that must agree on a dimension do not
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which dimension was checked
        what: String,
        /// Expected extent
        expected: usize,
        /// Actual extent
        actual: usize,
    },

    /// NaN or infinity in a matrix or target
    #[error("Non-finite value in {what} at ({row}, {col})")]
    NonFinite {
        /// Array name
        what: String,
        /// Row index
        row: usize,
        /// Column index
        col: usize,
    },

    /// Mask entry other than 0 or 1
    #[error("Mask entry ({area}, {household}) must be 0 or 1, got {value}")]
    NonBinaryMask {
        /// Area index
        area: usize,
        /// Household index
        household: usize,
        /// Offending value
        value: f64,
    },
}

impl DesignError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Check if this is a shape mismatch.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }

    /// Check if this is a non-finite value error.
    pub fn is_non_finite(&self) -> bool {
        matches!(self, Self::NonFinite { .. })
    }
}
