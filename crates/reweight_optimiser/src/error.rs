//! Calibration error types.

use infra_config::ConfigError;
use infra_store::StoreError;
use reweight_core::types::DesignError;
use thiserror::Error;

/// Errors that can occur while writing a checkpoint.
///
/// # Examples
///
/// ```
/// use reweight_optimiser::CheckpointError;
///
/// let err = CheckpointError::NonMonotonicEpoch { previous: 20, epoch: 10 };
/// assert!(err.is_non_monotonic());
/// assert_eq!(format!("{}", err), "Checkpoint epoch 10 does not follow epoch 20");
/// ```
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Epoch not strictly greater than the previous checkpoint's
    #[error("Checkpoint epoch {epoch} does not follow epoch {previous}")]
    NonMonotonicEpoch {
        /// Epoch of the previous checkpoint
        previous: usize,
        /// Rejected epoch
        epoch: usize,
    },

    /// Weight snapshot or log could not be written
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Snapshot does not fit the problem's designs
    #[error(transparent)]
    Design(#[from] DesignError),
}

impl CheckpointError {
    /// Check if this is an epoch ordering violation.
    pub fn is_non_monotonic(&self) -> bool {
        matches!(self, Self::NonMonotonicEpoch { .. })
    }
}

/// Errors that can occur during calibration.
///
/// There is no partial success: any of these terminates the run.
///
/// # Variants
///
/// - `Design`: inconsistent shapes or non-finite inputs
/// - `InvalidInitialWeight`: negative or non-finite survey weight
/// - `InvalidConfig`: optimiser hyper-parameter out of range
/// - `Config`: settings could not be loaded
/// - `Device`: compute device could not be created
/// - `Checkpoint`: the checkpoint observer failed
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Inconsistent problem shapes or values
    #[error(transparent)]
    Design(#[from] DesignError),

    /// Survey weight that cannot seed log-space weights
    #[error("Invalid initial weight for household {household}: {value}")]
    InvalidInitialWeight {
        /// Household index
        household: usize,
        /// Offending weight
        value: f64,
    },

    /// Hyper-parameter out of range
    #[error("Invalid calibration config: {0}")]
    InvalidConfig(String),

    /// Settings error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Device construction failure
    #[error("Device error: {0}")]
    Device(String),

    /// Checkpoint observer failure
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl CalibrationError {
    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Check if this error came from a checkpoint observer.
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, Self::Checkpoint(_))
    }

    /// Check if this is an input shape or value error.
    pub fn is_design(&self) -> bool {
        matches!(self, Self::Design(_))
    }
}
