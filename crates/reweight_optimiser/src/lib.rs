//! # reweight_optimiser: Weight Calibration
//!
//! ## Layer 3 Role
//!
//! reweight_optimiser fits an area × household weight matrix to local and
//! national targets:
//! - Compute devices for the dense kernels (`device`)
//! - Weight initialisation from survey weights (`init`)
//! - Mean-replacement dropout and Adam (`dropout`, `adam`)
//! - The symmetric relative error objective and its gradient (`objective`)
//! - The training loop with periodic checkpoints (`calibrator`)
//! - Per-metric performance tables and the calibration log (`performance`)
//! - Checkpoint observers that persist or retain snapshots (`checkpoint`)
//!
//! ## Architecture Position
//!
//! Consumes the designs and mask produced by `reweight_matrix` through the
//! `reweight_core` types. Reads its hyper-parameters from `infra_config`
//! and writes snapshots through `infra_store`.
//!
//! ## Features
//!
//! - `parallel` (default): Rayon-backed [`ParallelDevice`]
//!
//! ## Usage Examples
//!
//! ```rust
//! use ndarray::array;
//! use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};
//! use reweight_optimiser::{CalibrationProblem, Calibrator, CheckpointHistory, CpuDevice};
//!
//! let local = LocalDesign::new(
//!     array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
//!     array![[6.0, 8.0]],
//!     vec!["owners".into(), "renters".into()],
//!     vec![Area::new("E14000001", "Aldershot")],
//! )?;
//! let national = NationalDesign::new(array![[1.0], [1.0], [1.0]], array![12.0], vec!["households".into()])?;
//! let problem = CalibrationProblem::new(local, national, GeographyMask::all_ones(1, 3))?;
//!
//! let mut history = CheckpointHistory::new();
//! let outcome = Calibrator::new(CpuDevice)
//!     .with_epochs(40)
//!     .with_seed(7)
//!     .calibrate_from_survey_weights(&problem, &array![3.0, 3.0, 3.0], &mut history)?;
//!
//! assert_eq!(history.epochs(), vec![0, 10, 20, 30, 39]);
//! assert_eq!(outcome.weights.dim(), (1, 3));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

mod adam;
mod calibrator;
mod checkpoint;
mod device;
pub mod dropout;
mod error;
mod init;
pub mod objective;
mod partition;
mod performance;
mod problem;

pub use adam::{Adam, AdamCoefficients, DEFAULT_LEARNING_RATE};
pub use calibrator::{calibrate_with_settings, CalibrationOutcome, Calibrator, CalibratorConfig};
pub use checkpoint::{
    Checkpoint, CheckpointHistory, CheckpointObserver, CheckpointWriter, NoopObserver,
};
#[cfg(feature = "parallel")]
pub use device::ParallelDevice;
pub use device::{device_from_settings, CpuDevice, Device};
pub use dropout::DropoutMask;
pub use error::{CalibrationError, CheckpointError};
pub use init::{initial_log_weights, MIN_INITIAL_WEIGHT};
pub use objective::{CloseShares, LossBreakdown, Predictions, CLOSE_TOLERANCE};
pub use partition::{Split, TargetPartition};
pub use performance::{
    evaluate_performance, LogRow, PerformanceRow, PerformanceTable, NATIONAL_AREA_NAME,
};
pub use problem::CalibrationProblem;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        evaluate_performance, initial_log_weights, CalibrationError, CalibrationOutcome,
        CalibrationProblem, Calibrator, CalibratorConfig, CheckpointHistory, CheckpointObserver,
        CheckpointWriter, CpuDevice, Device,
    };
}
