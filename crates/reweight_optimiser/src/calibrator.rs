//! Training loop for area-by-household weights.
//!
//! Parameters are the log-weights `L` (A × H). Each epoch:
//!
//! 1. `L' = dropout(L)`; `W = exp(L') ⊙ R`
//! 2. loss and gradient at `W` on the training columns
//! 3. chain rule back through `exp` and dropout to `L`
//! 4. one Adam step on `L`
//!
//! At checkpoint epochs the snapshot `exp(L) ⊙ R` (no dropout) is scored
//! on held-out columns and handed to the observer. The epoch budget is
//! fixed; loss never gates continuation.

use std::time::{Duration, Instant};

use infra_config::{OptimiserSettings, Settings, FULL_EPOCHS};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reweight_core::types::DesignError;
use tracing::{debug, info};

use crate::adam::{Adam, DEFAULT_LEARNING_RATE};
use crate::checkpoint::{Checkpoint, CheckpointObserver, CheckpointWriter};
use crate::device::{device_from_settings, CpuDevice, Device};
use crate::dropout;
use crate::error::CalibrationError;
use crate::init::initial_log_weights;
use crate::objective::{self, LossBreakdown, CLOSE_TOLERANCE};
use crate::partition::Split;
use crate::problem::CalibrationProblem;

/// Optimiser hyper-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratorConfig {
    /// Number of epochs
    pub epochs: usize,
    /// Adam step size
    pub learning_rate: f64,
    /// Dropout probability per log-weight
    pub dropout_rate: f64,
    /// Upper bound of the uniform noise added to initial weights
    pub jitter: f64,
    /// Epochs between checkpoints
    pub checkpoint_interval: usize,
    /// Relative gap below which a metric counts as close
    pub close_tolerance: f64,
    /// RNG seed; drawn from entropy when unset
    pub seed: Option<u64>,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            epochs: FULL_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            dropout_rate: 0.05,
            jitter: 0.01,
            checkpoint_interval: 10,
            close_tolerance: CLOSE_TOLERANCE,
            seed: None,
        }
    }
}

impl CalibratorConfig {
    /// Config from optimiser settings, applying the testing-mode epoch budget.
    pub fn from_settings(settings: &OptimiserSettings) -> Self {
        Self {
            epochs: settings.effective_epochs(),
            learning_rate: settings.learning_rate,
            dropout_rate: settings.dropout_rate,
            jitter: settings.jitter,
            checkpoint_interval: settings.checkpoint_interval,
            close_tolerance: CLOSE_TOLERANCE,
            seed: settings.seed,
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(CalibrationError::invalid_config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(CalibrationError::invalid_config(format!(
                "dropout rate must lie in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if !(self.jitter >= 0.0 && self.jitter.is_finite()) {
            return Err(CalibrationError::invalid_config(format!(
                "jitter must be non-negative, got {}",
                self.jitter
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(CalibrationError::invalid_config(
                "checkpoint interval must be at least 1",
            ));
        }
        Ok(())
    }

    fn is_checkpoint(&self, epoch: usize) -> bool {
        epoch % self.checkpoint_interval == 0 || epoch + 1 == self.epochs
    }
}

/// Result of a calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    /// Final `exp(L) ⊙ R`, A × H
    pub weights: Array2<f64>,
    /// Final weights summed over areas, H
    pub household_weights: Array1<f64>,
    /// Final log-weights, A × H
    pub log_weights: Array2<f64>,
    /// Training loss of every epoch
    pub losses: Vec<LossBreakdown>,
    /// Number of checkpoints handed to the observer
    pub checkpoints: usize,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

impl CalibrationOutcome {
    /// Training loss of the last epoch.
    pub fn final_loss(&self) -> Option<LossBreakdown> {
        self.losses.last().copied()
    }

    /// Number of epochs run.
    pub fn epochs(&self) -> usize {
        self.losses.len()
    }
}

/// Gradient-descent calibrator.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};
/// use reweight_optimiser::{CalibrationProblem, Calibrator, CpuDevice, NoopObserver};
///
/// // Two households, one area; the two must sum to 10
/// let local = LocalDesign::new(
///     array![[1.0], [1.0]],
///     array![[10.0]],
///     vec!["people".into()],
///     vec![Area::new("E1", "Aldershot")],
/// )?;
/// let problem = CalibrationProblem::new(local, NationalDesign::empty(2), GeographyMask::all_ones(1, 2))?;
///
/// let calibrator = Calibrator::new(CpuDevice)
///     .with_epochs(300)
///     .with_dropout_rate(0.0)
///     .with_seed(42);
/// let outcome = calibrator.calibrate_from_survey_weights(&problem, &array![2.0, 2.0], &mut NoopObserver)?;
///
/// assert!((outcome.household_weights.sum() - 10.0).abs() < 0.5);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Calibrator<D: Device = CpuDevice> {
    device: D,
    config: CalibratorConfig,
}

impl<D: Device> Calibrator<D> {
    /// Create a calibrator with the default config.
    pub fn new(device: D) -> Self {
        Self {
            device,
            config: CalibratorConfig::default(),
        }
    }

    /// Replace the whole config.
    pub fn with_config(mut self, config: CalibratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the epoch budget.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    /// Set the Adam step size.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    /// Set the dropout probability.
    pub fn with_dropout_rate(mut self, dropout_rate: f64) -> Self {
        self.config.dropout_rate = dropout_rate;
        self
    }

    /// Set the initial-weight jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Set the checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.config.checkpoint_interval = interval;
        self
    }

    /// Fix the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Current config.
    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Compute device.
    pub fn device(&self) -> &D {
        &self.device
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Optimise from the given log-weights (A × H).
    ///
    /// # Errors
    ///
    /// - [`CalibrationError::InvalidConfig`] for out-of-range settings
    /// - [`CalibrationError::Design`] if `initial` has the wrong shape or a
    ///   non-finite entry
    /// - [`CalibrationError::Checkpoint`] if the observer fails
    pub fn calibrate<O: CheckpointObserver + ?Sized>(
        &self,
        problem: &CalibrationProblem,
        initial: Array2<f64>,
        observer: &mut O,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        let mut rng = self.rng();
        self.run(problem, initial, &mut rng, observer)
    }

    /// Seed log-weights from national survey weights, then optimise.
    ///
    /// The jitter and the dropout masks come from the same RNG stream.
    pub fn calibrate_from_survey_weights<O: CheckpointObserver + ?Sized>(
        &self,
        problem: &CalibrationProblem,
        w0: &Array1<f64>,
        observer: &mut O,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        let mut rng = self.rng();
        let initial = initial_log_weights(w0, problem.mask(), self.config.jitter, &mut rng)?;
        self.run(problem, initial, &mut rng, observer)
    }

    fn run<O: CheckpointObserver + ?Sized>(
        &self,
        problem: &CalibrationProblem,
        initial: Array2<f64>,
        rng: &mut StdRng,
        observer: &mut O,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        self.config.validate()?;
        let (areas, households) = problem.weight_dim();
        if initial.nrows() != areas {
            return Err(DesignError::shape_mismatch("initial rows", areas, initial.nrows()).into());
        }
        if initial.ncols() != households {
            return Err(
                DesignError::shape_mismatch("initial columns", households, initial.ncols()).into(),
            );
        }
        if let Some(((row, col), _)) = initial.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(DesignError::NonFinite {
                what: "initial log-weights".to_string(),
                row,
                col,
            }
            .into());
        }

        let device = &self.device;
        let mask = problem.mask().as_array();
        let mut log_weights = initial;
        let mut adam = Adam::new(log_weights.dim(), self.config.learning_rate);
        let mut losses = Vec::with_capacity(self.config.epochs);
        let mut checkpoints = 0;
        let started = Instant::now();

        info!(
            device = device.name(),
            areas,
            households,
            local_targets = problem.local().target_count(),
            national_targets = problem.national().target_count(),
            epochs = self.config.epochs,
            "Starting calibration"
        );

        for epoch in 0..self.config.epochs {
            let (dropped, dropout_mask) =
                dropout::apply(&log_weights, self.config.dropout_rate, rng);
            let weights = device.exp_masked(dropped.view(), mask.view());
            let (loss, weight_grad) = objective::loss_and_gradient(device, problem, &weights);

            // d exp(L')⊙R / dL' = W
            let dropped_grad = weight_grad * &weights;
            let grad = match dropout_mask {
                Some(dropout_mask) => dropout::backward(&dropped_grad, &dropout_mask),
                None => dropped_grad,
            };
            adam.step(device, &mut log_weights, &grad);
            losses.push(loss);
            debug!(epoch, loss = loss.total(), "Epoch complete");

            if self.config.is_checkpoint(epoch) {
                let snapshot = device.exp_masked(log_weights.view(), mask.view());
                let predictions = objective::predict(device, problem, &snapshot);
                let validation_loss = problem
                    .has_validation()
                    .then(|| objective::loss(problem, &predictions, Split::Validation));
                let close = objective::close_shares(problem, &predictions, self.config.close_tolerance);

                info!(
                    epoch,
                    training_loss = loss.total(),
                    validation_loss = ?validation_loss.map(|v| v.total()),
                    local_close = close.local(),
                    national_close = close.national(),
                    "Checkpoint"
                );

                observer.on_checkpoint(&Checkpoint {
                    epoch,
                    weights: &snapshot,
                    training_loss: loss,
                    validation_loss,
                    close,
                    problem,
                })?;
                checkpoints += 1;
            }
        }

        let weights = device.exp_masked(log_weights.view(), mask.view());
        let household_weights = weights.sum_axis(Axis(0));
        let elapsed = started.elapsed();
        info!(
            epochs = losses.len(),
            checkpoints,
            final_loss = ?losses.last().map(|l| l.total()),
            elapsed = ?elapsed,
            "Calibration complete"
        );

        Ok(CalibrationOutcome {
            weights,
            household_weights,
            log_weights,
            losses,
            checkpoints,
            elapsed,
        })
    }
}

impl Calibrator<Box<dyn Device>> {
    /// Calibrator with the device and hyper-parameters in `settings`.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::Config`] for invalid settings, or
    /// [`CalibrationError::Device`] if the device cannot be created.
    pub fn from_settings(settings: &OptimiserSettings) -> Result<Self, CalibrationError> {
        settings.validate()?;
        Ok(Self::new(device_from_settings(settings)?)
            .with_config(CalibratorConfig::from_settings(settings)))
    }
}

/// Run a full calibration as configured: exclusions from
/// `settings.targets`, optimiser from `settings.optimiser`, snapshots and log
/// under `settings.storage` keyed by the target year.
pub fn calibrate_with_settings(
    settings: &Settings,
    problem: CalibrationProblem,
    w0: &Array1<f64>,
) -> Result<CalibrationOutcome, CalibrationError> {
    settings.validate()?;
    let problem = problem.with_excluded(&settings.targets.excluded);
    let calibrator = Calibrator::from_settings(&settings.optimiser)?;
    let mut writer = CheckpointWriter::from_settings(&settings.storage, settings.targets.year);
    calibrator.calibrate_from_survey_weights(&problem, w0, &mut writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointHistory, NoopObserver};
    use crate::error::CheckpointError;
    use ndarray::array;
    use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};

    fn problem() -> CalibrationProblem {
        let local = LocalDesign::new(
            array![[1.0], [1.0], [1.0]],
            array![[9.0], [4.0]],
            vec!["people".into()],
            vec![Area::new("E1", "North"), Area::new("E2", "South")],
        )
        .unwrap();
        let mask = GeographyMask::new(array![[1.0, 1.0, 0.0], [0.0, 1.0, 1.0]]).unwrap();
        CalibrationProblem::new(local, NationalDesign::empty(3), mask).unwrap()
    }

    #[test]
    fn test_checkpoint_schedule_includes_final_epoch() {
        let mut history = CheckpointHistory::new();
        let outcome = Calibrator::new(CpuDevice)
            .with_epochs(25)
            .with_seed(3)
            .calibrate(&problem(), Array2::zeros((2, 3)), &mut history)
            .unwrap();
        assert_eq!(history.epochs(), vec![0, 10, 20, 24]);
        assert_eq!(outcome.checkpoints, 4);
        assert_eq!(outcome.epochs(), 25);
    }

    #[test]
    fn test_elapsed_is_bounded_by_wall_clock() {
        let started = Instant::now();
        let outcome = Calibrator::new(CpuDevice)
            .with_epochs(5)
            .with_seed(1)
            .calibrate(&problem(), Array2::zeros((2, 3)), &mut NoopObserver)
            .unwrap();
        assert!(outcome.elapsed <= started.elapsed());
    }

    #[test]
    fn test_masked_entries_stay_zero() {
        let outcome = Calibrator::new(CpuDevice)
            .with_epochs(50)
            .with_seed(9)
            .calibrate(&problem(), Array2::zeros((2, 3)), &mut NoopObserver)
            .unwrap();
        assert_eq!(outcome.weights[[0, 2]], 0.0);
        assert_eq!(outcome.weights[[1, 0]], 0.0);
        assert!(outcome.weights.iter().all(|&w| w >= 0.0));
    }

    #[test]
    fn test_zero_epochs_returns_initial_weights() {
        let outcome = Calibrator::new(CpuDevice)
            .with_epochs(0)
            .calibrate(&problem(), Array2::zeros((2, 3)), &mut NoopObserver)
            .unwrap();
        assert_eq!(outcome.weights, array![[1.0, 1.0, 0.0], [0.0, 1.0, 1.0]]);
        assert_eq!(outcome.household_weights, array![1.0, 2.0, 1.0]);
        assert!(outcome.final_loss().is_none());
        assert_eq!(outcome.checkpoints, 0);
    }

    #[test]
    fn test_rejects_bad_initial_weights() {
        let calibrator = Calibrator::new(CpuDevice).with_epochs(1);
        let err = calibrator
            .calibrate(&problem(), Array2::zeros((3, 3)), &mut NoopObserver)
            .unwrap_err();
        assert!(err.is_design());

        let mut initial = Array2::zeros((2, 3));
        initial[[1, 1]] = f64::NAN;
        let err = calibrator
            .calibrate(&problem(), initial, &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Design(DesignError::NonFinite { row: 1, col: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_config() {
        let err = Calibrator::new(CpuDevice)
            .with_checkpoint_interval(0)
            .calibrate(&problem(), Array2::zeros((2, 3)), &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidConfig(_)));
    }

    #[test]
    fn test_observer_error_aborts() {
        let mut calls = 0;
        let mut failing = |_: &Checkpoint<'_>| -> Result<(), CheckpointError> {
            calls += 1;
            Err(CheckpointError::NonMonotonicEpoch { previous: 0, epoch: 0 })
        };
        let err = Calibrator::new(CpuDevice)
            .with_epochs(30)
            .calibrate(&problem(), Array2::zeros((2, 3)), &mut failing)
            .unwrap_err();
        assert!(err.is_checkpoint());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = OptimiserSettings {
            epochs: Some(7),
            seed: Some(5),
            ..OptimiserSettings::default()
        };
        let config = CalibratorConfig::from_settings(&settings);
        assert_eq!(config.epochs, 7);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.learning_rate, 0.1);
        let calibrator = Calibrator::from_settings(&settings).unwrap();
        assert_eq!(calibrator.device().name(), "cpu");
    }
}
