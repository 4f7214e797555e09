//! Checkpoint observers.
//!
//! The calibrator hands a [`Checkpoint`] to a [`CheckpointObserver`] every
//! `checkpoint_interval` epochs and after the final epoch. Observers decide
//! what to keep:
//!
//! - [`CheckpointWriter`]: persist the snapshot under its year and rewrite
//!   the performance log
//! - [`CheckpointHistory`]: retain snapshots in memory and build the log
//!   after the run
//! - [`NoopObserver`]: discard everything
//!
//! Any `FnMut(&Checkpoint<'_>) -> Result<(), CheckpointError>` closure is
//! also an observer.

use std::path::{Path, PathBuf};

use infra_config::StorageSettings;
use infra_store::{write_csv_atomic, NpyWeightStore, WeightKey, WeightStore};
use ndarray::Array2;
use reweight_core::types::Year;
use tracing::debug;

use crate::error::CheckpointError;
use crate::objective::{CloseShares, LossBreakdown};
use crate::performance::{evaluate_performance, LogRow};
use crate::problem::CalibrationProblem;

/// State of the optimiser at a checkpoint epoch.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint<'a> {
    /// Zero-based epoch just completed
    pub epoch: usize,
    /// `exp(L) ⊙ R` after the epoch's update, without dropout
    pub weights: &'a Array2<f64>,
    /// Training loss of the epoch's (dropped-out) weights
    pub training_loss: LossBreakdown,
    /// Loss of `weights` on held-out columns, if any are held out
    pub validation_loss: Option<LossBreakdown>,
    /// Metrics of `weights` within tolerance of their targets
    pub close: CloseShares,
    /// Problem being solved
    pub problem: &'a CalibrationProblem,
}

/// Receives checkpoints during calibration.
///
/// An error aborts the calibration.
pub trait CheckpointObserver {
    /// Handle one checkpoint.
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint<'_>) -> Result<(), CheckpointError>;
}

impl<F> CheckpointObserver for F
where
    F: FnMut(&Checkpoint<'_>) -> Result<(), CheckpointError>,
{
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint<'_>) -> Result<(), CheckpointError> {
        self(checkpoint)
    }
}

/// Observer that ignores every checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CheckpointObserver for NoopObserver {
    fn on_checkpoint(&mut self, _checkpoint: &Checkpoint<'_>) -> Result<(), CheckpointError> {
        Ok(())
    }
}

/// Persists each checkpoint's weights and, optionally, a performance log.
///
/// Each snapshot replaces the previous one under the same key, so the store
/// always holds the latest checkpoint. The log accumulates one block of rows
/// per checkpoint and is rewritten atomically each time. Epochs must be
/// strictly increasing.
///
/// # Examples
///
/// ```
/// use infra_store::{MemoryWeightStore, WeightKey, WeightStore};
/// use ndarray::array;
/// use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};
/// use reweight_optimiser::{CalibrationProblem, Calibrator, CheckpointWriter, CpuDevice};
///
/// let local = LocalDesign::new(
///     array![[1.0], [1.0]],
///     array![[3.0]],
///     vec!["people".into()],
///     vec![Area::new("E1", "Aldershot")],
/// )?;
/// let problem = CalibrationProblem::new(
///     local,
///     NationalDesign::empty(2),
///     GeographyMask::all_ones(1, 2),
/// )?;
///
/// let store = MemoryWeightStore::new();
/// let key = WeightKey::new("constituency_weights", 2025);
/// let mut writer = CheckpointWriter::new(&store, key.clone());
/// let calibrator = Calibrator::new(CpuDevice).with_epochs(20).with_seed(1);
/// calibrator.calibrate(&problem, array![[0.0, 0.0]], &mut writer)?;
///
/// assert_eq!(writer.last_epoch(), Some(19));
/// assert_eq!(store.write_count(), 3);
/// assert!(store.load(&key)?.is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct CheckpointWriter<S: WeightStore> {
    store: S,
    key: WeightKey,
    log_path: Option<PathBuf>,
    log: Vec<LogRow>,
    last_epoch: Option<usize>,
}

impl<S: WeightStore> CheckpointWriter<S> {
    /// Write snapshots to `store` under `key`.
    pub fn new(store: S, key: WeightKey) -> Self {
        Self {
            store,
            key,
            log_path: None,
            log: Vec::new(),
            last_epoch: None,
        }
    }

    /// Also maintain a CSV performance log at `path`.
    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Snapshot key.
    pub fn key(&self) -> &WeightKey {
        &self.key
    }

    /// Performance log path, if logging.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Epoch of the last checkpoint written.
    pub fn last_epoch(&self) -> Option<usize> {
        self.last_epoch
    }

    /// Log rows accumulated so far.
    pub fn log_rows(&self) -> &[LogRow] {
        &self.log
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl CheckpointWriter<NpyWeightStore> {
    /// Writer for the `.npy` store and log configured in `storage`.
    pub fn from_settings(storage: &StorageSettings, year: Year) -> Self {
        let writer = Self::new(
            NpyWeightStore::new(&storage.weights_dir),
            WeightKey::new(storage.weight_file.clone(), year),
        );
        match &storage.log_csv {
            Some(path) => writer.with_log(path),
            None => writer,
        }
    }
}

impl<S: WeightStore> CheckpointObserver for CheckpointWriter<S> {
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint<'_>) -> Result<(), CheckpointError> {
        if let Some(previous) = self.last_epoch {
            if checkpoint.epoch <= previous {
                return Err(CheckpointError::NonMonotonicEpoch {
                    previous,
                    epoch: checkpoint.epoch,
                });
            }
        }

        self.store.save(&self.key, checkpoint.weights)?;

        if let Some(path) = &self.log_path {
            let problem = checkpoint.problem;
            let table = evaluate_performance(
                checkpoint.weights,
                problem.local(),
                problem.national(),
                problem.excluded(),
            )?;
            self.log.extend(table.log_rows(checkpoint.epoch));
            write_csv_atomic(path, &self.log)?;
        }

        self.last_epoch = Some(checkpoint.epoch);
        debug!(epoch = checkpoint.epoch, key = %self.key, "Checkpoint written");
        Ok(())
    }
}

/// Retains every checkpoint's weights in memory.
///
/// Useful when the run happens away from the final storage: the snapshots
/// come back as one value and the log is built afterwards.
#[derive(Debug, Clone, Default)]
pub struct CheckpointHistory {
    snapshots: Vec<(usize, Array2<f64>)>,
}

impl CheckpointHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Epochs recorded, in order.
    pub fn epochs(&self) -> Vec<usize> {
        self.snapshots.iter().map(|(epoch, _)| *epoch).collect()
    }

    /// Number of checkpoints recorded.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Most recent `(epoch, weights)`.
    pub fn latest(&self) -> Option<(usize, &Array2<f64>)> {
        self.snapshots.last().map(|(epoch, w)| (*epoch, w))
    }

    /// All `(epoch, weights)` pairs.
    pub fn snapshots(&self) -> &[(usize, Array2<f64>)] {
        &self.snapshots
    }

    /// Performance log over every recorded checkpoint.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::Design`] if a snapshot does not fit `problem`.
    pub fn performance_log(&self, problem: &CalibrationProblem) -> Result<Vec<LogRow>, CheckpointError> {
        let mut log = Vec::new();
        for (epoch, weights) in &self.snapshots {
            let table = evaluate_performance(
                weights,
                problem.local(),
                problem.national(),
                problem.excluded(),
            )?;
            log.extend(table.log_rows(*epoch));
        }
        Ok(log)
    }

    /// Build the performance log and write it to `path`.
    pub fn write_log(
        &self,
        problem: &CalibrationProblem,
        path: &Path,
    ) -> Result<usize, CheckpointError> {
        let log = self.performance_log(problem)?;
        write_csv_atomic(path, &log)?;
        Ok(log.len())
    }
}

impl CheckpointObserver for CheckpointHistory {
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint<'_>) -> Result<(), CheckpointError> {
        self.snapshots
            .push((checkpoint.epoch, checkpoint.weights.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infra_store::MemoryWeightStore;
    use ndarray::array;
    use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};

    fn problem() -> CalibrationProblem {
        let local = LocalDesign::new(
            array![[1.0], [2.0]],
            array![[5.0]],
            vec!["people".into()],
            vec![Area::new("E1", "North")],
        )
        .unwrap();
        let national =
            NationalDesign::new(array![[1.0], [1.0]], array![3.0], vec!["households".into()])
                .unwrap();
        CalibrationProblem::new(local, national, GeographyMask::all_ones(1, 2)).unwrap()
    }

    fn checkpoint<'a>(
        epoch: usize,
        weights: &'a Array2<f64>,
        problem: &'a CalibrationProblem,
    ) -> Checkpoint<'a> {
        Checkpoint {
            epoch,
            weights,
            training_loss: LossBreakdown::default(),
            validation_loss: None,
            close: CloseShares::default(),
            problem,
        }
    }

    #[test]
    fn test_writer_rejects_repeated_epoch() {
        let problem = problem();
        let weights = array![[1.0, 2.0]];
        let store = MemoryWeightStore::new();
        let mut writer = CheckpointWriter::new(&store, WeightKey::new("weights", 2025));

        writer.on_checkpoint(&checkpoint(0, &weights, &problem)).unwrap();
        writer.on_checkpoint(&checkpoint(10, &weights, &problem)).unwrap();
        let err = writer
            .on_checkpoint(&checkpoint(10, &weights, &problem))
            .unwrap_err();
        assert!(err.is_non_monotonic());
        assert_eq!(store.write_count(), 2);
        assert_eq!(writer.last_epoch(), Some(10));
    }

    #[test]
    fn test_writer_logs_each_checkpoint() {
        let problem = problem();
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.csv");
        let mut writer = CheckpointWriter::new(MemoryWeightStore::new(), WeightKey::new("w", 2025))
            .with_log(&log_path);

        let first = array![[1.0, 2.0]];
        let second = array![[1.0, 1.0]];
        writer.on_checkpoint(&checkpoint(0, &first, &problem)).unwrap();
        writer.on_checkpoint(&checkpoint(10, &second, &problem)).unwrap();

        assert_eq!(writer.log_rows().len(), 4);
        assert_eq!(writer.log_rows()[0].estimate, 5.0);
        assert_eq!(writer.log_rows()[2].epoch, 10);
        assert_eq!(writer.log_rows()[2].estimate, 3.0);
        let written = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(written.lines().count(), 5);
        assert!(written.starts_with("area_index,area_name,metric,target_name,"));
    }

    #[test]
    fn test_history_rebuilds_log() {
        let problem = problem();
        let mut history = CheckpointHistory::new();
        let weights = array![[1.0, 2.0]];
        history.on_checkpoint(&checkpoint(0, &weights, &problem)).unwrap();
        history.on_checkpoint(&checkpoint(10, &weights, &problem)).unwrap();

        assert_eq!(history.epochs(), vec![0, 10]);
        assert_eq!(history.latest().map(|(epoch, _)| epoch), Some(10));
        let log = history.performance_log(&problem).unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[3].target_name, "UK/households");
        assert_eq!(log[3].loss, 0.0);
    }

    #[test]
    fn test_closure_observer() {
        let problem = problem();
        let weights = array![[1.0, 2.0]];
        let mut seen = Vec::new();
        let mut observer = |c: &Checkpoint<'_>| -> Result<(), CheckpointError> {
            seen.push(c.epoch);
            Ok(())
        };
        observer.on_checkpoint(&checkpoint(20, &weights, &problem)).unwrap();
        assert_eq!(seen, vec![20]);
    }
}
