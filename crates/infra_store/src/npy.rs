//! `.npy` file-backed weight store.

use crate::atomic::write_atomic;
use crate::error::StoreError;
use crate::traits::{WeightKey, WeightStore};
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Weight store writing one `.npy` file per key.
///
/// Layout: `{root}/{file}/{year}.npy`. Snapshots are replaced atomically,
/// so a run can checkpoint every few epochs without ever leaving a
/// truncated array behind.
#[derive(Debug, Clone)]
pub struct NpyWeightStore {
    root: PathBuf,
}

impl NpyWeightStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for `key`.
    pub fn path_for(&self, key: &WeightKey) -> Result<PathBuf, StoreError> {
        key.validate()?;
        Ok(self
            .root
            .join(&key.file)
            .join(format!("{}.npy", key.year)))
    }
}

impl WeightStore for NpyWeightStore {
    fn save(&self, key: &WeightKey, weights: &Array2<f64>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        write_atomic(&path, |writer| Ok(weights.write_npy(writer)?))?;
        debug!(
            key = %key,
            path = %path.display(),
            rows = weights.nrows(),
            cols = weights.ncols(),
            "Weight snapshot written"
        );
        Ok(())
    }

    fn load(&self, key: &WeightKey) -> Result<Option<Array2<f64>>, StoreError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);
        let weights = Array2::<f64>::read_npy(reader)?;
        Ok(Some(weights))
    }
}
