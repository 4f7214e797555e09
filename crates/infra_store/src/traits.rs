//! Storage traits.

use crate::error::StoreError;
use ndarray::Array2;
use std::fmt;

/// Key of one weight snapshot: the weight file of an area group and the
/// calibration year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeightKey {
    /// Weight file name, e.g. `parliamentary_constituency_weights`
    pub file: String,
    /// Calibration year
    pub year: i32,
}

impl WeightKey {
    /// Create a new key.
    pub fn new(file: impl Into<String>, year: i32) -> Self {
        Self {
            file: file.into(),
            year,
        }
    }

    /// Check that the file name is a single plain path component.
    pub fn validate(&self) -> Result<(), StoreError> {
        let file = self.file.as_str();
        if file.is_empty()
            || file == "."
            || file == ".."
            || file.contains('/')
            || file.contains('\\')
        {
            return Err(StoreError::invalid_key(format!(
                "weight file name '{}' must be a single path component",
                file
            )));
        }
        Ok(())
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.file, self.year)
    }
}

/// Store for area × household weight snapshots.
///
/// `save` creates or overwrites the array at `key`; a reader never observes
/// a partially written snapshot. Only one writer per key is supported.
pub trait WeightStore {
    /// Create or overwrite the snapshot at `key`.
    fn save(&self, key: &WeightKey, weights: &Array2<f64>) -> Result<(), StoreError>;

    /// Read the snapshot at `key`, or `None` if it was never written.
    fn load(&self, key: &WeightKey) -> Result<Option<Array2<f64>>, StoreError>;
}

impl<S: WeightStore + ?Sized> WeightStore for &S {
    fn save(&self, key: &WeightKey, weights: &Array2<f64>) -> Result<(), StoreError> {
        (**self).save(key, weights)
    }

    fn load(&self, key: &WeightKey) -> Result<Option<Array2<f64>>, StoreError> {
        (**self).load(key)
    }
}
