//! In-memory weight store.

use crate::error::StoreError;
use crate::traits::{WeightKey, WeightStore};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Thread-safe in-memory weight store.
///
/// Useful for tests and for callers that hand the final weights straight to
/// dataset assembly without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryWeightStore {
    snapshots: RwLock<BTreeMap<WeightKey, Array2<f64>>>,
    writes: RwLock<usize>,
}

impl MemoryWeightStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls served so far.
    pub fn write_count(&self) -> usize {
        *self.writes.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Keys currently held, in order.
    pub fn keys(&self) -> Vec<WeightKey> {
        self.snapshots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl WeightStore for MemoryWeightStore {
    fn save(&self, key: &WeightKey, weights: &Array2<f64>) -> Result<(), StoreError> {
        key.validate()?;
        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(key.clone(), weights.clone());
        *self.writes.write().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn load(&self, key: &WeightKey) -> Result<Option<Array2<f64>>, StoreError> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        Ok(snapshots.get(key).cloned())
    }
}
