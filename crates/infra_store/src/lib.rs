//! # infra_store
//!
//! Persistence for calibration outputs.
//!
//! This crate implements the weight-snapshot store keyed by
//! `(weight_file, year)` and the atomic CSV writer used for performance logs.
//! Every write goes to a temporary file in the destination directory and is
//! renamed into place, so readers never observe a partial file.
//! It isolates I/O dependencies from the optimiser kernel.
//!
//! ## Architecture Position
//!
//! Part of the **I**nfra layer.
//! Must not depend on any `reweight_*` crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use infra_store::{NpyWeightStore, WeightKey, WeightStore};
//! use ndarray::Array2;
//!
//! let store = NpyWeightStore::new("storage");
//! let key = WeightKey::new("parliamentary_constituency_weights", 2025);
//! store.save(&key, &Array2::<f64>::ones((650, 100)))?;
//! let weights = store.load(&key)?;
//! # Ok::<(), infra_store::StoreError>(())
//! ```

mod atomic;
mod error;
mod memory;
mod npy;
mod table;
mod traits;

pub use atomic::write_atomic;
pub use error::StoreError;
pub use memory::MemoryWeightStore;
pub use npy::NpyWeightStore;
pub use table::{read_csv, write_csv_atomic};
pub use traits::{WeightKey, WeightStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        MemoryWeightStore, NpyWeightStore, StoreError, WeightKey, WeightStore,
    };
}
