//! # infra_config
//!
//! Calibration settings and environment management for the reweighting engine.
//!
//! This crate loads runtime settings (TOML files and environment variables)
//! that control the optimiser (epoch budget, learning rate, dropout, jitter,
//! checkpoint interval, compute device), target resolution (calibration year,
//! nearest-year tolerance) and output locations (weight store, performance log).
//!
//! ## Architecture Position
//!
//! Part of the **I**nfra layer.
//! Must not depend on any `reweight_*` crate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use infra_config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Epoch budget: {}", settings.optimiser.effective_epochs());
//! ```

mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{
    DeviceKind, OptimiserSettings, Settings, StorageSettings, TargetSettings, FAST_EPOCHS,
    FULL_EPOCHS,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ConfigError, DeviceKind, OptimiserSettings, Settings, StorageSettings, TargetSettings,
    };
}
