//! # reweight_matrix: Design Matrix Construction
//!
//! ## Layer 2 Role
//!
//! reweight_matrix turns calibration targets and household microdata into
//! the arrays the optimiser consumes:
//! - Target providers and a de-duplicating registry (`provider`, `registry`)
//! - Year resolution with nearest-earlier-year fallback (`resolve`)
//! - National and local design matrices (`builder`)
//! - The country-based geography mask (`mask`)
//! - National consistency and boundary mapping adjustments (`adjust`)
//! - An in-memory microdata implementation (`memory`)
//!
//! ## Architecture Position
//!
//! Depends on `reweight_core` for the data model, `infra_store` for reading
//! target files and `infra_config` for target settings. Has no dependency on
//! the optimiser.
//!
//! ## Usage Examples
//!
//! ```rust
//! use ndarray::array;
//! use reweight_core::types::{Area, Entity, EntityArray, GeographicLevel, Target, Unit};
//! use reweight_matrix::{DesignMatrixBuilder, InMemoryMicrodata, StaticTargetProvider, TargetRegistry};
//!
//! let data = InMemoryMicrodata::new(array![1.0, 1.0, 1.0])
//!     .with_persons(vec![0, 1, 2])
//!     .with_variable("age", EntityArray::new(Entity::Person, array![5.0, 30.0, 70.0]))
//!     .with_geography(
//!         GeographicLevel::Country,
//!         vec!["ENGLAND".into(), "ENGLAND".into(), "WALES".into()],
//!     );
//!
//! let areas = vec![Area::new("E14000001", "A"), Area::new("W07000041", "B")];
//! let per_area = |code: &str, value: f64| {
//!     Target::new(format!("ons/people/{}", code), "age", Unit::Count)
//!         .as_count()
//!         .with_level(GeographicLevel::Constituency)
//!         .with_geo(code, code)
//!         .with_metric("people")
//!         .with_value(2025, value)
//! };
//! let mut registry = TargetRegistry::new();
//! registry.register(StaticTargetProvider::new(
//!     "ons",
//!     vec![per_area("E14000001", 2.0), per_area("W07000041", 1.0)],
//! ));
//!
//! let builder = DesignMatrixBuilder::new(&data, 2025);
//! let local = builder.build_local(&registry, GeographicLevel::Constituency, &areas)?;
//! let mask = builder.build_mask(&areas)?;
//! assert_eq!(local.targets.column(0).to_vec(), vec![2.0, 1.0]);
//! assert_eq!(mask.as_array().row(1).to_vec(), vec![0.0, 0.0, 1.0]);
//! # Ok::<(), reweight_matrix::MatrixError>(())
//! ```

#![warn(missing_docs)]

mod adjust;
mod builder;
mod error;
mod mask;
mod memory;
mod provider;
mod registry;
mod resolve;

pub use adjust::{apply_area_mapping, apply_national_consistency, scale_columns};
pub use builder::DesignMatrixBuilder;
pub use error::MatrixError;
pub use mask::{build_country_mask, household_countries};
pub use memory::InMemoryMicrodata;
pub use provider::{CsvTargetProvider, StaticTargetProvider, TargetProvider};
pub use registry::TargetRegistry;
pub use resolve::{resolve_value, DEFAULT_YEAR_TOLERANCE};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DesignMatrixBuilder, InMemoryMicrodata, MatrixError, StaticTargetProvider,
        TargetProvider, TargetRegistry,
    };
}
