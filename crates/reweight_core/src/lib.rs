//! # reweight_core: Data Model for Survey Weight Calibration
//!
//! ## Layer 1 (Foundation) Role
//!
//! reweight_core is the bottom layer of the reweighting kernel, providing:
//! - Calibration targets and their compute strategies (`types::target`)
//! - Geography types: `GeographicLevel`, `Country`, `Area` (`types::geography`)
//! - The microdata collaborator interface: `Microdata`, `Entity` (`types::microdata`)
//! - Design matrices and the geography mask (`types::design`)
//! - Symmetric relative error and its derivative (`math::loss`)
//! - Error types: `TargetError`, `MicrodataError`, `DesignError` (`types::error`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other workspace crates. External
//! dependencies are limited to:
//! - ndarray: dense arrays for design matrices and masks
//! - serde: serialisation of enum codes
//! - thiserror / anyhow: structured errors and custom compute functions
//!
//! ## Usage Examples
//!
//! ```rust
//! use reweight_core::math::loss::symmetric_relative_error;
//! use reweight_core::types::{ComputeStrategy, GeographicLevel, Target, Unit};
//!
//! let target = Target::new("obr/income_tax", "income_tax", Unit::Gbp)
//!     .with_source("obr")
//!     .with_value(2025, 328.4e9);
//! assert_eq!(target.geographic_level, GeographicLevel::National);
//! assert!(matches!(target.compute_strategy(), Some(ComputeStrategy::Sum)));
//!
//! // Over- and under-prediction by the same ratio cost the same.
//! let over = symmetric_relative_error(199.0, 99.0);
//! let under = symmetric_relative_error(99.0, 199.0);
//! assert!((over - under).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod math;
pub mod types;
