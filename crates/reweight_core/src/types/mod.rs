//! Calibration data model.
//!
//! This module provides:
//! - `target`: `Target`, `Unit`, `ComputeStrategy`, `Extrapolation`
//! - `geography`: `GeographicLevel`, `Country`, `Area`
//! - `microdata`: the `Microdata` collaborator trait and `EntityArray`
//! - `design`: `LocalDesign`, `NationalDesign`, `GeographyMask`
//! - `error`: `TargetError`, `MicrodataError`, `DesignError`

pub mod design;
pub mod error;
pub mod geography;
pub mod microdata;
pub mod target;

pub use design::{GeographyMask, LocalDesign, NationalDesign};
pub use error::{DesignError, MicrodataError, TargetError};
pub use geography::{Area, Country, GeographicLevel};
pub use microdata::{Entity, EntityArray, Microdata};
pub use target::{
    ComputeStrategy, CustomCompute, CustomComputeFn, Extrapolation, Target, Unit, Year,
};
