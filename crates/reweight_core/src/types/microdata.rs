//! Microdata collaborator interface.
//!
//! The tax-benefit simulation that produces per-entity variables lives
//! outside this workspace. The design matrix builder only needs the narrow
//! surface below: evaluate a named variable, map an entity-level array to
//! households, and read household weights and geography.

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::error::MicrodataError;
use super::geography::GeographicLevel;

/// Entity a simulation variable is defined on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// Individual person
    Person,
    /// Benefit unit (adult, partner and dependent children)
    BenefitUnit,
    /// Household
    Household,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Entity::Person => "person",
            Entity::BenefitUnit => "benunit",
            Entity::Household => "household",
        };
        write!(f, "{}", code)
    }
}

/// Values of one variable, tagged with the entity they belong to.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityArray {
    /// Entity of `values`
    pub entity: Entity,
    /// One value per entity instance
    pub values: Array1<f64>,
}

impl EntityArray {
    /// Create a new entity array.
    pub fn new(entity: Entity, values: Array1<f64>) -> Self {
        Self { entity, values }
    }

    /// Number of entity instances.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no instances.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same entity, values transformed element-wise.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            entity: self.entity,
            values: self.values.mapv(f),
        }
    }

    /// `1.0` where the value is positive, `0.0` elsewhere.
    pub fn indicator(&self) -> Self {
        self.map(|v| if v > 0.0 { 1.0 } else { 0.0 })
    }
}

/// Household microdata with simulated variables.
///
/// Implementations are expected to cache expensive variables; the builder
/// may request the same variable once per target.
pub trait Microdata {
    /// Number of households.
    fn household_count(&self) -> usize;

    /// Evaluate a named variable at its native entity.
    fn calculate(&self, variable: &str) -> Result<EntityArray, MicrodataError>;

    /// Sum entity-level values into their households.
    fn map_to_household(&self, values: &EntityArray) -> Result<Array1<f64>, MicrodataError>;

    /// Survey weight per household.
    fn household_weights(&self) -> Result<Array1<f64>, MicrodataError>;

    /// Geography code of each household at `level`, e.g. the country name or
    /// region code. The coding must match the `geo_code` of targets at that
    /// level.
    fn household_geography(&self, level: GeographicLevel) -> Result<Vec<String>, MicrodataError>;
}

impl<T: Microdata + ?Sized> Microdata for &T {
    fn household_count(&self) -> usize {
        (**self).household_count()
    }

    fn calculate(&self, variable: &str) -> Result<EntityArray, MicrodataError> {
        (**self).calculate(variable)
    }

    fn map_to_household(&self, values: &EntityArray) -> Result<Array1<f64>, MicrodataError> {
        (**self).map_to_household(values)
    }

    fn household_weights(&self) -> Result<Array1<f64>, MicrodataError> {
        (**self).household_weights()
    }

    fn household_geography(&self, level: GeographicLevel) -> Result<Vec<String>, MicrodataError> {
        (**self).household_geography(level)
    }
}
