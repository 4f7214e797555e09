//! In-memory microdata.

use std::collections::HashMap;

use ndarray::Array1;
use reweight_core::types::{Entity, EntityArray, GeographicLevel, Microdata, MicrodataError};

/// Microdata held entirely in memory.
///
/// Persons and benefit units are linked to households by index vectors.
/// Variables are precomputed arrays; nothing is simulated. Suitable for
/// tests and for callers that export simulation output once and calibrate
/// against it many times.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use reweight_core::types::{Entity, EntityArray, Microdata};
/// use reweight_matrix::InMemoryMicrodata;
///
/// let data = InMemoryMicrodata::new(array![100.0, 200.0])
///     .with_persons(vec![0, 0, 1])
///     .with_variable("age", EntityArray::new(Entity::Person, array![40.0, 8.0, 70.0]));
///
/// let age = data.calculate("age")?;
/// assert_eq!(data.map_to_household(&age)?, array![48.0, 70.0]);
/// # Ok::<(), reweight_core::types::MicrodataError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryMicrodata {
    weights: Array1<f64>,
    person_household: Vec<usize>,
    benunit_household: Vec<usize>,
    variables: HashMap<String, EntityArray>,
    geography: HashMap<GeographicLevel, Vec<String>>,
}

impl InMemoryMicrodata {
    /// Create microdata with one survey weight per household.
    pub fn new(household_weights: Array1<f64>) -> Self {
        Self {
            weights: household_weights,
            ..Self::default()
        }
    }

    /// Household index of each person.
    pub fn with_persons(mut self, household_of_person: Vec<usize>) -> Self {
        self.person_household = household_of_person;
        self
    }

    /// Household index of each benefit unit.
    pub fn with_benefit_units(mut self, household_of_benunit: Vec<usize>) -> Self {
        self.benunit_household = household_of_benunit;
        self
    }

    /// Add or replace a variable.
    pub fn with_variable(mut self, name: impl Into<String>, values: EntityArray) -> Self {
        self.variables.insert(name.into(), values);
        self
    }

    /// Household geography codes at `level`.
    pub fn with_geography(mut self, level: GeographicLevel, codes: Vec<String>) -> Self {
        self.geography.insert(level, codes);
        self
    }

    fn links(&self, entity: Entity) -> Option<&[usize]> {
        match entity {
            Entity::Person => Some(self.person_household.as_slice()),
            Entity::BenefitUnit => Some(self.benunit_household.as_slice()),
            Entity::Household => None,
        }
    }
}

impl Microdata for InMemoryMicrodata {
    fn household_count(&self) -> usize {
        self.weights.len()
    }

    fn calculate(&self, variable: &str) -> Result<EntityArray, MicrodataError> {
        self.variables
            .get(variable)
            .cloned()
            .ok_or_else(|| MicrodataError::unknown_variable(variable))
    }

    fn map_to_household(&self, values: &EntityArray) -> Result<Array1<f64>, MicrodataError> {
        let household_count = self.household_count();
        let Some(links) = self.links(values.entity) else {
            if values.len() != household_count {
                return Err(MicrodataError::length_mismatch(
                    "household values",
                    household_count,
                    values.len(),
                ));
            }
            return Ok(values.values.clone());
        };

        if values.len() != links.len() {
            return Err(MicrodataError::length_mismatch(
                format!("{} values", values.entity),
                links.len(),
                values.len(),
            ));
        }
        let mut totals = Array1::zeros(household_count);
        for (&household, &value) in links.iter().zip(values.values.iter()) {
            if household >= household_count {
                return Err(MicrodataError::Other(format!(
                    "{} linked to household {} of {}",
                    values.entity, household, household_count
                )));
            }
            totals[household] += value;
        }
        Ok(totals)
    }

    fn household_weights(&self) -> Result<Array1<f64>, MicrodataError> {
        Ok(self.weights.clone())
    }

    fn household_geography(&self, level: GeographicLevel) -> Result<Vec<String>, MicrodataError> {
        let codes = self
            .geography
            .get(&level)
            .ok_or_else(|| MicrodataError::MissingGeography(level.to_string()))?;
        if codes.len() != self.household_count() {
            return Err(MicrodataError::length_mismatch(
                format!("{} geography", level),
                self.household_count(),
                codes.len(),
            ));
        }
        Ok(codes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn data() -> InMemoryMicrodata {
        InMemoryMicrodata::new(array![1.0, 2.0, 3.0])
            .with_persons(vec![0, 1, 1, 2])
            .with_benefit_units(vec![0, 1, 2])
            .with_variable(
                "employment_income",
                EntityArray::new(Entity::Person, array![10.0, 20.0, 5.0, 0.0]),
            )
            .with_variable(
                "universal_credit",
                EntityArray::new(Entity::BenefitUnit, array![0.0, 100.0, 50.0]),
            )
            .with_geography(
                GeographicLevel::Country,
                vec!["ENGLAND".into(), "WALES".into(), "ENGLAND".into()],
            )
    }

    #[test]
    fn test_map_person_and_benunit() {
        let data = data();
        let income = data.calculate("employment_income").unwrap();
        assert_eq!(data.map_to_household(&income).unwrap(), array![10.0, 25.0, 0.0]);

        let uc = data.calculate("universal_credit").unwrap().indicator();
        assert_eq!(data.map_to_household(&uc).unwrap(), array![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unknown_variable() {
        let err = data().calculate("pip").unwrap_err();
        assert!(err.is_unknown_variable());
    }

    #[test]
    fn test_length_mismatch() {
        let data = data();
        let short = EntityArray::new(Entity::Person, array![1.0]);
        assert!(matches!(
            data.map_to_household(&short),
            Err(MicrodataError::LengthMismatch { expected: 4, actual: 1, .. })
        ));
        let households = EntityArray::new(Entity::Household, array![1.0, 2.0]);
        assert!(data.map_to_household(&households).is_err());
    }

    #[test]
    fn test_geography() {
        let data = data();
        assert_eq!(data.household_geography(GeographicLevel::Country).unwrap()[1], "WALES");
        assert!(matches!(
            data.household_geography(GeographicLevel::Region),
            Err(MicrodataError::MissingGeography(_))
        ));
    }
}
