//! Design matrix builder.
//!
//! Turns registered targets into household-level design columns and target
//! values for one calibration year.
//!
//! # Skipping rules
//!
//! A target is skipped, never raised as an error, when:
//! - it has no value within the year tolerance (logged at debug)
//! - it has no compute strategy (warning)
//! - its column cannot be computed or contains non-finite values (warning)
//! - for local designs, any area lacks a value for the metric (warning)
//!
//! Provider and mask failures are fatal and propagate.

use std::collections::HashMap;

use anyhow::{bail, ensure, Context};
use infra_config::TargetSettings;
use ndarray::{Array1, Array2};
use reweight_core::types::{
    Area, ComputeStrategy, Country, GeographicLevel, GeographyMask, LocalDesign, Microdata,
    NationalDesign, Target, Year,
};
use tracing::{debug, info, warn};

use crate::adjust::apply_national_consistency;
use crate::error::MatrixError;
use crate::mask::{build_country_mask, household_countries};
use crate::registry::TargetRegistry;
use crate::resolve::{resolve_value, DEFAULT_YEAR_TOLERANCE};

/// Levels whose targets feed the national design.
const NATIONAL_SCOPE: [GeographicLevel; 3] = [
    GeographicLevel::National,
    GeographicLevel::Region,
    GeographicLevel::Country,
];

fn columns_to_matrix(household_count: usize, columns: &[Array1<f64>]) -> Array2<f64> {
    Array2::from_shape_fn((household_count, columns.len()), |(h, t)| columns[t][h])
}

/// Builds design matrices from a [`TargetRegistry`] and a [`Microdata`]
/// collaborator.
///
/// The builder is a pure function of its inputs; it holds no state between
/// calls.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use reweight_core::types::{Entity, EntityArray, Target, Unit};
/// use reweight_matrix::{DesignMatrixBuilder, InMemoryMicrodata, StaticTargetProvider, TargetRegistry};
///
/// let data = InMemoryMicrodata::new(array![1.0, 1.0])
///     .with_variable("income_tax", EntityArray::new(Entity::Household, array![10.0, 30.0]));
/// let mut registry = TargetRegistry::new();
/// registry.register(StaticTargetProvider::new(
///     "obr",
///     vec![Target::new("obr/income_tax", "income_tax", Unit::Gbp).with_value(2024, 100.0)],
/// ));
///
/// let national = DesignMatrixBuilder::new(&data, 2025).build_national(&registry)?;
/// assert_eq!(national.names, vec!["obr/income_tax"]);
/// assert_eq!(national.targets.to_vec(), vec![100.0]);
/// # Ok::<(), reweight_matrix::MatrixError>(())
/// ```
pub struct DesignMatrixBuilder<'a, M: Microdata + ?Sized> {
    microdata: &'a M,
    year: Year,
    tolerance: u32,
    consistency_factor: f64,
}

impl<'a, M: Microdata + ?Sized> DesignMatrixBuilder<'a, M> {
    /// Create a builder for `year` with the default year tolerance.
    pub fn new(microdata: &'a M, year: Year) -> Self {
        Self {
            microdata,
            year,
            tolerance: DEFAULT_YEAR_TOLERANCE,
            consistency_factor: 1.0,
        }
    }

    /// Create a builder from target settings: year, tolerance and national
    /// consistency factor.
    pub fn from_settings(microdata: &'a M, settings: &TargetSettings) -> Self {
        Self::new(microdata, settings.year)
            .with_tolerance(settings.year_tolerance)
            .with_consistency_factor(settings.national_consistency_factor)
    }

    /// Set the nearest-year tolerance.
    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the factor applied by [`Self::align_to_national`].
    pub fn with_consistency_factor(mut self, factor: f64) -> Self {
        self.consistency_factor = factor;
        self
    }

    /// Calibration year.
    pub fn year(&self) -> Year {
        self.year
    }

    /// Factor applied by [`Self::align_to_national`].
    pub fn consistency_factor(&self) -> f64 {
        self.consistency_factor
    }

    /// Rescale the local columns of `metrics` so their total over all areas
    /// is `national_total` times the builder's consistency factor.
    ///
    /// Returns the scale applied. See [`apply_national_consistency`].
    pub fn align_to_national(
        &self,
        local: &mut LocalDesign,
        metrics: &[&str],
        national_total: f64,
    ) -> Result<f64, MatrixError> {
        apply_national_consistency(local, metrics, national_total, self.consistency_factor)
    }

    /// Compute the household-level column of `target` under `strategy`.
    ///
    /// Country and region targets with a `geo_code` are restricted to the
    /// households of that geography.
    ///
    /// # Errors
    ///
    /// Any microdata failure, a custom function error, a column of the wrong
    /// length, or a non-finite entry.
    pub fn compute_column(
        &self,
        target: &Target,
        strategy: &ComputeStrategy,
    ) -> anyhow::Result<Array1<f64>> {
        let microdata = self.microdata;
        let column = match strategy {
            ComputeStrategy::Sum => {
                let values = microdata.calculate(&target.variable)?;
                microdata.map_to_household(&values)?
            }
            ComputeStrategy::Count => {
                let values = microdata.calculate(&target.variable)?;
                microdata.map_to_household(&values.indicator())?
            }
            ComputeStrategy::BandedSum {
                breakdown,
                lower,
                upper,
            } => {
                let values = microdata.calculate(&target.variable)?;
                let band_values = microdata.calculate(breakdown)?;
                ensure!(
                    values.entity == band_values.entity,
                    "{} is defined on {} but {} on {}",
                    target.variable,
                    values.entity,
                    breakdown,
                    band_values.entity
                );
                ensure!(
                    values.len() == band_values.len(),
                    "{} and {} differ in length",
                    target.variable,
                    breakdown
                );
                let mut banded = if target.is_count {
                    values.indicator()
                } else {
                    values
                };
                for (value, &b) in banded.values.iter_mut().zip(band_values.values.iter()) {
                    if !(b >= *lower && b < *upper) {
                        *value = 0.0;
                    }
                }
                microdata.map_to_household(&banded)?
            }
            ComputeStrategy::Custom(custom) => {
                let dynamic: &dyn Microdata = &microdata;
                custom
                    .call(dynamic, target, self.year)
                    .with_context(|| format!("custom compute for {}", target.name))?
            }
        };

        let household_count = microdata.household_count();
        ensure!(
            column.len() == household_count,
            "column has {} entries for {} households",
            column.len(),
            household_count
        );
        if let Some(h) = column.iter().position(|v| !v.is_finite()) {
            bail!("non-finite value for household {}", h);
        }
        self.restrict_to_geography(target, column)
    }

    fn restrict_to_geography(
        &self,
        target: &Target,
        column: Array1<f64>,
    ) -> anyhow::Result<Array1<f64>> {
        let level = target.geographic_level;
        let Some(code) = target.geo_code.as_deref() else {
            return Ok(column);
        };
        let in_geography: Vec<bool> = match level {
            GeographicLevel::Country => {
                let country: Country = code.parse()?;
                household_countries(self.microdata)?
                    .into_iter()
                    .map(|c| c == country)
                    .collect()
            }
            GeographicLevel::Region => self
                .microdata
                .household_geography(level)?
                .iter()
                .map(|region| region == code)
                .collect(),
            _ => return Ok(column),
        };
        let mut column = column;
        for (value, keep) in column.iter_mut().zip(in_geography) {
            if !keep {
                *value = 0.0;
            }
        }
        Ok(column)
    }

    /// Resolve value and column for one target, or `None` if it is skipped.
    fn target_column(&self, target: &Target) -> Option<(f64, Array1<f64>)> {
        let Some(value) = resolve_value(target, self.year, self.tolerance) else {
            debug!(target_name = %target.name, year = self.year, "No value within tolerance, skipping");
            return None;
        };
        let column = self.column_or_skip(target)?;
        Some((value, column))
    }

    fn column_or_skip(&self, target: &Target) -> Option<Array1<f64>> {
        let Some(strategy) = target.compute_strategy() else {
            warn!(target_name = %target.name, unit = %target.unit, "No compute strategy, skipping");
            return None;
        };
        match self.compute_column(target, &strategy) {
            Ok(column) => Some(column),
            Err(e) => {
                warn!(
                    target_name = %target.name,
                    strategy = strategy.label(),
                    error = %format!("{:#}", e),
                    "Skipping target"
                );
                None
            }
        }
    }

    /// Build the national design from national, region and country targets.
    pub fn build_national(&self, registry: &TargetRegistry) -> Result<NationalDesign, MatrixError> {
        let targets = registry.targets_at(&NATIONAL_SCOPE)?;
        let household_count = self.microdata.household_count();

        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut columns = Vec::new();
        for target in &targets {
            if let Some((value, column)) = self.target_column(target) {
                names.push(target.name.clone());
                values.push(value);
                columns.push(column);
            }
        }

        info!(
            year = self.year,
            considered = targets.len(),
            built = names.len(),
            "Built national design"
        );
        Ok(NationalDesign::new(
            columns_to_matrix(household_count, &columns),
            Array1::from(values),
            names,
        )?)
    }

    /// Build the local design for `areas` at `level`.
    ///
    /// Targets at `level` are grouped by metric key. Each group contributes
    /// one design column, computed from its first target, and one target
    /// value per area, matched on `geo_code`.
    ///
    /// # Errors
    ///
    /// [`MatrixError::NonLocalLevel`] unless `level` is a constituency or
    /// local authority level. Country and region targets belong in the
    /// national design.
    pub fn build_local(
        &self,
        registry: &TargetRegistry,
        level: GeographicLevel,
        areas: &[Area],
    ) -> Result<LocalDesign, MatrixError> {
        if !level.is_local() {
            return Err(MatrixError::NonLocalLevel(level));
        }
        let targets = registry.targets(Some(level), None)?;
        let household_count = self.microdata.household_count();
        let area_index: HashMap<&str, usize> = areas
            .iter()
            .enumerate()
            .map(|(i, area)| (area.code.as_str(), i))
            .collect();

        let mut groups: Vec<(&str, Vec<&Target>)> = Vec::new();
        let mut group_index: HashMap<&str, usize> = HashMap::new();
        for target in &targets {
            let metric = target.metric_key();
            match group_index.get(metric) {
                Some(&g) => groups[g].1.push(target),
                None => {
                    group_index.insert(metric, groups.len());
                    groups.push((metric, vec![target]));
                }
            }
        }

        let mut names = Vec::new();
        let mut columns = Vec::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (metric, members) in &groups {
            let mut per_area: Vec<Option<f64>> = vec![None; areas.len()];
            for target in members {
                let Some(&a) = target.geo_code.as_deref().and_then(|c| area_index.get(c)) else {
                    debug!(target_name = %target.name, "Target geography not among areas, ignoring");
                    continue;
                };
                if let Some(value) = resolve_value(target, self.year, self.tolerance) {
                    per_area[a] = Some(value);
                }
            }
            let missing = per_area.iter().filter(|v| v.is_none()).count();
            if missing > 0 {
                warn!(metric, missing_areas = missing, "Metric not available for every area, skipping");
                continue;
            }
            let Some(column) = self.column_or_skip(members[0]) else {
                continue;
            };
            names.push(metric.to_string());
            columns.push(column);
            rows.push(per_area.into_iter().flatten().collect());
        }

        let targets_matrix =
            Array2::from_shape_fn((areas.len(), rows.len()), |(a, t)| rows[t][a]);
        info!(
            year = self.year,
            level = %level,
            areas = areas.len(),
            metrics = names.len(),
            skipped = groups.len() - names.len(),
            "Built local design"
        );
        Ok(LocalDesign::new(
            columns_to_matrix(household_count, &columns),
            targets_matrix,
            names,
            areas.to_vec(),
        )?)
    }

    /// Country mask for `areas` from the households' country geography.
    pub fn build_mask(&self, areas: &[Area]) -> Result<GeographyMask, MatrixError> {
        let countries = household_countries(self.microdata)?;
        build_country_mask(&countries, areas)
    }
}
