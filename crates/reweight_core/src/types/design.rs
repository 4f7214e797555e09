//! Design matrices and the geography mask.
//!
//! Shapes, with `H` households, `A` areas, `T` local and `N` national
//! target columns:
//!
//! | Array | Shape |
//! |-------|-------|
//! | [`LocalDesign::matrix`] | H × T |
//! | [`LocalDesign::targets`] | A × T |
//! | [`NationalDesign::matrix`] | H × N |
//! | [`NationalDesign::targets`] | N |
//! | [`GeographyMask`] | A × H |
//!
//! Constructors reject mismatched shapes and non-finite values; the
//! optimiser does not sanitise its inputs.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::error::DesignError;
use super::geography::Area;

fn check_finite(what: &str, values: ArrayView2<'_, f64>) -> Result<(), DesignError> {
    match values.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), _)) => Err(DesignError::NonFinite {
            what: what.to_string(),
            row,
            col,
        }),
        None => Ok(()),
    }
}

fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), DesignError> {
    if expected != actual {
        return Err(DesignError::shape_mismatch(what, expected, actual));
    }
    Ok(())
}

/// Nationally scoped design: one column and one scalar target per metric.
#[derive(Clone, Debug, PartialEq)]
pub struct NationalDesign {
    /// Household contributions, H × N
    pub matrix: Array2<f64>,
    /// Target values, N
    pub targets: Array1<f64>,
    /// Column names, N
    pub names: Vec<String>,
}

impl NationalDesign {
    /// Create a validated national design.
    pub fn new(
        matrix: Array2<f64>,
        targets: Array1<f64>,
        names: Vec<String>,
    ) -> Result<Self, DesignError> {
        let design = Self {
            matrix,
            targets,
            names,
        };
        design.validate()?;
        Ok(design)
    }

    /// Design with no columns.
    pub fn empty(household_count: usize) -> Self {
        Self {
            matrix: Array2::zeros((household_count, 0)),
            targets: Array1::zeros(0),
            names: Vec::new(),
        }
    }

    /// Number of households.
    pub fn household_count(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of target columns.
    pub fn target_count(&self) -> usize {
        self.matrix.ncols()
    }

    /// Check shapes agree and every value is finite.
    pub fn validate(&self) -> Result<(), DesignError> {
        check_len("national targets", self.matrix.ncols(), self.targets.len())?;
        check_len("national names", self.matrix.ncols(), self.names.len())?;
        check_finite("national matrix", self.matrix.view())?;
        check_finite(
            "national targets",
            self.targets.view().insert_axis(Axis(0)),
        )
    }
}

/// Local design: one column per metric, one target row per area.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalDesign {
    /// Household contributions, H × T
    pub matrix: Array2<f64>,
    /// Target values, A × T
    pub targets: Array2<f64>,
    /// Metric names, T
    pub names: Vec<String>,
    /// Areas, A
    pub areas: Vec<Area>,
}

impl LocalDesign {
    /// Create a validated local design.
    pub fn new(
        matrix: Array2<f64>,
        targets: Array2<f64>,
        names: Vec<String>,
        areas: Vec<Area>,
    ) -> Result<Self, DesignError> {
        let design = Self {
            matrix,
            targets,
            names,
            areas,
        };
        design.validate()?;
        Ok(design)
    }

    /// Design with no metrics over `areas`.
    pub fn empty(household_count: usize, areas: Vec<Area>) -> Self {
        Self {
            matrix: Array2::zeros((household_count, 0)),
            targets: Array2::zeros((areas.len(), 0)),
            names: Vec::new(),
            areas,
        }
    }

    /// Number of households.
    pub fn household_count(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of areas.
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// Number of metric columns.
    pub fn target_count(&self) -> usize {
        self.matrix.ncols()
    }

    /// Index of a metric column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Check shapes agree and every value is finite.
    pub fn validate(&self) -> Result<(), DesignError> {
        check_len("local target columns", self.matrix.ncols(), self.targets.ncols())?;
        check_len("local target rows", self.areas.len(), self.targets.nrows())?;
        check_len("local names", self.matrix.ncols(), self.names.len())?;
        check_finite("local matrix", self.matrix.view())?;
        check_finite("local targets", self.targets.view())
    }
}

/// Area × household 0/1 matrix of allowed assignments.
///
/// Built once per run and never updated during optimisation.
#[derive(Clone, Debug, PartialEq)]
pub struct GeographyMask {
    mask: Array2<f64>,
}

impl GeographyMask {
    /// Wrap a mask, checking every entry is 0 or 1.
    pub fn new(mask: Array2<f64>) -> Result<Self, DesignError> {
        if let Some(((area, household), &value)) = mask
            .indexed_iter()
            .find(|(_, &v)| v != 0.0 && v != 1.0)
        {
            return Err(DesignError::NonBinaryMask {
                area,
                household,
                value,
            });
        }
        Ok(Self { mask })
    }

    /// Mask allowing every household in every area.
    pub fn all_ones(area_count: usize, household_count: usize) -> Self {
        Self {
            mask: Array2::ones((area_count, household_count)),
        }
    }

    /// Underlying A × H array.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.mask
    }

    /// Consume into the underlying array.
    pub fn into_array(self) -> Array2<f64> {
        self.mask
    }

    /// Number of areas.
    pub fn area_count(&self) -> usize {
        self.mask.nrows()
    }

    /// Number of households.
    pub fn household_count(&self) -> usize {
        self.mask.ncols()
    }

    /// Whether household `h` may carry weight in area `a`.
    pub fn allows(&self, a: usize, h: usize) -> bool {
        self.mask[[a, h]] != 0.0
    }

    /// Number of areas each household may belong to.
    pub fn areas_per_household(&self) -> Array1<f64> {
        self.mask.sum_axis(Axis(0))
    }

    /// Households with no allowed area.
    pub fn uncovered_households(&self) -> Vec<usize> {
        self.areas_per_household()
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0.0)
            .map(|(h, _)| h)
            .collect()
    }
}
