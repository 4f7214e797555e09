//! Per-metric comparison of estimates against targets.
//!
//! Produces one row per (area, local metric) and one per national metric.
//! Rows serialise directly to the calibration log.

use ndarray::{Array2, Axis};
use reweight_core::types::{DesignError, LocalDesign, NationalDesign};
use serde::Serialize;

/// Area name used for national rows.
pub const NATIONAL_AREA_NAME: &str = "UK";

/// Estimate and error for one metric in one area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    /// Row of the weight matrix; `None` for national metrics
    pub area_index: Option<usize>,
    /// Area name, or [`NATIONAL_AREA_NAME`]
    pub area_name: String,
    /// Metric name
    pub metric: String,
    /// Weighted estimate
    pub estimate: f64,
    /// Target value
    pub target: f64,
    /// `estimate - target`
    pub error: f64,
    /// `|estimate - target|`
    pub abs_error: f64,
    /// `abs_error / target`; infinite or NaN for a zero target
    pub rel_abs_error: f64,
    /// Whether the metric was held out of training
    pub validation: bool,
}

impl PerformanceRow {
    fn new(
        area_index: Option<usize>,
        area_name: &str,
        metric: &str,
        estimate: f64,
        target: f64,
        validation: bool,
    ) -> Self {
        let error = estimate - target;
        let abs_error = error.abs();
        Self {
            area_index,
            area_name: area_name.to_string(),
            metric: metric.to_string(),
            estimate,
            target,
            error,
            abs_error,
            rel_abs_error: abs_error / target,
            validation,
        }
    }

    /// Whether this row describes a national metric.
    pub fn is_national(&self) -> bool {
        self.area_index.is_none()
    }
}

/// One line of the calibration log: a performance row at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    /// Row of the weight matrix; `None` for national metrics
    pub area_index: Option<usize>,
    /// Area name
    pub area_name: String,
    /// Metric name
    pub metric: String,
    /// `{area_name}/{metric}`
    pub target_name: String,
    /// Weighted estimate
    pub estimate: f64,
    /// Target value
    pub target: f64,
    /// `estimate - target`
    pub error: f64,
    /// `|estimate - target|`
    pub abs_error: f64,
    /// `abs_error / target`
    pub rel_abs_error: f64,
    /// Held out of training
    pub validation: bool,
    /// Checkpoint epoch
    pub epoch: usize,
    /// `rel_abs_error²`
    pub loss: f64,
}

/// Performance rows for one set of weights.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerformanceTable {
    rows: Vec<PerformanceRow>,
}

impl PerformanceTable {
    /// All rows: local rows area by area, then national rows.
    pub fn rows(&self) -> &[PerformanceRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for `metric` in `area_index` (`None` for national).
    pub fn find(&self, area_index: Option<usize>, metric: &str) -> Option<&PerformanceRow> {
        self.rows
            .iter()
            .find(|row| row.area_index == area_index && row.metric == metric)
    }

    /// Mean absolute relative error over rows with a non-zero target.
    pub fn mean_rel_abs_error(&self) -> f64 {
        let finite: Vec<f64> = self
            .rows
            .iter()
            .map(|row| row.rel_abs_error)
            .filter(|e| e.is_finite())
            .collect();
        if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        }
    }

    /// Log lines for a checkpoint at `epoch`.
    pub fn log_rows(&self, epoch: usize) -> Vec<LogRow> {
        self.rows
            .iter()
            .map(|row| LogRow {
                area_index: row.area_index,
                area_name: row.area_name.clone(),
                metric: row.metric.clone(),
                target_name: format!("{}/{}", row.area_name, row.metric),
                estimate: row.estimate,
                target: row.target,
                error: row.error,
                abs_error: row.abs_error,
                rel_abs_error: row.rel_abs_error,
                validation: row.validation,
                epoch,
                loss: row.rel_abs_error * row.rel_abs_error,
            })
            .collect()
    }
}

/// Compare `weights` (A × H) against every local and national target.
///
/// A metric is flagged as validation when its name is in `excluded`.
/// Pure: the same inputs always produce the same table.
///
/// # Errors
///
/// [`DesignError::ShapeMismatch`] when `weights` does not have one row per
/// local area and one column per household of both designs.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use reweight_core::types::{Area, LocalDesign, NationalDesign};
/// use reweight_optimiser::evaluate_performance;
///
/// let local = LocalDesign::new(
///     array![[1.0], [1.0]],
///     array![[4.0]],
///     vec!["people".into()],
///     vec![Area::new("E1", "Aldershot")],
/// )?;
/// let national = NationalDesign::new(array![[1.0], [0.0]], array![2.0], vec!["owners".into()])?;
///
/// let table = evaluate_performance(&array![[1.0, 2.0]], &local, &national, &[])?;
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.rows()[0].error, -1.0);
/// assert_eq!(table.rows()[1].area_name, "UK");
/// assert_eq!(table.rows()[1].rel_abs_error, 0.5);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn evaluate_performance(
    weights: &Array2<f64>,
    local: &LocalDesign,
    national: &NationalDesign,
    excluded: &[String],
) -> Result<PerformanceTable, DesignError> {
    if weights.nrows() != local.area_count() {
        return Err(DesignError::shape_mismatch(
            "weight rows",
            local.area_count(),
            weights.nrows(),
        ));
    }
    if weights.ncols() != local.household_count() {
        return Err(DesignError::shape_mismatch(
            "weight columns",
            local.household_count(),
            weights.ncols(),
        ));
    }
    if weights.ncols() != national.household_count() {
        return Err(DesignError::shape_mismatch(
            "weight columns",
            national.household_count(),
            weights.ncols(),
        ));
    }

    let is_excluded = |name: &str| excluded.iter().any(|e| e == name);
    let local_estimates = weights.dot(&local.matrix);
    let national_estimates = weights.sum_axis(Axis(0)).dot(&national.matrix);

    let mut rows = Vec::with_capacity(local_estimates.len() + national_estimates.len());
    for (a, area) in local.areas.iter().enumerate() {
        for (t, metric) in local.names.iter().enumerate() {
            rows.push(PerformanceRow::new(
                Some(a),
                &area.name,
                metric,
                local_estimates[[a, t]],
                local.targets[[a, t]],
                is_excluded(metric),
            ));
        }
    }
    for (n, metric) in national.names.iter().enumerate() {
        rows.push(PerformanceRow::new(
            None,
            NATIONAL_AREA_NAME,
            metric,
            national_estimates[n],
            national.targets[n],
            is_excluded(metric),
        ));
    }
    Ok(PerformanceTable { rows })
}
