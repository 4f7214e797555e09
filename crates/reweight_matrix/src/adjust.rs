//! Post-build adjustments to local target rows.
//!
//! - [`apply_national_consistency`]: rescale a metric family so its total
//!   across areas matches a national figure
//! - [`apply_area_mapping`]: re-express targets on a new set of areas, e.g.
//!   after a boundary review

use ndarray::{Array2, Axis};
use reweight_core::types::{Area, DesignError, LocalDesign};
use tracing::debug;

use crate::error::MatrixError;

fn column_indices(design: &LocalDesign, metrics: &[&str]) -> Result<Vec<usize>, MatrixError> {
    metrics
        .iter()
        .map(|metric| {
            design.column_index(metric).ok_or_else(|| {
                MatrixError::invalid_adjustment(format!("unknown local metric '{}'", metric))
            })
        })
        .collect()
}

/// Multiply the target columns `metrics` by `scale`.
pub fn scale_columns(
    design: &mut LocalDesign,
    metrics: &[&str],
    scale: f64,
) -> Result<(), MatrixError> {
    for col in column_indices(design, metrics)? {
        design
            .targets
            .column_mut(col)
            .mapv_inplace(|value| value * scale);
    }
    Ok(())
}

/// Rescale the local targets of `metrics` so their sum over all areas equals
/// `national_total * factor`. Returns the scale applied.
///
/// `factor` is 1 unless the national figure is known to cover a different
/// population than the local breakdown.
///
/// # Errors
///
/// [`MatrixError::InvalidAdjustment`] for an unknown metric or when the
/// current local total is not positive.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use reweight_core::types::{Area, LocalDesign};
/// use reweight_matrix::apply_national_consistency;
///
/// let mut design = LocalDesign::new(
///     array![[1.0, 0.0], [0.0, 1.0]],
///     array![[10.0, 20.0], [30.0, 40.0]],
///     vec!["age/0_10".into(), "age/10_20".into()],
///     vec![Area::new("E1", "A"), Area::new("E2", "B")],
/// )?;
/// let scale = apply_national_consistency(&mut design, &["age/0_10", "age/10_20"], 200.0, 1.0)?;
/// assert_eq!(scale, 2.0);
/// assert_eq!(design.targets.sum(), 200.0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn apply_national_consistency(
    design: &mut LocalDesign,
    metrics: &[&str],
    national_total: f64,
    factor: f64,
) -> Result<f64, MatrixError> {
    let cols = column_indices(design, metrics)?;
    let local_total: f64 = cols
        .iter()
        .map(|&col| design.targets.column(col).sum())
        .sum();
    if !(local_total > 0.0 && local_total.is_finite()) {
        return Err(MatrixError::invalid_adjustment(format!(
            "local total of {:?} is {}",
            metrics, local_total
        )));
    }
    if !(national_total.is_finite() && factor.is_finite()) {
        return Err(MatrixError::invalid_adjustment(
            "national total and factor must be finite",
        ));
    }

    let scale = national_total / local_total * factor;
    scale_columns(design, metrics, scale)?;
    debug!(
        metrics = ?metrics,
        local_total,
        national_total,
        factor,
        scale,
        "Applied national consistency adjustment"
    );
    Ok(scale)
}

/// Re-express local targets on `areas` through an `(A_new × A_old)`
/// mapping matrix: `Y_new = mapping · Y_old`.
///
/// The design matrix columns are unchanged; only target rows move.
///
/// # Errors
///
/// [`MatrixError::Design`] when the mapping does not have one column per
/// current area and one row per new area.
pub fn apply_area_mapping(
    design: LocalDesign,
    mapping: &Array2<f64>,
    areas: Vec<Area>,
) -> Result<LocalDesign, MatrixError> {
    if mapping.ncols() != design.area_count() {
        return Err(DesignError::shape_mismatch(
            "mapping columns",
            design.area_count(),
            mapping.ncols(),
        )
        .into());
    }
    if mapping.nrows() != areas.len() {
        return Err(
            DesignError::shape_mismatch("mapping rows", areas.len(), mapping.nrows()).into(),
        );
    }

    let targets = mapping.dot(&design.targets);
    debug!(
        old_areas = design.area_count(),
        new_areas = areas.len(),
        unmapped_old_areas = mapping
            .sum_axis(Axis(0))
            .iter()
            .filter(|&&weight| weight == 0.0)
            .count(),
        "Applied area mapping"
    );
    Ok(LocalDesign::new(design.matrix, targets, design.names, areas)?)
}
