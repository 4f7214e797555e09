//! Initial log-space weights.

use ndarray::{Array1, Array2};
use rand::Rng;
use reweight_core::types::{DesignError, GeographyMask};

use crate::error::CalibrationError;

/// Floor applied before taking the logarithm of a zero weight.
pub const MIN_INITIAL_WEIGHT: f64 = 1e-12;

/// Seed the `(A × H)` log-weight matrix from national survey weights.
///
/// Each household's weight is shared equally between the areas the mask
/// allows it in, so that `exp(L) ⊙ R` summed over areas reproduces `w0`
/// up to the jitter. One uniform draw in `[0, jitter)` per household is
/// added before the logarithm and broadcast across areas.
///
/// # Errors
///
/// - [`CalibrationError::Design`] if `w0` does not have one entry per
///   household in `mask`
/// - [`CalibrationError::InvalidInitialWeight`] for a negative or
///   non-finite weight
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use reweight_core::types::GeographyMask;
/// use reweight_optimiser::initial_log_weights;
///
/// let mask = GeographyMask::new(array![[1.0, 1.0], [1.0, 0.0]])?;
/// let logits = initial_log_weights(&array![10.0, 4.0], &mask, 0.0, &mut StdRng::seed_from_u64(0))?;
///
/// // Household 0 is split across two areas, household 1 sits in one
/// assert!((logits[[0, 0]].exp() - 5.0).abs() < 1e-9);
/// assert!((logits[[1, 1]].exp() - 4.0).abs() < 1e-9);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn initial_log_weights<R: Rng + ?Sized>(
    w0: &Array1<f64>,
    mask: &GeographyMask,
    jitter: f64,
    rng: &mut R,
) -> Result<Array2<f64>, CalibrationError> {
    if w0.len() != mask.household_count() {
        return Err(
            DesignError::shape_mismatch("initial weights", mask.household_count(), w0.len()).into(),
        );
    }
    if let Some((household, &value)) = w0
        .iter()
        .enumerate()
        .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
    {
        return Err(CalibrationError::InvalidInitialWeight { household, value });
    }

    let areas = mask.areas_per_household().mapv(|count| count.max(1.0));
    let household_logits: Array1<f64> = w0
        .iter()
        .zip(areas.iter())
        .map(|(&weight, &count)| {
            let noise = if jitter > 0.0 {
                rng.gen::<f64>() * jitter
            } else {
                0.0
            };
            (weight / count + noise).max(MIN_INITIAL_WEIGHT).ln()
        })
        .collect();

    let mut logits = Array2::zeros((mask.area_count(), mask.household_count()));
    logits.assign(&household_logits);
    Ok(logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Axis};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mask() -> GeographyMask {
        GeographyMask::new(array![[1.0, 1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0]]).unwrap()
    }

    #[test]
    fn test_masked_weights_reproduce_survey_totals() {
        let w0 = array![300.0, 40.0, 7.0];
        let mut rng = StdRng::seed_from_u64(11);
        let logits = initial_log_weights(&w0, &mask(), 0.0, &mut rng).unwrap();
        let weights = logits.mapv(f64::exp) * mask().as_array();
        let totals = weights.sum_axis(Axis(0));
        for (total, expected) in totals.iter().zip(w0.iter()) {
            assert_relative_eq!(total, expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_jitter_is_shared_across_areas() {
        let w0 = array![300.0, 40.0, 7.0];
        let mut rng = StdRng::seed_from_u64(11);
        let logits = initial_log_weights(&w0, &mask(), 0.01, &mut rng).unwrap();
        for column in logits.columns() {
            assert!(column.iter().all(|&v| v == column[0]));
        }
        assert!(logits[[0, 1]].exp() >= 40.0 && logits[[0, 1]].exp() < 40.01);
    }

    #[test]
    fn test_zero_weight_is_floored() {
        let logits = initial_log_weights(
            &array![0.0, 1.0, 1.0],
            &mask(),
            0.0,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert!(logits.iter().all(|v| v.is_finite()));
        assert_relative_eq!(logits[[0, 0]], MIN_INITIAL_WEIGHT.ln());
    }

    #[test]
    fn test_rejects_invalid_weights() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = initial_log_weights(&array![1.0, -2.0, 1.0], &mask(), 0.0, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::InvalidInitialWeight { household: 1, .. }
        ));
        let err = initial_log_weights(&array![1.0, 1.0], &mask(), 0.0, &mut rng).unwrap_err();
        assert!(err.is_design());
    }
}
