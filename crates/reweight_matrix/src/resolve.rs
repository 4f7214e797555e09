//! Year resolution for target values.

use reweight_core::types::{Target, Year};

/// Default nearest-year tolerance.
pub const DEFAULT_YEAR_TOLERANCE: u32 = 3;

/// Value of `target` for `year`.
///
/// Resolution order:
/// 1. the exact year
/// 2. the nearest available year within `tolerance`, only if it is not
///    later than `year`, scaled by the target's [`Extrapolation`] rule
///
/// Returns `None` when neither applies; the caller skips the target.
///
/// [`Extrapolation`]: reweight_core::types::Extrapolation
///
/// # Examples
///
/// ```
/// use reweight_core::types::{Target, Unit};
/// use reweight_matrix::resolve_value;
///
/// let target = Target::new("obr/income_tax", "income_tax", Unit::Gbp)
///     .with_value(2023, 250.0)
///     .with_value(2029, 400.0);
///
/// assert_eq!(resolve_value(&target, 2023, 3), Some(250.0));
/// assert_eq!(resolve_value(&target, 2025, 3), Some(250.0));
/// // 2029 is nearer to 2027 but lies in the future
/// assert_eq!(resolve_value(&target, 2027, 3), None);
/// ```
pub fn resolve_value(target: &Target, year: Year, tolerance: u32) -> Option<f64> {
    if let Some(&value) = target.values.get(&year) {
        return Some(value);
    }
    // Ties go to the earlier year, which is the one that may be used.
    let (&closest, &value) = target
        .values
        .iter()
        .min_by_key(|(&y, _)| (y.abs_diff(year), y))?;
    if closest.abs_diff(year) > tolerance || closest > year {
        return None;
    }
    Some(value * target.extrapolation.factor(closest, year))
}
