//! Symmetric relative squared error.
//!
//! # Mathematical Definition
//! ```text
//! a = (1 + x) / (1 + y) - 1
//! b = (1 + y) / (1 + x) - 1
//! sre(x, y) = min(a², b²)
//! ```
//!
//! The `+1` offsets keep the ratio finite for zero targets, and taking the
//! smaller of the two directions makes the loss independent of which side is
//! treated as the denominator. The function is defined for `x, y > -1`.

/// Symmetric relative squared error between an estimate `x` and a target `y`.
///
/// # Examples
/// ```
/// use reweight_core::math::loss::symmetric_relative_error;
///
/// assert_eq!(symmetric_relative_error(10.0, 10.0), 0.0);
/// // 22 / 11 gives (2 - 1)² = 1, 11 / 22 gives (0.5 - 1)² = 0.25
/// // and the smaller one is kept.
/// assert!((symmetric_relative_error(21.0, 10.0) - 0.25).abs() < 1e-12);
/// ```
#[inline]
pub fn symmetric_relative_error(x: f64, y: f64) -> f64 {
    let one_way = (1.0 + x) / (1.0 + y) - 1.0;
    let other_way = (1.0 + y) / (1.0 + x) - 1.0;
    (one_way * one_way).min(other_way * other_way)
}

/// Derivative of [`symmetric_relative_error`] with respect to the estimate `x`.
///
/// The branch taken is the one selected by the `min`; the two branches only
/// tie at `x == y`, where both derivatives are zero.
#[inline]
pub fn symmetric_relative_error_grad(x: f64, y: f64) -> f64 {
    let one_way = (1.0 + x) / (1.0 + y) - 1.0;
    let other_way = (1.0 + y) / (1.0 + x) - 1.0;
    if one_way * one_way <= other_way * other_way {
        2.0 * one_way / (1.0 + y)
    } else {
        -2.0 * other_way * (1.0 + y) / ((1.0 + x) * (1.0 + x))
    }
}

/// Gap between an estimate and `1 + target`, as used for the
/// share-within-tolerance diagnostic: `estimate / (1 + target) - 1`.
#[inline]
pub fn relative_gap(estimate: f64, target: f64) -> f64 {
    estimate / (1.0 + target) - 1.0
}

/// Whether `estimate` lies strictly within `tolerance` of `1 + target`.
#[inline]
pub fn is_close(estimate: f64, target: f64, tolerance: f64) -> bool {
    relative_gap(estimate, target).abs() < tolerance
}
