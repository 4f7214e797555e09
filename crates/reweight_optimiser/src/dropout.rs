//! Mean-replacement dropout on log-weights.
//!
//! Each entry is independently selected with probability `rate`; selected
//! entries are replaced by the mean of the entries that were not selected.
//! The mean depends on the kept entries, so [`backward`] routes the
//! gradient of every replaced entry back onto the kept ones.

use ndarray::{Array2, Zip};
use rand::Rng;

/// Entries replaced by one call to [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct DropoutMask {
    dropped: Array2<bool>,
    kept: usize,
}

impl DropoutMask {
    /// `true` where the entry was replaced.
    pub fn dropped(&self) -> &Array2<bool> {
        &self.dropped
    }

    /// Number of entries that kept their value.
    pub fn kept(&self) -> usize {
        self.kept
    }

    /// Number of replaced entries.
    pub fn dropped_count(&self) -> usize {
        self.dropped.len() - self.kept
    }
}

/// Replace a random fraction `rate` of `logits` with the mean of the rest.
///
/// Returns the transformed matrix and the mask, or `None` for the mask when
/// nothing was replaced: a zero rate, no entry selected, or every entry
/// selected (there is then no mean to take and the input is returned
/// unchanged).
pub fn apply<R: Rng + ?Sized>(
    logits: &Array2<f64>,
    rate: f64,
    rng: &mut R,
) -> (Array2<f64>, Option<DropoutMask>) {
    if rate <= 0.0 || logits.is_empty() {
        return (logits.clone(), None);
    }

    let dropped = logits.map(|_| rng.gen::<f64>() < rate);
    let kept = dropped.iter().filter(|&&d| !d).count();
    if kept == 0 || kept == logits.len() {
        return (logits.clone(), None);
    }

    let kept_sum: f64 = Zip::from(logits)
        .and(&dropped)
        .fold(0.0, |acc, &value, &d| if d { acc } else { acc + value });
    let mean = kept_sum / kept as f64;

    let out = Zip::from(logits)
        .and(&dropped)
        .map_collect(|&value, &d| if d { mean } else { value });
    (out, Some(DropoutMask { dropped, kept }))
}

/// Gradient with respect to the input of [`apply`], given the gradient with
/// respect to its output.
///
/// Replaced entries receive nothing directly; their summed gradient is
/// shared equally by the kept entries through the mean.
pub fn backward(grad: &Array2<f64>, mask: &DropoutMask) -> Array2<f64> {
    let dropped_sum: f64 = Zip::from(grad)
        .and(&mask.dropped)
        .fold(0.0, |acc, &g, &d| if d { acc + g } else { acc });
    let share = dropped_sum / mask.kept as f64;

    Zip::from(grad)
        .and(&mask.dropped)
        .map_collect(|&g, &d| if d { 0.0 } else { g + share })
}
