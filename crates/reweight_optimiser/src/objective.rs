//! Calibration loss and its gradient with respect to the weights.
//!
//! With predictions `P = W · M` (A × T) and `p = (Σ_a W) · M_nat` (N):
//!
//! ```text
//! local    = mean over areas a and training columns t of sre(P[a,t], Y[a,t])
//! national = mean over training columns n of sre(p[n], y[n])
//! total    = local + national
//! ```
//!
//! The mean of no terms is zero.

use ndarray::{Array1, Array2, Axis};
use reweight_core::math::{is_close, symmetric_relative_error, symmetric_relative_error_grad};

use crate::device::Device;
use crate::partition::Split;
use crate::problem::CalibrationProblem;

/// Tolerance on the relative gap for a metric to count as close.
pub const CLOSE_TOLERANCE: f64 = 0.1;

/// Loss split into its local and national parts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossBreakdown {
    /// Mean error over areas and local columns
    pub local: f64,
    /// Mean error over national columns
    pub national: f64,
}

impl LossBreakdown {
    /// Sum of both parts.
    pub fn total(&self) -> f64 {
        self.local + self.national
    }
}

/// Model estimates for every target.
#[derive(Debug, Clone)]
pub struct Predictions {
    /// Local estimates, A × T
    pub local: Array2<f64>,
    /// National estimates, N
    pub national: Array1<f64>,
}

/// Evaluate both designs at `weights` (A × H).
pub fn predict<D: Device + ?Sized>(
    device: &D,
    problem: &CalibrationProblem,
    weights: &Array2<f64>,
) -> Predictions {
    let local = device.matmul(weights.view(), problem.local().matrix.view());
    let household_totals = weights.sum_axis(Axis(0)).insert_axis(Axis(0));
    let national = device
        .matmul(household_totals.view(), problem.national().matrix.view())
        .index_axis_move(Axis(0), 0);
    Predictions { local, national }
}

fn mean_or_zero(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Loss of `predictions` on one side of the column split.
pub fn loss(problem: &CalibrationProblem, predictions: &Predictions, split: Split) -> LossBreakdown {
    let local_targets = &problem.local().targets;
    let local_cols = problem.local_partition().columns(split);
    let mut local_sum = 0.0;
    for &t in local_cols {
        for (&estimate, &target) in predictions
            .local
            .column(t)
            .iter()
            .zip(local_targets.column(t).iter())
        {
            local_sum += symmetric_relative_error(estimate, target);
        }
    }

    let national_targets = &problem.national().targets;
    let national_cols = problem.national_partition().columns(split);
    let national_sum: f64 = national_cols
        .iter()
        .map(|&n| symmetric_relative_error(predictions.national[n], national_targets[n]))
        .sum();

    LossBreakdown {
        local: mean_or_zero(local_sum, local_cols.len() * problem.area_count()),
        national: mean_or_zero(national_sum, national_cols.len()),
    }
}

/// Loss of `weights` on one side of the split, without a gradient.
pub fn evaluate<D: Device + ?Sized>(
    device: &D,
    problem: &CalibrationProblem,
    weights: &Array2<f64>,
    split: Split,
) -> LossBreakdown {
    loss(problem, &predict(device, problem, weights), split)
}

/// Training loss at `weights` and its gradient with respect to `weights`.
///
/// The gradient has the shape of `weights`. Held-out columns contribute
/// nothing.
pub fn loss_and_gradient<D: Device + ?Sized>(
    device: &D,
    problem: &CalibrationProblem,
    weights: &Array2<f64>,
) -> (LossBreakdown, Array2<f64>) {
    let predictions = predict(device, problem, weights);
    let breakdown = loss(problem, &predictions, Split::Training);

    let local = problem.local();
    let local_cols = problem.local_partition().columns(Split::Training);
    let local_terms = local_cols.len() * problem.area_count();
    let mut grad = if local_terms == 0 {
        Array2::zeros(weights.raw_dim())
    } else {
        let scale = 1.0 / local_terms as f64;
        let mut d_predictions = Array2::<f64>::zeros(predictions.local.raw_dim());
        for &t in local_cols {
            for a in 0..problem.area_count() {
                d_predictions[[a, t]] = scale
                    * symmetric_relative_error_grad(
                        predictions.local[[a, t]],
                        local.targets[[a, t]],
                    );
            }
        }
        device.matmul(d_predictions.view(), local.matrix.t())
    };

    let national = problem.national();
    let national_cols = problem.national_partition().columns(Split::Training);
    if !national_cols.is_empty() {
        let scale = 1.0 / national_cols.len() as f64;
        let mut d_national = Array2::<f64>::zeros((national.target_count(), 1));
        for &n in national_cols {
            d_national[[n, 0]] = scale
                * symmetric_relative_error_grad(predictions.national[n], national.targets[n]);
        }
        // Every area's weight feeds the household total identically
        let household_grad = device
            .matmul(national.matrix.view(), d_national.view())
            .index_axis_move(Axis(1), 0);
        grad += &household_grad;
    }

    (breakdown, grad)
}

/// Counts of metrics within [`CLOSE_TOLERANCE`] of their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CloseShares {
    /// Local (area, metric) pairs that are close
    pub local_close: usize,
    /// Local (area, metric) pairs
    pub local_total: usize,
    /// National metrics that are close
    pub national_close: usize,
    /// National metrics
    pub national_total: usize,
}

impl CloseShares {
    /// Share of local metrics that are close.
    pub fn local(&self) -> f64 {
        mean_or_zero(self.local_close as f64, self.local_total)
    }

    /// Share of national metrics that are close.
    pub fn national(&self) -> f64 {
        mean_or_zero(self.national_close as f64, self.national_total)
    }

    /// Share of all metrics that are close.
    pub fn overall(&self) -> f64 {
        mean_or_zero(
            (self.local_close + self.national_close) as f64,
            self.local_total + self.national_total,
        )
    }
}

/// Count metrics whose estimate is within `tolerance` of `1 + target`,
/// over every column regardless of the split.
pub fn close_shares(
    problem: &CalibrationProblem,
    predictions: &Predictions,
    tolerance: f64,
) -> CloseShares {
    let local_close = predictions
        .local
        .iter()
        .zip(problem.local().targets.iter())
        .filter(|(&estimate, &target)| is_close(estimate, target, tolerance))
        .count();
    let national_close = predictions
        .national
        .iter()
        .zip(problem.national().targets.iter())
        .filter(|(&estimate, &target)| is_close(estimate, target, tolerance))
        .count();
    CloseShares {
        local_close,
        local_total: predictions.local.len(),
        national_close,
        national_total: predictions.national.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;
    use approx::assert_relative_eq;
    use ndarray::array;
    use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};

    fn problem() -> CalibrationProblem {
        let local = LocalDesign::new(
            array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]],
            array![[6.0, 8.0], [3.0, 1.0]],
            vec!["a".into(), "b".into()],
            vec![Area::new("E1", "One"), Area::new("E2", "Two")],
        )
        .unwrap();
        let national = NationalDesign::new(
            array![[1.0, 0.5], [1.0, 0.0], [1.0, 2.0]],
            array![12.0, 4.0],
            vec!["total".into(), "mixed".into()],
        )
        .unwrap();
        CalibrationProblem::new(local, national, GeographyMask::all_ones(2, 3)).unwrap()
    }

    fn weights() -> Array2<f64> {
        array![[2.0, 1.5, 0.5], [0.3, 4.0, 1.0]]
    }

    fn total_loss(problem: &CalibrationProblem, weights: &Array2<f64>) -> f64 {
        evaluate(&CpuDevice, problem, weights, Split::Training).total()
    }

    #[test]
    fn test_predictions() {
        let predictions = predict(&CpuDevice, &problem(), &weights());
        let expected = array![[2.5, 3.5], [1.3, 9.0]];
        for (actual, expected) in predictions.local.iter().zip(expected.iter()) {
            assert_relative_eq!(actual, expected, epsilon = 1e-12);
        }
        // household totals [2.3, 5.5, 1.5]
        assert_relative_eq!(predictions.national[0], 9.3, epsilon = 1e-12);
        assert_relative_eq!(predictions.national[1], 4.15, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_weights_have_zero_loss() {
        let local = LocalDesign::new(
            array![[1.0], [1.0]],
            array![[3.0]],
            vec!["a".into()],
            vec![Area::new("E1", "One")],
        )
        .unwrap();
        let problem =
            CalibrationProblem::new(local, NationalDesign::empty(2), GeographyMask::all_ones(1, 2))
                .unwrap();
        let (breakdown, grad) = loss_and_gradient(&CpuDevice, &problem, &array![[1.0, 2.0]]);
        assert_eq!(breakdown, LossBreakdown::default());
        assert!(grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let problem = problem().with_excluded(&["b"]);
        let weights = weights();
        let (breakdown, grad) = loss_and_gradient(&CpuDevice, &problem, &weights);
        assert_relative_eq!(breakdown.total(), total_loss(&problem, &weights), epsilon = 1e-12);

        let h = 1e-6;
        for ((a, household), &g) in grad.indexed_iter() {
            let mut up = weights.clone();
            up[[a, household]] += h;
            let mut down = weights.clone();
            down[[a, household]] -= h;
            let numeric = (total_loss(&problem, &up) - total_loss(&problem, &down)) / (2.0 * h);
            assert_relative_eq!(g, numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_validation_only_sees_excluded_columns() {
        let problem = problem().with_excluded(&["b", "mixed"]);
        let predictions = predict(&CpuDevice, &problem, &weights());

        let validation = loss(&problem, &predictions, Split::Validation);
        let expected_local = (symmetric_relative_error(3.5, 8.0)
            + symmetric_relative_error(9.0, 1.0))
            / 2.0;
        assert_relative_eq!(validation.local, expected_local, epsilon = 1e-12);
        assert_relative_eq!(
            validation.national,
            symmetric_relative_error(4.15, 4.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_everything_excluded_gives_zero_training_loss() {
        let problem = problem().with_excluded(&["a", "b", "total", "mixed"]);
        let (breakdown, grad) = loss_and_gradient(&CpuDevice, &problem, &weights());
        assert_eq!(breakdown.total(), 0.0);
        assert!(grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_close_shares() {
        let problem = problem();
        let predictions = Predictions {
            local: array![[7.5, 9.0], [4.0, 20.0]],
            national: array![13.0, 100.0],
        };
        let shares = close_shares(&problem, &predictions, CLOSE_TOLERANCE);
        assert_eq!(shares.local_close, 3);
        assert_eq!(shares.national_close, 1);
        assert_relative_eq!(shares.local(), 0.75);
        assert_relative_eq!(shares.national(), 0.5);
        assert_relative_eq!(shares.overall(), 4.0 / 6.0);
        assert_eq!(CloseShares::default().overall(), 0.0);
    }
}
