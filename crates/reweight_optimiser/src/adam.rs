//! Adam optimiser over a dense parameter matrix.

use ndarray::Array2;

use crate::device::Device;

/// Default step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Per-step constants of the Adam update.
///
/// Built by [`Adam::step`]; devices apply [`AdamCoefficients::update`] to
/// every parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamCoefficients {
    /// Step size
    pub learning_rate: f64,
    /// First-moment decay
    pub beta1: f64,
    /// Second-moment decay
    pub beta2: f64,
    /// Denominator floor
    pub epsilon: f64,
    /// `1 - beta1^t`
    pub bias_correction1: f64,
    /// `1 - beta2^t`
    pub bias_correction2: f64,
}

impl AdamCoefficients {
    /// Update one parameter and its moment estimates in place.
    #[inline]
    pub fn update(&self, param: &mut f64, grad: f64, first: &mut f64, second: &mut f64) {
        *first = self.beta1 * *first + (1.0 - self.beta1) * grad;
        *second = self.beta2 * *second + (1.0 - self.beta2) * grad * grad;
        let first_hat = *first / self.bias_correction1;
        let second_hat = *second / self.bias_correction2;
        *param -= self.learning_rate * first_hat / (second_hat.sqrt() + self.epsilon);
    }
}

/// Adam state for one parameter matrix.
///
/// Bias-corrected moments with the denominator floor added after the
/// square root.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use reweight_optimiser::{Adam, CpuDevice};
///
/// let mut params = array![[1.0, -1.0]];
/// let mut adam = Adam::new((1, 2), 0.1);
/// adam.step(&CpuDevice, &mut params, &array![[2.0, -3.0]]);
///
/// // The first step moves every parameter by the learning rate
/// assert!((params[[0, 0]] - 0.9).abs() < 1e-6);
/// assert!((params[[0, 1]] + 0.9).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    first_moment: Array2<f64>,
    second_moment: Array2<f64>,
}

impl Adam {
    /// Create zeroed state for parameters of shape `dim`.
    pub fn new(dim: (usize, usize), learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moment: Array2::zeros(dim),
            second_moment: Array2::zeros(dim),
        }
    }

    /// Override the moment decay rates.
    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Override the denominator floor.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Number of steps taken.
    pub fn steps(&self) -> usize {
        self.step as usize
    }

    /// Step size.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Apply one update to `params` given `grad`.
    ///
    /// # Panics
    ///
    /// Panics if `params` or `grad` differ in shape from the state.
    pub fn step<D: Device + ?Sized>(
        &mut self,
        device: &D,
        params: &mut Array2<f64>,
        grad: &Array2<f64>,
    ) {
        self.step = self.step.saturating_add(1);
        let coefficients = AdamCoefficients {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias_correction1: 1.0 - self.beta1.powi(self.step),
            bias_correction2: 1.0 - self.beta2.powi(self.step),
        };
        device.adam_update(
            params.view_mut(),
            grad.view(),
            self.first_moment.view_mut(),
            self.second_moment.view_mut(),
            &coefficients,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_zero_gradient_is_a_fixed_point() {
        let mut params = array![[0.5, 1.5]];
        let mut adam = Adam::new((1, 2), 0.1);
        for _ in 0..5 {
            adam.step(&CpuDevice, &mut params, &array![[0.0, 0.0]]);
        }
        assert_eq!(params, array![[0.5, 1.5]]);
        assert_eq!(adam.steps(), 5);
    }

    #[test]
    fn test_second_step_matches_hand_computation() {
        let mut params = array![[0.0]];
        let mut adam = Adam::new((1, 1), 0.1);
        adam.step(&CpuDevice, &mut params, &array![[1.0]]);
        adam.step(&CpuDevice, &mut params, &array![[-1.0]]);

        // m2 = 0.9*0.1 - 0.1 = -0.01, v2 = 0.999*0.001 + 0.001 = 0.001999
        let m_hat = -0.01 / (1.0 - 0.81);
        let v_hat: f64 = 0.001999 / (1.0 - 0.998001);
        let expected = -0.1 * (1.0 / (1.0 + 1e-8)) - 0.1 * m_hat / (v_hat.sqrt() + 1e-8);
        assert_relative_eq!(params[[0, 0]], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_minimises_quadratic() {
        let mut params = array![[3.0, -2.0]];
        let mut adam = Adam::new((1, 2), 0.05).with_betas(0.9, 0.999).with_epsilon(1e-8);
        for _ in 0..2000 {
            let grad = params.mapv(|p| 2.0 * p);
            adam.step(&CpuDevice, &mut params, &grad);
        }
        assert!(params.iter().all(|p| p.abs() < 1e-2));
        assert_relative_eq!(adam.learning_rate(), 0.05);
    }
}
