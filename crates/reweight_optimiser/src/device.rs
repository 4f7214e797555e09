//! Compute devices for the dense kernels of the training loop.
//!
//! The calibrator runs the same arithmetic on every device: only the three
//! kernels below are dispatched. [`CpuDevice`] is single-threaded;
//! [`ParallelDevice`] splits rows across a dedicated Rayon pool and is
//! available with the `parallel` feature.

use infra_config::{DeviceKind, OptimiserSettings};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Zip};

use crate::adam::AdamCoefficients;
use crate::error::CalibrationError;

/// Dense kernels used by the training loop.
pub trait Device: Send + Sync {
    /// Short device name for logs.
    fn name(&self) -> &'static str;

    /// Matrix product `a · b`.
    fn matmul(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64>;

    /// `exp(logits) ⊙ mask`, with masked-out entries exactly zero.
    fn exp_masked(&self, logits: ArrayView2<'_, f64>, mask: ArrayView2<'_, f64>) -> Array2<f64>;

    /// One elementwise Adam update of `params` and its moment buffers.
    fn adam_update(
        &self,
        params: ArrayViewMut2<'_, f64>,
        grad: ArrayView2<'_, f64>,
        first_moment: ArrayViewMut2<'_, f64>,
        second_moment: ArrayViewMut2<'_, f64>,
        coefficients: &AdamCoefficients,
    );
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn matmul(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
        (**self).matmul(a, b)
    }

    fn exp_masked(&self, logits: ArrayView2<'_, f64>, mask: ArrayView2<'_, f64>) -> Array2<f64> {
        (**self).exp_masked(logits, mask)
    }

    fn adam_update(
        &self,
        params: ArrayViewMut2<'_, f64>,
        grad: ArrayView2<'_, f64>,
        first_moment: ArrayViewMut2<'_, f64>,
        second_moment: ArrayViewMut2<'_, f64>,
        coefficients: &AdamCoefficients,
    ) {
        (**self).adam_update(params, grad, first_moment, second_moment, coefficients)
    }
}

#[inline]
fn masked_exp(logit: f64, mask: f64) -> f64 {
    if mask == 0.0 {
        0.0
    } else {
        logit.exp() * mask
    }
}

/// Single-threaded device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuDevice;

impl Device for CpuDevice {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn matmul(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
        a.dot(&b)
    }

    fn exp_masked(&self, logits: ArrayView2<'_, f64>, mask: ArrayView2<'_, f64>) -> Array2<f64> {
        Zip::from(&logits)
            .and(&mask)
            .map_collect(|&logit, &m| masked_exp(logit, m))
    }

    fn adam_update(
        &self,
        params: ArrayViewMut2<'_, f64>,
        grad: ArrayView2<'_, f64>,
        first_moment: ArrayViewMut2<'_, f64>,
        second_moment: ArrayViewMut2<'_, f64>,
        coefficients: &AdamCoefficients,
    ) {
        Zip::from(params)
            .and(grad)
            .and(first_moment)
            .and(second_moment)
            .for_each(|p, &g, m, v| coefficients.update(p, g, m, v));
    }
}

/// Row-parallel device backed by its own Rayon thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug)]
pub struct ParallelDevice {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelDevice {
    /// Create a device with `threads` worker threads.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::Device`] if the pool cannot be built.
    pub fn new(threads: usize) -> Result<Self, CalibrationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("reweight-{}", i))
            .build()
            .map_err(|e| CalibrationError::Device(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(feature = "parallel")]
impl Device for ParallelDevice {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn matmul(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::zeros((a.nrows(), b.ncols()));
        self.pool.install(|| {
            Zip::from(out.rows_mut())
                .and(a.rows())
                .par_for_each(|mut row, a_row| row.assign(&a_row.dot(&b)));
        });
        out
    }

    fn exp_masked(&self, logits: ArrayView2<'_, f64>, mask: ArrayView2<'_, f64>) -> Array2<f64> {
        self.pool.install(|| {
            Zip::from(&logits)
                .and(&mask)
                .par_map_collect(|&logit, &m| masked_exp(logit, m))
        })
    }

    fn adam_update(
        &self,
        params: ArrayViewMut2<'_, f64>,
        grad: ArrayView2<'_, f64>,
        first_moment: ArrayViewMut2<'_, f64>,
        second_moment: ArrayViewMut2<'_, f64>,
        coefficients: &AdamCoefficients,
    ) {
        self.pool.install(|| {
            Zip::from(params)
                .and(grad)
                .and(first_moment)
                .and(second_moment)
                .par_for_each(|p, &g, m, v| coefficients.update(p, g, m, v));
        });
    }
}

/// Create the device named in `settings`.
///
/// # Errors
///
/// [`CalibrationError::Device`] when the parallel device is requested but
/// the crate was built without the `parallel` feature, or its pool cannot
/// be created.
pub fn device_from_settings(
    settings: &OptimiserSettings,
) -> Result<Box<dyn Device>, CalibrationError> {
    match settings.device {
        DeviceKind::Cpu => Ok(Box::new(CpuDevice)),
        #[cfg(feature = "parallel")]
        DeviceKind::Parallel => Ok(Box::new(ParallelDevice::new(settings.threads)?)),
        #[cfg(not(feature = "parallel"))]
        DeviceKind::Parallel => Err(CalibrationError::Device(
            "built without the `parallel` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_cpu_exp_masked_zeroes_masked_entries() {
        let logits = array![[0.0, 1000.0], [2.0_f64.ln(), 0.0]];
        let mask = array![[1.0, 0.0], [1.0, 1.0]];
        let out = CpuDevice.exp_masked(logits.view(), mask.view());
        assert_eq!(out[[0, 1]], 0.0);
        assert_relative_eq!(out[[1, 0]], 2.0, epsilon = 1e-12);
        assert_relative_eq!(out[[0, 0]], 1.0);
    }

    #[test]
    fn test_device_from_settings_cpu() {
        let device = device_from_settings(&OptimiserSettings::default()).unwrap();
        assert_eq!(device.name(), "cpu");
        let product = device.matmul(array![[1.0, 2.0]].view(), array![[3.0], [4.0]].view());
        assert_eq!(product, array![[11.0]]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_cpu() {
        let device = ParallelDevice::new(2).unwrap();
        assert_eq!(device.threads(), 2);

        let a = Array2::from_shape_fn((7, 5), |(i, j)| (i * 5 + j) as f64 * 0.1);
        let b = Array2::from_shape_fn((5, 3), |(i, j)| 1.0 - (i + 2 * j) as f64 * 0.05);
        let expected = CpuDevice.matmul(a.view(), b.view());
        let actual = device.matmul(a.view(), b.view());
        for (x, y) in expected.iter().zip(actual.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }

        let mask = Array2::from_shape_fn((7, 5), |(i, j)| ((i + j) % 2) as f64);
        assert_eq!(
            CpuDevice.exp_masked(a.view(), mask.view()),
            device.exp_masked(a.view(), mask.view())
        );
    }
}
