//! Benchmarks for reweight_optimiser.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use reweight_core::types::{Area, GeographyMask, LocalDesign, NationalDesign};
use reweight_optimiser::objective::loss_and_gradient;
use reweight_optimiser::{evaluate_performance, CalibrationProblem, Calibrator, CpuDevice, NoopObserver};

/// Synthetic problem with `areas` areas, `households` households and
/// 20 local plus 10 national metrics.
fn generate_problem(areas: usize, households: usize) -> (CalibrationProblem, Array1<f64>) {
    let local_metrics = 20;
    let national_metrics = 10;

    let matrix = Array2::from_shape_fn((households, local_metrics), |(h, t)| {
        ((h * 7 + t * 13) % 5) as f64
    });
    let w0 = Array1::from_shape_fn(households, |h| 50.0 + (h % 11) as f64 * 10.0);
    let per_area = matrix.t().dot(&w0) / areas as f64;
    let targets = Array2::from_shape_fn((areas, local_metrics), |(a, t)| {
        per_area[t] * (0.8 + 0.4 * ((a * 3 + t) % 7) as f64 / 6.0)
    });
    let local = LocalDesign::new(
        matrix,
        targets,
        (0..local_metrics).map(|t| format!("metric_{}", t)).collect(),
        (0..areas)
            .map(|a| Area::new(format!("E14{:06}", a), format!("Area {}", a)))
            .collect(),
    )
    .expect("valid local design");

    let national_matrix = Array2::from_shape_fn((households, national_metrics), |(h, n)| {
        ((h + n) % 3) as f64
    });
    let national_targets = national_matrix.t().dot(&w0) * 1.05;
    let national = NationalDesign::new(
        national_matrix,
        national_targets,
        (0..national_metrics).map(|n| format!("national_{}", n)).collect(),
    )
    .expect("valid national design");

    let problem =
        CalibrationProblem::new(local, national, GeographyMask::all_ones(areas, households))
            .expect("consistent problem");
    (problem, w0)
}

fn benchmark_loss_and_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("loss_and_gradient");

    for (areas, households) in [(10, 500), (50, 2_000), (100, 5_000)] {
        let (problem, _) = generate_problem(areas, households);
        let weights = Array2::from_elem((areas, households), 1.0);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", areas, households)),
            &weights,
            |b, w| b.iter(|| loss_and_gradient(&CpuDevice, black_box(&problem), black_box(w))),
        );
    }

    group.finish();
}

fn benchmark_calibration_epochs(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibrate_32_epochs");
    group.sample_size(10);

    for (areas, households) in [(10, 500), (50, 2_000)] {
        let (problem, w0) = generate_problem(areas, households);
        let calibrator = Calibrator::new(CpuDevice).with_epochs(32).with_seed(0);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", areas, households)),
            &w0,
            |b, w0| {
                b.iter(|| {
                    calibrator.calibrate_from_survey_weights(
                        black_box(&problem),
                        black_box(w0),
                        &mut NoopObserver,
                    )
                })
            },
        );
    }

    group.finish();
}

#[cfg(feature = "parallel")]
fn benchmark_parallel_device(c: &mut Criterion) {
    use reweight_optimiser::ParallelDevice;

    let (problem, w0) = generate_problem(100, 5_000);
    let device = ParallelDevice::new(num_cpus::get()).expect("thread pool");
    let calibrator = Calibrator::new(device).with_epochs(8).with_seed(0);

    c.bench_function("calibrate_8_epochs_parallel_100x5000", |b| {
        b.iter(|| {
            calibrator.calibrate_from_survey_weights(black_box(&problem), &w0, &mut NoopObserver)
        })
    });
}

fn benchmark_performance_table(c: &mut Criterion) {
    let (problem, _) = generate_problem(100, 5_000);
    let weights = Array2::from_elem((100, 5_000), 0.5);

    c.bench_function("evaluate_performance_100x5000", |b| {
        b.iter(|| {
            evaluate_performance(
                black_box(&weights),
                problem.local(),
                problem.national(),
                problem.excluded(),
            )
        })
    });
}

#[cfg(feature = "parallel")]
criterion_group!(
    benches,
    benchmark_loss_and_gradient,
    benchmark_calibration_epochs,
    benchmark_parallel_device,
    benchmark_performance_table,
);

#[cfg(not(feature = "parallel"))]
criterion_group!(
    benches,
    benchmark_loss_and_gradient,
    benchmark_calibration_epochs,
    benchmark_performance_table,
);

criterion_main!(benches);
