//! Performance benchmark for fitting, cross-validation and grid search
//!
//! Run with: cargo bench --bench tuning_perf

use chrono::Months;
use demand_fcst_core::{
    decomposable_factory, evaluate, fit_predict, month_start, tune, CrossValidationConfig,
    DecomposableModel, ModelConfig, Observation, ParallelMode, ParamGrid, SeasonalityMode,
    TuneOptions,
};
use std::time::{Duration, Instant};

fn generate_monthly_history(n: usize) -> Vec<Observation> {
    let start = month_start(2000, 1).expect("valid start month");
    (0..n)
        .map(|i| {
            let trend = 500.0 + 3.0 * i as f64;
            let seasonal = 60.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin();
            let noise = (i % 5) as f64 * 4.0;
            Observation::new(
                start + Months::new(i as u32),
                (trend + seasonal + noise).round() as i64,
            )
        })
        .collect()
}

fn benchmark_fn<F, R>(name: &str, iterations: usize, mut f: F) -> Duration
where
    F: FnMut() -> R,
{
    // Warmup
    let _ = f();

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = std::hint::black_box(f());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "{}: total={:?}, per_iter={:?}, iters={}",
        name, elapsed, per_iter, iterations
    );
    elapsed
}

fn main() {
    println!("=== Demand Forecast Performance Benchmark ===\n");

    let history_lengths = [36, 60, 120, 240];

    println!("--- 1. Fit + Predict ---\n");

    for &n in &history_lengths {
        let history = generate_monthly_history(n);
        for mode in [SeasonalityMode::Additive, SeasonalityMode::Multiplicative] {
            let model = DecomposableModel::new(ModelConfig {
                seasonality_mode: mode,
                ..ModelConfig::default()
            })
            .expect("valid config");
            benchmark_fn(
                &format!("fit_predict(n={}, {}, horizon=60)", n, mode.name()),
                20,
                || fit_predict(&model, &history, 60),
            );
        }
    }

    println!("\n--- 2. Cross-Validation ---\n");

    for &n in &history_lengths {
        let history = generate_monthly_history(n);
        let (_, fitted) = fit_predict(&DecomposableModel::default(), &history, 1)
            .expect("benchmark history fits");
        for parallel in [ParallelMode::Sequential, ParallelMode::Threads] {
            let config = CrossValidationConfig::tuning().with_parallel(parallel);
            benchmark_fn(&format!("evaluate(n={}, {:?})", n, parallel), 5, || {
                evaluate(fitted.as_ref(), &config)
            });
        }
    }

    println!("\n--- 3. Grid Search ---\n");

    let history = generate_monthly_history(120);
    let grid = ParamGrid::new()
        .with("seasonality_mode", ["additive", "multiplicative"])
        .with("changepoint_prior_scale", [0.01, 0.05, 0.1, 0.5])
        .with("seasonality_prior_scale", [1.0, 10.0]);
    println!("Grid of {} candidates on n={}:", grid.candidate_count(), history.len());

    benchmark_fn("  tune", 1, || {
        tune(decomposable_factory, &history, &grid, &TuneOptions::default())
    });

    println!("\n=== Benchmark Complete ===");
}
