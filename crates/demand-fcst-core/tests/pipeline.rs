//! End-to-end tests: load, forecast, flag, clean, export and tune.

use approx::assert_relative_eq;
use demand_fcst_core::{
    decomposable_factory, detect_anomalies, evaluate, export_forecast, fit_predict, future_rows,
    load_observations, read_export, remove_anomalies, tune, AnomalyFlag, CrossValidationConfig,
    DecomposableModel, EtsModel, FittedModel, ForecastError, ModelConfig, Observation,
    ParallelMode, ParamGrid, SeasonalityMode, TuneOptions, TuningOutcome,
};
use std::fmt::Write as _;
use std::fs;
use tempfile::TempDir;

/// Semicolon CSV with a seasonal pattern and one injected spike.
fn write_history(dir: &TempDir, years: i32, spike: Option<(i32, u32)>) -> std::path::PathBuf {
    let mut contents = String::from("year;month;quantity\n");
    for (i, year) in (2015..2015 + years).enumerate() {
        for month in 1..=12u32 {
            let t = i as f64 * 12.0 + month as f64;
            let season = (month as f64 * std::f64::consts::PI / 6.0).sin() * 40.0;
            let mut q = 400.0 + 1.5 * t + season;
            if spike == Some((year, month)) {
                q *= 4.0;
            }
            writeln!(contents, "{};{};{}", year, month, format!("{:.1}", q).replace('.', ","))
                .unwrap();
        }
    }
    let path = dir.path().join("data.csv");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_forecast_table_shape_and_export() {
    let dir = TempDir::new().unwrap();
    let input = write_history(&dir, 2, None);
    let observations = load_observations(&input).unwrap();
    assert_eq!(observations.len(), 24);

    let (rows, _) = fit_predict(&DecomposableModel::default(), &observations, 12).unwrap();
    assert_eq!(rows.len(), 36);
    assert!(rows[..24].iter().all(|r| r.actual.is_some()));
    assert!(rows[24..].iter().all(|r| r.actual.is_none()));
    assert!(rows
        .iter()
        .all(|r| r.yhat_lower <= r.yhat && r.yhat <= r.yhat_upper));

    let output = dir.path().join("exports").join("data_forecast.csv");
    assert_eq!(export_forecast(&output, &rows).unwrap(), 12);

    let exported = read_export(&output).unwrap();
    let future = future_rows(&rows);
    assert_eq!(exported.len(), future.len());
    for (e, r) in exported.iter().zip(&future) {
        assert_eq!((e.year, e.month), (r.year(), r.month()));
        assert_relative_eq!(e.quantity, r.yhat, epsilon = 1e-6);
    }
}

#[test]
fn test_spike_is_flagged_and_removed() {
    let dir = TempDir::new().unwrap();
    let input = write_history(&dir, 4, Some((2017, 6)));
    let observations = load_observations(&input).unwrap();

    let (rows, _) = fit_predict(&DecomposableModel::default(), &observations, 6).unwrap();
    let anomalies = detect_anomalies(&rows);

    let spike = anomalies
        .iter()
        .find(|a| a.date() == demand_fcst_core::month_start(2017, 6).unwrap())
        .unwrap();
    assert_eq!(spike.flag, AnomalyFlag::Above);
    assert!(spike.importance > 0.0);

    // flag rule holds on every row
    for a in &anomalies {
        match a.forecast.actual {
            None => assert_eq!(a.flag, AnomalyFlag::Normal),
            Some(q) if (q as f64) > a.forecast.yhat_upper => assert_eq!(a.flag, AnomalyFlag::Above),
            Some(q) if (q as f64) < a.forecast.yhat_lower => assert_eq!(a.flag, AnomalyFlag::Below),
            Some(_) => assert_eq!(a.flag, AnomalyFlag::Normal),
        }
    }

    let cleaned = remove_anomalies(&observations, &anomalies);
    assert!(cleaned.len() < observations.len());
    assert!(cleaned.iter().all(|o| o.date != spike.date()));
    assert_eq!(remove_anomalies(&cleaned, &anomalies), cleaned);
}

#[test]
fn test_evaluate_both_model_families() {
    let dir = TempDir::new().unwrap();
    let observations = load_observations(write_history(&dir, 5, None)).unwrap();
    let config = CrossValidationConfig::tuning();

    let additive = DecomposableModel::new(ModelConfig {
        seasonality_mode: SeasonalityMode::Additive,
        ..ModelConfig::default()
    })
    .unwrap();
    let ets = EtsModel::new("AAN", 1).unwrap();

    for forecaster in [
        &additive as &dyn demand_fcst_core::Forecaster,
        &ets as &dyn demand_fcst_core::Forecaster,
    ] {
        let (_, model) = fit_predict(forecaster, &observations, 1).unwrap();
        let metrics = evaluate(model.as_ref(), &config).unwrap();
        assert!(metrics.mape >= 0.0 && metrics.mape.is_finite());
        assert!(metrics.mdape >= 0.0);
        assert!((0.0..=2.0).contains(&metrics.smape));
    }
}

#[test]
fn test_parallel_and_sequential_folds_agree() {
    let dir = TempDir::new().unwrap();
    let observations = load_observations(write_history(&dir, 5, None)).unwrap();
    let (_, model) = fit_predict(&DecomposableModel::default(), &observations, 1).unwrap();

    let threads = evaluate(model.as_ref(), &CrossValidationConfig::tuning()).unwrap();
    let sequential = evaluate(
        model.as_ref(),
        &CrossValidationConfig::tuning().with_parallel(ParallelMode::Sequential),
    )
    .unwrap();
    assert_eq!(threads, sequential);
}

#[test]
fn test_tuning_on_loaded_history() {
    let dir = TempDir::new().unwrap();
    let observations: Vec<Observation> =
        load_observations(write_history(&dir, 4, None)).unwrap();

    let grid = ParamGrid::new()
        .with("seasonality_mode", ["additive", "multiplicative"])
        .with("changepoint_prior_scale", [0.01, 0.5]);
    let report = tune(
        decomposable_factory,
        &observations,
        &grid,
        &TuneOptions::default(),
    )
    .unwrap();

    assert_eq!(report.results.len(), 4);
    assert_eq!(report.failed_count(), 0);
    let best = report.best_result().unwrap();
    assert!(matches!(best.outcome, TuningOutcome::Evaluated { .. }));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 4);
    assert_eq!(json["cancelled"], false);
    assert_eq!(json["results"][0]["outcome"]["status"], "evaluated");
}

#[test]
fn test_tuning_with_alternative_forecaster() {
    let dir = TempDir::new().unwrap();
    let observations = load_observations(write_history(&dir, 4, None)).unwrap();
    let grid = ParamGrid::new().with("interval_width", [0.8, 0.95]);

    let report = tune(
        |config: &ModelConfig| -> demand_fcst_core::Result<Box<dyn demand_fcst_core::Forecaster>> {
            Ok(Box::new(
                EtsModel::new("AAN", 1)?.with_interval_width(config.interval_width)?,
            ))
        },
        &observations,
        &grid,
        &TuneOptions::default(),
    )
    .unwrap();
    assert_eq!(report.results.len(), 2);
    // interval width does not move the point forecast
    assert_eq!(report.results[0].score(), report.results[1].score());
    assert_eq!(report.best, Some(0));
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = load_observations(dir.path().join("data").join("data.csv")).unwrap_err();
    assert!(matches!(err, ForecastError::DataLoad { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_refit_history_is_prefix() {
    let dir = TempDir::new().unwrap();
    let observations = load_observations(write_history(&dir, 3, None)).unwrap();
    let (_, model) = fit_predict(&DecomposableModel::default(), &observations, 1).unwrap();
    let dates = model.make_future_dates(4, false).unwrap();
    assert_eq!(dates.len(), 4);
    assert_eq!(model.history(), observations.as_slice());
}
