//! Core library for monthly demand forecasting.
//!
//! This crate fits forecasting models to monthly quantity histories, flags
//! observations outside the model's uncertainty band, scores models with
//! rolling-origin cross-validation and searches hyperparameter grids.

pub mod anomaly;
pub mod decomposable;
pub mod diagnostics;
pub mod error;
pub mod ets;
pub mod forecast;
pub mod io;
pub mod metrics;
pub mod model;
pub mod series;
pub mod tuning;

// Re-exports for convenience
pub use anomaly::{
    anomaly_summary, detect_anomalies, remove_anomalies, AnomalyFlag, AnomalyRow, AnomalySummary,
};
pub use decomposable::DecomposableModel;
pub use diagnostics::{
    cross_validation, cutoffs, evaluate, performance_metrics, AccuracyMetrics,
    CrossValidationConfig, CrossValidationRow, HorizonMetrics, ParallelMode,
};
pub use error::{ForecastError, Result};
pub use ets::EtsModel;
pub use forecast::{fit_predict, future_rows, ForecastRow};
pub use io::{export_forecast, load_observations, read_export, ExportRow};
pub use metrics::{coverage, mae, mape, mdape, rmse, smape};
pub use model::{
    Configuration, FittedModel, Forecaster, ModelConfig, ParamValue, Prediction, SeasonalityMode,
};
pub use series::{month_start, Observation};
pub use tuning::{
    composite_score, decomposable_factory, tune, CancellationToken, LoggingObserver, ParamGrid,
    TuneOptions, TuningObserver, TuningOutcome, TuningReport, TuningResult,
};
