//! Exhaustive hyperparameter search scored by cross-validated accuracy.
//!
//! Every combination of a [`ParamGrid`] is applied on top of a base
//! [`ModelConfig`], fitted on the full history and scored with rolling-origin
//! cross-validation. The composite score weights MAPE most heavily:
//!
//! ```text
//! score = 0.2 * mdape + 0.6 * mape + 0.2 * smape
//! ```
//!
//! Candidates that fail are recorded and skipped.

use crate::decomposable::DecomposableModel;
use crate::diagnostics::{cutoffs, evaluate, AccuracyMetrics, CrossValidationConfig};
use crate::error::{ForecastError, Result};
use crate::forecast::fit_predict;
use crate::model::{Configuration, Forecaster, ModelConfig, ParamValue};
use crate::series::{validate_monthly, Gaps, Observation};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MDAPE_WEIGHT: f64 = 0.2;
pub const MAPE_WEIGHT: f64 = 0.6;
pub const SMAPE_WEIGHT: f64 = 0.2;

/// Weighted accuracy score; lower is better.
pub fn composite_score(metrics: &AccuracyMetrics) -> f64 {
    MDAPE_WEIGHT * metrics.mdape + MAPE_WEIGHT * metrics.mape + SMAPE_WEIGHT * metrics.smape
}

/// Candidate values per hyperparameter, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamGrid {
    params: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; a repeated name replaces the earlier values in place.
    pub fn with<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = values,
            None => self.params.push((name, values)),
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of combinations in the cartesian product.
    pub fn candidate_count(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    /// Cartesian product of all values, last parameter varying fastest.
    pub fn combinations(&self) -> Result<Vec<Configuration>> {
        if self.params.is_empty() {
            return Err(ForecastError::EmptyGrid("no parameters".into()));
        }
        if let Some((name, _)) = self.params.iter().find(|(_, v)| v.is_empty()) {
            return Err(ForecastError::EmptyGrid(format!(
                "parameter '{}' has no values",
                name
            )));
        }

        let mut combos = vec![Configuration::new()];
        for (name, values) in &self.params {
            combos = combos
                .iter()
                .flat_map(|base| {
                    values
                        .iter()
                        .map(move |v| base.clone().with(name.clone(), v.clone()))
                })
                .collect();
        }
        Ok(combos)
    }
}

impl<'de> Deserialize<'de> for ParamGrid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct GridVisitor;

        impl<'de> Visitor<'de> for GridVisitor {
            type Value = ParamGrid;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of parameter names to value lists")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<ParamGrid, A::Error> {
                let mut grid = ParamGrid::new();
                while let Some((name, values)) = map.next_entry::<String, Vec<ParamValue>>()? {
                    grid = grid.with(name, values);
                }
                Ok(grid)
            }
        }

        deserializer.deserialize_map(GridVisitor)
    }
}

/// Result of evaluating one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TuningOutcome {
    Evaluated { metrics: AccuracyMetrics, score: f64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningResult {
    pub configuration: Configuration,
    pub outcome: TuningOutcome,
}

impl TuningResult {
    pub fn score(&self) -> Option<f64> {
        match self.outcome {
            TuningOutcome::Evaluated { score, .. } => Some(score),
            TuningOutcome::Failed { .. } => None,
        }
    }
}

/// All candidates tried, in grid order, and the winner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningReport {
    pub results: Vec<TuningResult>,
    /// Index into `results` of the lowest score.
    pub best: Option<usize>,
    /// Set when the search stopped before exhausting the grid.
    pub cancelled: bool,
}

impl TuningReport {
    pub fn best_result(&self) -> Option<&TuningResult> {
        self.best.and_then(|i| self.results.get(i))
    }

    pub fn best_configuration(&self) -> Option<&Configuration> {
        self.best_result().map(|r| &r.configuration)
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_result().and_then(TuningResult::score)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.score().is_none()).count()
    }
}

/// Progress callbacks for a tuning run.
pub trait TuningObserver: Send + Sync {
    fn candidate_started(&self, _index: usize, _total: usize, _configuration: &Configuration) {}

    fn candidate_finished(&self, _index: usize, _total: usize, _result: &TuningResult) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl TuningObserver for LoggingObserver {
    fn candidate_started(&self, index: usize, total: usize, configuration: &Configuration) {
        tracing::debug!(candidate = index + 1, total, %configuration, "evaluating candidate");
    }

    fn candidate_finished(&self, index: usize, total: usize, result: &TuningResult) {
        match &result.outcome {
            TuningOutcome::Evaluated { metrics, score } => tracing::info!(
                candidate = index + 1,
                total,
                configuration = %result.configuration,
                mdape = metrics.mdape,
                mape = metrics.mape,
                smape = metrics.smape,
                score,
                "candidate scored"
            ),
            TuningOutcome::Failed { reason } => tracing::warn!(
                candidate = index + 1,
                total,
                %reason,
                "candidate failed"
            ),
        }
    }
}

/// Shared flag for stopping a search between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct TuneOptions {
    /// Configuration each candidate is applied on top of.
    pub base: ModelConfig,
    pub cross_validation: CrossValidationConfig,
    pub cancel: CancellationToken,
    pub observer: Arc<dyn TuningObserver>,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            base: ModelConfig::default(),
            cross_validation: CrossValidationConfig::tuning(),
            cancel: CancellationToken::new(),
            observer: Arc::new(LoggingObserver),
        }
    }
}

/// Builds the default decomposable forecaster for a candidate.
pub fn decomposable_factory(config: &ModelConfig) -> Result<Box<dyn Forecaster>> {
    Ok(Box::new(DecomposableModel::new(config.clone())?))
}

/// Grid search over `grid`, building each candidate with `factory`.
///
/// Returns the report of every candidate tried. Fails with
/// [`ForecastError::NoViableCandidate`] when the grid was exhausted and no
/// candidate could be scored.
pub fn tune<F>(
    factory: F,
    observations: &[Observation],
    grid: &ParamGrid,
    options: &TuneOptions,
) -> Result<TuningReport>
where
    F: Fn(&ModelConfig) -> Result<Box<dyn Forecaster>>,
{
    let candidates = grid.combinations()?;
    validate_monthly(observations, Gaps::Allow)?;
    cutoffs(observations, &options.cross_validation)?;

    let total = candidates.len();
    tracing::info!(candidates = total, "starting grid search");

    let mut results = Vec::with_capacity(total);
    let mut best: Option<(usize, f64)> = None;
    let mut cancelled = false;

    for (index, configuration) in candidates.into_iter().enumerate() {
        if options.cancel.is_cancelled() {
            tracing::info!(evaluated = index, total, "grid search cancelled");
            cancelled = true;
            break;
        }
        options
            .observer
            .candidate_started(index, total, &configuration);

        let outcome = match score_candidate(&factory, observations, &configuration, options) {
            Ok(metrics) => TuningOutcome::Evaluated {
                metrics,
                score: composite_score(&metrics),
            },
            Err(e) => TuningOutcome::Failed {
                reason: ForecastError::CandidateEvaluation {
                    configuration: configuration.to_string(),
                    reason: e.to_string(),
                }
                .to_string(),
            },
        };
        let result = TuningResult {
            configuration,
            outcome,
        };

        if let Some(score) = result.score() {
            if best.map_or(true, |(_, b)| score < b) {
                best = Some((index, score));
            }
        }
        options.observer.candidate_finished(index, total, &result);
        results.push(result);
    }

    let report = TuningReport {
        best: best.map(|(i, _)| i),
        results,
        cancelled,
    };
    if report.best.is_none() && !cancelled {
        return Err(ForecastError::NoViableCandidate {
            failed: report.failed_count(),
        });
    }
    if let Some(best) = report.best_result() {
        tracing::info!(configuration = %best.configuration, score = report.best_score(), "best candidate");
    }
    Ok(report)
}

fn score_candidate<F>(
    factory: &F,
    observations: &[Observation],
    configuration: &Configuration,
    options: &TuneOptions,
) -> Result<AccuracyMetrics>
where
    F: Fn(&ModelConfig) -> Result<Box<dyn Forecaster>>,
{
    let config = options.base.apply(configuration)?;
    let forecaster = factory(&config)?;
    let (_, model) = fit_predict(forecaster.as_ref(), observations, 1)?;
    let metrics = evaluate(model.as_ref(), &options.cross_validation)?;
    if ![metrics.mdape, metrics.mape, metrics.smape]
        .iter()
        .all(|m| m.is_finite())
    {
        return Err(ForecastError::ComputationError(
            "non-finite accuracy metric".into(),
        ));
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ParallelMode;
    use crate::series::month_start;
    use approx::assert_relative_eq;
    use chrono::Months;
    use std::sync::Mutex;

    fn history(n: usize) -> Vec<Observation> {
        let start = month_start(2016, 1).unwrap();
        (0..n)
            .map(|i| {
                let season = ((i % 12) as f64 * std::f64::consts::PI / 6.0).sin() * 20.0;
                Observation::new(
                    start + Months::new(i as u32),
                    (200.0 + 2.0 * i as f64 + season).round() as i64,
                )
            })
            .collect()
    }

    fn options() -> TuneOptions {
        TuneOptions {
            cross_validation: CrossValidationConfig::tuning().with_parallel(ParallelMode::Sequential),
            ..TuneOptions::default()
        }
    }

    #[test]
    fn test_composite_score_weights() {
        let metrics = AccuracyMetrics {
            mdape: 0.1,
            mape: 0.2,
            smape: 0.3,
        };
        assert_relative_eq!(composite_score(&metrics), 0.02 + 0.12 + 0.06, epsilon = 1e-12);
        assert_relative_eq!(MDAPE_WEIGHT + MAPE_WEIGHT + SMAPE_WEIGHT, 1.0);
    }

    #[test]
    fn test_combinations_last_fastest() {
        let grid = ParamGrid::new()
            .with("seasonality_mode", ["additive", "multiplicative"])
            .with("changepoint_prior_scale", [0.01, 0.1, 1.0]);
        assert_eq!(grid.candidate_count(), 6);

        let combos = grid.combinations().unwrap();
        assert_eq!(combos.len(), 6);
        assert_eq!(
            combos[0].to_string(),
            "{seasonality_mode: additive, changepoint_prior_scale: 0.01}"
        );
        assert_eq!(
            combos[1].get("changepoint_prior_scale"),
            Some(&ParamValue::Float(0.1))
        );
        assert_eq!(
            combos[3].get("seasonality_mode"),
            Some(&ParamValue::from("multiplicative"))
        );
    }

    #[test]
    fn test_empty_grid() {
        assert!(matches!(
            ParamGrid::new().combinations(),
            Err(ForecastError::EmptyGrid(_))
        ));
        let grid = ParamGrid::new()
            .with("yearly_seasonality", [true])
            .with("changepoint_range", Vec::<f64>::new());
        assert_eq!(grid.candidate_count(), 0);
        assert!(matches!(
            tune(decomposable_factory, &history(48), &grid, &options()),
            Err(ForecastError::EmptyGrid(_))
        ));
    }

    #[test]
    fn test_single_candidate_is_best() {
        let grid = ParamGrid::new().with("changepoint_prior_scale", [0.05]);
        let report = tune(decomposable_factory, &history(48), &grid, &options()).unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.best, Some(0));
        assert!(!report.cancelled);
        assert_eq!(
            report.best_configuration().unwrap().get("changepoint_prior_scale"),
            Some(&ParamValue::Float(0.05))
        );
    }

    #[test]
    fn test_scores_follow_formula_and_best_is_minimum() {
        let grid = ParamGrid::new()
            .with("seasonality_mode", ["additive", "multiplicative"])
            .with("changepoint_prior_scale", [0.01, 0.5]);
        let report = tune(decomposable_factory, &history(48), &grid, &options()).unwrap();

        assert_eq!(report.results.len(), 4);
        for result in &report.results {
            if let TuningOutcome::Evaluated { metrics, score } = &result.outcome {
                assert_relative_eq!(*score, composite_score(metrics));
            }
        }
        let best = report.best_score().unwrap();
        assert!(report
            .results
            .iter()
            .filter_map(TuningResult::score)
            .all(|s| best <= s));
    }

    #[test]
    fn test_ties_keep_first_seen() {
        // identical candidates score identically
        let grid = ParamGrid::new().with("yearly_seasonality", [true, true]);
        let report = tune(decomposable_factory, &history(48), &grid, &options()).unwrap();
        assert_eq!(report.best, Some(0));
    }

    #[test]
    fn test_failed_candidate_is_recorded() {
        let grid = ParamGrid::new().with("changepoint_range", [1.5, 0.8]);
        let report = tune(decomposable_factory, &history(48), &grid, &options()).unwrap();

        assert_eq!(report.failed_count(), 1);
        match &report.results[0].outcome {
            TuningOutcome::Failed { reason } => assert!(reason.contains("changepoint_range")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.best, Some(1));
    }

    #[test]
    fn test_all_candidates_failing() {
        let grid = ParamGrid::new().with("interval_width", [2.0, -1.0]);
        let err = tune(decomposable_factory, &history(48), &grid, &options()).unwrap_err();
        assert!(matches!(err, ForecastError::NoViableCandidate { failed: 2 }));
    }

    #[test]
    fn test_insufficient_history() {
        let grid = ParamGrid::new().with("yearly_seasonality", [true]);
        let err = tune(decomposable_factory, &history(20), &grid, &options()).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { .. }));
    }

    struct CancelAfterFirst {
        cancel: CancellationToken,
        seen: Mutex<Vec<usize>>,
    }

    impl TuningObserver for CancelAfterFirst {
        fn candidate_finished(&self, index: usize, _total: usize, _result: &TuningResult) {
            self.seen.lock().unwrap().push(index);
            self.cancel.cancel();
        }
    }

    #[test]
    fn test_cancellation_between_candidates() {
        let cancel = CancellationToken::new();
        let observer = Arc::new(CancelAfterFirst {
            cancel: cancel.clone(),
            seen: Mutex::new(vec![]),
        });
        let options = TuneOptions {
            cancel,
            observer: observer.clone(),
            ..options()
        };
        let grid = ParamGrid::new().with("changepoint_prior_scale", [0.01, 0.05, 0.5]);
        let report = tune(decomposable_factory, &history(48), &grid, &options).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.results.len(), 1);
        assert_eq!(*observer.seen.lock().unwrap(), vec![0]);
        assert_eq!(report.best, Some(0));
    }

    #[test]
    fn test_grid_deserialize_keeps_order() {
        let grid: ParamGrid = serde_json::from_str(
            r#"{"seasonality_mode": ["additive"], "changepoint_prior_scale": [0.01, 0.1]}"#,
        )
        .unwrap();
        let names: Vec<&str> = grid.names().collect();
        assert_eq!(names, vec!["seasonality_mode", "changepoint_prior_scale"]);
        assert_eq!(grid.candidate_count(), 2);
    }
}
