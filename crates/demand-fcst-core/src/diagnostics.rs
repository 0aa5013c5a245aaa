//! Rolling-origin cross-validation and accuracy summaries.

use crate::error::{ForecastError, Result};
use crate::metrics::{coverage, mae, mape, mdape, rmse, smape};
use crate::model::FittedModel;
use crate::series::{history_span_days, months_between, Observation};
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How cross-validation folds are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelMode {
    Sequential,
    #[default]
    Threads,
}

/// Longest window accepted for any of the cross-validation spans.
pub const MAX_WINDOW_DAYS: i64 = 100 * 366;

/// Window sizes for rolling-origin cross-validation, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    /// Minimum training span before the first cutoff.
    pub initial_days: i64,
    /// Span forecast after each cutoff.
    pub horizon_days: i64,
    /// Distance between consecutive cutoffs.
    pub period_days: i64,
    #[serde(default)]
    pub parallel: ParallelMode,
}

impl CrossValidationConfig {
    /// Fixed windows used when scoring tuning candidates.
    pub const fn tuning() -> Self {
        Self {
            initial_days: 731,
            horizon_days: 365,
            period_days: 365,
            parallel: ParallelMode::Threads,
        }
    }

    pub fn with_parallel(mut self, parallel: ParallelMode) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            ("initial_days", self.initial_days, self.initial_days >= 0),
            ("horizon_days", self.horizon_days, self.horizon_days > 0),
            ("period_days", self.period_days, self.period_days > 0),
        ];
        if let Some((param, value, _)) = checks.iter().find(|(_, _, ok)| !ok) {
            return Err(ForecastError::InvalidParameter {
                param: param.to_string(),
                value: value.to_string(),
                reason: "window length out of range".into(),
            });
        }
        match checks.iter().find(|(_, value, _)| *value > MAX_WINDOW_DAYS) {
            Some((param, value, _)) => Err(ForecastError::InvalidParameter {
                param: param.to_string(),
                value: value.to_string(),
                reason: format!("window longer than {} days", MAX_WINDOW_DAYS),
            }),
            None => Ok(()),
        }
    }
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self::tuning()
    }
}

/// One out-of-sample prediction made during cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossValidationRow {
    pub date: NaiveDate,
    pub cutoff: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub actual: i64,
}

/// Accuracy metrics at one forecast horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonMetrics {
    /// Months (or days when not aggregated monthly) after the cutoff.
    pub horizon: i64,
    pub count: usize,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub mdape: f64,
    pub smape: f64,
    pub coverage: f64,
}

/// Averaged accuracy over all horizons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracyMetrics {
    pub mdape: f64,
    pub mape: f64,
    pub smape: f64,
}

impl AccuracyMetrics {
    /// Unweighted mean over horizons. NaN for an empty slice.
    pub fn mean_over(per_horizon: &[HorizonMetrics]) -> Self {
        let n = per_horizon.len() as f64;
        Self {
            mdape: per_horizon.iter().map(|m| m.mdape).sum::<f64>() / n,
            mape: per_horizon.iter().map(|m| m.mape).sum::<f64>() / n,
            smape: per_horizon.iter().map(|m| m.smape).sum::<f64>() / n,
        }
    }
}

/// Cutoff dates, earliest first.
pub fn cutoffs(history: &[Observation], config: &CrossValidationConfig) -> Result<Vec<NaiveDate>> {
    config.validate()?;
    let needed = config.initial_days + config.horizon_days;
    let available = history_span_days(history);
    if available < needed {
        return Err(ForecastError::InsufficientHistory {
            needed_days: needed,
            available_days: available,
        });
    }

    let start = history[0].date;
    let end = history[history.len() - 1].date;
    let initial = Duration::days(config.initial_days);
    let period = Duration::days(config.period_days);

    let mut result = Vec::new();
    let mut cutoff = end - Duration::days(config.horizon_days);
    while cutoff - start >= initial {
        result.push(cutoff);
        cutoff -= period;
    }
    result.reverse();
    Ok(result)
}

/// Refit the model's forecaster on the history up to each cutoff and predict
/// the observed dates in the following horizon.
///
/// Rows are ordered by cutoff, then date, whatever the parallel mode.
pub fn cross_validation(
    model: &dyn FittedModel,
    config: &CrossValidationConfig,
) -> Result<Vec<CrossValidationRow>> {
    let history = model.history();
    let cutoffs = cutoffs(history, config)?;
    tracing::debug!(folds = cutoffs.len(), "running cross-validation");

    let folds: Vec<Result<Vec<CrossValidationRow>>> = match config.parallel {
        ParallelMode::Threads => cutoffs
            .par_iter()
            .map(|&cutoff| run_fold(model, cutoff, config.horizon_days))
            .collect(),
        ParallelMode::Sequential => cutoffs
            .iter()
            .map(|&cutoff| run_fold(model, cutoff, config.horizon_days))
            .collect(),
    };

    let mut rows = Vec::new();
    for fold in folds {
        rows.extend(fold?);
    }
    if rows.is_empty() {
        return Err(ForecastError::InvalidInput(
            "cross-validation produced no out-of-sample points".into(),
        ));
    }
    Ok(rows)
}

fn run_fold(
    model: &dyn FittedModel,
    cutoff: NaiveDate,
    horizon_days: i64,
) -> Result<Vec<CrossValidationRow>> {
    let history = model.history();
    let horizon_end = cutoff + Duration::days(horizon_days);

    let train: Vec<Observation> = history
        .iter()
        .filter(|o| o.date <= cutoff)
        .copied()
        .collect();
    let test: Vec<&Observation> = history
        .iter()
        .filter(|o| o.date > cutoff && o.date <= horizon_end)
        .collect();
    if test.is_empty() {
        return Ok(vec![]);
    }

    let fold_model = model.forecaster().fit(&train)?;
    let dates: Vec<NaiveDate> = test.iter().map(|o| o.date).collect();
    let predictions = fold_model.predict(&dates)?;

    tracing::debug!(%cutoff, train = train.len(), test = test.len(), "fold complete");

    Ok(predictions
        .into_iter()
        .zip(test)
        .map(|(p, o)| CrossValidationRow {
            date: p.date,
            cutoff,
            yhat: p.yhat,
            yhat_lower: p.yhat_lower,
            yhat_upper: p.yhat_upper,
            actual: o.quantity,
        })
        .collect())
}

/// Accuracy per forecast horizon.
///
/// With `monthly` the horizon is the number of calendar months between cutoff
/// and date, otherwise the number of days.
pub fn performance_metrics(
    rows: &[CrossValidationRow],
    monthly: bool,
) -> Result<Vec<HorizonMetrics>> {
    let mut groups: BTreeMap<i64, Vec<&CrossValidationRow>> = BTreeMap::new();
    for row in rows {
        let horizon = if monthly {
            months_between(row.cutoff, row.date) as i64
        } else {
            (row.date - row.cutoff).num_days()
        };
        groups.entry(horizon).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(horizon, group)| {
            let actual: Vec<f64> = group.iter().map(|r| r.actual as f64).collect();
            let yhat: Vec<f64> = group.iter().map(|r| r.yhat).collect();
            let lower: Vec<f64> = group.iter().map(|r| r.yhat_lower).collect();
            let upper: Vec<f64> = group.iter().map(|r| r.yhat_upper).collect();
            Ok(HorizonMetrics {
                horizon,
                count: group.len(),
                mae: mae(&actual, &yhat)?,
                rmse: rmse(&actual, &yhat)?,
                mape: mape(&actual, &yhat)?,
                mdape: mdape(&actual, &yhat)?,
                smape: smape(&actual, &yhat)?,
                coverage: coverage(&actual, &lower, &upper)?,
            })
        })
        .collect()
}

/// Cross-validate a fitted model and average mdape, mape and smape over the
/// monthly horizons.
pub fn evaluate(model: &dyn FittedModel, config: &CrossValidationConfig) -> Result<AccuracyMetrics> {
    let rows = cross_validation(model, config)?;
    let metrics = AccuracyMetrics::mean_over(&performance_metrics(&rows, true)?);
    tracing::debug!(
        mdape = metrics.mdape,
        mape = metrics.mape,
        smape = metrics.smape,
        "evaluation complete"
    );
    Ok(metrics)
}
