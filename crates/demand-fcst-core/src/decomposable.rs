//! Decomposable trend + seasonality model.
//!
//! The series is modelled as a piecewise-linear trend with potential
//! changepoints spread over the first `changepoint_range` of the history,
//! plus Fourier seasonalities that either add to the trend or scale it.
//! Changepoint and seasonal coefficients are shrunk towards zero with a
//! strength inversely proportional to their prior scales, which is solved as
//! ordinary least squares on a penalty-augmented design matrix.
//!
//! Uncertainty bands use the in-sample residual spread, widened beyond the
//! end of the history, at the configured `interval_width`.

use crate::error::{ForecastError, Result};
use crate::model::{FittedModel, Forecaster, ModelConfig, Prediction, SeasonalityMode};
use crate::series::{validate_monthly, Gaps, Observation};
use anofox_regression::prelude::*;
use chrono::NaiveDate;
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

/// Residual scale assumed when turning prior scales into penalty weights.
const PRIOR_NOISE: f64 = 0.05;
/// Prior scale of the base growth rate.
const GROWTH_PRIOR_SCALE: f64 = 5.0;
/// Alternating trend / seasonality refits for multiplicative seasonality.
const BACKFIT_ROUNDS: usize = 3;
/// Smallest trend (or seasonal factor) magnitude used as a divisor.
const MIN_DIVISOR: f64 = 1e-6;
/// Mean spacing of month-start observations.
const MONTH_DAYS: f64 = 365.25 / 12.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Seasonality {
    period_days: f64,
    order: usize,
}

impl Seasonality {
    const YEARLY: Seasonality = Seasonality {
        period_days: 365.25,
        order: 10,
    };
    const WEEKLY: Seasonality = Seasonality {
        period_days: 7.0,
        order: 3,
    };
    const DAILY: Seasonality = Seasonality {
        period_days: 1.0,
        order: 4,
    };

    /// Drop Fourier terms at or above the monthly sampling Nyquist frequency.
    /// They alias onto lower terms and cannot be identified from monthly data.
    fn resolvable(self) -> Option<Seasonality> {
        let max_order = ((self.period_days / MONTH_DAYS) / 2.0).ceil() as usize - 1;
        let order = self.order.min(max_order);
        (order > 0).then_some(Seasonality { order, ..self })
    }
}

/// Piecewise-linear trend with Fourier seasonality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecomposableModel {
    config: ModelConfig,
}

impl DecomposableModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn seasonalities(&self) -> Vec<Seasonality> {
        [
            (self.config.yearly_seasonality, Seasonality::YEARLY),
            (self.config.weekly_seasonality, Seasonality::WEEKLY),
            (self.config.daily_seasonality, Seasonality::DAILY),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .filter_map(|(_, s)| s.resolvable())
        .collect()
    }
}

impl Forecaster for DecomposableModel {
    fn name(&self) -> String {
        format!(
            "Decomposable({}, changepoint_prior_scale={}, seasonality_prior_scale={}, changepoint_range={})",
            self.config.seasonality_mode.name(),
            self.config.changepoint_prior_scale,
            self.config.seasonality_prior_scale,
            self.config.changepoint_range
        )
    }

    fn fit(&self, history: &[Observation]) -> Result<Box<dyn FittedModel>> {
        Ok(Box::new(DecomposableFit::fit(self.clone(), history)?))
    }
}

#[derive(Debug, Clone)]
struct DecomposableFit {
    model: DecomposableModel,
    history: Vec<Observation>,
    start: NaiveDate,
    t_scale: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    /// `[offset, growth, delta_1 .. delta_k]` on the scaled series.
    trend_coef: Vec<f64>,
    season_coef: Vec<f64>,
    sigma: f64,
    z: f64,
}

impl DecomposableFit {
    fn fit(model: DecomposableModel, history: &[Observation]) -> Result<Self> {
        validate_monthly(history, Gaps::Allow)?;
        let config = model.config.clone();
        config.validate()?;

        let n = history.len();
        let start = history[0].date;
        let days: Vec<f64> = history
            .iter()
            .map(|o| (o.date - start).num_days() as f64)
            .collect();
        let t_scale = days[n - 1];
        if t_scale <= 0.0 {
            return Err(ForecastError::Fit("history spans zero days".into()));
        }
        let t: Vec<f64> = days.iter().map(|d| d / t_scale).collect();

        let y: Vec<f64> = history.iter().map(|o| o.quantity as f64).collect();
        let y_max = y.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_max > 0.0 { y_max } else { 1.0 };
        let ys: Vec<f64> = y.iter().map(|v| v / y_scale).collect();

        let changepoints = changepoint_times(&t, config.n_changepoints, config.changepoint_range);
        let seasonalities = model.seasonalities();

        let trend_cols = trend_columns(&t, &changepoints);
        let season_cols = seasonal_columns(&days, &seasonalities);

        let mut trend_pen = vec![0.0, PRIOR_NOISE / GROWTH_PRIOR_SCALE];
        trend_pen.extend(std::iter::repeat(PRIOR_NOISE / config.changepoint_prior_scale).take(changepoints.len()));
        let season_pen = vec![PRIOR_NOISE / config.seasonality_prior_scale; season_cols.len()];

        let (trend_coef, season_coef) = match config.seasonality_mode {
            SeasonalityMode::Additive => {
                let mut cols = trend_cols.clone();
                cols.extend(season_cols.iter().cloned());
                let mut pen = trend_pen.clone();
                pen.extend(season_pen.iter().cloned());
                let coef = penalized_least_squares(&cols, &ys, &pen)?;
                let (tc, sc) = coef.split_at(trend_cols.len());
                (tc.to_vec(), sc.to_vec())
            }
            SeasonalityMode::Multiplicative => backfit_multiplicative(
                &trend_cols,
                &trend_pen,
                &season_cols,
                &season_pen,
                &ys,
            )?,
        };

        let mut fit = Self {
            model,
            history: history.to_vec(),
            start,
            t_scale,
            y_scale,
            changepoints,
            seasonalities,
            trend_coef,
            season_coef,
            sigma: 0.0,
            z: standard_normal_quantile(0.5 + config.interval_width / 2.0)?,
        };

        let sse: f64 = history
            .iter()
            .map(|o| {
                let (_, yhat) = fit.components(o.date);
                (o.quantity as f64 - yhat).powi(2)
            })
            .sum();
        let sigma = (sse / n as f64).sqrt();
        if !sigma.is_finite() {
            return Err(ForecastError::ComputationError(
                "non-finite residual spread".into(),
            ));
        }
        fit.sigma = sigma;

        tracing::debug!(
            observations = n,
            changepoints = fit.changepoints.len(),
            sigma,
            "fitted decomposable model"
        );
        Ok(fit)
    }

    fn scaled_time(&self, date: NaiveDate) -> (f64, f64) {
        let d = (date - self.start).num_days() as f64;
        (d, d / self.t_scale)
    }

    /// Trend and point estimate in original units.
    fn components(&self, date: NaiveDate) -> (f64, f64) {
        let (d, t) = self.scaled_time(date);

        let mut trend = self.trend_coef[0] + self.trend_coef[1] * t;
        for (cp, delta) in self.changepoints.iter().zip(&self.trend_coef[2..]) {
            trend += delta * (t - cp).max(0.0);
        }

        let features = seasonal_features(d, &self.seasonalities);
        let seasonal: f64 = features
            .iter()
            .zip(&self.season_coef)
            .map(|(x, c)| x * c)
            .sum();

        let yhat = match self.model.config.seasonality_mode {
            SeasonalityMode::Additive => trend + seasonal,
            SeasonalityMode::Multiplicative => trend * (1.0 + seasonal),
        };
        (trend * self.y_scale, yhat * self.y_scale)
    }
}

impl FittedModel for DecomposableFit {
    fn forecaster(&self) -> &dyn Forecaster {
        &self.model
    }

    fn history(&self) -> &[Observation] {
        &self.history
    }

    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>> {
        Ok(dates
            .iter()
            .map(|&date| {
                let (trend, yhat) = self.components(date);
                let (_, t) = self.scaled_time(date);
                let spread = self.z * self.sigma * (1.0 + (t - 1.0).max(0.0)).sqrt();
                Prediction {
                    date,
                    trend,
                    yhat,
                    yhat_lower: yhat - spread,
                    yhat_upper: yhat + spread,
                }
            })
            .collect())
    }
}

/// Changepoint locations (scaled time) spread over the eligible history.
fn changepoint_times(t: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    let hist_size = (t.len() as f64 * range).floor() as usize;
    let n_cp = n_changepoints.min(hist_size.saturating_sub(1));
    if n_cp == 0 {
        return vec![];
    }
    let last = (hist_size - 1) as f64;
    (1..=n_cp)
        .map(|i| t[(i as f64 * last / n_cp as f64).round() as usize])
        .collect()
}

fn trend_columns(t: &[f64], changepoints: &[f64]) -> Vec<Vec<f64>> {
    let mut cols = vec![vec![1.0; t.len()], t.to_vec()];
    for cp in changepoints {
        cols.push(t.iter().map(|ti| (ti - cp).max(0.0)).collect());
    }
    cols
}

fn seasonal_features(day: f64, seasonalities: &[Seasonality]) -> Vec<f64> {
    let mut out = Vec::new();
    for s in seasonalities {
        for k in 1..=s.order {
            let angle = 2.0 * PI * k as f64 * day / s.period_days;
            out.push(angle.sin());
            out.push(angle.cos());
        }
    }
    out
}

fn seasonal_columns(days: &[f64], seasonalities: &[Seasonality]) -> Vec<Vec<f64>> {
    let rows: Vec<Vec<f64>> = days
        .iter()
        .map(|&d| seasonal_features(d, seasonalities))
        .collect();
    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    (0..k)
        .map(|j| rows.iter().map(|r| r[j]).collect())
        .collect()
}

fn evaluate_columns(cols: &[Vec<f64>], coef: &[f64], n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| cols.iter().zip(coef).map(|(c, b)| c[i] * b).sum())
        .collect()
}

/// Select the rows in `keep` from every column.
fn subset_rows(cols: &[Vec<f64>], keep: &[usize]) -> Vec<Vec<f64>> {
    cols.iter()
        .map(|c| keep.iter().map(|&i| c[i]).collect())
        .collect()
}

/// Alternate between fitting the trend on the deseasonalised series and the
/// seasonal factors on the series relative to the trend.
fn backfit_multiplicative(
    trend_cols: &[Vec<f64>],
    trend_pen: &[f64],
    season_cols: &[Vec<f64>],
    season_pen: &[f64],
    ys: &[f64],
) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = ys.len();
    let mut trend_coef = penalized_least_squares(trend_cols, ys, trend_pen)?;
    let mut season_coef = vec![0.0; season_cols.len()];
    if season_cols.is_empty() {
        return Ok((trend_coef, season_coef));
    }

    for _ in 0..BACKFIT_ROUNDS {
        let trend = evaluate_columns(trend_cols, &trend_coef, n);
        let keep: Vec<usize> = (0..n).filter(|&i| trend[i].abs() > MIN_DIVISOR).collect();
        if keep.is_empty() {
            return Err(ForecastError::Fit(
                "trend is zero everywhere, multiplicative seasonality is undefined".into(),
            ));
        }
        let ratio: Vec<f64> = keep.iter().map(|&i| ys[i] / trend[i] - 1.0).collect();
        season_coef = penalized_least_squares(&subset_rows(season_cols, &keep), &ratio, season_pen)?;

        let factor: Vec<f64> = evaluate_columns(season_cols, &season_coef, n)
            .into_iter()
            .map(|s| 1.0 + s)
            .collect();
        let keep: Vec<usize> = (0..n).filter(|&i| factor[i].abs() > MIN_DIVISOR).collect();
        let deseasonalised: Vec<f64> = keep.iter().map(|&i| ys[i] / factor[i]).collect();
        trend_coef =
            penalized_least_squares(&subset_rows(trend_cols, &keep), &deseasonalised, trend_pen)?;
    }

    Ok((trend_coef, season_coef))
}

/// Least squares with a ridge penalty per column, via anofox-regression.
///
/// Each column with a positive weight gets one extra row holding the weight
/// in that column and a zero target.
fn penalized_least_squares(
    columns: &[Vec<f64>],
    target: &[f64],
    penalties: &[f64],
) -> Result<Vec<f64>> {
    let n = target.len();
    let k = columns.len();
    if k == 0 {
        return Ok(vec![]);
    }

    let penalized: Vec<usize> = (0..k).filter(|&j| penalties[j] > 0.0).collect();
    let rows = n + penalized.len();

    let x_mat = faer::Mat::from_fn(rows, k, |i, j| {
        if i < n {
            columns[j][i]
        } else if penalized[i - n] == j {
            penalties[j]
        } else {
            0.0
        }
    });
    let y_col = faer::Col::from_fn(rows, |i| if i < n { target[i] } else { 0.0 });

    let fitted = OlsRegressor::builder()
        .with_intercept(false)
        .build()
        .fit(&x_mat, &y_col)
        .map_err(|_| {
            ForecastError::ComputationError(format!(
                "least squares fit failed ({} rows, {} columns)",
                rows, k
            ))
        })?;

    let coeffs_col = fitted.coefficients();
    let coeffs: Vec<f64> = (0..coeffs_col.nrows()).map(|i| coeffs_col[i]).collect();
    if coeffs.len() != k || coeffs.iter().any(|c| !c.is_finite()) {
        return Err(ForecastError::ComputationError(
            "least squares produced non-finite coefficients".into(),
        ));
    }
    Ok(coeffs)
}

fn standard_normal_quantile(p: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|_| ForecastError::ComputationError("standard normal unavailable".into()))?;
    Ok(normal.inverse_cdf(p))
}
