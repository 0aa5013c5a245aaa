//! Forecast runner: fit a model and build the forecast table.

use crate::error::Result;
use crate::model::{FittedModel, Forecaster};
use crate::series::{validate_monthly, Gaps, Observation};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

/// One row of the forecast table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub trend: f64,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    /// Observed quantity; `None` for horizon rows.
    pub actual: Option<i64>,
}

impl ForecastRow {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn is_future(&self) -> bool {
        self.actual.is_none()
    }
}

/// Fit `forecaster` on `observations` and forecast `horizon_periods` months
/// after the last observation.
///
/// The returned table covers the history followed by the horizon. Actual
/// quantities are joined onto the rows by date.
pub fn fit_predict(
    forecaster: &dyn Forecaster,
    observations: &[Observation],
    horizon_periods: usize,
) -> Result<(Vec<ForecastRow>, Box<dyn FittedModel>)> {
    validate_monthly(observations, Gaps::Allow)?;

    let model = forecaster.fit(observations)?;
    let dates = model.make_future_dates(horizon_periods, true)?;
    let predictions = model.predict(&dates)?;

    let actuals: HashMap<NaiveDate, i64> = observations
        .iter()
        .map(|o| (o.date, o.quantity))
        .collect();

    let rows = predictions
        .into_iter()
        .map(|p| ForecastRow {
            date: p.date,
            trend: p.trend,
            yhat: p.yhat,
            yhat_lower: p.yhat_lower,
            yhat_upper: p.yhat_upper,
            actual: actuals.get(&p.date).copied(),
        })
        .collect();

    tracing::info!(
        model = %forecaster.name(),
        observations = observations.len(),
        horizon = horizon_periods,
        "forecast complete"
    );

    Ok((rows, model))
}

/// Rows beyond the observed history.
pub fn future_rows(rows: &[ForecastRow]) -> Vec<ForecastRow> {
    rows.iter().filter(|r| r.is_future()).copied().collect()
}
