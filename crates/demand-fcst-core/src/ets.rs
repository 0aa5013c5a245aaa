//! Exponential smoothing forecaster backed by the anofox-forecast ETS model.

use crate::error::{ForecastError, Result};
use crate::model::{FittedModel, Forecaster, Prediction};
use crate::series::{months_between, validate_monthly, Gaps, Observation};
use anofox_forecast::core::TimeSeriesBuilder;
use anofox_forecast::models::exponential::{ETSSpec, ETS as ETSModel};
use anofox_forecast::prelude::Forecaster as _;
use chrono::NaiveDate;
use statrs::distribution::{ContinuousCDF, Normal};

/// ETS model with a fixed specification such as `"AAA"` or `"MNM"`.
#[derive(Debug, Clone, PartialEq)]
pub struct EtsModel {
    notation: String,
    seasonal_period: usize,
    interval_width: f64,
}

impl EtsModel {
    pub fn new(notation: &str, seasonal_period: usize) -> Result<Self> {
        parse_spec(notation)?;
        Ok(Self {
            notation: notation.to_string(),
            seasonal_period,
            interval_width: 0.8,
        })
    }

    pub fn with_interval_width(mut self, interval_width: f64) -> Result<Self> {
        if !(interval_width > 0.0 && interval_width < 1.0) {
            return Err(ForecastError::InvalidParameter {
                param: "interval_width".into(),
                value: interval_width.to_string(),
                reason: "must be in (0, 1)".into(),
            });
        }
        self.interval_width = interval_width;
        Ok(self)
    }
}

impl Forecaster for EtsModel {
    fn name(&self) -> String {
        format!("ETS({}, period={})", self.notation, self.seasonal_period)
    }

    fn fit(&self, history: &[Observation]) -> Result<Box<dyn FittedModel>> {
        validate_monthly(history, Gaps::Reject)?;
        let spec = parse_spec(&self.notation)?;
        let values: Vec<f64> = history.iter().map(|o| o.quantity as f64).collect();

        let (_, fitted) = run_ets(&values, &spec, self.seasonal_period, 1)?;
        let fitted = fitted
            .filter(|f| f.len() == values.len())
            .ok_or_else(|| ForecastError::Fit("ETS model returned no fitted values".into()))?;

        let residuals: Vec<f64> = values
            .iter()
            .zip(&fitted)
            .map(|(y, f)| y - f)
            .filter(|r| r.is_finite())
            .collect();
        if residuals.is_empty() {
            return Err(ForecastError::Fit("ETS fitted values are not finite".into()));
        }
        let sigma =
            (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt();

        let normal = Normal::new(0.0, 1.0)
            .map_err(|_| ForecastError::ComputationError("standard normal unavailable".into()))?;
        let z = normal.inverse_cdf(0.5 + self.interval_width / 2.0);

        Ok(Box::new(EtsFit {
            model: self.clone(),
            history: history.to_vec(),
            values,
            fitted,
            sigma,
            z,
        }))
    }
}

struct EtsFit {
    model: EtsModel,
    history: Vec<Observation>,
    values: Vec<f64>,
    fitted: Vec<f64>,
    sigma: f64,
    z: f64,
}

impl FittedModel for EtsFit {
    fn forecaster(&self) -> &dyn Forecaster {
        &self.model
    }

    fn history(&self) -> &[Observation] {
        &self.history
    }

    /// In-sample dates use fitted values; later dates use the h-step forecast.
    /// ETS has no separate trend output, so `trend` mirrors the point estimate.
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>> {
        let start = self.history[0].date;
        let n = self.values.len() as i32;

        let offsets: Vec<i32> = dates.iter().map(|&d| months_between(start, d)).collect();
        if let Some((date, _)) = dates.iter().zip(&offsets).find(|(_, &o)| o < 0) {
            return Err(ForecastError::InvalidInput(format!(
                "cannot predict {} before the history start {}",
                date, start
            )));
        }

        let max_step = offsets.iter().map(|&o| o - n + 1).max().unwrap_or(0);
        let point = if max_step > 0 {
            let spec = parse_spec(&self.model.notation)?;
            run_ets(&self.values, &spec, self.model.seasonal_period, max_step as usize)?.0
        } else {
            vec![]
        };

        dates
            .iter()
            .zip(offsets)
            .map(|(&date, offset)| {
                let (yhat, spread) = if offset < n {
                    (self.fitted[offset as usize], self.z * self.sigma)
                } else {
                    let step = (offset - n + 1) as usize;
                    let yhat = *point.get(step - 1).ok_or_else(|| {
                        ForecastError::ComputationError(format!(
                            "ETS forecast shorter than {} steps",
                            step
                        ))
                    })?;
                    (yhat, self.z * self.sigma * (step as f64).sqrt())
                };
                Ok(Prediction {
                    date,
                    trend: yhat,
                    yhat,
                    yhat_lower: yhat - spread,
                    yhat_upper: yhat + spread,
                })
            })
            .collect()
    }
}

fn parse_spec(notation: &str) -> Result<ETSSpec> {
    let spec = ETSSpec::from_notation(notation).map_err(|e| ForecastError::InvalidParameter {
        param: "ets_spec".into(),
        value: notation.into(),
        reason: format!("{}", e),
    })?;
    if !spec.is_valid() {
        return Err(ForecastError::InvalidParameter {
            param: "ets_spec".into(),
            value: notation.into(),
            reason: "unstable ETS combination".into(),
        });
    }
    Ok(spec)
}

/// Fit ETS on `values` and forecast `horizon` steps.
fn run_ets(
    values: &[f64],
    spec: &ETSSpec,
    period: usize,
    horizon: usize,
) -> Result<(Vec<f64>, Option<Vec<f64>>)> {
    let seasonal_period = if spec.has_seasonal() && period > 1 {
        period
    } else {
        1
    };

    let time_series = TimeSeriesBuilder::new()
        .values(values.to_vec())
        .build()
        .map_err(|e| ForecastError::Fit(format!("Failed to build TimeSeries: {}", e)))?;

    let mut forecaster = ETSModel::new(*spec, seasonal_period);
    forecaster
        .fit(&time_series)
        .map_err(|e| ForecastError::Fit(format!("Failed to fit ETS model: {}", e)))?;

    let forecast = forecaster.predict(horizon.max(1)).map_err(|e| {
        ForecastError::ComputationError(format!("Failed to generate ETS forecasts: {}", e))
    })?;

    let point = forecast.point().first().cloned().unwrap_or_default();
    let fitted = forecaster.fitted_values().map(|v| v.to_vec());
    Ok((point, fitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::month_start;
    use chrono::Months;

    fn history(n: usize) -> Vec<Observation> {
        let start = month_start(2019, 1).unwrap();
        (0..n)
            .map(|i| {
                let season = ((i % 12) as f64 * std::f64::consts::PI / 6.0).sin() * 15.0;
                Observation::new(start + Months::new(i as u32), (120.0 + i as f64 + season) as i64)
            })
            .collect()
    }

    #[test]
    fn test_invalid_notation() {
        assert!(EtsModel::new("XYZ", 12).is_err());
    }

    #[test]
    fn test_invalid_interval_width() {
        let model = EtsModel::new("AAN", 1).unwrap();
        assert!(model.with_interval_width(1.5).is_err());
    }

    #[test]
    fn test_ets_forecast_shape() {
        let history = history(36);
        let fitted = EtsModel::new("AAN", 1).unwrap().fit(&history).unwrap();
        let dates = fitted.make_future_dates(6, true).unwrap();
        let preds = fitted.predict(&dates).unwrap();
        assert_eq!(preds.len(), 42);
        assert!(preds
            .iter()
            .all(|p| p.yhat.is_finite() && p.yhat_lower <= p.yhat_upper));
    }

    #[test]
    fn test_ets_requires_contiguous_history() {
        let mut history = history(36);
        history.remove(10);
        let err = EtsModel::new("AAN", 1).unwrap().fit(&history).err().unwrap();
        assert!(matches!(err, ForecastError::Fit(_)));
    }

    #[test]
    fn test_predict_before_history_fails() {
        let history = history(24);
        let fitted = EtsModel::new("AAN", 1).unwrap().fit(&history).unwrap();
        let before = month_start(2018, 6).unwrap();
        assert!(fitted.predict(&[before]).is_err());
    }
}
