//! Point and interval accuracy measures for out-of-sample demand forecasts.
//!
//! Percentage measures are fractions (0.1 means 10%), the scale the tuning
//! score is defined on.
//!
//! | Measure | Reads as |
//! |---------|----------|
//! | MAE | Average miss in units of demand |
//! | RMSE | Average miss with large misses weighted up |
//! | MAPE | Average miss relative to actual demand |
//! | MdAPE | Typical relative miss, insensitive to a few outliers |
//! | sMAPE | Relative miss against the mean of actual and forecast |
//! | Coverage | Share of actuals inside the uncertainty band |

use crate::error::{ForecastError, Result};

/// Pairs of (actual, forecast) after checking both sides line up.
fn paired<'a>(
    actual: &'a [f64],
    forecast: &'a [f64],
) -> Result<impl Iterator<Item = (f64, f64)> + 'a> {
    if actual.is_empty() {
        return Err(ForecastError::InvalidInput(
            "no points to score".to_string(),
        ));
    }
    if actual.len() != forecast.len() {
        return Err(ForecastError::InvalidInput(format!(
            "{} actual values but {} forecasts",
            actual.len(),
            forecast.len()
        )));
    }
    Ok(actual.iter().copied().zip(forecast.iter().copied()))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Mean absolute error.
///
/// # Formula
/// MAE = (1/n) * Σ|actual_i - forecast_i|
///
/// # Example
/// ```
/// use demand_fcst_core::metrics::mae;
/// let actual = [120.0, 80.0, 100.0];
/// let forecast = [110.0, 90.0, 100.0];
/// let error = mae(&actual, &forecast).unwrap();
/// assert!((error - 20.0 / 3.0).abs() < 1e-9);
/// ```
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let pairs = paired(actual, forecast)?;
    Ok(mean(pairs.map(|(a, f)| (a - f).abs())).unwrap_or(0.0))
}

/// Root mean squared error.
///
/// # Formula
/// RMSE = √[(1/n) * Σ(actual_i - forecast_i)²]
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let pairs = paired(actual, forecast)?;
    Ok(mean(pairs.map(|(a, f)| (a - f) * (a - f)))
        .unwrap_or(0.0)
        .sqrt())
}

/// |actual - forecast| / |actual| for every month with non-zero demand.
fn relative_errors(actual: &[f64], forecast: &[f64]) -> Result<Vec<f64>> {
    let errors: Vec<f64> = paired(actual, forecast)?
        .filter(|(a, _)| *a != 0.0)
        .map(|(a, f)| ((a - f) / a).abs())
        .collect();
    if errors.is_empty() {
        return Err(ForecastError::ComputationError(
            "relative error undefined: every actual is zero".to_string(),
        ));
    }
    Ok(errors)
}

/// Mean absolute percentage error over months with non-zero demand.
///
/// # Formula
/// MAPE = (1/n) * Σ|actual_i - forecast_i| / |actual_i|
pub fn mape(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let errors = relative_errors(actual, forecast)?;
    Ok(errors.iter().sum::<f64>() / errors.len() as f64)
}

/// Median absolute percentage error over months with non-zero demand.
pub fn mdape(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let mut errors = relative_errors(actual, forecast)?;
    errors.sort_by(f64::total_cmp);
    let mid = errors.len() / 2;
    Ok(if errors.len() % 2 == 1 {
        errors[mid]
    } else {
        (errors[mid - 1] + errors[mid]) / 2.0
    })
}

/// Symmetric mean absolute percentage error, between 0 and 2.
///
/// Months where actual and forecast are both zero are a perfect match and
/// are left out; if nothing is left the score is 0.
///
/// # Formula
/// sMAPE = (1/n) * Σ 2|actual_i - forecast_i| / (|actual_i| + |forecast_i|)
pub fn smape(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    let pairs = paired(actual, forecast)?;
    Ok(mean(
        pairs
            .filter(|(a, f)| a.abs() + f.abs() > 0.0)
            .map(|(a, f)| 2.0 * (a - f).abs() / (a.abs() + f.abs())),
    )
    .unwrap_or(0.0))
}

/// Fraction of actuals inside `[lower, upper]`, bounds included.
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    if lower.len() != upper.len() {
        return Err(ForecastError::InvalidInput(format!(
            "{} lower bounds but {} upper bounds",
            lower.len(),
            upper.len()
        )));
    }
    let inside = paired(actual, lower)?
        .zip(upper.iter())
        .filter(|((a, l), u)| l <= a && a <= *u)
        .count();
    Ok(inside as f64 / actual.len() as f64)
}
