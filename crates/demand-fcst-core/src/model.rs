//! Model configuration and the forecaster capability traits.
//!
//! Any model family can drive the pipeline by implementing [`Forecaster`]
//! (configuration + fitting) and [`FittedModel`] (prediction over arbitrary
//! month-start dates). Cross-validation only needs these two traits.

use crate::error::{ForecastError, Result};
use crate::series::{future_month_starts, Observation};
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// How seasonal components combine with the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

impl SeasonalityMode {
    pub fn name(&self) -> &'static str {
        match self {
            SeasonalityMode::Additive => "additive",
            SeasonalityMode::Multiplicative => "multiplicative",
        }
    }
}

impl std::str::FromStr for SeasonalityMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "additive" | "add" => Ok(SeasonalityMode::Additive),
            "multiplicative" | "mul" | "mult" => Ok(SeasonalityMode::Multiplicative),
            _ => Err(ForecastError::InvalidParameter {
                param: "seasonality_mode".into(),
                value: s.into(),
                reason: "expected 'additive' or 'multiplicative'".into(),
            }),
        }
    }
}

/// Options controlling trend flexibility, seasonality and interval width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub daily_seasonality: bool,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub seasonality_mode: SeasonalityMode,
    /// Fraction of history eligible for trend changepoints.
    pub changepoint_range: f64,
    /// Flexibility of the trend at changepoints.
    pub changepoint_prior_scale: f64,
    /// Flexibility of the seasonal amplitude.
    pub seasonality_prior_scale: f64,
    /// Number of potential changepoints placed over the eligible history.
    pub n_changepoints: usize,
    /// Coverage of the uncertainty interval.
    pub interval_width: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            daily_seasonality: false,
            yearly_seasonality: true,
            weekly_seasonality: false,
            seasonality_mode: SeasonalityMode::Multiplicative,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            n_changepoints: 25,
            interval_width: 0.8,
        }
    }
}

impl ModelConfig {
    /// Return a copy with every entry of `configuration` applied by name.
    pub fn apply(&self, configuration: &Configuration) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in configuration.iter() {
            config.set(name, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn set(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "daily_seasonality" => self.daily_seasonality = value.as_bool(name)?,
            "yearly_seasonality" => self.yearly_seasonality = value.as_bool(name)?,
            "weekly_seasonality" => self.weekly_seasonality = value.as_bool(name)?,
            "seasonality_mode" => self.seasonality_mode = value.as_str(name)?.parse()?,
            "changepoint_range" => self.changepoint_range = value.as_f64(name)?,
            "changepoint_prior_scale" => self.changepoint_prior_scale = value.as_f64(name)?,
            "seasonality_prior_scale" => self.seasonality_prior_scale = value.as_f64(name)?,
            "n_changepoints" => self.n_changepoints = value.as_usize(name)?,
            "interval_width" => self.interval_width = value.as_f64(name)?,
            _ => {
                return Err(ForecastError::InvalidParameter {
                    param: name.into(),
                    value: value.to_string(),
                    reason: "unknown hyperparameter".into(),
                })
            }
        }
        Ok(())
    }

    /// Reject out-of-range option values.
    pub fn validate(&self) -> Result<()> {
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(invalid(
                "changepoint_range",
                self.changepoint_range,
                "must be in (0, 1]",
            ));
        }
        if !(self.changepoint_prior_scale > 0.0 && self.changepoint_prior_scale.is_finite()) {
            return Err(invalid(
                "changepoint_prior_scale",
                self.changepoint_prior_scale,
                "must be positive",
            ));
        }
        if !(self.seasonality_prior_scale > 0.0 && self.seasonality_prior_scale.is_finite()) {
            return Err(invalid(
                "seasonality_prior_scale",
                self.seasonality_prior_scale,
                "must be positive",
            ));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(invalid(
                "interval_width",
                self.interval_width,
                "must be in (0, 1)",
            ));
        }
        Ok(())
    }
}

fn invalid(param: &str, value: f64, reason: &str) -> ForecastError {
    ForecastError::InvalidParameter {
        param: param.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn type_error(&self, name: &str, expected: &str) -> ForecastError {
        ForecastError::InvalidParameter {
            param: name.into(),
            value: self.to_string(),
            reason: format!("expected {}", expected),
        }
    }

    pub fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(b) => Ok(*b),
            _ => Err(self.type_error(name, "a boolean")),
        }
    }

    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            _ => Err(self.type_error(name, "a number")),
        }
    }

    pub fn as_usize(&self, name: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            ParamValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as usize),
            _ => Err(self.type_error(name, "a non-negative integer")),
        }
    }

    pub fn as_str(&self, name: &str) -> Result<&str> {
        match self {
            ParamValue::Text(s) => Ok(s),
            _ => Err(self.type_error(name, "a string")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// An ordered set of hyperparameter assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    entries: Vec<(String, ParamValue)>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing entry of the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Model output for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub trend: f64,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// An unfitted, configured model family.
pub trait Forecaster: Send + Sync {
    /// Human readable model description.
    fn name(&self) -> String;

    /// Fit the model to a regular monthly history.
    fn fit(&self, history: &[Observation]) -> Result<Box<dyn FittedModel>>;
}

/// A model fitted to a specific history.
pub trait FittedModel: Send + Sync {
    /// The configured model this fit came from, used to refit on sub-histories.
    fn forecaster(&self) -> &dyn Forecaster;

    /// Observations the model was fitted on.
    fn history(&self) -> &[Observation];

    /// Predict trend, point estimate and bounds for each date.
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>>;

    /// Month-start dates covering `periods` months after the history,
    /// optionally preceded by the history dates.
    fn make_future_dates(&self, periods: usize, include_history: bool) -> Result<Vec<NaiveDate>> {
        let history = self.history();
        let last = history
            .last()
            .ok_or_else(|| ForecastError::InvalidInput("model has no history".into()))?;
        let mut dates: Vec<NaiveDate> = if include_history {
            history.iter().map(|o| o.date).collect()
        } else {
            Vec::with_capacity(periods)
        };
        dates.extend(future_month_starts(last.date, periods)?);
        Ok(dates)
    }
}
