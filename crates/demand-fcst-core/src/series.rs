//! Monthly demand observations and calendar helpers.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// A single monthly demand observation.
///
/// `date` is always the first day of its month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub quantity: i64,
}

impl Observation {
    pub fn new(date: NaiveDate, quantity: i64) -> Self {
        Self { date, quantity }
    }

    /// Build an observation dated at the start of `(year, month)`.
    pub fn from_year_month(year: i32, month: u32, quantity: i64) -> Result<Self> {
        let date = month_start(year, month).ok_or_else(|| {
            ForecastError::InvalidInput(format!("Invalid year/month: {}-{}", year, month))
        })?;
        Ok(Self { date, quantity })
    }
}

/// First day of the given month, or `None` if the month is out of range.
pub fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Whole calendar months from `from` to `to` (negative when `to` is earlier).
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    let from_months = from.year() * 12 + from.month() as i32;
    let to_months = to.year() * 12 + to.month() as i32;
    to_months - from_months
}

/// `periods` month-start dates following `last`.
pub fn future_month_starts(last: NaiveDate, periods: usize) -> Result<Vec<NaiveDate>> {
    let start = month_start(last.year(), last.month()).unwrap_or(last);
    (1..=periods)
        .map(|step| {
            u32::try_from(step)
                .ok()
                .and_then(|months| start.checked_add_months(Months::new(months)))
                .ok_or_else(|| {
                    ForecastError::InvalidInput(format!(
                        "Cannot extend {} by {} months",
                        start, step
                    ))
                })
        })
        .collect()
}

/// Days covered by the series, from first to last observation.
pub fn history_span_days(observations: &[Observation]) -> i64 {
    match (observations.first(), observations.last()) {
        (Some(first), Some(last)) => (last.date - first.date).num_days(),
        _ => 0,
    }
}

/// Whether missing months are acceptable in a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gaps {
    /// Missing months are fine, e.g. after anomalies were removed.
    Allow,
    Reject,
}

/// Check that observations lie on the monthly grid and can be fitted.
///
/// Requires at least two points, every date on the first of a month and
/// strictly increasing dates. With [`Gaps::Reject`] consecutive dates must
/// also be exactly one month apart.
pub fn validate_monthly(observations: &[Observation], gaps: Gaps) -> Result<()> {
    if observations.len() < 2 {
        return Err(ForecastError::Fit(format!(
            "need at least 2 observations, got {}",
            observations.len()
        )));
    }

    for (i, obs) in observations.iter().enumerate() {
        if obs.date.day() != 1 {
            return Err(ForecastError::Fit(format!(
                "observation {} dated {} is not a month start",
                i, obs.date
            )));
        }
    }

    for (i, pair) in observations.windows(2).enumerate() {
        let (prev, curr) = (pair[0].date, pair[1].date);
        let step = months_between(prev, curr);
        if step != 1 && !(step > 1 && gaps == Gaps::Allow) {
            let reason = match step {
                0 => "duplicate month".to_string(),
                s if s < 0 => "dates not increasing".to_string(),
                s => format!("gap of {} months", s - 1),
            };
            return Err(ForecastError::Fit(format!(
                "irregular monthly frequency between observations {} ({}) and {} ({}): {}",
                i,
                prev,
                i + 1,
                curr,
                reason
            )));
        }
    }

    Ok(())
}
