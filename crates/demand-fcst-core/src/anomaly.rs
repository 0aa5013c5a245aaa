//! Band-based anomaly detection and filtering.
//!
//! A point is anomalous when its actual quantity falls outside the model's
//! uncertainty interval. Importance is the relative distance to the violated
//! bound.

use crate::forecast::ForecastRow;
use crate::series::Observation;
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::HashSet;

/// Position of an actual relative to the forecast band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyFlag {
    Below,
    Normal,
    Above,
}

impl AnomalyFlag {
    /// Signed representation: -1 below, 0 within, +1 above.
    pub fn as_i8(&self) -> i8 {
        match self {
            AnomalyFlag::Below => -1,
            AnomalyFlag::Normal => 0,
            AnomalyFlag::Above => 1,
        }
    }
}

impl Serialize for AnomalyFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

/// Forecast row with its anomaly classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyRow {
    #[serde(flatten)]
    pub forecast: ForecastRow,
    pub flag: AnomalyFlag,
    /// Signed fractional deviation beyond the band, 0 when within.
    pub importance: f64,
}

impl AnomalyRow {
    pub fn date(&self) -> NaiveDate {
        self.forecast.date
    }

    pub fn is_anomaly(&self) -> bool {
        self.flag != AnomalyFlag::Normal
    }
}

/// Classify every row of a forecast table.
///
/// Rows without an actual are never flagged. An actual of zero outside the
/// band keeps its flag but gets importance 0, since the relative deviation
/// is undefined.
pub fn detect_anomalies(rows: &[ForecastRow]) -> Vec<AnomalyRow> {
    rows.iter()
        .map(|row| {
            let (flag, importance) = match row.actual {
                Some(actual) => classify(actual as f64, row.yhat_lower, row.yhat_upper),
                None => (AnomalyFlag::Normal, 0.0),
            };
            AnomalyRow {
                forecast: *row,
                flag,
                importance,
            }
        })
        .collect()
}

fn classify(actual: f64, lower: f64, upper: f64) -> (AnomalyFlag, f64) {
    let (flag, excess) = if actual > upper {
        (AnomalyFlag::Above, actual - upper)
    } else if actual < lower {
        (AnomalyFlag::Below, lower - actual)
    } else {
        return (AnomalyFlag::Normal, 0.0);
    };

    if actual == 0.0 {
        (flag, 0.0)
    } else {
        (flag, excess / actual)
    }
}

/// Drop observations whose date is flagged in `anomalies`.
pub fn remove_anomalies(observations: &[Observation], anomalies: &[AnomalyRow]) -> Vec<Observation> {
    let flagged: HashSet<NaiveDate> = anomalies
        .iter()
        .filter(|a| a.is_anomaly())
        .map(|a| a.date())
        .collect();

    observations
        .iter()
        .filter(|o| !flagged.contains(&o.date))
        .copied()
        .collect()
}

/// Counts of flagged rows and the most severe one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalySummary {
    pub above: usize,
    pub below: usize,
    pub most_severe: Option<AnomalyRow>,
}

pub fn anomaly_summary(anomalies: &[AnomalyRow]) -> AnomalySummary {
    let count = |flag: AnomalyFlag| anomalies.iter().filter(|a| a.flag == flag).count();
    let most_severe = anomalies
        .iter()
        .filter(|a| a.is_anomaly())
        .max_by(|a, b| {
            a.importance
                .abs()
                .partial_cmp(&b.importance.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied();

    AnomalySummary {
        above: count(AnomalyFlag::Above),
        below: count(AnomalyFlag::Below),
        most_severe,
    }
}
