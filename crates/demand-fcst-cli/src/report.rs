//! Plain text tables printed to stdout.

use demand_fcst_core::{
    AccuracyMetrics, AnomalyRow, AnomalySummary, ForecastRow, HorizonMetrics, TuningOutcome,
    TuningReport,
};
use std::fmt::Write;

pub fn forecast_table(rows: &[ForecastRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>7} {:>12} {:>12} {:>12} {:>12}",
        "month", "yhat", "lower", "upper", "trend"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:>4}-{:02} {:>12.1} {:>12.1} {:>12.1} {:>12.1}",
            row.year(),
            row.month(),
            row.yhat,
            row.yhat_lower,
            row.yhat_upper,
            row.trend
        );
    }
    out
}

pub fn anomaly_table(anomalies: &[AnomalyRow], summary: &AnomalySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>7} {:>10} {:>12} {:>12} {:>5} {:>10}",
        "month", "actual", "lower", "upper", "flag", "importance"
    );
    for a in anomalies.iter().filter(|a| a.is_anomaly()) {
        let f = &a.forecast;
        let _ = writeln!(
            out,
            "{:>4}-{:02} {:>10} {:>12.1} {:>12.1} {:>5} {:>10.3}",
            f.year(),
            f.month(),
            f.actual.unwrap_or_default(),
            f.yhat_lower,
            f.yhat_upper,
            a.flag.as_i8(),
            a.importance
        );
    }
    let _ = writeln!(
        out,
        "{} above, {} below the band",
        summary.above, summary.below
    );
    out
}

pub fn metrics_table(per_horizon: &[HorizonMetrics], mean: &AccuracyMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>7} {:>5} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8}",
        "horizon", "n", "mae", "rmse", "mape", "mdape", "smape", "coverage"
    );
    for m in per_horizon {
        let _ = writeln!(
            out,
            "{:>7} {:>5} {:>10.2} {:>10.2} {:>8.4} {:>8.4} {:>8.4} {:>8.3}",
            m.horizon, m.count, m.mae, m.rmse, m.mape, m.mdape, m.smape, m.coverage
        );
    }
    let _ = writeln!(
        out,
        "mean: mdape={:.4} mape={:.4} smape={:.4}",
        mean.mdape, mean.mape, mean.smape
    );
    out
}

pub fn tuning_table(report: &TuningReport) -> String {
    let mut out = String::new();
    for (i, result) in report.results.iter().enumerate() {
        let marker = if report.best == Some(i) { "*" } else { " " };
        match &result.outcome {
            TuningOutcome::Evaluated { metrics, score } => {
                let _ = writeln!(
                    out,
                    "{} {:>3} score={:.4} mdape={:.4} mape={:.4} smape={:.4} {}",
                    marker,
                    i + 1,
                    score,
                    metrics.mdape,
                    metrics.mape,
                    metrics.smape,
                    result.configuration
                );
            }
            TuningOutcome::Failed { reason } => {
                let _ = writeln!(out, "{} {:>3} failed: {}", marker, i + 1, reason);
            }
        }
    }
    if report.cancelled {
        let _ = writeln!(out, "search cancelled after {} candidates", report.results.len());
    }
    match report.best_configuration() {
        Some(best) => {
            let _ = writeln!(out, "best: {}", best);
        }
        None => {
            let _ = writeln!(out, "best: none");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use demand_fcst_core::{month_start, Configuration, TuningResult};

    #[test]
    fn test_forecast_table_lines() {
        let rows = vec![ForecastRow {
            date: month_start(2024, 3).unwrap(),
            trend: 10.0,
            yhat: 12.25,
            yhat_lower: 9.0,
            yhat_upper: 15.5,
            actual: None,
        }];
        let table = forecast_table(&rows);
        assert_eq!(table.lines().count(), 2);
        assert!(table.contains("2024-03"));
        assert!(table.contains("12.2") || table.contains("12.3"));
    }

    #[test]
    fn test_tuning_table_marks_best() {
        let report = TuningReport {
            results: vec![
                TuningResult {
                    configuration: Configuration::new().with("changepoint_prior_scale", 0.5),
                    outcome: TuningOutcome::Failed {
                        reason: "boom".into(),
                    },
                },
                TuningResult {
                    configuration: Configuration::new().with("changepoint_prior_scale", 0.05),
                    outcome: TuningOutcome::Evaluated {
                        metrics: AccuracyMetrics {
                            mdape: 0.1,
                            mape: 0.1,
                            smape: 0.1,
                        },
                        score: 0.1,
                    },
                },
            ],
            best: Some(1),
            cancelled: false,
        };
        let table = tuning_table(&report);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with(' ') && lines[0].contains("failed: boom"));
        assert!(lines[1].starts_with('*'));
        assert_eq!(lines[2], "best: {changepoint_prior_scale: 0.05}");
    }
}
