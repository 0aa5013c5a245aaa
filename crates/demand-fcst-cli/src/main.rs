//! # demand-fcst
//!
//! Command line runner: forecast monthly demand, list anomalies, evaluate a
//! model and tune its hyperparameters.

use clap::{Parser, Subcommand};
use demand_fcst_core::{
    anomaly_summary, cross_validation, decomposable_factory, detect_anomalies, export_forecast,
    fit_predict, future_rows, load_observations, performance_metrics, remove_anomalies, tune,
    AccuracyMetrics, CrossValidationConfig, DecomposableModel, EtsModel, ForecastRow, Forecaster,
    Observation, TuneOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod error;
mod logging;
mod report;

use config::RunConfig;
use error::CliResult;

#[derive(Parser)]
#[command(name = "demand-fcst")]
#[command(about = "Monthly demand forecasting and tuning", long_about = None)]
struct Cli {
    /// TOML run configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log filter directive, e.g. `debug` or `demand_fcst_core=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit, forecast and export the horizon
    Forecast {
        /// Input file (year;month;quantity)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Export file for the forecast horizon
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Months to forecast
        #[arg(long)]
        horizon: Option<usize>,

        /// Drop anomalies and refit before exporting
        #[arg(long)]
        clean: bool,

        /// Use an ETS model with this notation (e.g. AAN) instead of the
        /// decomposable model
        #[arg(long)]
        ets: Option<String>,
    },

    /// Print observations outside the uncertainty band
    Anomalies {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Cross-validate the configured model
    Evaluate {
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long)]
        ets: Option<String>,
    },

    /// Grid search over the configured hyperparameters
    Tune {
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write the full results as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    config.logging = config.logging.overridden(cli.quiet, cli.log_level);
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Forecast {
            input,
            output,
            horizon,
            clean,
            ets,
        } => {
            let observations = load(input.as_deref(), &config)?;
            let forecaster = build_forecaster(&config, ets.as_deref())?;
            let horizon = horizon.unwrap_or(config.horizon);
            let output = output.unwrap_or_else(|| config.export_path.clone());
            run_forecast(forecaster.as_ref(), &observations, horizon, clean, &output)?;
            Ok(())
        }
        Commands::Anomalies { input } => {
            let observations = load(input.as_deref(), &config)?;
            let forecaster = build_forecaster(&config, None)?;
            let (rows, _) = fit_predict(forecaster.as_ref(), &observations, 0)?;
            let anomalies = detect_anomalies(&rows);
            print!(
                "{}",
                report::anomaly_table(&anomalies, &anomaly_summary(&anomalies))
            );
            Ok(())
        }
        Commands::Evaluate { input, ets } => {
            let observations = load(input.as_deref(), &config)?;
            let forecaster = build_forecaster(&config, ets.as_deref())?;
            let (_, model) = fit_predict(forecaster.as_ref(), &observations, 1)?;
            let cv = CrossValidationConfig::tuning().with_parallel(config.tuning.parallel);
            let rows = cross_validation(model.as_ref(), &cv)?;
            let per_horizon = performance_metrics(&rows, true)?;
            let mean = AccuracyMetrics::mean_over(&per_horizon);
            print!("{}", report::metrics_table(&per_horizon, &mean));
            Ok(())
        }
        Commands::Tune { input, report } => {
            let observations = load(input.as_deref(), &config)?;
            let options = TuneOptions {
                base: config.model.clone(),
                cross_validation: CrossValidationConfig::tuning()
                    .with_parallel(config.tuning.parallel),
                ..TuneOptions::default()
            };
            let result = tune(
                decomposable_factory,
                &observations,
                &config.tuning.grid,
                &options,
            )?;
            print!("{}", report::tuning_table(&result));
            if let Some(path) = report {
                write_json(&path, &result)?;
            }
            Ok(())
        }
    }
}

fn load(input: Option<&Path>, config: &RunConfig) -> CliResult<Vec<Observation>> {
    let path = input.unwrap_or(config.data_path.as_path());
    Ok(load_observations(path)?)
}

fn build_forecaster(config: &RunConfig, ets: Option<&str>) -> CliResult<Box<dyn Forecaster>> {
    Ok(match ets {
        Some(notation) => Box::new(
            EtsModel::new(notation, 12)?.with_interval_width(config.model.interval_width)?,
        ),
        None => Box::new(DecomposableModel::new(config.model.clone())?),
    })
}

/// Forecast table for `horizon` months, refitted without anomalies when
/// `clean` is set. A failed refit keeps the original table.
fn forecast_rows(
    forecaster: &dyn Forecaster,
    observations: &[Observation],
    horizon: usize,
    clean: bool,
) -> CliResult<Vec<ForecastRow>> {
    let (rows, _) = fit_predict(forecaster, observations, horizon)?;
    if !clean {
        return Ok(rows);
    }

    let anomalies = detect_anomalies(&rows);
    let cleaned = remove_anomalies(observations, &anomalies);
    let dropped = observations.len() - cleaned.len();
    if dropped == 0 {
        return Ok(rows);
    }

    tracing::info!(dropped, "refitting without anomalies");
    // ETS cannot fit a history with missing months
    match fit_predict(forecaster, &cleaned, horizon) {
        Ok((refit, _)) => Ok(refit),
        Err(e) => {
            tracing::warn!(error = %e, "refit on cleaned history failed, keeping original fit");
            Ok(rows)
        }
    }
}

fn run_forecast(
    forecaster: &dyn Forecaster,
    observations: &[Observation],
    horizon: usize,
    clean: bool,
    output: &Path,
) -> CliResult<Vec<ForecastRow>> {
    let rows = forecast_rows(forecaster, observations, horizon, clean)?;
    let written = export_forecast(output, &rows)?;
    print!("{}", report::forecast_table(&future_rows(&rows)));
    println!("{} rows written to {}", written, output.display());
    Ok(rows)
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
