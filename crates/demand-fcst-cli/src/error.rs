//! Errors surfaced by the command line runner.

use demand_fcst_core::ForecastError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration '{}': {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Invalid log filter '{directive}': {reason}")]
    Logging { directive: String, reason: String },

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = std::result::Result<T, CliError>;
