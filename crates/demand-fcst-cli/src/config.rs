//! Run configuration loaded from a TOML file.

use crate::error::{CliError, CliResult};
use demand_fcst_core::{ModelConfig, ParallelMode, ParamGrid};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a run needs besides the subcommand.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub data_path: PathBuf,
    pub export_path: PathBuf,
    /// Months forecast after the last observation.
    pub horizon: usize,
    pub model: ModelConfig,
    pub tuning: TuningConfig,
    pub logging: LoggingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/data.csv"),
            export_path: PathBuf::from("exports/data_forecast.csv"),
            horizon: 60,
            model: ModelConfig::default(),
            tuning: TuningConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| CliError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            CliError::Config { reason, .. } => CliError::Config {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> CliResult<Self> {
        let config: RunConfig = toml::from_str(text).map_err(|e| CliError::Config {
            path: PathBuf::new(),
            reason: e.message().to_string(),
        })?;
        config.model.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningConfig {
    /// Parameter name to candidate values, searched in declaration order.
    pub grid: ParamGrid,
    pub parallel: ParallelMode,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            grid: ParamGrid::new()
                .with("changepoint_prior_scale", [0.001, 0.01, 0.1, 0.5])
                .with("seasonality_prior_scale", [0.01, 0.1, 1.0, 10.0]),
            parallel: ParallelMode::Threads,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive such as `info` or `demand_fcst_core=debug`.
    /// Falls back to `RUST_LOG`, then `info`.
    pub level: Option<String>,
    /// Only errors are printed.
    pub quiet: bool,
}

impl LoggingConfig {
    /// Apply command line flags on top of the file values.
    pub fn overridden(mut self, quiet: bool, level: Option<String>) -> Self {
        if quiet {
            self.quiet = true;
        }
        if level.is_some() {
            self.level = level;
        }
        self
    }
}
