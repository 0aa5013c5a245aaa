//! Subscriber setup for the command line runner.

use crate::config::LoggingConfig;
use crate::error::{CliError, CliResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "info";

/// Filter for the given settings. `quiet` wins over any level.
pub fn filter(config: &LoggingConfig) -> CliResult<EnvFilter> {
    if config.quiet {
        return Ok(EnvFilter::new("error"));
    }
    match &config.level {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| CliError::Logging {
            directive: directive.clone(),
            reason: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
    }
}

/// Install the global subscriber, writing to stderr so tables on stdout stay clean.
pub fn init(config: &LoggingConfig) -> CliResult<()> {
    let filter = filter(config)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .map_err(|e| CliError::Logging {
            directive: config.level.clone().unwrap_or_default(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_overrides_level() {
        let config = LoggingConfig {
            level: Some("debug".into()),
            quiet: true,
        };
        assert_eq!(filter(&config).unwrap().to_string(), "error");
    }

    #[test]
    fn test_explicit_level() {
        let config = LoggingConfig {
            level: Some("demand_fcst_core=debug".into()),
            quiet: false,
        };
        assert_eq!(filter(&config).unwrap().to_string(), "demand_fcst_core=debug");
    }

    #[test]
    fn test_invalid_level() {
        let config = LoggingConfig {
            level: Some("demand_fcst_core=loud".into()),
            quiet: false,
        };
        assert!(matches!(filter(&config), Err(CliError::Logging { .. })));
    }
}
