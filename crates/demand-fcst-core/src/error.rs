//! Error types for the demand forecasting pipeline.

use thiserror::Error;

/// Result type for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types for forecasting, evaluation and tuning.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Failed to load data from '{path}': {reason}")]
    DataLoad { path: String, reason: String },

    #[error("Fit error: {0}")]
    Fit(String),

    #[error(
        "Insufficient history: cross-validation needs {needed_days} days, history spans {available_days}"
    )]
    InsufficientHistory {
        needed_days: i64,
        available_days: i64,
    },

    #[error("Empty parameter grid: {0}")]
    EmptyGrid(String),

    #[error("Candidate {configuration} failed: {reason}")]
    CandidateEvaluation {
        configuration: String,
        reason: String,
    },

    #[error("No viable candidate: all {failed} evaluated configurations failed")]
    NoViableCandidate { failed: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    /// Whether the error should abort the whole pipeline rather than a single step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ForecastError::DataLoad { .. } | ForecastError::Fit(_) | ForecastError::Io(_)
        )
    }
}
