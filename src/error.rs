//! Evaluator error taxonomy
//!
//! Per-task failures never show up here: they are recorded in the `exception`
//! column of the row that failed. Everything in [`EvaluatorError`] aborts a run
//! (or refuses to start one).

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::database::StoreError;
use crate::execution::backend::BackendError;

/// Fatal evaluator error
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Resumed input disagrees with the persisted input on shared columns.
    #[error("The following columns have different values from the persisted store: {columns:?}")]
    ReconciliationConflict { columns: Vec<String> },

    #[error(
        "The '{name}' backend is not available, maybe the required features are not enabled"
    )]
    BackendUnavailable { name: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl EvaluatorError {
    /// Configuration problems detected before any work is dispatched
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EvaluatorError::Configuration(_) | EvaluatorError::BackendUnavailable { .. }
        )
    }

    pub fn backend_unavailable(name: impl Into<String>) -> Self {
        EvaluatorError::BackendUnavailable { name: name.into() }
    }
}

/// Result type alias for EvaluatorError
pub type Result<T> = std::result::Result<T, EvaluatorError>;
