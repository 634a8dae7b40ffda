//! Configuration Error Types
//!
//! Everything here is detected before any task is dispatched.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A declared column collides with a column the evaluator owns
    #[error("The '{column}' column can not be one of the new columns")]
    ReservedColumn { column: String },

    #[error("Column '{column}' is declared more than once")]
    DuplicateColumn { column: String },

    /// The backend needs column typing up front
    #[error("The new columns must be provided when using the '{backend}' backend")]
    MissingOutputSchema { backend: String },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigurationError {
    pub fn reserved_column(column: impl Into<String>) -> Self {
        Self::ReservedColumn {
            column: column.into(),
        }
    }

    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_column_message() {
        let err = ConfigurationError::reserved_column("exception");
        assert_eq!(
            err.to_string(),
            "The 'exception' column can not be one of the new columns"
        );
    }

    #[test]
    fn invalid_value_message() {
        let err = ConfigurationError::invalid_value("batch_size", "0", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'batch_size': must be positive"
        );
    }
}
