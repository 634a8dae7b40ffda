use thiserror::Error;

/// Errors that can occur while reading or writing the persisted store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored table does not match the run: {0}")]
    SchemaMismatch(String),

    #[error("Invalid store location '{0}'")]
    InvalidLocation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
