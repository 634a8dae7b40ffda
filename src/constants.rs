//! # Evaluator Constants
//!
//! Reserved column names, environment variables and defaults shared by the
//! configuration layer, the run loop and the persisted store.

/// Column holding the failure trace of a row (null when the row succeeded)
pub const EXCEPTION_COLUMN: &str = "exception";

/// Primary key column of the persisted store
pub const TASK_ID_COLUMN: &str = "task_id";

/// Bookkeeping column of the persisted store: 1 once an outcome was committed
pub const ATTEMPTED_COLUMN: &str = "attempted";

/// Columns the persisted store owns; user columns may not reuse them
pub const RESERVED_STORE_COLUMNS: [&str; 2] = [TASK_ID_COLUMN, ATTEMPTED_COLUMN];

/// Output column used when the caller declares none
pub const DEFAULT_OUTPUT_COLUMN: &str = "data";

/// Default table name in the persisted store
pub const DEFAULT_TABLE_NAME: &str = "results";

pub mod env {
    /// Batch size override (`0` means unset)
    pub const PARALLEL_BATCH_SIZE: &str = "PARALLEL_BATCH_SIZE";
    /// Chunk size override (`0` means unset)
    pub const PARALLEL_CHUNK_SIZE: &str = "PARALLEL_CHUNK_SIZE";
    /// Path to a TOML configuration file
    pub const CONFIG_PATH: &str = "TASKER_EVALUATOR_CONFIG_PATH";
    /// Prefix of structured environment overrides (`EVALUATOR__EXECUTION__BATCH_SIZE`)
    pub const CONFIG_PREFIX: &str = "EVALUATOR";
    /// Deployment environment, drives the default log level
    pub const ENVIRONMENT: &str = "TASKER_ENV";
}

pub mod defaults {
    /// Interactive engines accept this many outstanding chunks before the
    /// scheduler waits for one to free up
    pub const HIGH_WATER_MARK: usize = 1;

    /// Progress is logged every time this fraction of the residual completes
    pub const PROGRESS_LOG_FRACTION: f64 = 0.1;

    /// Number of workers when neither config nor the host reports one
    pub const FALLBACK_PARALLELISM: usize = 1;
}

/// Workers to use when a backend declares no explicit parallelism
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(defaults::FALLBACK_PARALLELISM)
}
