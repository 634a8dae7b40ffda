#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Evaluator
//!
//! Resumable batched evaluation of a user function over the rows of a dataset.
//!
//! ## Overview
//!
//! A run evaluates one function once per row, spreads the work over a
//! configurable execution backend, records per-row failures instead of
//! aborting, and optionally persists every outcome as it arrives so an
//! interrupted run can resume without recomputing finished rows.
//!
//! ## Architecture
//!
//! ```text
//! Dataset ──► Reconciler ──► Batcher ──► Backend Mapper ──► Isolation Wrapper
//!                 ▲                                               │
//!                 │                                               ▼
//!           Persisted store ◄──────────── Result Sink ◄──── outcome stream
//! ```
//!
//! - the reconciler merges any persisted state and computes the residual tasks
//! - batches are dispatched one after the other; inside a batch the backend
//!   may complete tasks in any order
//! - every task is tagged with its id before dispatch, so outcomes land on the
//!   right row regardless of completion order
//! - each outcome is committed to the store and then to the in-memory table
//!
//! ## Module Organization
//!
//! - [`models`] - task ids, datasets, outcomes and the result table
//! - [`execution`] - batcher, isolation wrapper, interrupt and backends
//! - [`database`] - persisted store contract, SQLite and in-memory stores
//! - [`orchestration`] - reconciler, result sink, progress and the run loop
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::{json, Value};
//! use tasker_evaluator::prelude::*;
//!
//! fn double(row: &Row, _args: &ExtraArgs) -> Result<Row, EvalError> {
//!     let value = row.get("value").and_then(Value::as_f64).unwrap_or_default();
//!     Ok([("doubled".to_string(), json!(value * 2.0))].into_iter().collect())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dataset = Dataset::from_rows(
//!         (0..10)
//!             .map(|v| [("value".to_string(), json!(v))].into_iter().collect())
//!             .collect(),
//!     )?;
//!
//!     let request = EvaluationRequest::new()
//!         .with_output("doubled", json!(0.0))
//!         .with_backend(BackendConfig::from_name(Some("worker-pool"))?)
//!         .with_batch_size(4);
//!
//!     let report = evaluate(dataset, double, request).await?;
//!     assert_eq!(report.table.len(), 10);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;

pub use config::{
    BackendConfig, BackendKind, ConfigManager, EvaluatorConfig, ExecutionConfig, LoggingConfig,
    StoreConfig,
};
pub use database::{MemoryStore, ResultStore, SqliteStore, StoreError};
pub use error::{EvaluatorError, Result};
pub use execution::{
    Attempt, BackendError, BackendRegistry, EvalError, EvaluationFunction, ExtraArgs,
    InterruptSignal, Mapper,
};
pub use models::{
    Dataset, Outcome, OutcomeResult, OutputColumn, ResultRow, ResultTable, Row, TableSchema,
    TaskId, TaskRecord,
};
pub use orchestration::{
    evaluate, evaluate_with, EvaluationReport, EvaluationRequest, Evaluator, Progress, RunStats,
};

/// Everything a typical caller needs
pub mod prelude {
    pub use crate::config::{BackendConfig, BackendKind, StoreConfig};
    pub use crate::execution::{from_fn, EvalError, EvaluationFunction, ExtraArgs, InterruptSignal};
    pub use crate::models::{Dataset, OutputColumn, ResultTable, Row, TaskId};
    pub use crate::orchestration::{evaluate, EvaluationReport, EvaluationRequest, Evaluator};
}
