//! # Orchestration
//!
//! Drives a run end to end.
//!
//! - [`reconciler`]: merges persisted state with the dataset, computes the residual set
//! - [`result_sink`]: commits outcomes to the store, then to the result table
//! - [`progress`]: completed/total side channel
//! - [`evaluator`]: the batch loop and the [`evaluate`] entry point

pub mod evaluator;
pub mod progress;
pub mod reconciler;
pub mod result_sink;

pub use evaluator::{
    evaluate, evaluate_with, EvaluationReport, EvaluationRequest, Evaluator, RunStats,
};
pub use progress::Progress;
pub use reconciler::{reconcile, Reconciliation};
pub use result_sink::ResultSink;
