//! # Execution
//!
//! Everything between a residual task list and a stream of outcomes:
//!
//! - [`batcher`]: bounded, order-preserving batches (and backend chunks)
//! - [`isolation`]: the per-task wrapper that turns errors and panics into
//!   failure outcomes
//! - [`interrupt`]: the cooperative operator interrupt
//! - [`backend`]: the [`Mapper`](backend::Mapper) contract and its backends

pub mod backend;
pub mod batcher;
pub mod interrupt;
pub mod isolation;

pub use backend::{AttemptStream, BackendError, BackendRegistry, DispatchContext, Mapper};
pub use batcher::batch;
pub use interrupt::{CtrlCListener, InterruptSignal};
pub use isolation::{
    attempt, from_fn, isolated_job, Attempt, EvalError, EvaluationFunction, ExtraArgs, TaskJob,
};
