//! # Isolation Wrapper
//!
//! Runs the user function for one task so that a failing row never aborts
//! its batch. Errors and panics raised by the function become a failure
//! [`Outcome`] tagged with the task id; the only thing that crosses this
//! boundary is [`EvalError::Interrupted`], which the run loop turns into a
//! graceful shutdown.

use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::models::{Outcome, Row, TaskId, TaskRecord};

/// Extra positional and keyword arguments passed to every call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraArgs {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
}

impl ExtraArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    /// Numeric parameter given either positionally or by name
    pub fn f64_or(&self, index: usize, name: &str, default: f64) -> f64 {
        self.arg(index)
            .or_else(|| self.kwarg(name))
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }
}

/// Why a user function did not return outputs
#[derive(Debug)]
pub enum EvalError {
    /// The row failed; recorded in its `exception` column
    Failed(anyhow::Error),
    /// The operator asked the run to stop
    Interrupted,
}

impl EvalError {
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        EvalError::Failed(anyhow::Error::msg(message))
    }

    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        EvalError::Failed(error.into())
    }
}

impl From<anyhow::Error> for EvalError {
    fn from(error: anyhow::Error) -> Self {
        EvalError::Failed(error)
    }
}

/// Function evaluated once per row
pub trait EvaluationFunction: Send + Sync + 'static {
    fn evaluate(&self, inputs: &Row, args: &ExtraArgs) -> Result<Row, EvalError>;
}

impl<F> EvaluationFunction for F
where
    F: Fn(&Row, &ExtraArgs) -> Result<Row, EvalError> + Send + Sync + 'static,
{
    fn evaluate(&self, inputs: &Row, args: &ExtraArgs) -> Result<Row, EvalError> {
        self(inputs, args)
    }
}

/// Pins a closure to the [`EvaluationFunction`] call signature
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&Row, &ExtraArgs) -> Result<Row, EvalError> + Send + Sync + 'static,
{
    f
}

/// What one isolated call produced
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Completed(Outcome),
    Interrupted(TaskId),
}

/// Unit of work handed to a backend: task in, tagged attempt out
pub type TaskJob = Arc<dyn Fn(TaskRecord) -> Attempt + Send + Sync>;

/// Evaluate one task, converting any failure into a failure outcome
pub fn attempt(task: &TaskRecord, function: &dyn EvaluationFunction, args: &ExtraArgs) -> Attempt {
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| function.evaluate(task.inputs(), args)));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(outputs)) => {
            debug!(task_id = %task.id(), elapsed_ms, "Task evaluated");
            Attempt::Completed(Outcome::success(task.id().clone(), outputs))
        }
        Ok(Err(EvalError::Failed(err))) => {
            let trace = format!("{err:#}");
            error!(task_id = %task.id(), elapsed_ms, exception = %trace, "Exception for task");
            Attempt::Completed(Outcome::failure(task.id().clone(), trace))
        }
        Ok(Err(EvalError::Interrupted)) => {
            warn!(task_id = %task.id(), "Task requested an interrupt");
            Attempt::Interrupted(task.id().clone())
        }
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            let trace = format!("Evaluation panicked: {message}");
            error!(task_id = %task.id(), elapsed_ms, exception = %trace, "Exception for task");
            Attempt::Completed(Outcome::failure(task.id().clone(), trace))
        }
    }
}

/// Wrap a user function into a backend job
pub fn isolated_job(function: Arc<dyn EvaluationFunction>, args: Arc<ExtraArgs>) -> TaskJob {
    Arc::new(move |task: TaskRecord| attempt(&task, function.as_ref(), &args))
}
