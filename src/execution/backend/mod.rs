//! # Backend Mappers
//!
//! Every execution backend satisfies one capability contract, [`Mapper`]:
//! take a job and a batch of tasks, return a stream of attempts in whatever
//! order the workers finish. Each task is paired with its id before dispatch
//! (the job returns an [`Attempt`] tagged with it), so completion order never
//! matters to the caller.
//!
//! ## Variants
//!
//! | Backend | Scheduling |
//! |---|---|
//! | [`SerialBackend`] | inline on poll, fully ordered |
//! | [`WorkerPoolBackend`] | fixed OS thread pool fed by a shared queue |
//! | [`DistributedBackend`] | blocking futures, in-flight capped, yielded as completed |
//! | [`InteractiveBackend`] | long-lived engines behind a load-balanced scheduler |
//! | [`VectorizedFrameBackend`] | column partitions evaluated concurrently, flattened |
//!
//! The set is closed; [`BackendRegistry`] decides which of them this build
//! offers and constructs them from a [`BackendConfig`](crate::config::BackendConfig).
//!
//! ## Interrupts
//!
//! [`DispatchContext`] carries the run's [`InterruptSignal`]. Once it is raised
//! a backend starts no new unit of work; results already produced stay
//! readable so the run loop can drain them without triggering more work.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

use crate::config::BackendKind;
use crate::execution::interrupt::InterruptSignal;
use crate::execution::isolation::{Attempt, TaskJob};
use crate::models::{TaskId, TaskRecord};

pub mod registry;
pub mod serial;
pub mod worker_pool;

#[cfg(feature = "distributed")]
pub mod distributed;
#[cfg(feature = "interactive")]
pub mod interactive;
#[cfg(feature = "vectorized-frame")]
pub mod vectorized_frame;

pub use registry::BackendRegistry;
pub use serial::SerialBackend;
pub use worker_pool::WorkerPoolBackend;

#[cfg(feature = "distributed")]
pub use distributed::DistributedBackend;
#[cfg(feature = "interactive")]
pub use interactive::InteractiveBackend;
#[cfg(feature = "vectorized-frame")]
pub use vectorized_frame::VectorizedFrameBackend;

/// Failures of the execution machinery itself (never of the user function)
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend failed to start: {0}")]
    Startup(String),

    #[error("The {backend} backend has been shut down")]
    ShutDown { backend: BackendKind },

    #[error("Worker lost: {0}")]
    WorkerLost(String),

    #[error("Backend delivered {received} of {expected} outcomes for a batch")]
    IncompleteBatch { expected: usize, received: usize },

    #[error("Backend delivered an outcome for unknown task '{0}'")]
    UnknownTask(TaskId),
}

/// Unordered stream of attempts for one dispatched batch
pub type AttemptStream = BoxStream<'static, Result<Attempt, BackendError>>;

/// Everything a backend needs to run one batch
#[derive(Clone)]
pub struct DispatchContext {
    pub job: TaskJob,
    pub interrupt: InterruptSignal,
}

impl DispatchContext {
    pub fn new(job: TaskJob, interrupt: InterruptSignal) -> Self {
        Self { job, interrupt }
    }

    /// Run `chunk` unless interrupted, stopping at the first task after the interrupt
    pub(crate) fn run_chunk(&self, chunk: Vec<TaskRecord>) -> Vec<Attempt> {
        let mut attempts = Vec::with_capacity(chunk.len());
        for task in chunk {
            if self.interrupt.is_triggered() {
                break;
            }
            attempts.push((self.job)(task));
        }
        attempts
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("interrupted", &self.interrupt.is_triggered())
            .finish()
    }
}

/// Capability contract shared by every backend
#[async_trait]
pub trait Mapper: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Number of tasks the backend can run at once
    fn parallelism(&self) -> usize;

    /// Whether the caller must declare output columns up front
    fn requires_output_schema(&self) -> bool {
        false
    }

    /// Start evaluating `batch`; outcomes arrive in completion order
    fn dispatch(
        &self,
        ctx: DispatchContext,
        batch: Vec<TaskRecord>,
    ) -> Result<AttemptStream, BackendError>;

    /// Release workers and connections; safe to call repeatedly or never
    async fn shutdown(&self);
}
