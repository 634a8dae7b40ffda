//! Distributed backend
//!
//! Ships each chunk as an independent future onto the runtime's blocking pool
//! and yields results as the futures complete. At most `workers` chunks are
//! in flight; the rest wait in submission order. A chunk whose worker is lost
//! (its future is cancelled or its thread dies) surfaces as
//! [`BackendError::WorkerLost`] and ends the batch stream.

use async_trait::async_trait;
use futures::stream::{self, FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{AttemptStream, BackendError, DispatchContext, Mapper};
use crate::config::BackendKind;
use crate::execution::batcher::chunk;
use crate::execution::isolation::Attempt;
use crate::models::TaskRecord;

#[derive(Debug)]
pub struct DistributedBackend {
    workers: usize,
    chunk_size: Option<usize>,
    closed: AtomicBool,
}

impl DistributedBackend {
    pub fn new(workers: usize, chunk_size: Option<usize>) -> Self {
        let workers = workers.max(1);
        info!(workers, chunk_size = ?chunk_size, "Distributed backend ready");
        Self {
            workers,
            chunk_size,
            closed: AtomicBool::new(false),
        }
    }
}

/// Per-batch scheduling state threaded through the result stream
struct Flight {
    ctx: DispatchContext,
    pending: VecDeque<Vec<TaskRecord>>,
    running: FuturesUnordered<JoinHandle<Vec<Attempt>>>,
    ready: VecDeque<Attempt>,
    max_in_flight: usize,
    lost: bool,
}

impl Flight {
    fn submit_pending(&mut self) {
        while self.running.len() < self.max_in_flight && !self.ctx.interrupt.is_triggered() {
            let Some(chunk) = self.pending.pop_front() else {
                break;
            };
            let ctx = self.ctx.clone();
            self.running
                .push(tokio::task::spawn_blocking(move || ctx.run_chunk(chunk)));
        }
    }

    async fn next_attempt(mut self) -> Option<(Result<Attempt, BackendError>, Self)> {
        loop {
            if let Some(attempt) = self.ready.pop_front() {
                return Some((Ok(attempt), self));
            }
            if self.lost {
                return None;
            }

            self.submit_pending();
            match self.running.next().await? {
                Ok(attempts) => self.ready.extend(attempts),
                Err(e) => {
                    self.lost = true;
                    return Some((Err(BackendError::WorkerLost(e.to_string())), self));
                }
            }
        }
    }
}

#[async_trait]
impl Mapper for DistributedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    fn parallelism(&self) -> usize {
        self.workers
    }

    fn dispatch(
        &self,
        ctx: DispatchContext,
        batch: Vec<TaskRecord>,
    ) -> Result<AttemptStream, BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::ShutDown {
                backend: BackendKind::Distributed,
            });
        }

        let pending: VecDeque<_> = chunk(batch, self.chunk_size).into();
        debug!(chunks = pending.len(), "Submitting chunks");

        let flight = Flight {
            ctx,
            pending,
            running: FuturesUnordered::new(),
            ready: VecDeque::new(),
            max_in_flight: self.workers,
            lost: false,
        };
        Ok(stream::unfold(flight, Flight::next_attempt).boxed())
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Distributed backend shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::interrupt::InterruptSignal;
    use crate::execution::isolation::TaskJob;
    use crate::models::{Outcome, Row};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn tasks(n: usize) -> Vec<TaskRecord> {
        (0..n).map(|i| TaskRecord::new(i, Row::new())).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_chunks_are_capped() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let job: TaskJob = {
            let (running, peak) = (running.clone(), peak.clone());
            Arc::new(move |task: TaskRecord| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                running.fetch_sub(1, Ordering::SeqCst);
                Attempt::Completed(Outcome::success(task.id().clone(), Row::new()))
            })
        };

        let backend = DistributedBackend::new(2, None);
        let ctx = DispatchContext::new(job, InterruptSignal::new());
        let attempts: Vec<_> = backend.dispatch(ctx, tasks(8)).unwrap().collect().await;

        assert_eq!(attempts.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn closed_backend_refuses_batches() {
        let backend = DistributedBackend::new(1, None);
        backend.shutdown().await;
        let job: TaskJob = Arc::new(|task: TaskRecord| Attempt::Interrupted(task.id().clone()));
        let ctx = DispatchContext::new(job, InterruptSignal::new());
        assert!(backend.dispatch(ctx, tasks(1)).is_err());
    }
}
