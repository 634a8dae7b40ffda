//! # Worker Pool Backend
//!
//! Fixed pool of named OS threads pulling chunks from one shared crossbeam
//! queue. Each dispatched batch gets its own result channel; a chunk holds a
//! sender clone, so the batch stream ends exactly when its last chunk has been
//! processed (or skipped after an interrupt).
//!
//! Worker threads are regular (non-daemon) threads: user functions may spawn
//! their own threads or processes. [`Mapper::shutdown`] closes the queue and
//! joins every worker.

use async_trait::async_trait;
use crossbeam::channel::{self, Receiver, Sender};
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::{AttemptStream, BackendError, DispatchContext, Mapper};
use crate::config::BackendKind;
use crate::execution::batcher::chunk;
use crate::execution::isolation::Attempt;
use crate::models::TaskRecord;

type AttemptSender = mpsc::UnboundedSender<Result<Attempt, BackendError>>;

/// One chunk of one batch, queued for any free worker
struct WorkItem {
    ctx: DispatchContext,
    chunk: Vec<TaskRecord>,
    results: AttemptSender,
}

#[derive(Debug)]
pub struct WorkerPoolBackend {
    processes: usize,
    chunk_size: Option<usize>,
    queue: Mutex<Option<Sender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPoolBackend {
    /// Spawn `processes` worker threads
    pub fn start(processes: usize, chunk_size: Option<usize>) -> Result<Self, BackendError> {
        let processes = processes.max(1);
        let (sender, receiver) = channel::unbounded::<WorkItem>();

        let mut workers = Vec::with_capacity(processes);
        for index in 0..processes {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("evaluator-worker-{index}"))
                .spawn(move || worker_loop(index, receiver))
                .map_err(|e| BackendError::Startup(format!("failed to spawn worker {index}: {e}")))?;
            workers.push(handle);
        }

        info!(processes, chunk_size = ?chunk_size, "Worker pool started");

        Ok(Self {
            processes,
            chunk_size,
            queue: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }
}

fn worker_loop(index: usize, queue: Receiver<WorkItem>) {
    debug!(worker = index, "Worker waiting for chunks");
    while let Ok(item) = queue.recv() {
        let WorkItem {
            ctx,
            chunk,
            results,
        } = item;
        for task in chunk {
            if ctx.interrupt.is_triggered() {
                break;
            }
            if results.unbounded_send(Ok((ctx.job)(task))).is_err() {
                // consumer dropped the batch stream
                break;
            }
        }
    }
    debug!(worker = index, "Worker exiting");
}

#[async_trait]
impl Mapper for WorkerPoolBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::WorkerPool
    }

    fn parallelism(&self) -> usize {
        self.processes
    }

    fn dispatch(
        &self,
        ctx: DispatchContext,
        batch: Vec<TaskRecord>,
    ) -> Result<AttemptStream, BackendError> {
        let guard = self.queue.lock();
        let queue = guard.as_ref().ok_or(BackendError::ShutDown {
            backend: BackendKind::WorkerPool,
        })?;

        let (results, receiver) = mpsc::unbounded();
        for chunk in chunk(batch, self.chunk_size) {
            let item = WorkItem {
                ctx: ctx.clone(),
                chunk,
                results: results.clone(),
            };
            queue
                .send(item)
                .map_err(|_| BackendError::WorkerLost("worker queue disconnected".to_string()))?;
        }

        Ok(receiver.boxed())
    }

    async fn shutdown(&self) {
        let Some(queue) = self.queue.lock().take() else {
            return;
        };
        drop(queue);

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let count = workers.len();
        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(JoinHandle::join)
                .filter(Result::is_err)
                .count()
        })
        .await;

        match joined {
            Ok(0) => info!(workers = count, "Worker pool shut down"),
            Ok(panicked) => warn!(workers = count, panicked, "Worker pool shut down with panicked workers"),
            Err(e) => error!(error = %e, "Failed to join worker threads"),
        }
    }
}

impl Drop for WorkerPoolBackend {
    fn drop(&mut self) {
        // closing the queue lets idle workers exit
        self.queue.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::interrupt::InterruptSignal;
    use crate::execution::isolation::TaskJob;
    use crate::models::{Outcome, Row, TaskId};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn tasks(n: usize) -> Vec<TaskRecord> {
        (0..n).map(|i| TaskRecord::new(i, Row::new())).collect()
    }

    fn sleepy_job() -> TaskJob {
        Arc::new(|task: TaskRecord| {
            // later tasks finish first
            let index: u64 = task.id().as_str().parse().unwrap();
            thread::sleep(Duration::from_millis(20u64.saturating_sub(index * 2)));
            Attempt::Completed(Outcome::success(task.id().clone(), Row::new()))
        })
    }

    fn completed_ids(attempts: Vec<Result<Attempt, BackendError>>) -> HashSet<TaskId> {
        attempts
            .into_iter()
            .map(|a| match a.unwrap() {
                Attempt::Completed(o) => o.id,
                Attempt::Interrupted(id) => id,
            })
            .collect()
    }

    #[tokio::test]
    async fn every_task_yields_exactly_one_attempt() {
        let pool = WorkerPoolBackend::start(4, Some(2)).unwrap();
        let ctx = DispatchContext::new(sleepy_job(), InterruptSignal::new());

        let attempts: Vec<_> = pool.dispatch(ctx, tasks(9)).unwrap().collect().await;
        assert_eq!(attempts.len(), 9);
        assert_eq!(
            completed_ids(attempts),
            (0..9usize).map(TaskId::from).collect::<HashSet<_>>()
        );

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_fails() {
        let pool = WorkerPoolBackend::start(2, None).unwrap();
        pool.shutdown().await;
        pool.shutdown().await;

        let ctx = DispatchContext::new(sleepy_job(), InterruptSignal::new());
        assert!(matches!(
            pool.dispatch(ctx, tasks(1)),
            Err(BackendError::ShutDown { .. })
        ));
    }

    #[tokio::test]
    async fn interrupted_batches_skip_queued_chunks() {
        let pool = WorkerPoolBackend::start(1, None).unwrap();
        let interrupt = InterruptSignal::new();
        interrupt.trigger();
        let ctx = DispatchContext::new(sleepy_job(), interrupt);

        let attempts: Vec<_> = pool.dispatch(ctx, tasks(5)).unwrap().collect().await;
        assert!(attempts.is_empty());
        pool.shutdown().await;
    }
}
