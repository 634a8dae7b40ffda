//! # Interactive Backend
//!
//! A set of long-lived engines, each an async task with its own inbox, fed by
//! a per-batch scheduler. The scheduler hands every chunk to the engine with
//! the fewest outstanding chunks, and waits once every engine is at the
//! high-water mark. Engines run their chunks on the blocking pool and report
//! each attempt as soon as its chunk finishes.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::channel::mpsc as results_channel;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AttemptStream, BackendError, DispatchContext, Mapper};
use crate::config::BackendKind;
use crate::execution::batcher::chunk;
use crate::execution::isolation::Attempt;
use crate::models::TaskRecord;

type AttemptSender = results_channel::UnboundedSender<Result<Attempt, BackendError>>;

struct Assignment {
    ctx: DispatchContext,
    chunk: Vec<TaskRecord>,
    results: AttemptSender,
}

/// Outstanding chunks per engine
#[derive(Debug, Default)]
struct EngineLoad {
    outstanding: DashMap<usize, usize>,
    freed: Notify,
}

impl EngineLoad {
    fn least_loaded(&self, high_water_mark: usize) -> Option<usize> {
        self.outstanding
            .iter()
            .filter(|entry| *entry.value() < high_water_mark)
            .min_by_key(|entry| (*entry.value(), *entry.key()))
            .map(|entry| *entry.key())
    }

    fn acquire(&self, engine: usize) {
        *self.outstanding.entry(engine).or_insert(0) += 1;
    }

    fn release(&self, engine: usize) {
        if let Some(mut outstanding) = self.outstanding.get_mut(&engine) {
            *outstanding = outstanding.saturating_sub(1);
        }
        self.freed.notify_one();
    }
}

#[derive(Debug)]
pub struct InteractiveBackend {
    engines: usize,
    high_water_mark: usize,
    chunk_size: Option<usize>,
    runtime: Handle,
    load: Arc<EngineLoad>,
    inboxes: Mutex<Option<Vec<mpsc::UnboundedSender<Assignment>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl InteractiveBackend {
    /// Start `engines` engines on the current tokio runtime
    pub fn start(
        engines: usize,
        high_water_mark: usize,
        chunk_size: Option<usize>,
    ) -> Result<Self, BackendError> {
        let runtime = Handle::try_current().map_err(|e| {
            BackendError::Startup(format!("interactive engines need a tokio runtime: {e}"))
        })?;
        let engines = engines.max(1);
        let high_water_mark = high_water_mark.max(1);
        let load = Arc::new(EngineLoad::default());

        let mut inboxes = Vec::with_capacity(engines);
        let mut handles = Vec::with_capacity(engines);
        for index in 0..engines {
            let (inbox, receiver) = mpsc::unbounded_channel();
            load.outstanding.insert(index, 0);
            handles.push(runtime.spawn(engine_loop(index, receiver, load.clone())));
            inboxes.push(inbox);
        }

        info!(engines, high_water_mark, chunk_size = ?chunk_size, "Interactive engines started");

        Ok(Self {
            engines,
            high_water_mark,
            chunk_size,
            runtime,
            load,
            inboxes: Mutex::new(Some(inboxes)),
            handles: Mutex::new(handles),
        })
    }
}

async fn engine_loop(
    index: usize,
    mut inbox: mpsc::UnboundedReceiver<Assignment>,
    load: Arc<EngineLoad>,
) {
    while let Some(Assignment {
        ctx,
        chunk,
        results,
    }) = inbox.recv().await
    {
        let attempts = tokio::task::spawn_blocking(move || ctx.run_chunk(chunk)).await;
        load.release(index);

        match attempts {
            Ok(attempts) => {
                for attempt in attempts {
                    if results.unbounded_send(Ok(attempt)).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                let _ = results.unbounded_send(Err(BackendError::WorkerLost(format!(
                    "engine {index}: {e}"
                ))));
            }
        }
    }
    debug!(engine = index, "Engine stopped");
}

async fn schedule(
    chunks: Vec<Vec<TaskRecord>>,
    ctx: DispatchContext,
    inboxes: Vec<mpsc::UnboundedSender<Assignment>>,
    load: Arc<EngineLoad>,
    high_water_mark: usize,
    results: AttemptSender,
) {
    'chunks: for chunk in chunks {
        let engine = loop {
            if ctx.interrupt.is_triggered() || results.is_closed() {
                break 'chunks;
            }
            if let Some(engine) = load.least_loaded(high_water_mark) {
                break engine;
            }
            tokio::select! {
                _ = load.freed.notified() => {}
                _ = ctx.interrupt.triggered() => {}
            }
        };

        load.acquire(engine);
        let assignment = Assignment {
            ctx: ctx.clone(),
            chunk,
            results: results.clone(),
        };
        if inboxes[engine].send(assignment).is_err() {
            load.release(engine);
            warn!(engine, "Engine inbox closed while scheduling");
            let _ = results.unbounded_send(Err(BackendError::WorkerLost(format!(
                "engine {engine} stopped"
            ))));
            break;
        }
    }
}

#[async_trait]
impl Mapper for InteractiveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Interactive
    }

    fn parallelism(&self) -> usize {
        self.engines
    }

    fn dispatch(
        &self,
        ctx: DispatchContext,
        batch: Vec<TaskRecord>,
    ) -> Result<AttemptStream, BackendError> {
        let inboxes = self
            .inboxes
            .lock()
            .clone()
            .ok_or(BackendError::ShutDown {
                backend: BackendKind::Interactive,
            })?;

        let (results, receiver) = results_channel::unbounded();
        self.runtime.spawn(schedule(
            chunk(batch, self.chunk_size),
            ctx,
            inboxes,
            self.load.clone(),
            self.high_water_mark,
            results,
        ));
        Ok(receiver.boxed())
    }

    async fn shutdown(&self) {
        let Some(inboxes) = self.inboxes.lock().take() else {
            return;
        };
        drop(inboxes);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Engine terminated abnormally");
            }
        }
        info!(engines = self.engines, "Interactive engines shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::interrupt::InterruptSignal;
    use crate::execution::isolation::TaskJob;
    use crate::models::{Outcome, Row};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn tasks(n: usize) -> Vec<TaskRecord> {
        (0..n).map(|i| TaskRecord::new(i, Row::new())).collect()
    }

    #[test]
    fn start_requires_runtime() {
        assert!(matches!(
            InteractiveBackend::start(2, 1, None),
            Err(BackendError::Startup(_))
        ));
    }

    #[test]
    fn least_loaded_respects_high_water_mark() {
        let load = EngineLoad::default();
        load.outstanding.insert(0, 0);
        load.outstanding.insert(1, 0);

        assert_eq!(load.least_loaded(1), Some(0));
        load.acquire(0);
        assert_eq!(load.least_loaded(1), Some(1));
        load.acquire(1);
        assert_eq!(load.least_loaded(1), None);
        assert_eq!(load.least_loaded(2), Some(0));
        load.release(1);
        assert_eq!(load.least_loaded(1), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn engines_process_every_chunk() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let job: TaskJob = {
            let (running, peak) = (running.clone(), peak.clone());
            Arc::new(move |task: TaskRecord| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                Attempt::Completed(Outcome::success(task.id().clone(), Row::new()))
            })
        };

        let backend = InteractiveBackend::start(2, 1, Some(2)).unwrap();
        let ctx = DispatchContext::new(job, InterruptSignal::new());
        let attempts: Vec<_> = backend.dispatch(ctx, tasks(11)).unwrap().collect().await;

        assert_eq!(attempts.len(), 11);
        assert!(attempts.iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);

        backend.shutdown().await;
        backend.shutdown().await;
    }
}
