//! Vectorized frame backend
//!
//! Rebuilds each batch as column-oriented partitions, evaluates partitions
//! concurrently on the blocking pool and flattens the per-partition results
//! back into individual attempts. Output columns cannot be inferred from a
//! partitioned frame before it is computed, so callers must declare them.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{AttemptStream, BackendError, DispatchContext, Mapper};
use crate::config::BackendKind;
use crate::execution::batcher::{batch, chunk};
use crate::execution::isolation::Attempt;
use crate::models::{Row, TaskId, TaskRecord};

/// Column-oriented slice of a batch
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    ids: Vec<TaskId>,
    columns: Vec<(String, Vec<Value>)>,
}

impl Frame {
    fn from_records(records: Vec<TaskRecord>) -> Self {
        let mut names: Vec<String> = Vec::new();
        for record in &records {
            for name in record.inputs().keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }

        let mut columns: Vec<(String, Vec<Value>)> = names
            .into_iter()
            .map(|name| (name, Vec::with_capacity(records.len())))
            .collect();
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let (id, inputs) = record.into_parts();
            for (name, values) in &mut columns {
                values.push(inputs.get(name).cloned().unwrap_or(Value::Null));
            }
            ids.push(id);
        }

        Self { ids, columns }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    /// Apply the job row-wise over the partition
    fn evaluate(self, ctx: &DispatchContext) -> Vec<Attempt> {
        let Frame { ids, columns } = self;
        let records = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let inputs: Row = columns
                    .iter()
                    .map(|(name, values)| {
                        (name.clone(), values.get(index).cloned().unwrap_or(Value::Null))
                    })
                    .collect();
                TaskRecord::new(id, inputs)
            })
            .collect();
        ctx.run_chunk(records)
    }
}

#[derive(Debug)]
pub struct VectorizedFrameBackend {
    partitions: usize,
    chunk_size: Option<usize>,
    closed: AtomicBool,
}

impl VectorizedFrameBackend {
    pub fn new(partitions: usize, chunk_size: Option<usize>) -> Self {
        let partitions = partitions.max(1);
        info!(partitions, chunk_size = ?chunk_size, "Vectorized frame backend ready");
        Self {
            partitions,
            chunk_size,
            closed: AtomicBool::new(false),
        }
    }

    /// `chunk_size` rows per partition, or the batch split into `partitions` parts
    fn partition(&self, tasks: Vec<TaskRecord>) -> Vec<Frame> {
        let groups = match self.chunk_size {
            Some(size) => chunk(tasks, Some(size)),
            None => {
                let size = tasks.len().div_ceil(self.partitions);
                batch(tasks, Some(size))
            }
        };
        groups.into_iter().map(Frame::from_records).collect()
    }
}

#[async_trait]
impl Mapper for VectorizedFrameBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::VectorizedFrame
    }

    fn parallelism(&self) -> usize {
        self.partitions
    }

    fn requires_output_schema(&self) -> bool {
        true
    }

    fn dispatch(
        &self,
        ctx: DispatchContext,
        tasks: Vec<TaskRecord>,
    ) -> Result<AttemptStream, BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::ShutDown {
                backend: BackendKind::VectorizedFrame,
            });
        }

        let frames = self.partition(tasks);
        debug!(
            partitions = frames.len(),
            rows = frames.iter().map(Frame::len).sum::<usize>(),
            "Computing frame partitions"
        );

        let attempts = stream::iter(frames)
            .map(move |frame| {
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || frame.evaluate(&ctx))
            })
            .buffer_unordered(self.partitions)
            .flat_map(|computed| {
                let attempts: Vec<Result<Attempt, BackendError>> = match computed {
                    Ok(attempts) => attempts.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(BackendError::WorkerLost(format!(
                        "partition failed: {e}"
                    )))],
                };
                stream::iter(attempts)
            });
        Ok(attempts.boxed())
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Vectorized frame backend shut down");
        }
    }
}
