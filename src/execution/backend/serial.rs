//! Serial backend
//!
//! Evaluates each task inline when the stream is polled, in batch order.
//! Nothing runs ahead of the consumer, so an interrupt takes effect at the
//! very next task.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::{AttemptStream, BackendError, DispatchContext, Mapper};
use crate::config::BackendKind;
use crate::models::TaskRecord;

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl SerialBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mapper for SerialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Serial
    }

    fn parallelism(&self) -> usize {
        1
    }

    fn dispatch(
        &self,
        ctx: DispatchContext,
        batch: Vec<TaskRecord>,
    ) -> Result<AttemptStream, BackendError> {
        let attempts = batch.into_iter().map_while(move |task| {
            if ctx.interrupt.is_triggered() {
                None
            } else {
                Some(Ok((ctx.job)(task)))
            }
        });
        Ok(stream::iter(attempts).boxed())
    }

    async fn shutdown(&self) {}
}
