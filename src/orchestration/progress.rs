//! Progress side channel
//!
//! Completed-task counts against the residual total, published on a tokio
//! `watch` channel and logged every tenth of the way. Purely observational.

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::constants::defaults::PROGRESS_LOG_FRACTION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

#[derive(Debug)]
pub(crate) struct ProgressReporter<'a> {
    run_id: Uuid,
    channel: &'a watch::Sender<Progress>,
    progress: Progress,
    log_every: usize,
    next_log: usize,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn start(run_id: Uuid, channel: &'a watch::Sender<Progress>, total: usize) -> Self {
        let log_every = ((total as f64 * PROGRESS_LOG_FRACTION).ceil() as usize).max(1);
        let progress = Progress {
            completed: 0,
            total,
        };
        channel.send_replace(progress);
        Self {
            run_id,
            channel,
            progress,
            log_every,
            next_log: log_every,
        }
    }

    pub(crate) fn record(&mut self) {
        self.progress.completed += 1;
        self.channel.send_replace(self.progress);

        if self.progress.completed >= self.next_log || self.progress.is_complete() {
            info!(
                run_id = %self.run_id,
                completed = self.progress.completed,
                total = self.progress.total,
                percent = (self.progress.fraction() * 100.0).round() as u64,
                "Evaluation progress"
            );
            self.next_log = self.progress.completed + self.log_every;
        }
    }
}
