//! Cooperative operator interrupt
//!
//! Shared by the run loop and every backend: once raised, backends stop
//! starting new units and the run loop stops waiting after a best-effort drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt; idempotent
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            info!("Operator interrupt raised");
        }
        self.notify.notify_waiters();
    }

    /// Lower the interrupt so the next run starts clean
    pub fn reset(&self) {
        if self.triggered.swap(false, Ordering::AcqRel) {
            debug!("Operator interrupt cleared");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolves once the interrupt has been raised
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Raise this signal on Ctrl-C until the returned listener is dropped;
    /// requires a tokio runtime
    pub fn install_ctrl_c_handler(&self) -> CtrlCListener {
        let signal = self.clone();
        let task = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => signal.trigger(),
                Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
            }
        });
        CtrlCListener { task }
    }
}

/// Background Ctrl-C listener, aborted on drop
#[derive(Debug)]
pub struct CtrlCListener {
    task: JoinHandle<()>,
}

impl CtrlCListener {
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }
}

impl Drop for CtrlCListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_wake_on_trigger() {
        let signal = InterruptSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.triggered().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!signal.is_triggered());
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn reset_rearms_the_signal() {
        let signal = InterruptSignal::new();
        signal.trigger();
        signal.reset();
        assert!(!signal.is_triggered());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.triggered().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_the_listener_stops_it() {
        let signal = InterruptSignal::new();
        let listener = signal.install_ctrl_c_handler();
        let handle = listener.abort_handle();
        assert!(!handle.is_finished());

        drop(listener);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener should be aborted");
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn already_triggered_resolves_immediately() {
        let signal = InterruptSignal::new();
        signal.trigger();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .expect("should not wait");
    }
}
