//! Deferred consumer scheduling.
//!
//! [`ConsumerSignal`] is raised by the producer after every commit.
//! Raises that land before the consumer wakes collapse into a single
//! pending run, since `Notify` stores at most one permit.
//! [`DisplayWorker`] is that single consumer: a Tokio task that drains
//! every committed slot each time it is woken.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::compositor::Compositor;
use crate::error::DisplayError;
use crate::surface::Surface;

// ── ConsumerSignal ───────────────────────────────────────────────

/// Level-triggered wakeup for the consumer.
#[derive(Debug, Clone, Default)]
pub struct ConsumerSignal {
    notify: Arc<Notify>,
    raised: Arc<AtomicU64>,
}

impl ConsumerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a consumer run. Never blocks.
    pub fn raise(&self) {
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Wait until at least one raise happened since the last wakeup.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Number of raises so far (not the number of runs).
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }
}

// ── DisplayWorker ────────────────────────────────────────────────

/// Handle to the running consumer task.
///
/// The compositor (and with it the surface) is moved into the task and
/// handed back by [`stop`](Self::stop).
pub struct DisplayWorker<S: Surface> {
    handle: JoinHandle<Compositor<S>>,
    cancel: CancellationToken,
}

impl<S: Surface + 'static> DisplayWorker<S> {
    /// Spawn the consumer on the current Tokio runtime.
    pub fn spawn(mut compositor: Compositor<S>, signal: ConsumerSignal) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = signal.wait() => {
                        if let Err(e) = compositor.drain() {
                            debug!("consumer run ended early: {e}");
                        }
                    }
                }
            }

            // Render whatever was committed before the stop request.
            if let Err(e) = compositor.drain() {
                debug!("final drain: {e}");
            }
            info!("display worker stopped");
            compositor
        });

        Self { handle, cancel }
    }

    /// Stop the worker after a final drain and take the compositor back.
    pub async fn stop(self) -> Result<Compositor<S>, DisplayError> {
        self.cancel.cancel();
        Ok(self.handle.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn raises_coalesce_into_one_wakeup() {
        let signal = ConsumerSignal::new();
        signal.raise();
        signal.raise();
        signal.raise();
        assert_eq!(signal.raised(), 3);

        // One stored permit satisfies exactly one wait.
        signal.wait().await;
        let second = tokio::time::timeout(std::time::Duration::from_millis(20), signal.wait()).await;
        assert!(second.is_err());
    }
}
