//! Background loops: retention cleanup and task status sync.

mod cleanup;
mod sync;

pub use cleanup::{CleanupReport, CleanupWorker};
pub use sync::StatusSyncWorker;

use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owns one periodic loop: its cancellation token and join handle.
struct Periodic {
    name: &'static str,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Periodic {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the loop. The first tick fires immediately. Returns `false` if already running.
    fn spawn<F, Fut>(&self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() || self.token.is_cancelled() {
            return false;
        }

        let name = self.name;
        let token = self.token.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(target: "kecs.worker", worker = name, "cancelled");
                        break;
                    }
                    _ = ticker.tick() => tick().await,
                }
            }
        }));
        debug!(target: "kecs.worker", worker = name, ?period, "started");
        true
    }

    /// Cancels the loop and waits for it to exit. Later calls do nothing.
    async fn stop(&self) {
        self.token.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(target: "kecs.worker", worker = self.name, error = %e, "worker loop panicked");
        }
    }

    fn is_running(&self) -> bool {
        let slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().is_some_and(|h| !h.is_finished())
    }
}
