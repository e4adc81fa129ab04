//! A periodic heartbeat timer that can be suppressed by resetting it.
//!
//! Used to skip heartbeats while an authoritative event stream is
//! healthy: every event resets the timer, and the callback only fires
//! after a full quiet period.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// A worker waits up to `period`; if no reset arrives the callback
/// fires and the next wait starts immediately. Any reset restarts the
/// wait from zero, so the next callback is at least `period` after the
/// most recent reset. Only the latest reset matters; there is no queue.
pub struct ResettableHeartbeater {
    name: String,
    period: Duration,
    callback: Arc<dyn Fn() -> Result<()> + Send + Sync>,
    reset_notify: Arc<Notify>,
    worker: Mutex<Option<Worker>>,
}

impl ResettableHeartbeater {
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        callback: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            period,
            callback: Arc::new(callback),
            reset_notify: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    /// Launch the worker. Fails if already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(ClientError::IllegalState(format!(
                "heartbeater {} already started",
                self.name
            )));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let notify = self.reset_notify.clone();
        let callback = self.callback.clone();
        let period = self.period;
        let name = self.name.clone();

        let handle = tokio::spawn(async move {
            debug!(heartbeater = %name, ?period, "heartbeat worker started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        // A failing callback is logged, not fatal.
                        if let Err(e) = callback() {
                            warn!(heartbeater = %name, error = %e, "heartbeat callback failed");
                        }
                    }
                    _ = notify.notified() => {
                        // Reset: restart the wait from zero.
                    }
                    _ = shutdown_rx.changed() => {
                        debug!(heartbeater = %name, "heartbeat worker stopping");
                        break;
                    }
                }
            }
        });

        *worker = Some(Worker {
            handle,
            shutdown_tx,
        });
        Ok(())
    }

    /// Restart the current wait. Non-blocking, safe from any thread,
    /// safe concurrently with `stop` (stop wins).
    pub fn reset(&self) {
        self.reset_notify.notify_one();
    }

    /// Stop the worker and wait for it, letting an in-flight callback
    /// finish. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            let _ = worker.shutdown_tx.send(true);
            let _ = worker.handle.await;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
