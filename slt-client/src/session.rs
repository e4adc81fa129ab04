//! Write session: buffers mutations into batchers and flushes them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::oneshot;
use tracing::warn;

use crate::batcher::Batcher;
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::error_collector::{ErrorCollector, SessionError};
use crate::write_op::Insert;

const DEFAULT_MAX_PENDING_ERRORS: usize = 100;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// How `apply` interacts with flushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Every `apply` flushes synchronously before returning.
    AutoFlushSync,
    /// Background flushing. Declared but not implemented.
    AutoFlushBackground,
    /// Mutations accumulate until the caller flushes.
    ManualFlush,
}

/// Callback invoked with a batch's flush status.
pub type FlushCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

struct SessionInner {
    flush_mode: FlushMode,
    timeout_ms: u64,
    current: Arc<Batcher>,
    in_flight: HashMap<u64, Arc<Batcher>>,
}

/// A write session. All mutable state sits behind one non-reentrant
/// lock; batcher calls that can complete inline and re-enter the
/// session are always made outside it.
pub struct Session {
    client: Arc<Client>,
    error_collector: Arc<ErrorCollector>,
    weak_self: Weak<Session>,
    next_batcher_id: AtomicU64,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(client: Arc<Client>) -> Arc<Session> {
        Arc::new_cyclic(|weak: &Weak<Session>| {
            let error_collector = Arc::new(ErrorCollector::new(DEFAULT_MAX_PENDING_ERRORS));
            let current = Arc::new(Batcher::new(
                0,
                client.clone(),
                weak.clone(),
                error_collector.clone(),
                0,
            ));
            Session {
                client,
                error_collector,
                weak_self: weak.clone(),
                next_batcher_id: AtomicU64::new(1),
                inner: Mutex::new(SessionInner {
                    flush_mode: FlushMode::AutoFlushSync,
                    timeout_ms: 0,
                    current,
                    in_flight: HashMap::new(),
                }),
            }
        })
    }

    /// Change the flush policy. Refused while mutations are buffered;
    /// setting the mode already in effect is a no-op.
    pub fn set_flush_mode(&self, mode: FlushMode) -> Result<()> {
        let mut inner = lock(&self.inner);
        if mode == inner.flush_mode {
            return Ok(());
        }
        if inner.current.has_pending_operations() {
            return Err(ClientError::IllegalState(
                "cannot change flush mode when writes are buffered".to_string(),
            ));
        }
        if mode == FlushMode::AutoFlushBackground {
            return Err(ClientError::InvalidArgument(
                "flush mode not supported".to_string(),
            ));
        }
        inner.flush_mode = mode;
        Ok(())
    }

    /// Set the per-operation timeout, propagated to the current
    /// batcher. Zero selects the default write timeout.
    pub fn set_timeout_millis(&self, millis: u64) {
        let mut inner = lock(&self.inner);
        inner.timeout_ms = millis;
        inner.current.set_timeout_millis(millis);
    }

    /// Hand a mutation to the current batcher. In `AutoFlushSync` mode
    /// the batch is flushed before returning.
    pub async fn apply(&self, insert: Insert) -> Result<()> {
        if !insert.row().is_key_set() {
            return Err(ClientError::IllegalState(format!(
                "key not specified: {:?}",
                insert
            )));
        }

        let (batcher, auto_flush) = {
            let inner = lock(&self.inner);
            (
                inner.current.clone(),
                inner.flush_mode == FlushMode::AutoFlushSync,
            )
        };
        // Batcher calls happen outside the session lock.
        batcher.add(insert);

        if auto_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flush synchronously: rotate the batcher and wait for the batch
    /// to complete.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.flush_async(Box::new(move |status| {
            let _ = tx.send(status);
        }));
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Rotate the current batcher into the in-flight set and start it
    /// draining. The callback fires with the batch's status, possibly
    /// on another task.
    pub fn flush_async(&self, callback: FlushCallback) {
        let previous = {
            let mut inner = lock(&self.inner);
            let fresh = Arc::new(Batcher::new(
                self.next_batcher_id.fetch_add(1, Ordering::Relaxed),
                self.client.clone(),
                self.weak_self.clone(),
                self.error_collector.clone(),
                inner.timeout_ms,
            ));
            let previous = std::mem::replace(&mut inner.current, fresh);
            inner.in_flight.insert(previous.id(), previous.clone());
            previous
        };
        // Send off the buffered data outside the lock: the callback may
        // re-enter the session, including on this same thread when a
        // batch fails inline.
        previous.flush_async(callback);
    }

    /// Called by a batcher when its flush completes.
    pub(crate) fn flush_finished(&self, batcher_id: u64) {
        let removed = lock(&self.inner).in_flight.remove(&batcher_id);
        assert!(
            removed.is_some(),
            "flush_finished for batcher {} not in flight",
            batcher_id
        );
    }

    /// True while the current batcher holds mutations or any flushed
    /// batch is still in flight.
    pub fn has_pending_operations(&self) -> bool {
        let inner = lock(&self.inner);
        inner.current.has_pending_operations()
            || inner.in_flight.values().any(|b| b.has_pending_operations())
    }

    /// Number of mutations buffered in the current batcher. Only
    /// meaningful in `ManualFlush` mode.
    pub fn count_buffered_operations(&self) -> usize {
        let inner = lock(&self.inner);
        assert_eq!(
            inner.flush_mode,
            FlushMode::ManualFlush,
            "count_buffered_operations outside manual flush"
        );
        inner.current.count_buffered_operations()
    }

    pub fn count_pending_errors(&self) -> usize {
        self.error_collector.count_errors()
    }

    /// Transfer collected mutation failures to the caller. The bool
    /// reports whether the collector dropped entries due to its cap.
    pub fn get_pending_errors(&self) -> (Vec<SessionError>, bool) {
        self.error_collector.drain()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = lock(&self.inner);
        if inner.current.has_pending_operations() {
            warn!("closing session with pending operations");
        }
        // In-flight batchers keep running; they hold the collector and
        // only a weak session reference.
        inner.current.abort();
    }
}
