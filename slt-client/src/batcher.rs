//! Accumulates mutations for one asynchronous flush.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use slt_wire::{WriteOp, WriteOpType, WriteRequest};
use tracing::trace;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::error_collector::{ErrorCollector, SessionError};
use crate::rpc::TabletServerRpc;
use crate::session::{FlushCallback, Session};
use crate::write_op::Insert;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct BatcherState {
    ops: Vec<Insert>,
    flushing: bool,
    aborted: bool,
}

/// A bounded accumulator of mutations. The session rotates batchers on
/// every flush: the previous batcher drains on a spawned task while a
/// fresh one starts buffering. Holds the session weakly (the session
/// owns its batchers) and the error collector strongly (flushes may
/// finish after the session is gone).
pub(crate) struct Batcher {
    id: u64,
    client: Arc<Client>,
    session: Weak<Session>,
    error_collector: Arc<ErrorCollector>,
    timeout_ms: AtomicU64,
    state: Mutex<BatcherState>,
}

impl Batcher {
    pub fn new(
        id: u64,
        client: Arc<Client>,
        session: Weak<Session>,
        error_collector: Arc<ErrorCollector>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            id,
            client,
            session,
            error_collector,
            timeout_ms: AtomicU64::new(timeout_ms),
            state: Mutex::new(BatcherState {
                ops: Vec::new(),
                flushing: false,
                aborted: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn add(&self, insert: Insert) {
        let mut state = lock(&self.state);
        assert!(!state.aborted, "add to an aborted batcher");
        debug_assert!(!state.flushing, "add after flush started");
        state.ops.push(insert);
    }

    /// True while mutations are buffered or a flush is in progress.
    pub fn has_pending_operations(&self) -> bool {
        let state = lock(&self.state);
        !state.ops.is_empty() || state.flushing
    }

    pub fn count_buffered_operations(&self) -> usize {
        lock(&self.state).ops.len()
    }

    pub fn set_timeout_millis(&self, millis: u64) {
        self.timeout_ms.store(millis, Ordering::Relaxed);
    }

    fn write_timeout(&self) -> Duration {
        match self.timeout_ms.load(Ordering::Relaxed) {
            0 => DEFAULT_WRITE_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    /// Drain the buffered mutations on a spawned task. On completion
    /// the owning session (if still alive) is told first, then the
    /// user callback fires with the batch's transport status.
    pub fn flush_async(self: &Arc<Self>, callback: FlushCallback) {
        let ops = {
            let mut state = lock(&self.state);
            state.flushing = true;
            std::mem::take(&mut state.ops)
        };
        let timeout = self.write_timeout();
        let batcher = self.clone();

        tokio::spawn(async move {
            let status = batcher.flush_batch(ops, timeout).await;

            lock(&batcher.state).flushing = false;
            if let Some(session) = batcher.session.upgrade() {
                session.flush_finished(batcher.id);
            }
            callback(status);
        });
    }

    /// Discard buffered mutations without sending them.
    pub fn abort(&self) {
        let mut state = lock(&self.state);
        state.aborted = true;
        state.ops.clear();
    }

    /// Send the batch, one write RPC per table. Mutation-level failures
    /// go to the error collector; only transport/RPC failures become
    /// the batch status.
    async fn flush_batch(&self, ops: Vec<Insert>, timeout: Duration) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        trace!(batcher = self.id, ops = ops.len(), "flushing batch");

        // Group by tablet; one tablet per table for now.
        let mut groups: HashMap<String, Vec<Insert>> = HashMap::new();
        for op in ops {
            groups
                .entry(op.table().tablet_id().to_string())
                .or_default()
                .push(op);
        }

        let mut batch_status: Result<()> = Ok(());
        for (tablet_id, group) in groups {
            if let Err(e) = self.write_group(&tablet_id, group, timeout).await {
                if batch_status.is_ok() {
                    batch_status = Err(e);
                }
            }
        }
        batch_status
    }

    async fn write_group(
        &self,
        tablet_id: &str,
        group: Vec<Insert>,
        timeout: Duration,
    ) -> Result<()> {
        let schema = group[0].table().schema().clone();

        // Encode rows first; inserts that fail to encode become
        // collector entries and drop out of the request.
        let mut sendable = Vec::with_capacity(group.len());
        let mut wire_ops = Vec::with_capacity(group.len());
        for insert in group {
            match insert.row().encode() {
                Ok(row) => {
                    wire_ops.push(WriteOp {
                        op_type: WriteOpType::Insert,
                        row,
                    });
                    sendable.push(insert);
                }
                Err(e) => {
                    self.error_collector
                        .add(SessionError::new(insert, ClientError::from(e)));
                }
            }
        }
        if sendable.is_empty() {
            return Ok(());
        }

        let proxy = match self.client.tablet_proxy(tablet_id).await {
            Ok(proxy) => proxy,
            Err(e) => {
                self.fail_all(sendable, &e);
                return Err(e);
            }
        };

        let req = WriteRequest {
            tablet_id: tablet_id.to_string(),
            schema,
            ops: wire_ops,
        };

        // The per-operation timeout bounds the call even when the
        // proxy implementation ignores its timeout argument.
        let write_result = match tokio::time::timeout(timeout, proxy.write(req, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::TimedOut(format!(
                "write to tablet {} timed out after {:?}",
                tablet_id, timeout
            ))),
        };

        match write_result {
            Ok(resp) => {
                if let Some(err) = resp.error {
                    let status = ClientError::from_wire(err);
                    self.fail_all(sendable, &status);
                    return Err(status);
                }
                // Per-row rejections are collector-only; the batch
                // itself succeeded.
                let mut failed: HashMap<u32, ClientError> = resp
                    .per_row_errors
                    .into_iter()
                    .map(|e| (e.row_index, ClientError::from_wire(e.error)))
                    .collect();
                for (idx, insert) in sendable.into_iter().enumerate() {
                    if let Some(status) = failed.remove(&(idx as u32)) {
                        self.error_collector.add(SessionError::new(insert, status));
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.fail_all(sendable, &e);
                Err(e)
            }
        }
    }

    fn fail_all(&self, inserts: Vec<Insert>, status: &ClientError) {
        for insert in inserts {
            self.error_collector
                .add(SessionError::new(insert, status.clone()));
        }
    }
}
