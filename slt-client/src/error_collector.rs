use std::sync::{Mutex, MutexGuard};

use crate::error::ClientError;
use crate::write_op::Insert;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A mutation that failed, paired with why.
pub struct SessionError {
    failed_op: Insert,
    status: ClientError,
}

impl SessionError {
    pub(crate) fn new(failed_op: Insert, status: ClientError) -> Self {
        Self { failed_op, status }
    }

    pub fn failed_op(&self) -> &Insert {
        &self.failed_op
    }

    pub fn status(&self) -> &ClientError {
        &self.status
    }

    pub fn into_parts(self) -> (Insert, ClientError) {
        (self.failed_op, self.status)
    }
}

impl std::fmt::Debug for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionError")
            .field("failed_op", &self.failed_op)
            .field("status", &self.status)
            .finish()
    }
}

struct CollectorState {
    errors: Vec<SessionError>,
    dropped: bool,
}

/// Per-session store of failed mutations. Shared (`Arc`) between the
/// session and every batcher it hands mutations to, so batchers that
/// outlive the session on the destruction path still have somewhere to
/// record failures.
pub(crate) struct ErrorCollector {
    max_errors: usize,
    state: Mutex<CollectorState>,
}

impl ErrorCollector {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            state: Mutex::new(CollectorState {
                errors: Vec::new(),
                dropped: false,
            }),
        }
    }

    /// Record a failed mutation, dropping it when the cap is reached.
    pub fn add(&self, error: SessionError) {
        let mut state = lock(&self.state);
        if state.errors.len() >= self.max_errors {
            state.dropped = true;
        } else {
            state.errors.push(error);
        }
    }

    pub fn count_errors(&self) -> usize {
        lock(&self.state).errors.len()
    }

    /// Transfer all collected errors to the caller, reporting whether
    /// any were dropped since the last drain.
    pub fn drain(&self) -> (Vec<SessionError>, bool) {
        let mut state = lock(&self.state);
        let overflowed = state.dropped;
        state.dropped = false;
        (std::mem::take(&mut state.errors), overflowed)
    }
}
