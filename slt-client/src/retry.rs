use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Drive a polling probe until it reports completion or `deadline`
/// passes.
///
/// The probe returns its status plus a retry flag: `false` means the
/// status is final and is returned verbatim; `true` means poll again.
/// When the deadline passes the last probe status is discarded in favor
/// of `TimedOut(timeout_msg)`. An already-expired deadline returns
/// `TimedOut` without invoking the probe at all.
///
/// Between attempts the driver sleeps for a wait that starts at 1 ms
/// and grows by 5/4 per attempt, clamped to the time remaining minus
/// the duration of the last attempt; the sleep is skipped when that
/// clamp is not positive.
pub async fn retry_until<F, Fut>(
    deadline: Instant,
    retry_msg: &str,
    timeout_msg: &str,
    mut probe: F,
) -> Result<()>
where
    F: FnMut(Instant) -> Fut,
    Fut: Future<Output = (Result<()>, bool)>,
{
    let mut now = Instant::now();
    if now >= deadline {
        return Err(ClientError::TimedOut(timeout_msg.to_string()));
    }

    let mut wait_time = Duration::from_millis(1);
    loop {
        let attempt_start = now;
        let (status, retry) = probe(deadline).await;
        if !retry {
            return status;
        }

        now = Instant::now();
        if now >= deadline {
            break;
        }

        match &status {
            Ok(()) => debug!("{} status=OK", retry_msg),
            Err(e) => debug!("{} status={}", retry_msg, e),
        }

        let attempt_duration = now - attempt_start;
        let remaining = deadline - now;
        if remaining > attempt_duration {
            wait_time = std::cmp::min(wait_time * 5 / 4, remaining - attempt_duration);
            tokio::time::sleep(wait_time).await;
            now = Instant::now();
        }
    }

    Err(ClientError::TimedOut(timeout_msg.to_string()))
}
