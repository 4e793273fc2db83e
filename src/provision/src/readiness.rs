//! Bounded poll-or-timeout gate for asynchronous cluster conditions.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Terminal state of one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Ready,
    TimedOut,
}

/// Re-check `check` every `interval` until it returns true or `timeout`
/// has elapsed since the first check.
///
/// The condition is checked once immediately. A check that reports false
/// after the deadline yields [`GateOutcome::TimedOut`].
pub async fn poll_until<F, Fut>(interval: Duration, timeout: Duration, mut check: F) -> GateOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if check().await {
            tracing::info!("[ReadinessGate] Condition met after {} checks", attempts);
            return GateOutcome::Ready;
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                "[ReadinessGate] Timed out after {}s ({} checks)",
                timeout.as_secs(),
                attempts
            );
            return GateOutcome::TimedOut;
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
