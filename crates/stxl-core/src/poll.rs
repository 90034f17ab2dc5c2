//! Timeout-bounded polling
//!
//! Exposure completion, filter wheel settle and cooldown all wait on camera
//! status the same way: probe, check, sleep, give up after a deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{CameraError, Result};

/// Interval and deadline for a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSpec {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Probe until it yields a value or the timeout expires.
///
/// The first probe runs immediately. Probe errors end the loop and are
/// returned as-is; expiry yields [`CameraError::Timeout`] naming `operation`.
pub async fn poll_until<T, F, Fut>(operation: &str, spec: PollSpec, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    // A deadline past what the clock can represent never expires
    let deadline = start.checked_add(spec.timeout);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = probe().await? {
            debug!(operation, attempts, "Poll condition met");
            return Ok(value);
        }

        let now = Instant::now();
        let wait = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(CameraError::timeout(operation, now - start));
            }
            Some(deadline) => spec.interval.min(deadline - now),
            None => spec.interval,
        };
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn spec() -> PollSpec {
        PollSpec::new(Duration::from_millis(100), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_still_polls() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let spec = PollSpec::new(Duration::from_millis(100), Duration::MAX);

        let value = poll_until("count", spec, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((n == 2).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_value() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let value = poll_until("count", spec(), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((n == 3).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let start = Instant::now();
        let value = poll_until("ready", spec(), || async { Ok(Some(())) }).await;
        assert!(value.is_ok());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result: Result<()> = poll_until("never", spec(), || async { Ok(None) }).await;

        match result {
            Err(CameraError::Timeout { operation, waited }) => {
                assert_eq!(operation, "never");
                assert_eq!(waited, Duration::from_secs(1));
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_is_returned() {
        let result: Result<()> = poll_until("broken", spec(), || async {
            Err(CameraError::InvalidResponse("garbage".into()))
        })
        .await;

        assert!(matches!(result, Err(CameraError::InvalidResponse(_))));
    }
}
