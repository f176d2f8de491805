//! Exponential backoff with full jitter for throttled AWS writes (spec
//! §4.9). No teacher precedent — new module, built on `rand` the way
//! `estuary-flow` and `DataDog-libdatadog` pull it in for jitter elsewhere
//! in the pack.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;

/// An AWS operation's error, reduced to the one thing retry logic cares
/// about. Sinks classify their SDK-specific error types into this before
/// handing them to [`retry_throttled`].
#[derive(Debug, Clone)]
pub struct AwsOpError {
    pub is_throttling: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_attempts: 5,
            max_elapsed: Duration::from_secs(30),
        }
    }
}

/// Retry `attempt` while it reports a throttling error, doubling the delay
/// each time with full jitter, until `max_attempts` or `max_elapsed`
/// (whichever comes first). Non-throttling errors return immediately.
pub async fn retry_throttled<F, Fut, T>(policy: &RetryPolicy, mut attempt: F) -> Result<T, AwsOpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AwsOpError>>,
{
    let start = Instant::now();
    let mut attempt_number: u32 = 0;

    loop {
        attempt_number += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_throttling && attempt_number < policy.max_attempts && start.elapsed() < policy.max_elapsed => {
                let base_ms = policy.initial_delay.as_millis() as u64 * 2u64.saturating_pow(attempt_number - 1);
                let jitter_ms = rand::thread_rng().gen_range(0..=base_ms);
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_on_throttling_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy { initial_delay: Duration::from_millis(1), ..RetryPolicy::default() };
        let result = retry_throttled(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AwsOpError { is_throttling: true, message: "slow down".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_throttling_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<(), AwsOpError> = retry_throttled(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AwsOpError { is_throttling: false, message: "bad request".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
