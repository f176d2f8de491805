//! A token bucket rate limiter (spec §4.9, §5). No teacher precedent for
//! rate limiting exists in this codebase; built from `tokio::time`
//! primitives already in the dependency set rather than a new crate.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Refills at a steady rate and caps burst at one second's worth of tokens.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64) -> Self {
        Self {
            capacity: rate_per_sec,
            refill_per_sec: rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: rate_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquire one token, sleeping if the bucket is currently empty.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn allows_burst_up_to_capacity() {
        let bucket = TokenBucket::new(5.0);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50), "first 5 tokens should be immediate");
    }

    #[tokio::test]
    async fn blocks_once_exhausted() {
        let bucket = Arc::new(TokenBucket::new(10.0));
        for _ in 0..10 {
            bucket.acquire().await;
        }
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50), "11th token should wait for refill");
    }
}
