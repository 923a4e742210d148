//! Token bucket rate limiter (spec §5, §9 "SUPPLEMENTED FEATURES"), used by
//! the registry-credential resolver to throttle outbound HEAD requests.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// Linear-refill token bucket. `consume` is non-blocking; `wait_for_tokens`
/// sleeps exactly the time needed for the bucket to cover the request.
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Attempts to consume `tokens`. Returns `false` without blocking if insufficient.
    pub fn consume(&self, tokens: f64) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= tokens {
            state.tokens -= tokens;
            true
        } else {
            false
        }
    }

    /// Sleeps exactly `(tokens - available)/refill_rate` if insufficient, then consumes.
    pub async fn wait_for_tokens(&self, tokens: f64) {
        let deficit = {
            let mut state = self.state.lock();
            self.refill(&mut state);
            if state.tokens >= tokens {
                state.tokens -= tokens;
                0.0
            } else {
                let deficit = tokens - state.tokens;
                state.tokens = 0.0;
                deficit
            }
        };
        if deficit > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(deficit / self.refill_rate)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_respects_capacity() {
        let bucket = TokenBucket::new(2.0, 1.0);
        assert!(bucket.consume(1.0));
        assert!(bucket.consume(1.0));
        assert!(!bucket.consume(1.0));
    }

    #[tokio::test]
    async fn wait_for_tokens_blocks_until_refilled() {
        let bucket = TokenBucket::new(1.0, 1000.0);
        assert!(bucket.consume(1.0));
        let start = Instant::now();
        bucket.wait_for_tokens(1.0).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
