//! Token bucket primitive (§3 "Token bucket", §4.3).

use std::time::Instant;

/// `0 ≤ tokens ≤ burst`; refill is `min(burst, tokens + elapsed * rps)`.
/// Decrementing `tokens` is the caller's job under a held lock — this
/// type has no internal synchronization of its own.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(burst: u32) -> Self {
        Self { burst: f64::from(burst), tokens: f64::from(burst), last_refill: Instant::now() }
    }

    /// Refills against `rps`, then tries to consume one token. Returns
    /// `true` and decrements on success.
    pub fn try_consume(&mut self, rps: f64) -> bool {
        self.refill(rps);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Milliseconds until a token would become available, assuming no
    /// further consumption by others. Caller refills first.
    pub fn wait_ms(&mut self, rps: f64) -> u64 {
        self.refill(rps);
        if self.tokens >= 1.0 {
            return 0;
        }
        let deficit = 1.0 - self.tokens;
        ((deficit / rps) * 1000.0).ceil() as u64
    }

    fn refill(&mut self, rps: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(self.burst);
        self.last_refill = now;
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn starts_full() {
        let bucket = TokenBucket::new(5);
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn consumes_down_to_empty_then_rejects() {
        let mut bucket = TokenBucket::new(2);
        assert!(bucket.try_consume(1.0));
        assert!(bucket.try_consume(1.0));
        assert!(!bucket.try_consume(1.0));
    }

    #[test]
    fn refills_over_time_bounded_by_burst() {
        let mut bucket = TokenBucket::new(2);
        bucket.try_consume(1.0);
        bucket.try_consume(1.0);
        sleep(Duration::from_millis(50));
        // at 100 rps, 50ms should refill ~5 tokens, capped at burst=2
        assert!(bucket.try_consume(100.0));
        assert!(bucket.tokens() <= 2.0);
    }
}
