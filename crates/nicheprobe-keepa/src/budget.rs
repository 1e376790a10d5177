//! Local token accounting for the Keepa budget.
//!
//! Two numbers are deliberately kept distinct: the *capacity* of the local
//! leaky bucket (how many tokens this process may hold, configuration-owned)
//! and the *refill rate* (tokens per minute, dictated by the remote). Every
//! API response carries the remote's authoritative balance and refill rate;
//! [`TokenBucket::sync`] overwrites local accounting with them so the two
//! never drift for longer than one call.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_minute: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(capacity: u32, refill_per_minute: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            refill_per_minute,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        self.last_refill = Instant::now();
        let refilled = elapsed.as_secs_f64() * self.refill_per_minute / 60.0;
        self.tokens = (self.tokens + refilled).min(self.capacity);
    }

    /// Overwrites local accounting with the remote's authoritative values.
    ///
    /// The balance is clamped to local capacity: the remote account may hold
    /// more tokens than this process is allowed to burn.
    pub fn sync(&mut self, tokens_left: i64, refill_per_minute: f64) {
        if refill_per_minute > 0.0 {
            self.refill_per_minute = refill_per_minute;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.tokens = (tokens_left.max(0) as f64).min(self.capacity);
        }
        self.last_refill = Instant::now();
    }

    /// Records local consumption. Used when a response carries no balance.
    pub fn consume(&mut self, cost: u32) {
        self.refill();
        self.tokens = (self.tokens - f64::from(cost)).max(0.0);
    }

    /// Current balance after refill.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// Remote-dictated refill rate in tokens per minute.
    #[must_use]
    pub fn refill_per_minute(&self) -> f64 {
        self.refill_per_minute
    }

    /// How long to sleep before `cost` tokens are available.
    ///
    /// Returns `Duration::ZERO` when the balance already covers the cost.
    /// With no known refill rate the wait defaults to one minute.
    pub fn wait_for(&mut self, cost: u32) -> Duration {
        self.refill();
        let needed = f64::from(cost);
        if self.tokens >= needed {
            return Duration::ZERO;
        }
        let deficit = needed - self.tokens;
        if self.refill_per_minute <= 0.0 {
            return Duration::from_secs(60);
        }
        Duration::from_secs_f64(deficit * 60.0 / self.refill_per_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bucket_is_full() {
        let mut bucket = TokenBucket::new(200, 21.0);
        assert!((bucket.available() - 200.0).abs() < 1.0);
    }

    #[test]
    fn full_bucket_needs_no_wait() {
        let mut bucket = TokenBucket::new(200, 21.0);
        assert_eq!(bucket.wait_for(200), Duration::ZERO);
    }

    #[test]
    fn wait_is_deficit_over_refill_rate() {
        let mut bucket = TokenBucket::new(200, 60.0);
        bucket.sync(0, 60.0);
        // 30 tokens deficit at 1 token/second.
        let wait = bucket.wait_for(30);
        assert!(
            (wait.as_secs_f64() - 30.0).abs() < 0.5,
            "expected ~30s, got {wait:?}"
        );
    }

    #[test]
    fn sync_clamps_remote_balance_to_local_capacity() {
        let mut bucket = TokenBucket::new(100, 21.0);
        bucket.sync(5_000, 21.0);
        assert!(bucket.available() <= 100.0);
    }

    #[test]
    fn sync_adopts_remote_refill_rate() {
        let mut bucket = TokenBucket::new(100, 21.0);
        bucket.sync(50, 42.0);
        assert!((bucket.refill_per_minute() - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sync_ignores_nonpositive_refill_rate() {
        let mut bucket = TokenBucket::new(100, 21.0);
        bucket.sync(50, 0.0);
        assert!((bucket.refill_per_minute() - 21.0).abs() < f64::EPSILON);
    }

    #[test]
    fn consume_floors_at_zero() {
        let mut bucket = TokenBucket::new(10, 21.0);
        bucket.consume(25);
        assert!(bucket.available() >= 0.0);
        assert!(bucket.available() < 1.0);
    }

    #[test]
    fn zero_refill_rate_waits_a_minute() {
        let mut bucket = TokenBucket::new(10, 0.0);
        bucket.sync(0, 0.0);
        assert_eq!(bucket.wait_for(5), Duration::from_secs(60));
    }
}
