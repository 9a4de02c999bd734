//! Rate Limiter (Token Bucket Algorithm)
//!
//! Caps how fast clients can push operations into the queue.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Token bucket: `burst` tokens, refilled at `refill_rate` tokens per second
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    burst: f64,
    refill_rate: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `burst` - Maximum burst size
    /// * `refill_rate` - Tokens added per second
    ///
    /// # Example
    /// Allow 20 enqueues/sec with a burst of 50:
    /// `RateLimiter::new(50, 20)`
    pub fn new(burst: u32, refill_rate: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
            burst: f64::from(burst),
            refill_rate: f64::from(refill_rate),
        }
    }

    /// Take one token; false when the caller should be throttled
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        bucket.tokens.floor() as u32
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.burst);
        bucket.last_refill = now;
    }
}
