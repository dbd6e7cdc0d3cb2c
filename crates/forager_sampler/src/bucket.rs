//! Interval-reset token bucket.
//!
//! A bucket starts full. Once `interval` has elapsed since the last refill,
//! the next consume restores the full capacity in one step; there is no
//! proportional trickle between refills. A denied consume is never queued.

use forager_policy::Rate;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// A single-key rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens_remaining: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket for the given rate.
    #[must_use]
    pub fn new(rate: Rate, now: Instant) -> Self {
        Self {
            capacity: rate.max_per_interval,
            refill_interval: rate.interval,
            state: Mutex::new(BucketState {
                tokens_remaining: rate.max_per_interval,
                last_refill: now,
            }),
        }
    }

    /// Takes one token if available.
    ///
    /// Refill and decrement happen under the same lock, so concurrent callers
    /// never consume more than `capacity` tokens between two refills.
    /// An instant earlier than the last refill counts as no time elapsed.
    pub fn consume(&self, now: Instant) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let mut state = self.state.lock();
        if now.saturating_duration_since(state.last_refill) >= self.refill_interval {
            state.tokens_remaining = self.capacity;
            state.last_refill = now;
        }

        if state.tokens_remaining > 0 {
            state.tokens_remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Returns the tokens left in the current interval.
    pub fn tokens_remaining(&self) -> u32 {
        self.state.lock().tokens_remaining
    }
}
