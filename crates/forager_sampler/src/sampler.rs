//! Per-key rate sampler.

use crate::bucket::TokenBucket;
use crate::clock::Clock;
use dashmap::DashMap;
use forager_policy::Rate;
use std::sync::Arc;

/// Enforces one [`Rate`] independently for every key it sees.
///
/// Buckets are created lazily on first use and live as long as the sampler.
/// The key space is not bounded.
#[derive(Debug)]
pub struct KeyedRateSampler {
    rate: Rate,
    buckets: DashMap<String, TokenBucket>,
    clock: Arc<dyn Clock>,
}

impl KeyedRateSampler {
    /// Creates a sampler with no buckets.
    #[must_use]
    pub fn new(rate: Rate, clock: Arc<dyn Clock>) -> Self {
        Self {
            rate,
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Decides whether a request for `key` may be sampled now.
    pub fn take_sample(&self, key: &str) -> bool {
        let now = self.clock.now();

        if let Some(bucket) = self.buckets.get(key) {
            return bucket.consume(now);
        }

        // The entry API holds the shard lock, so concurrent first requests
        // for one key all land on the same bucket.
        let bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucket::new(self.rate, now));
        bucket.consume(now)
    }

    /// Returns the rate every bucket in this sampler enforces.
    pub const fn rate(&self) -> Rate {
        self.rate
    }

    /// Returns the number of keys with a bucket.
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the tokens left for `key`, if it has a bucket yet.
    pub fn tokens_remaining(&self, key: &str) -> Option<u32> {
        self.buckets.get(key).map(|b| b.tokens_remaining())
    }
}
