//! Typed policy model.
//!
//! A [`Policy`] is immutable once built. A refreshed configuration always
//! produces a whole new value; an installed policy is never patched.

use crate::key::KeyPattern;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use xxhash_rust::xxh64::xxh64;

/// Seed for policy fingerprints.
const FINGERPRINT_SEED: u64 = 0x464F_5241_4745; // "FORAGE" in hex

/// A sampling rate: at most `max_per_interval` samples per key per `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rate {
    /// Bucket capacity; also the number of tokens restored on refill.
    pub max_per_interval: u32,
    /// Time after which a bucket is refilled to capacity.
    pub interval: Duration,
}

impl Rate {
    /// Creates a new rate.
    #[must_use]
    pub const fn new(max_per_interval: u32, interval: Duration) -> Self {
        Self {
            max_per_interval,
            interval,
        }
    }

    /// Creates a rate measured in whole seconds.
    #[must_use]
    pub const fn per_secs(max_per_interval: u32, secs: u64) -> Self {
        Self::new(max_per_interval, Duration::from_secs(secs))
    }

    /// Returns false if this rate denies every sample.
    #[must_use]
    pub const fn allows_any(&self) -> bool {
        self.max_per_interval > 0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (secs, millis) = (self.interval.as_secs(), self.interval.subsec_millis());
        if millis == 0 {
            write!(f, "{}/{secs}s", self.max_per_interval)
        } else {
            write!(f, "{}/{secs}.{millis:03}s", self.max_per_interval)
        }
    }
}

/// The distinct rates of a policy and which of them each override uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    /// Each distinct rate once; the default rate is always first.
    pub rates: Vec<Rate>,
    /// For every override, in order, the index of its rate in `rates`.
    pub override_slots: Vec<usize>,
}

/// A per-key rate that replaces the default for matching keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Override {
    /// Keys this override applies to.
    pub pattern: KeyPattern,
    /// Rate enforced for those keys.
    pub rate: Rate,
}

/// A validated sampling policy: a default rate plus per-key overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    default_rate: Rate,
    overrides: Vec<Override>,
}

impl Policy {
    /// Creates a policy with no overrides.
    #[must_use]
    pub const fn new(default_rate: Rate) -> Self {
        Self {
            default_rate,
            overrides: Vec::new(),
        }
    }

    /// Adds an override. An existing override with the same pattern is replaced.
    #[must_use]
    pub fn with_override(mut self, pattern: KeyPattern, rate: Rate) -> Self {
        if let Some(existing) = self.overrides.iter_mut().find(|o| o.pattern == pattern) {
            existing.rate = rate;
        } else {
            self.overrides.push(Override { pattern, rate });
        }
        self
    }

    /// Returns the rate applied to keys no override matches.
    #[must_use]
    pub const fn default_rate(&self) -> Rate {
        self.default_rate
    }

    /// Returns the overrides in configuration order.
    #[must_use]
    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    /// Returns true if the policy carries an override with this pattern.
    #[must_use]
    pub fn has_override(&self, pattern: &KeyPattern) -> bool {
        self.overrides.iter().any(|o| &o.pattern == pattern)
    }

    /// Finds the override governing a normalized key.
    ///
    /// An exact match wins over any prefix; among prefixes the longest wins.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&Override> {
        self.resolve_position(key).map(|idx| &self.overrides[idx])
    }

    /// Like [`Policy::resolve`], but returns the override's index in
    /// [`Policy::overrides`].
    #[must_use]
    pub fn resolve_position(&self, key: &str) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None; // (index, prefix length)
        for (idx, candidate) in self.overrides.iter().enumerate() {
            let pattern = &candidate.pattern;
            if !pattern.matches(key) {
                continue;
            }
            if !pattern.is_prefix() {
                return Some(idx);
            }
            let len = pattern.specificity();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((idx, len));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Returns the rate governing a normalized key.
    #[must_use]
    pub fn rate_for(&self, key: &str) -> Rate {
        self.resolve(key).map_or(self.default_rate, |o| o.rate)
    }

    /// Groups the policy's rates so that overrides with equal rates, and
    /// overrides equal to the default, share one slot.
    #[must_use]
    pub fn rate_table(&self) -> RateTable {
        let mut rates = vec![self.default_rate];
        let override_slots = self
            .overrides
            .iter()
            .map(|o| {
                rates.iter().position(|r| *r == o.rate).unwrap_or_else(|| {
                    rates.push(o.rate);
                    rates.len() - 1
                })
            })
            .collect();
        RateTable {
            rates,
            override_slots,
        }
    }

    /// Returns a stable hash of the policy contents.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut buf = Vec::with_capacity(16 + self.overrides.len() * 32);
        push_rate(&mut buf, self.default_rate);
        for o in &self.overrides {
            buf.extend_from_slice(o.pattern.to_string().as_bytes());
            buf.push(0);
            push_rate(&mut buf, o.rate);
        }
        xxh64(&buf, FINGERPRINT_SEED)
    }
}

fn push_rate(buf: &mut Vec<u8>, rate: Rate) {
    buf.extend_from_slice(&rate.max_per_interval.to_le_bytes());
    buf.extend_from_slice(&rate.interval.as_secs().to_le_bytes());
    buf.extend_from_slice(&rate.interval.subsec_nanos().to_le_bytes());
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "default={}", self.default_rate)?;
        for o in &self.overrides {
            write!(f, "; {}={}", o.pattern, o.rate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy::new(Rate::per_secs(5, 60))
            .with_override(KeyPattern::exact("/health"), Rate::per_secs(100, 60))
            .with_override(KeyPattern::prefix("/api/"), Rate::per_secs(1, 10))
            .with_override(KeyPattern::prefix("/api/admin/"), Rate::per_secs(0, 10))
            .with_override(KeyPattern::exact("/api/admin/login"), Rate::per_secs(3, 10))
    }

    #[test]
    fn unmatched_key_uses_default() {
        assert_eq!(policy().rate_for("/orders"), Rate::per_secs(5, 60));
        assert!(policy().resolve("/orders").is_none());
    }

    #[test]
    fn exact_override_applies() {
        assert_eq!(policy().rate_for("/health"), Rate::per_secs(100, 60));
        assert_eq!(policy().rate_for("/health/deep"), Rate::per_secs(5, 60));
    }

    #[test]
    fn longest_prefix_wins() {
        assert_eq!(policy().rate_for("/api/users"), Rate::per_secs(1, 10));
        assert_eq!(policy().rate_for("/api/admin/users"), Rate::per_secs(0, 10));
    }

    #[test]
    fn exact_beats_prefix() {
        assert_eq!(policy().rate_for("/api/admin/login"), Rate::per_secs(3, 10));
    }

    #[test]
    fn with_override_replaces_same_pattern() {
        let policy = Policy::new(Rate::per_secs(1, 1))
            .with_override(KeyPattern::exact("/a"), Rate::per_secs(2, 1))
            .with_override(KeyPattern::exact("/A/"), Rate::per_secs(3, 1));
        assert_eq!(policy.overrides().len(), 1);
        assert_eq!(policy.rate_for("/a"), Rate::per_secs(3, 1));
    }

    #[test]
    fn rate_table_shares_equal_rates() {
        let policy = Policy::new(Rate::per_secs(5, 60))
            .with_override(KeyPattern::exact("/a"), Rate::per_secs(5, 60))
            .with_override(KeyPattern::exact("/b"), Rate::per_secs(9, 60))
            .with_override(KeyPattern::exact("/c"), Rate::per_secs(9, 60));
        let table = policy.rate_table();
        assert_eq!(table.rates, vec![Rate::per_secs(5, 60), Rate::per_secs(9, 60)]);
        assert_eq!(table.override_slots, vec![0, 1, 1]);
    }

    #[test]
    fn resolution_uses_pattern_matching() {
        let policy = policy();
        for key in ["/health", "/api/users", "/api/admin/users", "/api/admin/login", "/apiary"] {
            let expected = policy
                .overrides()
                .iter()
                .filter(|o| o.pattern.matches(key))
                .max_by_key(|o| (!o.pattern.is_prefix(), o.pattern.specificity()))
                .map(|o| o.rate);
            assert_eq!(policy.resolve(key).map(|o| o.rate), expected, "key {key}");
        }
    }

    #[test]
    fn fingerprint_tracks_content() {
        assert_eq!(policy().fingerprint(), policy().fingerprint());
        let changed = policy().with_override(KeyPattern::exact("/health"), Rate::per_secs(1, 60));
        assert_ne!(policy().fingerprint(), changed.fingerprint());

        let sub_second = Policy::new(Rate::new(5, Duration::from_millis(60_000)));
        assert_eq!(sub_second.fingerprint(), Policy::new(Rate::per_secs(5, 60)).fingerprint());
        let other = Policy::new(Rate::new(5, Duration::from_millis(60_001)));
        assert_ne!(other.fingerprint(), sub_second.fingerprint());
    }

    #[test]
    fn rate_display_is_whole_seconds_or_millis() {
        assert_eq!(Rate::per_secs(5, 60).to_string(), "5/60s");
        assert_eq!(Rate::new(1, Duration::from_millis(1500)).to_string(), "1/1.500s");
    }

    #[test]
    fn display_lists_default_then_overrides() {
        let policy = Policy::new(Rate::per_secs(5, 60))
            .with_override(KeyPattern::prefix("/api/"), Rate::per_secs(1, 10));
        assert_eq!(policy.to_string(), "default=5/60s; /api/*=1/10s");
    }

    #[test]
    fn zero_capacity_rate_allows_nothing() {
        assert!(!Rate::per_secs(0, 1).allows_any());
        assert!(Rate::per_secs(1, 1).allows_any());
    }
}
