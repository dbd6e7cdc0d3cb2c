//! Sampling manager: the active policy and its samplers.
//!
//! The manager holds an immutable [`SamplerSet`] behind an atomic pointer.
//! Installing a policy builds a complete new set and swaps the pointer once,
//! so a decision always runs against one policy's samplers, never a mix.

use crate::clock::{Clock, SystemClock};
use crate::sampler::KeyedRateSampler;
use arc_swap::ArcSwapOption;
use forager_policy::{Policy, Rate};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// The outcome of one sampling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may be profiled.
    pub allowed: bool,
    /// Rate that governed the decision; `None` when no policy is installed.
    pub rate: Option<Rate>,
    /// Fingerprint of the policy that made the decision.
    pub policy_fingerprint: Option<u64>,
}

impl Decision {
    const NO_POLICY: Self = Self {
        allowed: true,
        rate: None,
        policy_fingerprint: None,
    };
}

/// A point-in-time view of the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerStatus {
    /// Whether a policy is installed.
    pub installed: bool,
    /// Fingerprint of the installed policy.
    pub fingerprint: Option<u64>,
    /// Number of distinct rates (one sampler each).
    pub samplers: usize,
    /// Keys with a bucket across all samplers.
    pub tracked_keys: usize,
    /// Number of policies installed since construction.
    pub installs: u64,
}

/// Samplers built from one policy.
#[derive(Debug)]
struct SamplerSet {
    policy: Arc<Policy>,
    fingerprint: u64,
    /// One sampler per distinct rate; index 0 serves the default rate.
    samplers: Vec<KeyedRateSampler>,
    /// Parallel to `policy.overrides()`, indexing into `samplers`.
    override_slots: Vec<usize>,
}

impl SamplerSet {
    fn build(policy: Policy, clock: &Arc<dyn Clock>) -> Self {
        let table = policy.rate_table();
        let samplers = table
            .rates
            .into_iter()
            .map(|rate| KeyedRateSampler::new(rate, Arc::clone(clock)))
            .collect();

        Self {
            fingerprint: policy.fingerprint(),
            policy: Arc::new(policy),
            samplers,
            override_slots: table.override_slots,
        }
    }

    fn sampler_for(&self, key: &str) -> &KeyedRateSampler {
        let slot = self
            .policy
            .resolve_position(key)
            .and_then(|idx| self.override_slots.get(idx).copied())
            .unwrap_or(0);
        &self.samplers[slot]
    }
}

/// Owns the active sampling policy and answers per-request decisions.
///
/// Construct one at startup and share it (`Arc`) between the request
/// pipeline and the policy refresher.
#[derive(Debug)]
pub struct SamplingManager {
    active: ArcSwapOption<SamplerSet>,
    clock: Arc<dyn Clock>,
    installs: AtomicU64,
}

impl Default for SamplingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingManager {
    /// Creates a manager with no policy, using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a manager with no policy and a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            clock,
            installs: AtomicU64::new(0),
        }
    }

    /// Decides whether a request for the normalized `key` may be profiled.
    ///
    /// Without an installed policy every request is allowed.
    pub fn take_sample(&self, key: &str) -> bool {
        self.decide(key).allowed
    }

    /// Like [`SamplingManager::take_sample`], but reports which policy and
    /// rate made the decision.
    pub fn decide(&self, key: &str) -> Decision {
        let guard = self.active.load();
        let Some(set) = guard.as_deref() else {
            return Decision::NO_POLICY;
        };

        let sampler = set.sampler_for(key);
        let allowed = sampler.take_sample(key);
        debug!(
            "Sampling {} for {} ({})",
            if allowed { "allowed" } else { "denied" },
            key,
            sampler.rate()
        );

        Decision {
            allowed,
            rate: Some(sampler.rate()),
            policy_fingerprint: Some(set.fingerprint),
        }
    }

    /// Installs a new policy.
    ///
    /// Every rate gets a fresh sampler with empty bucket state, so the first
    /// request for any key after the swap is allowed.
    pub fn set_policy(&self, policy: Policy) {
        let set = SamplerSet::build(policy, &self.clock);
        info!(
            "Installing sampling policy {:016x}: default {}, {} override(s), {} sampler(s)",
            set.fingerprint,
            set.policy.default_rate(),
            set.policy.overrides().len(),
            set.samplers.len()
        );
        self.active.store(Some(Arc::new(set)));
        self.installs.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the installed policy.
    pub fn policy(&self) -> Option<Arc<Policy>> {
        self.active.load().as_deref().map(|set| Arc::clone(&set.policy))
    }

    /// Returns the rate that would govern `key`, without consuming a token.
    pub fn resolve(&self, key: &str) -> Option<Rate> {
        self.active.load().as_deref().map(|set| set.sampler_for(key).rate())
    }

    /// Returns a snapshot of the manager state.
    pub fn status(&self) -> ManagerStatus {
        let installs = self.installs.load(Ordering::Relaxed);
        self.active.load().as_deref().map_or(
            ManagerStatus {
                installs,
                ..ManagerStatus::default()
            },
            |set| ManagerStatus {
                installed: true,
                fingerprint: Some(set.fingerprint),
                samplers: set.samplers.len(),
                tracked_keys: set.samplers.iter().map(|s| s.key_count()).sum(),
                installs,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use forager_policy::KeyPattern;
    use proptest::prelude::*;
    use std::time::Duration;

    fn manager() -> (SamplingManager, ManualClock) {
        let clock = ManualClock::new();
        (SamplingManager::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn no_policy_fails_open() {
        let (manager, _clock) = manager();
        for _ in 0..1000 {
            assert!(manager.take_sample("/anything"));
        }
        assert!(manager.policy().is_none());
        assert!(manager.resolve("/anything").is_none());
        assert_eq!(manager.status(), ManagerStatus::default());
    }

    #[test]
    fn override_is_independent_of_default() {
        let (manager, _clock) = manager();
        manager.set_policy(
            Policy::new(Rate::per_secs(5, 60))
                .with_override(KeyPattern::exact("/health"), Rate::per_secs(100, 60)),
        );

        for key in ["/a", "/b", "/c"] {
            for _ in 0..5 {
                assert!(manager.take_sample(key));
            }
            assert!(!manager.take_sample(key));
        }

        for _ in 0..100 {
            assert!(manager.take_sample("/health"));
        }
        assert!(!manager.take_sample("/health"));
        assert_eq!(manager.resolve("/health"), Some(Rate::per_secs(100, 60)));
    }

    #[test]
    fn equal_rates_share_a_sampler() {
        let (manager, _clock) = manager();
        manager.set_policy(
            Policy::new(Rate::per_secs(5, 60))
                .with_override(KeyPattern::exact("/a"), Rate::per_secs(5, 60))
                .with_override(KeyPattern::exact("/b"), Rate::per_secs(7, 60)),
        );
        assert_eq!(manager.status().samplers, 2);
        assert_eq!(manager.resolve("/a"), Some(Rate::per_secs(5, 60)));
        assert_eq!(manager.resolve("/b"), Some(Rate::per_secs(7, 60)));
        assert_eq!(manager.resolve("/z"), Some(Rate::per_secs(5, 60)));

        for _ in 0..7 {
            assert!(manager.take_sample("/b"));
        }
        assert!(!manager.take_sample("/b"));
    }

    #[test]
    fn set_policy_resets_bucket_history() {
        let (manager, _clock) = manager();
        let policy = Policy::new(Rate::per_secs(1, 3600));
        manager.set_policy(policy.clone());
        assert!(manager.take_sample("/a"));
        assert!(!manager.take_sample("/a"));

        manager.set_policy(policy);

        assert!(manager.take_sample("/a"));
        assert_eq!(manager.status().installs, 2);
        assert_eq!(manager.status().tracked_keys, 1);
    }

    #[test]
    fn refill_follows_clock() {
        let (manager, clock) = manager();
        manager.set_policy(Policy::new(Rate::per_secs(3, 1)));

        let burst: Vec<bool> = (0..4).map(|_| manager.take_sample("/a")).collect();
        assert_eq!(burst, vec![true, true, true, false]);

        clock.advance(Duration::from_millis(1100));
        assert!(manager.take_sample("/a"));
    }

    #[test]
    fn decision_reports_policy_and_rate() {
        let (manager, _clock) = manager();
        let policy = Policy::new(Rate::per_secs(2, 60));
        let fingerprint = policy.fingerprint();
        manager.set_policy(policy);

        let decision = manager.decide("/a");
        assert!(decision.allowed);
        assert_eq!(decision.rate, Some(Rate::per_secs(2, 60)));
        assert_eq!(decision.policy_fingerprint, Some(fingerprint));
        assert_eq!(manager.status().fingerprint, Some(fingerprint));
    }

    fn old_policy() -> Policy {
        Policy::new(Rate::per_secs(0, 60))
            .with_override(KeyPattern::exact("/probe"), Rate::per_secs(u32::MAX, 60))
    }

    fn new_policy() -> Policy {
        Policy::new(Rate::per_secs(u32::MAX, 60))
            .with_override(KeyPattern::prefix("/pro"), Rate::per_secs(0, 30))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn readers_never_see_a_mixed_policy(readers in 2usize..8, swap_after in 0usize..200) {
            let (manager, _clock) = manager();
            let (old, new) = (old_policy(), new_policy());
            let (old_fp, new_fp) = (old.fingerprint(), new.fingerprint());
            manager.set_policy(old.clone());

            let decisions = std::thread::scope(|s| {
                let handles: Vec<_> = (0..readers)
                    .map(|_| {
                        s.spawn(|| {
                            (0..400)
                                .flat_map(|_| ["/probe", "/other"])
                                .map(|key| (key, manager.decide(key)))
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();

                for _ in 0..swap_after {
                    std::hint::spin_loop();
                }
                manager.set_policy(new.clone());

                handles
                    .into_iter()
                    .flat_map(|h| h.join().unwrap())
                    .collect::<Vec<_>>()
            });

            for (key, decision) in decisions {
                let expected = if decision.policy_fingerprint == Some(old_fp) {
                    old.rate_for(key)
                } else {
                    prop_assert_eq!(decision.policy_fingerprint, Some(new_fp));
                    new.rate_for(key)
                };
                prop_assert_eq!(decision.rate, Some(expected));
                prop_assert_eq!(decision.allowed, expected.allows_any());
            }
        }
    }
}
