//! Sampling decision engine for Forager.
//!
//! This crate provides:
//! - A full-refill [`TokenBucket`]
//! - A [`KeyedRateSampler`] holding one bucket per request key
//! - The [`SamplingManager`], which owns the active policy and swaps it atomically
//! - [`RequestSampling`], the fail-open boundary used by the request pipeline
//!
//! # Example
//!
//! ```rust
//! use forager_policy::{KeyPattern, Policy, Rate};
//! use forager_sampler::SamplingManager;
//!
//! let manager = SamplingManager::new();
//! assert!(manager.take_sample("/anything")); // no policy: fail open
//!
//! manager.set_policy(
//!     Policy::new(Rate::per_secs(1, 60))
//!         .with_override(KeyPattern::exact("/health"), Rate::per_secs(0, 60)),
//! );
//! assert!(manager.take_sample("/orders"));
//! assert!(!manager.take_sample("/orders"));
//! assert!(!manager.take_sample("/health"));
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod boundary;
pub mod bucket;
pub mod clock;
pub mod manager;
pub mod sampler;

pub use boundary::{ProfilerControl, RequestSampling};
pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{Decision, ManagerStatus, SamplingManager};
pub use sampler::KeyedRateSampler;
