//! Request pipeline boundary.
//!
//! The pipeline calls [`RequestSampling::begin_request`] before profiling
//! starts and [`RequestSampling::end_request`] when the request completes.
//! Nothing here may fail a request: a panic anywhere in the decision path is
//! caught and treated as "allow profiling".

use crate::manager::SamplingManager;
use forager_policy::normalize_key;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Switches the profiler instrumentation on and off for the current request.
pub trait ProfilerControl: Send + Sync {
    /// Re-enables instrumentation.
    fn enable(&self);
    /// Suppresses instrumentation for the rest of the current request.
    fn disable(&self);
}

/// Connects a [`SamplingManager`] to the profiler for each request.
#[derive(Debug)]
pub struct RequestSampling<P> {
    manager: Arc<SamplingManager>,
    profiler: P,
}

impl<P: ProfilerControl> RequestSampling<P> {
    /// Creates the boundary.
    pub const fn new(manager: Arc<SamplingManager>, profiler: P) -> Self {
        Self { manager, profiler }
    }

    /// Makes the sampling decision for a request and disables the profiler
    /// when it is denied.
    ///
    /// Returns whether the request is profiled.
    pub fn begin_request(&self, url: &str) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let key = normalize_key(url);
            let allowed = self.manager.take_sample(&key);
            if !allowed {
                self.profiler.disable();
            }
            allowed
        }));

        outcome.unwrap_or_else(|_| {
            warn!("Sampling decision for {} panicked; leaving profiling enabled", url);
            true
        })
    }

    /// Re-enables the profiler for the next request, whatever the decision was.
    pub fn end_request(&self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.profiler.enable()));
        if outcome.is_err() {
            warn!("Re-enabling the profiler panicked");
        }
    }

    /// Returns the profiler control.
    pub const fn profiler(&self) -> &P {
        &self.profiler
    }
}
