//! Periodic policy refresh.
//!
//! The refresher reads the agent configuration, extracts the policy for its
//! site and installs it into the [`SamplingManager`]. A missing source, an
//! unreadable source, malformed text or a missing site entry all leave the
//! active policy untouched; the next poll simply tries again.

use crate::error::{Error, Result};
use crate::source::ConfigSource;
use chrono::{DateTime, Utc};
use forager_policy::Policy;
use forager_sampler::SamplingManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often the configuration source is polled by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Refresher configuration.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Site whose entry is read from the agent configuration.
    pub site_id: String,
    /// Pause between polls.
    pub poll_interval: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

impl RefresherConfig {
    /// Creates a configuration for the given site with the default poll interval.
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Result of a single refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A policy was parsed and installed.
    Installed {
        /// Fingerprint of the installed policy.
        fingerprint: u64,
    },
    /// The configuration source does not exist.
    SourceMissing,
    /// The configuration source exists but could not be read.
    SourceFailed,
    /// The configuration text is invalid.
    ParseFailed,
    /// The configuration holds no entry for this site.
    NoSiteEntry,
}

/// Counters describing the refresher's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Refresh attempts made.
    pub attempts: u64,
    /// Policies installed.
    pub installs: u64,
    /// Attempts where the source was missing or unreadable.
    pub source_failures: u64,
    /// Attempts where the text could not be parsed.
    pub parse_failures: u64,
    /// Attempts where the site had no entry.
    pub missing_site: u64,
    /// Fingerprint of the most recently installed policy.
    pub last_fingerprint: Option<u64>,
    /// When a policy was last installed.
    pub last_install_at: Option<DateTime<Utc>>,
}

impl RefreshStats {
    fn record(&mut self, outcome: RefreshOutcome) {
        self.attempts += 1;
        match outcome {
            RefreshOutcome::Installed { fingerprint } => {
                self.installs += 1;
                self.last_fingerprint = Some(fingerprint);
                self.last_install_at = Some(Utc::now());
            }
            RefreshOutcome::SourceMissing | RefreshOutcome::SourceFailed => {
                self.source_failures += 1;
            }
            RefreshOutcome::ParseFailed => self.parse_failures += 1,
            RefreshOutcome::NoSiteEntry => self.missing_site += 1,
        }
    }
}

/// Polls a [`ConfigSource`] and keeps a [`SamplingManager`] up to date.
pub struct Refresher<S> {
    manager: Arc<SamplingManager>,
    source: S,
    config: RefresherConfig,
    stats: Arc<watch::Sender<RefreshStats>>,
}

impl<S> std::fmt::Debug for Refresher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("config", &self.config)
            .field("stats", &*self.stats.borrow())
            .finish_non_exhaustive()
    }
}

impl<S: ConfigSource> Refresher<S> {
    /// Creates a refresher. Nothing is fetched until it runs.
    pub fn new(manager: Arc<SamplingManager>, source: S, config: RefresherConfig) -> Self {
        let (stats, _) = watch::channel(RefreshStats::default());
        Self {
            manager,
            source,
            config,
            stats: Arc::new(stats),
        }
    }

    /// Returns the refresh counters.
    pub fn stats(&self) -> RefreshStats {
        self.stats.borrow().clone()
    }

    /// Fetches and parses the configuration once, installing the policy on success.
    ///
    /// Failures are logged and reported in the outcome; they never change the
    /// active policy.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let outcome = match self.fetch_policy().await {
            Ok(Some(policy)) => {
                let fingerprint = policy.fingerprint();
                self.manager.set_policy(policy);
                RefreshOutcome::Installed { fingerprint }
            }
            Ok(None) => {
                warn!(
                    "Could not locate sampling settings for site '{}'",
                    self.config.site_id
                );
                RefreshOutcome::NoSiteEntry
            }
            Err(Error::SourceNotFound { location }) => {
                warn!("Could not locate agent configuration at {}", location);
                RefreshOutcome::SourceMissing
            }
            Err(Error::Io(e)) => {
                warn!(
                    "Failed to read agent configuration from {}: {}",
                    self.source.location(),
                    e
                );
                RefreshOutcome::SourceFailed
            }
            Err(Error::Policy(e)) => {
                warn!(
                    "Failed to parse agent configuration for site '{}': {}",
                    self.config.site_id, e
                );
                RefreshOutcome::ParseFailed
            }
        };

        self.stats.send_modify(|stats| stats.record(outcome));
        outcome
    }

    async fn fetch_policy(&self) -> Result<Option<Policy>> {
        let text = self.source.fetch().await?;
        debug!(
            "Read {} bytes of agent configuration from {}",
            text.len(),
            self.source.location()
        );
        Ok(forager_policy::parse(&text, &self.config.site_id)?)
    }

    /// Polls until `shutdown` carries `true` or its sender is dropped.
    ///
    /// The first poll happens immediately. Shutdown interrupts both the
    /// fetch and the pause between polls.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Refreshing sampling policy for site '{}' from {} every {:?}",
            self.config.site_id,
            self.source.location(),
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => break,
                _ = self.refresh_once() => {}
            }

            tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Policy refresher stopped");
    }

    /// Runs the refresher as a background task.
    pub fn spawn(self) -> RefresherHandle
    where
        S: 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(rx));
        RefresherHandle {
            shutdown,
            task,
            stats,
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Owns a spawned refresher task.
///
/// Dropping the handle also stops the refresher.
#[derive(Debug)]
pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<watch::Sender<RefreshStats>>,
}

impl RefresherHandle {
    /// Returns the refresh counters.
    pub fn stats(&self) -> RefreshStats {
        self.stats.borrow().clone()
    }

    /// Subscribes to the refresh counters; the receiver is notified after
    /// every refresh attempt.
    pub fn subscribe(&self) -> watch::Receiver<RefreshStats> {
        self.stats.subscribe()
    }

    /// Returns true once the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the refresher and waits for it to exit.
    pub async fn shutdown(self) {
        // The receiver is gone only if the task already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Policy refresher panicked: {}", e);
            } else {
                debug!("Policy refresher task cancelled: {}", e);
            }
        }
    }
}
