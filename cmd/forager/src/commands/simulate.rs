//! Simulate command implementation.
//!
//! Runs a sampling manager with a live refresher and replays request URLs
//! through the same begin/end boundary a request pipeline would use.

use anyhow::{Context, Result};
use forager_policy::normalize_key;
use forager_refresh::{FileSource, RefreshStats, Refresher, RefresherConfig};
use forager_sampler::{ProfilerControl, RequestSampling, SamplingManager};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long to wait for the first configuration poll before replaying.
const FIRST_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Simulate command options.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Path to the agent configuration file.
    pub settings: PathBuf,
    /// Site identifier.
    pub site: String,
    /// File with one request URL per line.
    pub requests: PathBuf,
    /// Seconds between configuration polls.
    pub poll_interval_secs: u64,
    /// Number of replays of the request file.
    pub rounds: usize,
    /// Pause between requests in milliseconds.
    pub pace_ms: u64,
}

/// Stand-in for profiler instrumentation that only records toggles.
#[derive(Debug)]
struct RecordingProfiler {
    enabled: AtomicBool,
    suppressed: AtomicU64,
}

impl RecordingProfiler {
    const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            suppressed: AtomicU64::new(0),
        }
    }
}

impl ProfilerControl for RecordingProfiler {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct KeyTally {
    allowed: u64,
    denied: u64,
}

/// Results of one replay.
#[derive(Debug)]
struct Simulation {
    manager: Arc<SamplingManager>,
    tallies: BTreeMap<String, KeyTally>,
    stats: RefreshStats,
    suppressed: u64,
}

/// Runs the simulate command.
pub async fn run(options: SimulateOptions) -> Result<()> {
    let simulation = simulate(options).await?;

    println!(
        "{}",
        render_report(&simulation.manager, &simulation.tallies, &simulation.stats)
    );
    info!("Profiler suppressed for {} request(s)", simulation.suppressed);
    Ok(())
}

async fn simulate(options: SimulateOptions) -> Result<Simulation> {
    let requests = load_requests(&options.requests)?;
    info!(
        "Replaying {} request(s) x {} round(s) for site '{}'",
        requests.len(),
        options.rounds,
        options.site
    );

    let manager = Arc::new(SamplingManager::new());
    let config = RefresherConfig::new(options.site.clone())
        .with_poll_interval(Duration::from_secs(options.poll_interval_secs.max(1)));
    let handle = Refresher::new(
        Arc::clone(&manager),
        FileSource::new(&options.settings),
        config,
    )
    .spawn();

    let mut updates = handle.subscribe();
    let polled = matches!(
        tokio::time::timeout(FIRST_POLL_TIMEOUT, updates.wait_for(|s| s.attempts > 0)).await,
        Ok(Ok(_))
    );
    if !polled {
        warn!("Agent configuration not polled yet; continuing without it");
    }
    if manager.policy().is_none() {
        warn!("No policy installed; every request will be profiled");
    }

    let sampling = RequestSampling::new(Arc::clone(&manager), RecordingProfiler::new());
    let mut tallies: BTreeMap<String, KeyTally> = BTreeMap::new();

    for _ in 0..options.rounds {
        for url in &requests {
            let allowed = sampling.begin_request(url);
            sampling.end_request();

            let tally = tallies.entry(normalize_key(url)).or_default();
            if allowed {
                tally.allowed += 1;
            } else {
                tally.denied += 1;
            }

            if options.pace_ms > 0 {
                tokio::time::sleep(Duration::from_millis(options.pace_ms)).await;
            }
        }
    }

    let stats = handle.stats();
    handle.shutdown().await;

    Ok(Simulation {
        manager,
        tallies,
        stats,
        suppressed: sampling.profiler().suppressed.load(Ordering::Relaxed),
    })
}

fn load_requests(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read requests file: {}", path.display()))?;

    let requests: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if requests.is_empty() {
        anyhow::bail!("Requests file is empty: {}", path.display());
    }
    Ok(requests)
}

fn render_report(
    manager: &SamplingManager,
    tallies: &BTreeMap<String, KeyTally>,
    stats: &RefreshStats,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>14} {:>8} {:>8}", "KEY", "RATE", "ALLOWED", "DENIED");
    for (key, tally) in tallies {
        let rate = manager
            .resolve(key)
            .map_or_else(|| "unlimited".to_string(), |r| r.to_string());
        let _ = writeln!(
            out,
            "{key:<40} {rate:>14} {:>8} {:>8}",
            tally.allowed, tally.denied
        );
    }

    let status = manager.status();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "policy: {}",
        status
            .fingerprint
            .map_or_else(|| "none".to_string(), |fp| format!("{fp:016x}"))
    );
    let _ = writeln!(
        out,
        "samplers: {}, tracked keys: {}",
        status.samplers, status.tracked_keys
    );
    let _ = write!(
        out,
        "polls: {} ({} installed, {} source failures, {} parse failures, {} missing site)",
        stats.attempts, stats.installs, stats.source_failures, stats.parse_failures, stats.missing_site
    );
    if let Some(at) = stats.last_install_at {
        let _ = write!(out, "\nlast install: {}", at.to_rfc3339());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{"sites": [{
        "identifier": "shop",
        "defaultRate": {"maxPerInterval": 2, "interval": 1, "intervalUnit": "hours"},
        "overrides": [{"key": "/health", "rate": {"maxPerInterval": 0, "interval": 60}}]
    }]}"#;

    #[test]
    fn load_requests_skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.txt");
        fs::write(&path, "# warmup\n/a\n\n  /b?x=1  \n").unwrap();

        assert_eq!(load_requests(&path).unwrap(), vec!["/a", "/b?x=1"]);
    }

    #[test]
    fn load_requests_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.txt");
        fs::write(&path, "# nothing\n").unwrap();

        assert!(load_requests(&path).is_err());
    }

    #[tokio::test]
    async fn replay_applies_policy_from_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("agent-configuration.json");
        let requests = dir.path().join("requests.txt");
        fs::write(&settings, CONFIG).unwrap();
        fs::write(&requests, "/a\n/A/\n/a?page=3\n/health\n").unwrap();

        let options = SimulateOptions {
            settings,
            site: "shop".to_string(),
            requests,
            poll_interval_secs: 300,
            rounds: 2,
            pace_ms: 0,
        };

        let simulation = simulate(options).await.unwrap();

        let a = simulation.tallies["/a"];
        assert_eq!((a.allowed, a.denied), (2, 4));
        let health = simulation.tallies["/health"];
        assert_eq!((health.allowed, health.denied), (0, 2));
        assert_eq!(simulation.suppressed, 6);
        assert_eq!(simulation.stats.installs, 1);
    }

    #[test]
    fn report_lists_keys_and_policy() {
        let manager = SamplingManager::new();
        manager.set_policy(forager_policy::parse(CONFIG, "shop").unwrap().unwrap());
        let mut tallies = BTreeMap::new();
        tallies.insert("/a".to_string(), KeyTally { allowed: 2, denied: 4 });

        let report = render_report(&manager, &tallies, &RefreshStats::default());

        assert!(report.contains("/a"));
        assert!(report.contains("2/3600s"));
        assert!(report.contains("samplers: 2"));
    }
}
