//! Agent configuration parser.
//!
//! The agent configuration is a JSON document holding sampling settings for
//! every site served by the host. Only the entry for the current site is
//! turned into a [`Policy`].
//!
//! ```json
//! {
//!   "version": 1,
//!   "sites": [
//!     {
//!       "identifier": "shop-frontend",
//!       "defaultRate": { "maxPerInterval": 5, "interval": 1, "intervalUnit": "minutes" },
//!       "overrides": [
//!         { "key": "/health", "rate": { "maxPerInterval": 100, "interval": 60 } },
//!         { "key": "/api/*", "rate": { "maxPerInterval": 1, "interval": 10 } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use crate::key::KeyPattern;
use crate::model::{Policy, Rate};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentConfiguration {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    sites: Vec<SiteSettings>,
}

const fn default_version() -> u32 {
    SUPPORTED_VERSION
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteSettings {
    identifier: String,
    default_rate: RateSettings,
    #[serde(default)]
    overrides: Vec<OverrideSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateSettings {
    max_per_interval: i64,
    interval: u64,
    #[serde(default)]
    interval_unit: IntervalUnit,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum IntervalUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl IntervalUnit {
    const fn secs(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideSettings {
    key: String,
    rate: RateSettings,
}

/// Parses agent configuration text and extracts the policy for one site.
///
/// Site identifiers are compared ASCII case-insensitively and the first
/// matching entry is used.
///
/// Returns `Ok(None)` when the document is valid but holds no entry for
/// `site_id`.
///
/// # Errors
///
/// Returns an error if:
/// - The text is not a valid configuration document
/// - The document version is unsupported
/// - The site's entry holds an invalid rate or override pattern
pub fn parse(input: &str, site_id: &str) -> Result<Option<Policy>> {
    let config: AgentConfiguration = serde_json::from_str(input)?;

    if config.version != SUPPORTED_VERSION {
        return Err(Error::UnsupportedVersion(config.version));
    }

    let site_id = site_id.trim();
    let Some(site) = config
        .sites
        .iter()
        .find(|s| s.identifier.trim().eq_ignore_ascii_case(site_id))
    else {
        debug!(
            "No sampling settings for site '{}' among {} entries",
            site_id,
            config.sites.len()
        );
        return Ok(None);
    };

    build_policy(site).map(Some)
}

fn build_policy(site: &SiteSettings) -> Result<Policy> {
    let mut policy = Policy::new(to_rate(&site.default_rate, &site.identifier)?);

    for entry in &site.overrides {
        let pattern = KeyPattern::parse(&entry.key)?;
        if policy.has_override(&pattern) {
            return Err(Error::DuplicateOverride {
                site: site.identifier.clone(),
                pattern: pattern.to_string(),
            });
        }
        let rate = to_rate(&entry.rate, &site.identifier)?;
        policy = policy.with_override(pattern, rate);
    }

    debug!(
        "Parsed policy for site '{}': {}",
        site.identifier, policy
    );
    Ok(policy)
}

fn to_rate(settings: &RateSettings, site: &str) -> Result<Rate> {
    if settings.interval == 0 {
        return Err(Error::InvalidRate {
            site: site.to_string(),
            reason: "interval must be greater than zero".to_string(),
        });
    }

    let secs = settings
        .interval
        .checked_mul(settings.interval_unit.secs())
        .ok_or_else(|| Error::InvalidRate {
            site: site.to_string(),
            reason: format!("interval {} overflows", settings.interval),
        })?;

    // Non-positive capacities are kept as a rate that denies every sample.
    let max_per_interval = u32::try_from(settings.max_per_interval.max(0)).unwrap_or(u32::MAX);

    Ok(Rate::new(max_per_interval, Duration::from_secs(secs)))
}
