//! Check command implementation.

use anyhow::{anyhow, Context, Result};
use forager_policy::{normalize_key, Policy};
use std::fmt::Write;
use std::fs;
use std::path::Path;
use tracing::info;

/// Runs the check command.
pub fn run(settings_path: &Path, site: &str, format: &str, keys: &[String]) -> Result<()> {
    info!("Checking agent configuration: {}", settings_path.display());

    let policy = load_policy(settings_path, site)?;

    info!(
        "Site '{}' has {} override(s)",
        site,
        policy.overrides().len()
    );

    let output = match format.to_lowercase().as_str() {
        "text" => render_text(&policy, site, keys),
        "json" => serde_json::to_string_pretty(&policy).context("Failed to encode policy")?,
        _ => {
            anyhow::bail!("Unknown output format: {format}. Use 'text' or 'json'.");
        }
    };

    println!("{output}");
    Ok(())
}

/// Reads the settings file and extracts the site's policy.
pub fn load_policy(settings_path: &Path, site: &str) -> Result<Policy> {
    let text = fs::read_to_string(settings_path).with_context(|| {
        format!(
            "Failed to read agent configuration: {}",
            settings_path.display()
        )
    })?;

    forager_policy::parse(&text, site)
        .with_context(|| "Failed to parse agent configuration")?
        .ok_or_else(|| anyhow!("No sampling settings for site '{site}'"))
}

fn render_text(policy: &Policy, site: &str, keys: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "site:        {site}");
    let _ = writeln!(out, "fingerprint: {:016x}", policy.fingerprint());
    let _ = writeln!(out, "default:     {}", policy.default_rate());
    for o in policy.overrides() {
        let _ = writeln!(out, "override:    {} -> {}", o.pattern, o.rate);
    }

    for raw in keys {
        let key = normalize_key(raw);
        let source = policy
            .resolve(&key)
            .map_or_else(|| "default".to_string(), |o| o.pattern.to_string());
        let _ = writeln!(
            out,
            "{raw} => {key}: {} ({source})",
            policy.rate_for(&key)
        );
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{"sites": [{
        "identifier": "shop",
        "defaultRate": {"maxPerInterval": 5, "interval": 1, "intervalUnit": "minutes"},
        "overrides": [{"key": "/api/*", "rate": {"maxPerInterval": 1, "interval": 10}}]
    }]}"#;

    #[test]
    fn loads_site_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent-configuration.json");
        fs::write(&path, CONFIG).unwrap();

        let policy = load_policy(&path, "SHOP").unwrap();
        assert_eq!(policy.overrides().len(), 1);

        assert!(load_policy(&path, "other").is_err());
        assert!(load_policy(&dir.path().join("missing.json"), "shop").is_err());
    }

    #[test]
    fn text_output_names_governing_pattern() {
        let policy = forager_policy::parse(CONFIG, "shop").unwrap().unwrap();
        let keys = vec!["https://shop/api/cart?x=1".to_string(), "/home".to_string()];

        let text = render_text(&policy, "shop", &keys);

        assert!(text.contains("override:    /api/* -> 1/10s"));
        assert!(text.contains("https://shop/api/cart?x=1 => /api/cart: 1/10s (/api/*)"));
        assert!(text.contains("/home => /home: 5/60s (default)"));
    }
}
