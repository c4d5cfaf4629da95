//! Subcommand implementations.

pub mod config;
pub mod domain;
pub mod reset;
pub mod status;
pub mod toggle;

use std::path::Path;

use anyhow::{Context, Result};
use hostwall_core::{CommandOutcome, ConfigStore, HostFirewall, Settings};
use tracing::debug;

/// Settings store at `path`, or at the default location.
pub fn config_store(path: Option<&Path>) -> Result<ConfigStore> {
    match path {
        Some(path) => Ok(ConfigStore::with_path(path.to_path_buf())),
        None => ConfigStore::new().context("Failed to locate settings file"),
    }
}

pub async fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let store = config_store(path)?;
    let settings = store
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {}", store.path().display()))?;
    debug!(path = %store.path().display(), "settings loaded");
    Ok(settings)
}

/// Firewall service wired to this host.
pub async fn open(path: Option<&Path>) -> Result<HostFirewall> {
    let settings = load_settings(path).await?;
    Ok(HostFirewall::from_settings(&settings)?)
}

/// Print one line per sub-command.
fn print_steps(steps: &[CommandOutcome]) {
    if steps.is_empty() {
        return;
    }
    println!("{:<4} {:<48} OUTPUT", "OK", "STEP");
    println!("{}", "-".repeat(80));
    for step in steps {
        let mark = if step.success { "yes" } else { "NO" };
        let output = step.output.lines().next().unwrap_or("");
        println!(
            "{:<4} {:<48} {}",
            mark,
            truncate(&step.command, 48),
            truncate(output, 40)
        );
    }
}

/// Fail the process when any step failed, after the report was printed.
fn ensure_complete(steps: &[CommandOutcome]) -> Result<()> {
    let failed = steps.iter().filter(|s| !s.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} steps failed; re-run to retry", failed, steps.len());
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
