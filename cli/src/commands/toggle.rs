//! Service and port commands - allow or deny traffic.

use std::path::Path;

use anyhow::Result;
use hostwall_core::ToggleOutcome;

pub async fn service(config: Option<&Path>, name: &str, action: &str, json: bool) -> Result<()> {
    let firewall = super::open(config).await?;
    let outcome = firewall.toggle_service(name, action).await?;
    report(&outcome, json)
}

pub async fn port(
    config: Option<&Path>,
    port: &str,
    action: &str,
    protocol: &str,
    json: bool,
) -> Result<()> {
    let firewall = super::open(config).await?;
    let outcome = firewall.toggle_port(port, action, Some(protocol)).await?;
    report(&outcome, json)
}

fn report(outcome: &ToggleOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        if let Some(warning) = &outcome.warning {
            eprintln!("warning: {}", warning);
        }
        super::print_steps(&outcome.steps);
        println!(
            "\n{} {}: {} stale rules removed, {} rules applied",
            outcome.action, outcome.target, outcome.removed, outcome.applied
        );
    }
    super::ensure_complete(&outcome.steps)
}
