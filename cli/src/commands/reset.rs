//! Reset command - restore the baseline policy.

use std::path::Path;

use anyhow::Result;

pub async fn run(config: Option<&Path>, yes: bool, json: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "This removes every firewall rule and restores deny-incoming / allow-outgoing. \
             Re-run with --yes to confirm."
        );
    }

    let firewall = super::open(config).await?;
    let outcome = firewall.emergency_reset().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        super::print_steps(&outcome.steps);
        println!("\nReset at {}", outcome.reset_at.to_rfc3339());
    }
    super::ensure_complete(&outcome.steps)
}
