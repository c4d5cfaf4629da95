//! Domain commands - block, unblock and list.

use std::path::Path;

use anyhow::Result;
use hostwall_core::{DomainAction, DomainBlockOutcome};

pub async fn block(config: Option<&Path>, domain: &str, json: bool) -> Result<()> {
    let firewall = super::open(config).await?;
    let outcome = firewall.block_domain(domain).await?;
    report(&outcome, json)
}

pub async fn unblock(config: Option<&Path>, domain: &str, json: bool) -> Result<()> {
    let firewall = super::open(config).await?;
    let outcome = firewall.unblock_domain(domain).await?;
    report(&outcome, json)
}

pub async fn list(config: Option<&Path>, json: bool) -> Result<()> {
    let firewall = super::open(config).await?;
    let blocked = firewall.list_blocked_domains().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&blocked)?);
        return Ok(());
    }

    if blocked.is_empty() {
        println!("No blocked domains.");
        return Ok(());
    }
    for domain in &blocked {
        println!("{}", domain);
    }
    println!("\nTotal: {} names", blocked.len());
    Ok(())
}

fn report(outcome: &DomainBlockOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return super::ensure_complete(&outcome.steps);
    }

    if let Some(error) = &outcome.resolution_error {
        eprintln!("warning: could not resolve {}: {}", outcome.record.base_domain, error);
    }
    super::print_steps(&outcome.steps);

    let [base, www] = outcome.domains();
    let verb = match outcome.action {
        DomainAction::Block => "installed",
        DomainAction::Unblock => "removed",
    };
    println!("\n{}ed {} and {}", outcome.action, base, www);
    for addr in outcome.ipv4() {
        println!("  {}", addr);
    }
    for addr in outcome.ipv6() {
        println!("  {}", addr);
    }
    println!("{} rules {}", outcome.rule_count, verb);
    for addr in &outcome.shared_addresses {
        println!("  {} still denied for another blocked domain", addr);
    }

    super::ensure_complete(&outcome.steps)
}
