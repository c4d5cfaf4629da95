//! Status command - show the numbered rule listing.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

pub async fn run(config: Option<&Path>, json: bool) -> Result<()> {
    let firewall = super::open(config).await?;
    let listing = firewall.get_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "listing": listing }))?);
    } else {
        println!("{}", listing.trim_end());
    }
    Ok(())
}
