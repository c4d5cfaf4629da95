//! Config command - show and initialise settings.

use std::path::Path;

use anyhow::Result;
use hostwall_core::Settings;

pub async fn show(config: Option<&Path>, json: bool) -> Result<()> {
    let store = super::config_store(config)?;
    let settings = super::load_settings(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    println!("Settings file:      {}", store.path().display());
    println!("ufw:                {}", settings.ufw_path.display());
    println!("sudo:               {}", settings.use_sudo);
    println!("hosts file:         {}", settings.hosts_path.display());
    println!(
        "sinkholes:          {}, {}",
        settings.sinkhole_v4, settings.sinkhole_v6
    );
    println!("flush command:      {}", settings.flush_command.join(" "));
    println!("command timeout:    {}s", settings.command_timeout_secs);
    println!("getent path:        {}", settings.getent_path.display());
    println!("resolve timeout:    {}s", settings.resolve_timeout_secs);
    println!("max delete passes:  {}", settings.max_delete_passes);
    Ok(())
}

pub async fn init(config: Option<&Path>) -> Result<()> {
    let store = super::config_store(config)?;
    if store.path().exists() {
        println!("Settings already exist at {}", store.path().display());
        return Ok(());
    }
    store.save(&Settings::default()).await?;
    println!("Wrote default settings to {}", store.path().display());
    Ok(())
}

pub fn path(config: Option<&Path>) -> Result<()> {
    println!("{}", super::config_store(config)?.path().display());
    Ok(())
}
