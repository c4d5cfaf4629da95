//! Configuration management for tool paths and timeouts.
//!
//! Stores settings in JSON format at `~/.hostwall/config.json`.
//! A missing file means defaults; missing fields fall back individually.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Settings stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the ufw binary.
    #[serde(default = "default_ufw_path", rename = "ufwPath")]
    pub ufw_path: PathBuf,

    /// Prefix every ufw call with non-interactive sudo.
    #[serde(default, rename = "useSudo")]
    pub use_sudo: bool,

    /// Hosts file used as the name override store.
    #[serde(default = "default_hosts_path", rename = "hostsPath")]
    pub hosts_path: PathBuf,

    /// IPv4 sinkhole written for blocked names.
    #[serde(default = "default_sinkhole_v4", rename = "sinkholeV4")]
    pub sinkhole_v4: Ipv4Addr,

    /// IPv6 sinkhole written for blocked names.
    #[serde(default = "default_sinkhole_v6", rename = "sinkholeV6")]
    pub sinkhole_v6: Ipv6Addr,

    /// Program and arguments that flush the resolver cache.
    #[serde(default = "default_flush_command", rename = "flushCommand")]
    pub flush_command: Vec<String>,

    /// Time budget for each external command, in seconds.
    #[serde(default = "default_command_timeout", rename = "commandTimeoutSecs")]
    pub command_timeout_secs: u64,

    /// Path to getent, used for per-family address lookups.
    #[serde(default = "default_getent_path", rename = "getentPath")]
    pub getent_path: PathBuf,

    /// Time budget for each address-family lookup, in seconds.
    #[serde(default = "default_resolve_timeout", rename = "resolveTimeoutSecs")]
    pub resolve_timeout_secs: u64,

    /// Upper bound on stale-rule deletion passes per reconciliation.
    #[serde(default = "default_max_delete_passes", rename = "maxDeletePasses")]
    pub max_delete_passes: usize,
}

fn default_ufw_path() -> PathBuf {
    PathBuf::from("/usr/sbin/ufw")
}

fn default_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

fn default_getent_path() -> PathBuf {
    PathBuf::from("/usr/bin/getent")
}

fn default_sinkhole_v4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_sinkhole_v6() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}

fn default_flush_command() -> Vec<String> {
    vec!["resolvectl".to_string(), "flush-caches".to_string()]
}

fn default_command_timeout() -> u64 {
    15
}

fn default_resolve_timeout() -> u64 {
    5
}

fn default_max_delete_passes() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ufw_path: default_ufw_path(),
            use_sudo: false,
            hosts_path: default_hosts_path(),
            sinkhole_v4: default_sinkhole_v4(),
            sinkhole_v6: default_sinkhole_v6(),
            flush_command: default_flush_command(),
            command_timeout_secs: default_command_timeout(),
            getent_path: default_getent_path(),
            resolve_timeout_secs: default_resolve_timeout(),
            max_delete_passes: default_max_delete_passes(),
        }
    }
}

impl Settings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Both sinkhole addresses, IPv4 first.
    pub fn sinkholes(&self) -> [IpAddr; 2] {
        [IpAddr::V4(self.sinkhole_v4), IpAddr::V6(self.sinkhole_v6)]
    }

    /// Reject settings that would make every operation fail.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 || self.resolve_timeout_secs == 0 {
            return Err(Error::Config("Timeouts must be at least one second".to_string()));
        }
        if self.max_delete_passes == 0 {
            return Err(Error::Config("maxDeletePasses must be at least 1".to_string()));
        }
        if self.flush_command.is_empty() {
            return Err(Error::Config("flushCommand cannot be empty".to_string()));
        }
        for sinkhole in self.sinkholes() {
            if !crate::domain::protected::is_excluded_address(&sinkhole) {
                return Err(Error::Config(format!(
                    "Sinkhole {} must be a loopback or unspecified address",
                    sinkhole
                )));
            }
        }
        Ok(())
    }
}

/// Configuration store for reading and writing settings.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.hostwall/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".hostwall").join("config.json"),
        })
    }

    /// Create a config store with a custom path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load settings from disk.
    ///
    /// Returns defaults if the file doesn't exist.
    pub async fn load(&self) -> Result<Settings> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;

        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_delete_passes, 10);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store();

        let settings = Settings {
            use_sudo: true,
            hosts_path: PathBuf::from("/tmp/hosts"),
            command_timeout_secs: 3,
            ..Settings::default()
        };
        store.save(&settings).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        fs::write(store.path(), r#"{"useSudo": true}"#).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.use_sudo);
        assert_eq!(loaded.ufw_path, PathBuf::from("/usr/sbin/ufw"));
        assert_eq!(loaded.sinkhole_v4, Ipv4Addr::UNSPECIFIED);
    }

    #[tokio::test]
    async fn test_rejects_routable_sinkhole() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        fs::write(store.path(), r#"{"sinkholeV4": "8.8.8.8"}"#).await.unwrap();

        assert!(matches!(store.load().await, Err(Error::Config(_))));
    }
}
