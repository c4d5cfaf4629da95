//! Name override store backed by a hosts file.
//!
//! # Format
//!
//! Standard `/etc/hosts` format:
//! - `<ip> <name1> [name2] [name3]...`
//! - Comments start with `#`
//!
//! A name counts as sinkholed when it appears on a line whose address is
//! one of the configured sinkholes (`0.0.0.0` and `::` by default). Every
//! blocked name gets one line per family so AAAA lookups are suppressed as
//! well as A lookups. Lines not written by hostwall are preserved verbatim.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{is_reserved_name, validate_domain, NameOverrideEntry};
use crate::error::{Error, Result};
use crate::ports::NameOverrideStore;

/// Hosts-file override store.
pub struct HostsFile {
    path: PathBuf,
    sinkhole_v4: Ipv4Addr,
    sinkhole_v6: Ipv6Addr,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>, sinkhole_v4: Ipv4Addr, sinkhole_v6: Ipv6Addr) -> Self {
        Self {
            path: path.into(),
            sinkhole_v4,
            sinkhole_v6,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_sinkhole(&self, addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => *v4 == self.sinkhole_v4,
            IpAddr::V6(v6) => *v6 == self.sinkhole_v6,
        }
    }

    /// All sinkhole entries currently in the file.
    pub async fn entries(&self) -> Result<Vec<NameOverrideEntry>> {
        let content = self.read().await?;
        let mut entries = Vec::new();
        for line in content.lines() {
            let Some((addr, names)) = parse_line(line) else {
                continue;
            };
            if !self.is_sinkhole(&addr) {
                continue;
            }
            for name in names {
                let name = name.to_ascii_lowercase();
                if is_reserved_name(&name) || validate_domain(&name).is_err() {
                    continue;
                }
                entries.push(NameOverrideEntry {
                    domain: name,
                    sinkhole_address: addr,
                });
            }
        }
        Ok(entries)
    }

    async fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::ExternalCommand {
                command: format!("read {}", self.path.display()),
                reason: e.to_string(),
            }),
        }
    }

    /// Replace the file contents, atomically where the filesystem allows.
    async fn write(&self, content: &str) -> Result<()> {
        let write_error = |e: std::io::Error| Error::ExternalCommand {
            command: format!("write {}", self.path.display()),
            reason: e.to_string(),
        };

        let temp_path = self.path.with_extension("hostwall.tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(write_error)?;
        file.write_all(content.as_bytes()).await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        drop(file);

        if let Ok(meta) = fs::metadata(&self.path).await {
            fs::set_permissions(&temp_path, meta.permissions())
                .await
                .map_err(write_error)?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            // Bind-mounted hosts files (containers) cannot be replaced.
            warn!(path = %self.path.display(), error = %e, "rename failed, writing in place");
            let _ = fs::remove_file(&temp_path).await;
            fs::write(&self.path, content).await.map_err(write_error)?;
        }
        Ok(())
    }
}

/// Split a hosts line into its address and names, ignoring comments.
fn parse_line(line: &str) -> Option<(IpAddr, Vec<&str>)> {
    let data = line.split('#').next().unwrap_or("").trim();
    let mut parts = data.split_whitespace();
    let addr: IpAddr = parts.next()?.parse().ok()?;
    let names: Vec<&str> = parts.collect();
    if names.is_empty() {
        return None;
    }
    Some((addr, names))
}

impl NameOverrideStore for HostsFile {
    async fn list_sinkholed_names(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|entry| entry.domain)
            .collect())
    }

    async fn append_sinkhole_entries(&self, domains: &[String]) -> Result<()> {
        if domains.is_empty() {
            return Ok(());
        }

        let mut content = self.read().await?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for domain in domains {
            // Never trust the caller with raw file content.
            let domain = validate_domain(domain)?;
            content.push_str(&format!("{}\t{}\n", self.sinkhole_v4, domain));
            content.push_str(&format!("{}\t{}\n", self.sinkhole_v6, domain));
        }

        self.write(&content).await?;
        debug!(path = %self.path.display(), count = domains.len(), "sinkhole entries appended");
        Ok(())
    }

    async fn remove_entries_matching(&self, domain: &str) -> Result<usize> {
        let content = self.read().await?;
        let mut kept = String::with_capacity(content.len());
        let mut removed = 0;

        for line in content.lines() {
            match parse_line(line) {
                Some((addr, names))
                    if self.is_sinkhole(&addr)
                        && names.iter().any(|n| n.eq_ignore_ascii_case(domain)) =>
                {
                    removed += 1;
                    let rest: Vec<&str> = names
                        .into_iter()
                        .filter(|n| !n.eq_ignore_ascii_case(domain))
                        .collect();
                    if !rest.is_empty() {
                        kept.push_str(&format!("{}\t{}\n", addr, rest.join(" ")));
                    }
                }
                _ => {
                    kept.push_str(line);
                    kept.push('\n');
                }
            }
        }

        if removed > 0 {
            self.write(&kept).await?;
            debug!(path = %self.path.display(), domain, removed, "sinkhole entries removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STOCK_HOSTS: &str = "127.0.0.1\tlocalhost\n\
        127.0.1.1\tworkstation.lan workstation\n\
        ::1\tip6-localhost ip6-loopback\n\
        # The following lines are desirable for IPv6 capable hosts\n\
        0.0.0.0 ads.example.net # from a blocklist";

    async fn hosts_with(content: &str) -> (HostsFile, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, content).await.unwrap();
        (
            HostsFile::new(path, Ipv4Addr::UNSPECIFIED, Ipv6Addr::UNSPECIFIED),
            dir,
        )
    }

    #[tokio::test]
    async fn test_lists_only_sinkholed_names() {
        let (hosts, _dir) = hosts_with(STOCK_HOSTS).await;
        let names = hosts.list_sinkholed_names().await.unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["ads.example.net"]);
    }

    #[tokio::test]
    async fn test_append_writes_both_families() {
        let (hosts, _dir) = hosts_with(STOCK_HOSTS).await;
        hosts
            .append_sinkhole_entries(&["example.com".into(), "www.example.com".into()])
            .await
            .unwrap();

        let content = fs::read_to_string(hosts.path()).await.unwrap();
        assert!(content.starts_with("127.0.0.1\tlocalhost\n"));
        assert!(content.contains("0.0.0.0\texample.com\n"));
        assert!(content.contains("::\texample.com\n"));
        assert!(content.contains("::\twww.example.com\n"));

        let entries = hosts.entries().await.unwrap();
        assert_eq!(entries.iter().filter(|e| e.domain == "example.com").count(), 2);
    }

    #[tokio::test]
    async fn test_append_rejects_unsafe_names() {
        let (hosts, _dir) = hosts_with("").await;
        let result = hosts
            .append_sinkhole_entries(&["evil.com\n1.2.3.4 bank.com".into()])
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(fs::read_to_string(hosts.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_remove_keeps_unrelated_lines() {
        let (hosts, _dir) =
            hosts_with("127.0.0.1 localhost\n0.0.0.0 example.com other.org\n::\texample.com\n")
                .await;

        let removed = hosts.remove_entries_matching("example.com").await.unwrap();
        assert_eq!(removed, 2);

        let content = fs::read_to_string(hosts.path()).await.unwrap();
        assert_eq!(content, "127.0.0.1 localhost\n0.0.0.0\tother.org\n");
    }

    #[tokio::test]
    async fn test_remove_missing_name_leaves_file_untouched() {
        let (hosts, _dir) = hosts_with(STOCK_HOSTS).await;
        assert_eq!(hosts.remove_entries_matching("example.com").await.unwrap(), 0);
        assert_eq!(fs::read_to_string(hosts.path()).await.unwrap(), STOCK_HOSTS);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let hosts = HostsFile::new(
            dir.path().join("absent"),
            Ipv4Addr::UNSPECIFIED,
            Ipv6Addr::UNSPECIFIED,
        );
        assert!(hosts.list_sinkholed_names().await.unwrap().is_empty());
    }
}
