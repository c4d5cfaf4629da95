//! System name resolution and resolver cache flushing.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::PathBuf;

use super::command::{CommandRunner, CommandSpec};
use crate::error::{Error, Result};
use crate::ports::{AddressFamily, CacheFlusher, ResolverBackend};

/// Resolver asking the host's name service switch through `getent`.
///
/// Each family is its own `ahostsv4` / `ahostsv6` query, so a failure in
/// one family never hides the answers of the other.
pub struct SystemResolver {
    getent: PathBuf,
    runner: CommandRunner,
}

impl SystemResolver {
    pub fn new(getent: impl Into<PathBuf>, runner: CommandRunner) -> Self {
        Self {
            getent: getent.into(),
            runner,
        }
    }
}

fn database(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => "ahostsv4",
        AddressFamily::V6 => "ahostsv6",
    }
}

/// Addresses of one family in `getent ahosts*` output.
///
/// The first column holds the address. `ahostsv6` also lists IPv4-mapped
/// addresses for names without AAAA records; those are dropped.
fn parse_getent(output: &str, family: AddressFamily) -> BTreeSet<IpAddr> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next()?.parse::<IpAddr>().ok())
        .filter(|ip| !matches!(ip, IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some()))
        .filter(|ip| family.matches(ip))
        .collect()
}

impl ResolverBackend for SystemResolver {
    async fn resolve_family(&self, domain: &str, family: AddressFamily) -> Result<BTreeSet<IpAddr>> {
        let failed = |reason: String| Error::Resolution {
            domain: domain.to_string(),
            reason: format!("{} lookup failed: {}", family, reason),
        };

        let spec = CommandSpec::new(&self.getent)
            .arg(database(family))
            .arg(domain);
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| failed(e.to_string()))?;

        // getent exits 2 without output when the name has no records
        if !output.success {
            return Err(failed(if output.text.is_empty() {
                "no such host".to_string()
            } else {
                output.text
            }));
        }

        Ok(parse_getent(&output.text, family))
    }
}

/// Flushes the resolver cache by running a configured command.
pub struct CommandCacheFlusher {
    command: CommandSpec,
    runner: CommandRunner,
}

impl CommandCacheFlusher {
    /// `argv` is the program followed by its arguments.
    pub fn new(argv: &[String], runner: CommandRunner) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config("Flush command cannot be empty".to_string()))?;
        Ok(Self {
            command: CommandSpec::new(program).args(args.iter().cloned()),
            runner,
        })
    }
}

impl CacheFlusher for CommandCacheFlusher {
    async fn flush_resolver_cache(&self) -> Result<String> {
        self.runner.run_checked(&self.command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    const AHOSTS_V6: &str = "\
2606:2800:220:1:248:1893:25c8:1946 STREAM example.com
2606:2800:220:1:248:1893:25c8:1946 DGRAM
2606:2800:220:1:248:1893:25c8:1946 RAW
::ffff:93.184.216.34 STREAM
";

    #[test]
    fn test_getent_output_parsed_per_family() {
        let v6 = parse_getent(AHOSTS_V6, AddressFamily::V6);
        assert_eq!(
            v6.into_iter().collect::<Vec<_>>(),
            vec!["2606:2800:220:1:248:1893:25c8:1946".parse::<IpAddr>().unwrap()]
        );

        let v4 = parse_getent("93.184.216.34   STREAM example.com\n93.184.216.34   DGRAM\n", AddressFamily::V4);
        assert_eq!(v4.len(), 1);
        assert!(parse_getent("", AddressFamily::V4).is_empty());
    }

    #[tokio::test]
    async fn test_missing_lookup_tool_is_resolution_error() {
        let resolver = SystemResolver::new(
            "/nonexistent/hostwall-getent",
            CommandRunner::new(false, Duration::from_secs(2)),
        );
        let err = resolver
            .resolve_family("example.com", AddressFamily::V4)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_empty_flush_command_rejected() {
        let runner = CommandRunner::new(false, Duration::from_secs(1));
        assert!(CommandCacheFlusher::new(&[], runner).is_err());
    }
}
