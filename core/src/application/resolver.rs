//! Domain resolution across both address families.

use std::net::IpAddr;

use tracing::{debug, warn};

use crate::domain::ResolvedAddresses;
use crate::error::{Error, Result};
use crate::ports::{AddressFamily, ResolverBackend};

/// Resolves a name to all of its IPv4 and IPv6 addresses.
pub struct DomainResolver<B: ResolverBackend> {
    backend: B,
}

impl<B: ResolverBackend> DomainResolver<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Look up both families independently.
    ///
    /// A family with no records, or whose lookup fails while the other
    /// succeeds, contributes an empty set. Only a failure of both families
    /// is an error.
    pub async fn resolve(&self, domain: &str) -> Result<ResolvedAddresses> {
        let mut addrs = ResolvedAddresses::default();
        let mut failures = Vec::new();

        for family in AddressFamily::ALL {
            match self.backend.resolve_family(domain, family).await {
                Ok(found) => {
                    debug!(domain, %family, count = found.len(), "resolved");
                    found.into_iter().for_each(|addr: IpAddr| addrs.insert(addr));
                }
                Err(e) => {
                    warn!(domain, %family, error = %e, "lookup failed");
                    failures.push(e.to_string());
                }
            }
        }

        if failures.len() == AddressFamily::ALL.len() {
            return Err(Error::Resolution {
                domain: domain.to_string(),
                reason: failures.join("; "),
            });
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::StaticResolver;

    #[tokio::test]
    async fn test_missing_family_is_not_an_error() {
        let resolver = DomainResolver::new(StaticResolver::new().with("v4only.org", &["192.0.2.7"]));
        let addrs = resolver.resolve("v4only.org").await.unwrap();
        assert_eq!(addrs.ipv4.len(), 1);
        assert!(addrs.ipv6.is_empty());
    }

    #[tokio::test]
    async fn test_one_failed_family_is_tolerated() {
        let backend = StaticResolver::new()
            .with("example.com", &["192.0.2.1"])
            .failing("example.com", AddressFamily::V6);
        let addrs = DomainResolver::new(backend).resolve("example.com").await.unwrap();
        assert_eq!(addrs.len(), 1);
    }

    #[tokio::test]
    async fn test_both_families_failing_is_resolution_error() {
        let backend = StaticResolver::new()
            .failing("gone.example", AddressFamily::V4)
            .failing("gone.example", AddressFamily::V6);
        let err = DomainResolver::new(backend)
            .resolve("gone.example")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }
}
