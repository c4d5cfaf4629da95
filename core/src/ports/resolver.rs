//! Name resolution ports (interfaces).

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Address family of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    pub fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::V4 => addr.is_ipv4(),
            AddressFamily::V6 => addr.is_ipv6(),
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Port for resolving a name within one address family.
pub trait ResolverBackend: Send + Sync {
    /// Addresses of `domain` in `family`.
    ///
    /// A name without records in this family yields an empty set, not an
    /// error.
    fn resolve_family(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> impl std::future::Future<Output = Result<BTreeSet<IpAddr>>> + Send;
}

/// Port for invalidating the host's resolver cache.
///
/// Failure is reported but never fatal to the calling operation.
pub trait CacheFlusher: Send + Sync {
    fn flush_resolver_cache(&self) -> impl std::future::Future<Output = Result<String>> + Send;
}
