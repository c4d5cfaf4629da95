//! Domain pairs and block records.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix tying the bare and www forms of a domain together.
const WWW_PREFIX: &str = "www.";

/// Comment prefix on every IP rule installed by a domain block.
const TAG_PREFIX: &str = "Blocked ";

/// Host names found in stock hosts files that never count as blocked.
pub const RESERVED_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Block or unblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainAction {
    Block,
    Unblock,
}

impl std::fmt::Display for DomainAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainAction::Block => f.write_str("block"),
            DomainAction::Unblock => f.write_str("unblock"),
        }
    }
}

/// The bare and `www.` forms of a domain, always handled together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPair {
    pub base: String,
    pub www: String,
}

impl DomainPair {
    /// Pair a domain with its sibling form.
    ///
    /// Expects a name that already passed `validate_domain`. A `www.`
    /// prefix is only stripped when a registrable name remains, so
    /// `www.com` stays its own base.
    pub fn normalize(domain: &str) -> Self {
        match domain.strip_prefix(WWW_PREFIX) {
            Some(base) if base.contains('.') => Self {
                base: base.to_string(),
                www: domain.to_string(),
            },
            _ => Self {
                base: domain.to_string(),
                www: format!("{}{}", WWW_PREFIX, domain),
            },
        }
    }

    /// Both names, base first.
    pub fn names(&self) -> [&str; 2] {
        [self.base.as_str(), self.www.as_str()]
    }
}

/// Comment naming every blocked base domain that owns an address.
///
/// Owners are listed in order so the same set always yields the same tag.
pub fn block_tag<'a>(owners: impl IntoIterator<Item = &'a str>) -> String {
    let owners: BTreeSet<&str> = owners.into_iter().collect();
    format!(
        "{}{}",
        TAG_PREFIX,
        owners.into_iter().collect::<Vec<_>>().join(", ")
    )
}

/// Base domains named by a block tag, or `None` for any other comment.
pub fn tag_owners(comment: &str) -> Option<BTreeSet<String>> {
    let owners: BTreeSet<String> = comment
        .strip_prefix(TAG_PREFIX)?
        .split(',')
        .map(|owner| owner.trim().to_string())
        .filter(|owner| !owner.is_empty())
        .collect();
    (!owners.is_empty()).then_some(owners)
}

impl std::fmt::Display for DomainPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} + {}", self.base, self.www)
    }
}

/// IPv4 and IPv6 addresses of one or more names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAddresses {
    pub ipv4: BTreeSet<Ipv4Addr>,
    pub ipv6: BTreeSet<Ipv6Addr>,
}

impl ResolvedAddresses {
    pub fn insert(&mut self, addr: IpAddr) {
        match addr {
            IpAddr::V4(v4) => {
                self.ipv4.insert(v4);
            }
            IpAddr::V6(v6) => {
                self.ipv6.insert(v6);
            }
        }
    }

    pub fn merge(&mut self, other: ResolvedAddresses) {
        self.ipv4.extend(other.ipv4);
        self.ipv6.extend(other.ipv6);
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    /// All addresses, IPv4 first.
    pub fn iter(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.ipv4
            .iter()
            .copied()
            .map(IpAddr::V4)
            .chain(self.ipv6.iter().copied().map(IpAddr::V6))
    }

    /// Drop every address matching `predicate`.
    pub fn retain(&mut self, mut predicate: impl FnMut(&IpAddr) -> bool) {
        self.ipv4.retain(|v4| predicate(&IpAddr::V4(*v4)));
        self.ipv6.retain(|v6| predicate(&IpAddr::V6(*v6)));
    }
}

impl FromIterator<IpAddr> for ResolvedAddresses {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        let mut addrs = Self::default();
        for addr in iter {
            addrs.insert(addr);
        }
        addrs
    }
}

/// A domain pair and the addresses its block covered.
///
/// Not stored anywhere: the override store entries and the tagged IP rules
/// are the durable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainBlockRecord {
    pub base_domain: String,
    pub www_domain: String,
    pub ipv4: BTreeSet<Ipv4Addr>,
    pub ipv6: BTreeSet<Ipv6Addr>,
    pub blocked_at: DateTime<Utc>,
}

impl DomainBlockRecord {
    pub fn new(pair: &DomainPair, addrs: &ResolvedAddresses) -> Self {
        Self {
            base_domain: pair.base.clone(),
            www_domain: pair.www.clone(),
            ipv4: addrs.ipv4.clone(),
            ipv6: addrs.ipv6.clone(),
            blocked_at: Utc::now(),
        }
    }
}

/// One line's worth of the override store: a name and its sinkhole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameOverrideEntry {
    pub domain: String,
    pub sinkhole_address: IpAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            DomainPair::normalize("youtube.com"),
            DomainPair {
                base: "youtube.com".into(),
                www: "www.youtube.com".into()
            }
        );
        assert_eq!(
            DomainPair::normalize("www.youtube.com"),
            DomainPair::normalize("youtube.com")
        );
        let pair = DomainPair::normalize("mail.google.com");
        assert_eq!(pair.base, "mail.google.com");
        assert_eq!(pair.www, "www.mail.google.com");

        assert_eq!(DomainPair::normalize("www.com").base, "www.com");
    }

    #[test]
    fn test_shared_tags() {
        assert_eq!(block_tag(["b-site.com", "a-site.com"]), "Blocked a-site.com, b-site.com");

        let owners = tag_owners("Blocked a-site.com, b-site.com").unwrap();
        assert_eq!(owners.into_iter().collect::<Vec<_>>(), ["a-site.com", "b-site.com"]);
        assert_eq!(tag_owners("allow office vpn"), None);
        assert_eq!(tag_owners("Blocked "), None);
    }

    #[test]
    fn test_resolved_addresses_dedup() {
        let addrs: ResolvedAddresses = ["1.1.1.1", "1.1.1.1", "::2", "2.2.2.2"]
            .iter()
            .map(|a| a.parse::<IpAddr>().unwrap())
            .collect();
        assert_eq!(addrs.ipv4.len(), 2);
        assert_eq!(addrs.ipv6.len(), 1);
        assert_eq!(addrs.len(), 3);
        assert_eq!(addrs.iter().next(), Some("1.1.1.1".parse().unwrap()));
    }
}
