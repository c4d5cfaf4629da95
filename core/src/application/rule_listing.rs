//! Parsing of the rule store's numbered listing.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{tag_owners, FirewallRule, RuleDirection, RuleTarget};

/// One line of a numbered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedRule {
    pub number: usize,
    /// Everything between the number and the comment.
    pub body: String,
    pub comment: Option<String>,
}

impl NumberedRule {
    /// Addresses named in the rule body.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.body
            .split_whitespace()
            .filter_map(|token| token.trim_matches(|c| c == '(' || c == ')').parse().ok())
    }

    /// Whether this line is a copy of `rule`.
    ///
    /// Port and service rules are matched on their IPv4 line only, since
    /// the packet filter lists one `(v6)` twin per rule added.
    pub fn matches(&self, rule: &FirewallRule) -> bool {
        let tokens: Vec<&str> = self.body.split_whitespace().collect();
        let Some(split) = tokens.windows(2).position(|pair| {
            pair[0].eq_ignore_ascii_case(rule.action.as_str())
                && pair[1].eq_ignore_ascii_case(rule.direction.as_str())
        }) else {
            return false;
        };
        let (to, from) = (&tokens[..split], &tokens[split + 2..]);

        match rule.target {
            RuleTarget::Address(addr) => {
                let side = match rule.direction {
                    RuleDirection::In => from,
                    RuleDirection::Out => to,
                };
                side.iter().any(|token| token.parse::<IpAddr>().ok() == Some(addr))
            }
            target => {
                !tokens.contains(&"(v6)")
                    && to.first().is_some_and(|token| names_target(token, target))
                    && from.iter().all(|token| matches!(*token, "Anywhere" | "(out)"))
            }
        }
    }
}

/// Whether the "To" column token `token` denotes a port or service target.
fn names_target(token: &str, target: RuleTarget) -> bool {
    match target {
        RuleTarget::Port(selector) => token == selector.to_string(),
        RuleTarget::Service(service) => {
            token == service.name()
                || service.well_known_ports().iter().any(|port| {
                    let port = port.to_string();
                    token == port
                        || token.strip_prefix(port.as_str()).is_some_and(|rest| {
                            matches!(rest, "/tcp" | "/udp")
                        })
                })
        }
        RuleTarget::Address(_) => false,
    }
}

fn numbered_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[\s*(\d+)\]\s+(.*?)\s*(?:#\s*(.*?))?\s*$").expect("numbered rule regex")
    })
}

/// Parse every numbered line, skipping headers and blank lines.
pub fn parse_numbered(listing: &str) -> Vec<NumberedRule> {
    listing
        .lines()
        .filter_map(|line| {
            let caps = numbered_line().captures(line.trim())?;
            Some(NumberedRule {
                number: caps[1].parse().ok()?,
                body: caps[2].to_string(),
                comment: caps
                    .get(3)
                    .map(|m| m.as_str().to_string())
                    .filter(|c| !c.is_empty()),
            })
        })
        .collect()
}

/// Number of lines in `listing` that are copies of `rule`.
pub fn count_matching(listing: &str, rule: &FirewallRule) -> usize {
    parse_numbered(listing)
        .iter()
        .filter(|line| line.matches(rule))
        .count()
}

/// Blocked base domains owning each address, read from block tags.
pub fn address_owners(listing: &str) -> BTreeMap<IpAddr, BTreeSet<String>> {
    let mut owners: BTreeMap<IpAddr, BTreeSet<String>> = BTreeMap::new();
    for line in parse_numbered(listing) {
        let Some(names) = line.comment.as_deref().and_then(tag_owners) else {
            continue;
        };
        for addr in line.addresses() {
            owners.entry(addr).or_default().extend(names.iter().cloned());
        }
    }
    owners
}

/// Addresses whose owners, as returned by `address_owners`, include `base`.
pub fn tagged_addresses(
    owners: &BTreeMap<IpAddr, BTreeSet<String>>,
    base: &str,
) -> BTreeSet<IpAddr> {
    owners
        .iter()
        .filter(|(_, names)| names.contains(base))
        .map(|(addr, _)| *addr)
        .collect()
}
