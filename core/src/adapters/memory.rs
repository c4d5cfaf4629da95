//! In-memory adapters.
//!
//! Used by tests and by callers that want to preview what an operation
//! would do. The rule store deliberately behaves like the least forgiving
//! packet filter: `apply` appends even when an identical rule exists and
//! `delete` removes a single match per call.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::domain::{
    validate_domain, CommandOutcome, DeleteOutcome, FirewallRule, RuleAction, RuleDirection,
    RuleTarget,
};
use crate::error::{Error, Result};
use crate::ports::{AddressFamily, CacheFlusher, NameOverrideStore, ResolverBackend, RuleStore};

// ============================================================================
// Rule store
// ============================================================================

/// A rule held by `MemoryRuleStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRule {
    pub rule: FirewallRule,
    pub comment: Option<String>,
}

/// Default policies of the memory rule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub incoming: RuleAction,
    pub outgoing: RuleAction,
    pub enabled: bool,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            incoming: RuleAction::Allow,
            outgoing: RuleAction::Allow,
            enabled: false,
        }
    }
}

#[derive(Default)]
pub struct MemoryRuleStore {
    rules: Mutex<Vec<StoredRule>>,
    baseline: Mutex<Baseline>,
    failing: Mutex<HashSet<RuleTarget>>,
    failing_apply: Mutex<HashSet<RuleTarget>>,
    calls: AtomicUsize,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing rules, duplicates included.
    pub fn with_rules(rules: impl IntoIterator<Item = FirewallRule>) -> Self {
        let store = Self::new();
        store.rules.lock().extend(rules.into_iter().map(|rule| StoredRule {
            rule,
            comment: None,
        }));
        store
    }

    /// Make every apply and delete touching `target` fail.
    pub fn fail_on(&self, target: RuleTarget) {
        self.failing.lock().insert(target);
    }

    /// Make only applies touching `target` fail; deletes still succeed.
    pub fn fail_apply_on(&self, target: RuleTarget) {
        self.failing_apply.lock().insert(target);
    }

    pub fn rules(&self) -> Vec<StoredRule> {
        self.rules.lock().clone()
    }

    /// Number of stored copies of `rule`.
    pub fn count(&self, rule: &FirewallRule) -> usize {
        self.rules.lock().iter().filter(|r| r.rule == *rule).count()
    }

    /// Rules applying to `target`, in any direction or polarity.
    pub fn rules_for(&self, target: &RuleTarget) -> Vec<FirewallRule> {
        self.rules
            .lock()
            .iter()
            .filter(|r| r.rule.target == *target)
            .map(|r| r.rule)
            .collect()
    }

    pub fn baseline(&self) -> Baseline {
        *self.baseline.lock()
    }

    /// Number of apply/delete/list/reset calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self, rule: &FirewallRule, verb: &str) -> Result<()> {
        let injected = self.failing.lock().contains(&rule.target)
            || (verb == "apply" && self.failing_apply.lock().contains(&rule.target));
        if injected {
            return Err(Error::ExternalCommand {
                command: format!("{} {}", verb, rule),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Render a listing shaped like `ufw status numbered`.
    fn render(&self) -> String {
        let baseline = self.baseline();
        let mut out = format!(
            "Status: {}\n",
            if baseline.enabled { "active" } else { "inactive" }
        );
        let rules = self.rules.lock();
        if rules.is_empty() {
            return out;
        }

        out.push_str("\n     To                         Action      From\n");
        out.push_str("     --                         ------      ----\n");
        for (i, stored) in rules.iter().enumerate() {
            let rule = &stored.rule;
            let action = format!(
                "{} {}",
                rule.action.as_str().to_uppercase(),
                rule.direction.as_str().to_uppercase()
            );
            let (to, from) = match (rule.target, rule.direction) {
                (RuleTarget::Address(addr), RuleDirection::In) => {
                    ("Anywhere".to_string(), addr.to_string())
                }
                (RuleTarget::Address(addr), RuleDirection::Out) => {
                    (addr.to_string(), "Anywhere".to_string())
                }
                (target, _) => (target.to_string(), "Anywhere".to_string()),
            };
            let _ = write!(out, "[{:>2}] {:<26} {:<11} {}", i + 1, to, action, from);
            if rule.direction == RuleDirection::Out {
                out.push_str(" (out)");
            }
            if let Some(comment) = &stored.comment {
                let _ = write!(out, " # {}", comment);
            }
            out.push('\n');
        }
        out
    }
}

impl RuleStore for MemoryRuleStore {
    async fn apply(&self, rule: &FirewallRule, comment: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(rule, "apply")?;
        self.rules.lock().push(StoredRule {
            rule: *rule,
            comment: comment.map(str::to_string),
        });
        Ok("Rule added".to_string())
    }

    async fn delete(&self, rule: &FirewallRule) -> Result<DeleteOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(rule, "delete")?;
        let mut rules = self.rules.lock();
        match rules.iter().position(|r| r.rule == *rule) {
            Some(index) => {
                rules.remove(index);
                Ok(DeleteOutcome {
                    removed: true,
                    output: "Rule deleted".to_string(),
                })
            }
            None => Ok(DeleteOutcome {
                removed: false,
                output: "Could not delete non-existent rule".to_string(),
            }),
        }
    }

    async fn list_numbered_rules(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.render())
    }

    async fn reset(&self) -> Vec<CommandOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rules.lock().clear();
        *self.baseline.lock() = Baseline {
            incoming: RuleAction::Deny,
            outgoing: RuleAction::Allow,
            enabled: true,
        };
        vec![
            CommandOutcome::ok("reset", "Resetting all rules to installed defaults"),
            CommandOutcome::ok("default deny incoming", "Default incoming policy changed to 'deny'"),
            CommandOutcome::ok("default allow outgoing", "Default outgoing policy changed to 'allow'"),
            CommandOutcome::ok("enable", "Firewall is active and enabled on system startup"),
        ]
    }
}

// ============================================================================
// Name override store
// ============================================================================

#[derive(Default)]
pub struct MemoryOverrideStore {
    names: Mutex<BTreeSet<String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store.names.lock().extend(names.into_iter().map(Into::into));
        store
    }

    /// Make appends and removals fail.
    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.names.lock().clone()
    }

    fn check_write(&self, verb: &str) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(Error::ExternalCommand {
                command: format!("{} override entries", verb),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl NameOverrideStore for MemoryOverrideStore {
    async fn list_sinkholed_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.names())
    }

    async fn append_sinkhole_entries(&self, domains: &[String]) -> Result<()> {
        self.check_write("append")?;
        let validated = domains
            .iter()
            .map(|d| validate_domain(d))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.names.lock().extend(validated);
        Ok(())
    }

    async fn remove_entries_matching(&self, domain: &str) -> Result<usize> {
        self.check_write("remove")?;
        Ok(usize::from(self.names.lock().remove(domain)))
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolver answering from a fixed table. Unknown names have no records.
#[derive(Default)]
pub struct StaticResolver {
    answers: Mutex<HashMap<String, Vec<IpAddr>>>,
    failing: Mutex<HashMap<String, HashSet<AddressFamily>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, domain: &str, addrs: &[&str]) -> Self {
        let parsed = addrs
            .iter()
            .filter_map(|a| a.parse::<IpAddr>().ok())
            .collect::<Vec<_>>();
        self.answers
            .lock()
            .entry(domain.to_string())
            .or_default()
            .extend(parsed);
        self
    }

    /// Make lookups of `domain` in `family` fail.
    pub fn failing(self, domain: &str, family: AddressFamily) -> Self {
        self.failing
            .lock()
            .entry(domain.to_string())
            .or_default()
            .insert(family);
        self
    }

    /// Replace the answers for `domain`.
    pub fn set(&self, domain: &str, addrs: &[IpAddr]) {
        self.answers.lock().insert(domain.to_string(), addrs.to_vec());
    }
}

impl ResolverBackend for StaticResolver {
    async fn resolve_family(&self, domain: &str, family: AddressFamily) -> Result<BTreeSet<IpAddr>> {
        if self
            .failing
            .lock()
            .get(domain)
            .is_some_and(|families| families.contains(&family))
        {
            return Err(Error::Resolution {
                domain: domain.to_string(),
                reason: format!("{} lookup failed: no such host", family),
            });
        }
        Ok(self
            .answers
            .lock()
            .get(domain)
            .map(|addrs| addrs.iter().copied().filter(|a| family.matches(a)).collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Cache flusher
// ============================================================================

/// Counts flushes; optionally fails every one.
#[derive(Default)]
pub struct RecordingFlusher {
    flushes: AtomicUsize,
    fail: bool,
}

impl RecordingFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            flushes: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl CacheFlusher for RecordingFlusher {
    async fn flush_resolver_cache(&self) -> Result<String> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::ExternalCommand {
                command: "flush resolver cache".to_string(),
                reason: "resolver service not running".to_string(),
            });
        }
        Ok("Flushed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PortSelector, Protocol};

    fn deny_in_8081() -> FirewallRule {
        FirewallRule::new(
            RuleDirection::In,
            RuleAction::Deny,
            RuleTarget::Port(PortSelector::new(8081, Protocol::Tcp)),
        )
    }

    #[test]
    fn test_delete_removes_one_copy() {
        tokio_test::block_on(async {
            let store = MemoryRuleStore::with_rules([deny_in_8081(), deny_in_8081()]);
            assert!(store.delete(&deny_in_8081()).await.unwrap().removed);
            assert_eq!(store.count(&deny_in_8081()), 1);
            assert!(store.delete(&deny_in_8081()).await.unwrap().removed);
            assert!(!store.delete(&deny_in_8081()).await.unwrap().removed);
        });
    }

    #[tokio::test]
    async fn test_listing_shows_comments() {
        let store = MemoryRuleStore::new();
        let addr: IpAddr = "93.184.216.34".parse().unwrap();
        store
            .apply(
                &FirewallRule::new(RuleDirection::Out, RuleAction::Deny, RuleTarget::Address(addr)),
                Some("Blocked example.com"),
            )
            .await
            .unwrap();
        let listing = store.list_numbered_rules().await.unwrap();
        assert!(listing.contains("[ 1] 93.184.216.34"));
        assert!(listing.contains("DENY OUT"));
        assert!(listing.trim_end().ends_with("# Blocked example.com"));
    }

    #[tokio::test]
    async fn test_static_resolver_splits_families() {
        let resolver = StaticResolver::new().with("example.com", &["93.184.216.34", "2606:2800::1"]);
        let v4 = resolver.resolve_family("example.com", AddressFamily::V4).await.unwrap();
        let v6 = resolver.resolve_family("example.com", AddressFamily::V6).await.unwrap();
        assert_eq!(v4.len(), 1);
        assert_eq!(v6.len(), 1);
        assert!(resolver
            .resolve_family("unknown.org", AddressFamily::V4)
            .await
            .unwrap()
            .is_empty());
    }
}
