//! Dual-layer domain blocking.
//!
//! Blocking a domain sinkholes both of its names in the override store and
//! denies traffic to and from every address either name resolved to.
//! Unblocking reverses both layers. Individual sub-step failures are
//! recorded in the outcome and never stop the remaining steps.
//!
//! Address rules are tagged with every blocked base domain that resolved to
//! the address, so an address shared by two blocked domains stays denied
//! until the last of them is unblocked.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::reconciler::RuleReconciler;
use super::resolver::DomainResolver;
use super::rule_listing::{address_owners, tagged_addresses};
use crate::domain::protected::is_excluded_address;
use crate::domain::{
    block_tag, validate_domain, CommandOutcome, Direction, DomainAction, DomainBlockOutcome,
    DomainBlockRecord, DomainPair, OutcomeStatus, ResolvedAddresses, RuleAction, RuleIntent,
    RuleTarget,
};
use crate::error::Result;
use crate::ports::{CacheFlusher, NameOverrideStore, ResolverBackend, RuleStore};

/// Composes resolution, the override store, rule reconciliation and cache
/// invalidation into block/unblock operations over a domain pair.
///
/// Lock order is always override store, then rule store.
pub struct DomainBlockOrchestrator<R, H, B, C>
where
    R: RuleStore,
    H: NameOverrideStore,
    B: ResolverBackend,
    C: CacheFlusher,
{
    reconciler: Arc<RuleReconciler<R>>,
    overrides: Arc<Mutex<H>>,
    resolver: DomainResolver<B>,
    flusher: C,
}

impl<R, H, B, C> DomainBlockOrchestrator<R, H, B, C>
where
    R: RuleStore,
    H: NameOverrideStore,
    B: ResolverBackend,
    C: CacheFlusher,
{
    pub fn new(
        reconciler: Arc<RuleReconciler<R>>,
        overrides: Arc<Mutex<H>>,
        resolver: DomainResolver<B>,
        flusher: C,
    ) -> Self {
        Self {
            reconciler,
            overrides,
            resolver,
            flusher,
        }
    }

    /// Run `action` on `domain`.
    pub async fn apply(&self, domain: &str, action: DomainAction) -> Result<DomainBlockOutcome> {
        match action {
            DomainAction::Block => self.block(domain).await,
            DomainAction::Unblock => self.unblock(domain).await,
        }
    }

    /// Sinkhole both names and deny every resolved address.
    pub async fn block(&self, domain: &str) -> Result<DomainBlockOutcome> {
        let pair = DomainPair::normalize(&validate_domain(domain)?);
        let (addrs, resolution_error) = self.resolve_pair(&pair).await;
        let mut steps = Vec::new();

        let overrides = self.overrides.lock().await;
        self.sinkhole(&*overrides, &pair, &mut steps).await;

        let mut rule_count = 0;
        {
            let store = self.reconciler.lock().await;
            let owners = self.read_owners(&store, &mut steps).await;
            for addr in addrs.iter() {
                let mut names: BTreeSet<&str> = owners
                    .get(&addr)
                    .into_iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                names.insert(pair.base.as_str());

                let intent = deny_intent(addr, block_tag(names));
                let outcome = self.reconciler.reconcile_locked(&store, &intent, None).await;
                rule_count += outcome.applied;
                steps.extend(outcome.steps);
            }
        }

        self.flush(&mut steps).await;
        drop(overrides);

        let outcome = self.finish(DomainAction::Block, &pair, addrs, rule_count, steps);
        Ok(DomainBlockOutcome {
            resolution_error,
            ..outcome
        })
    }

    /// Remove both names and the deny rules for their addresses.
    ///
    /// Addresses come from a fresh lookup and from rules tagged for this
    /// domain, since a blocked name may still resolve to the sinkhole. An
    /// address whose tag names another still-sinkholed domain keeps its deny
    /// rules, re-tagged for the remaining owners.
    pub async fn unblock(&self, domain: &str) -> Result<DomainBlockOutcome> {
        let pair = DomainPair::normalize(&validate_domain(domain)?);
        let (mut addrs, resolution_error) = self.resolve_pair(&pair).await;
        let mut steps = Vec::new();

        let overrides = self.overrides.lock().await;
        for name in pair.names() {
            let label = format!("remove override {}", name);
            match overrides.remove_entries_matching(name).await {
                Ok(removed) => {
                    steps.push(CommandOutcome::ok(label, format!("{} entries removed", removed)))
                }
                Err(e) => {
                    warn!(domain = name, error = %e, "failed to remove override entries");
                    steps.push(CommandOutcome::failed(label, &e));
                }
            }
        }
        // Without a readable override store every tagged owner counts as live.
        let live = match overrides.list_sinkholed_names().await {
            Ok(names) => Some(names),
            Err(e) => {
                warn!(error = %e, "failed to read override store");
                None
            }
        };

        let mut rule_count = 0;
        let mut shared = BTreeSet::new();
        {
            let store = self.reconciler.lock().await;
            let owners = self.read_owners(&store, &mut steps).await;
            let tagged: ResolvedAddresses =
                tagged_addresses(&owners, &pair.base).into_iter().collect();
            debug!(domain = %pair.base, count = tagged.len(), "tagged rules found");
            addrs.merge(tagged);
            addrs.retain(|a| !is_excluded_address(a));

            for addr in addrs.iter() {
                let others: BTreeSet<&str> = owners
                    .get(&addr)
                    .into_iter()
                    .flatten()
                    .map(String::as_str)
                    .filter(|owner| *owner != pair.base)
                    .filter(|owner| live.as_ref().map_or(true, |names| names.contains(*owner)))
                    .collect();

                if others.is_empty() {
                    rule_count += self
                        .reconciler
                        .purge(&store, RuleTarget::Address(addr), &[RuleAction::Deny], &mut steps)
                        .await;
                    continue;
                }

                debug!(%addr, owners = others.len(), "address still blocked for other domains");
                let intent = deny_intent(addr, block_tag(others));
                let outcome = self.reconciler.reconcile_locked(&store, &intent, None).await;
                steps.extend(outcome.steps);
                shared.insert(addr);
            }
        }

        self.flush(&mut steps).await;
        drop(overrides);

        let outcome = self.finish(DomainAction::Unblock, &pair, addrs, rule_count, steps);
        Ok(DomainBlockOutcome {
            resolution_error,
            shared_addresses: shared,
            ..outcome
        })
    }

    /// Names currently blocked, derived from the override store alone.
    pub async fn list_blocked(&self) -> Result<BTreeSet<String>> {
        self.overrides.lock().await.list_sinkholed_names().await
    }

    /// Resolve both names, union the results and drop excluded addresses.
    ///
    /// Returns the resolution error only when neither name resolved.
    async fn resolve_pair(&self, pair: &DomainPair) -> (ResolvedAddresses, Option<String>) {
        let mut addrs = ResolvedAddresses::default();
        let mut failures = Vec::new();

        for name in pair.names() {
            match self.resolver.resolve(name).await {
                Ok(found) => addrs.merge(found),
                Err(e) => {
                    warn!(domain = name, error = %e, "resolution failed");
                    failures.push(e.to_string());
                }
            }
        }

        let before = addrs.len();
        addrs.retain(|a| !is_excluded_address(a));
        if addrs.len() < before {
            debug!(domain = %pair.base, skipped = before - addrs.len(), "loopback/unspecified addresses skipped");
        }

        let error = (failures.len() == pair.names().len()).then(|| failures.join("; "));
        (addrs, error)
    }

    /// Owners of every tagged address in the current rule listing.
    async fn read_owners(
        &self,
        store: &R,
        steps: &mut Vec<CommandOutcome>,
    ) -> BTreeMap<IpAddr, BTreeSet<String>> {
        match store.list_numbered_rules().await {
            Ok(listing) => address_owners(&listing),
            Err(e) => {
                warn!(error = %e, "failed to list rules; tagged addresses unknown");
                steps.push(CommandOutcome::failed("list rules", &e));
                BTreeMap::new()
            }
        }
    }

    async fn sinkhole(&self, overrides: &H, pair: &DomainPair, steps: &mut Vec<CommandOutcome>) {
        let existing = match overrides.list_sinkholed_names().await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "failed to read override store");
                steps.push(CommandOutcome::failed("list overrides", &e));
                return;
            }
        };

        let missing: Vec<String> = pair
            .names()
            .iter()
            .filter(|name| !existing.contains(**name))
            .map(|name| name.to_string())
            .collect();

        let label = format!("sinkhole {}", pair);
        if missing.is_empty() {
            steps.push(CommandOutcome::ok(label, "already present"));
            return;
        }
        match overrides.append_sinkhole_entries(&missing).await {
            Ok(()) => steps.push(CommandOutcome::ok(label, format!("added {}", missing.join(", ")))),
            Err(e) => {
                warn!(domain = %pair.base, error = %e, "failed to add override entries");
                steps.push(CommandOutcome::failed(label, &e));
            }
        }
    }

    async fn flush(&self, steps: &mut Vec<CommandOutcome>) {
        match self.flusher.flush_resolver_cache().await {
            Ok(output) => steps.push(CommandOutcome::ok("flush resolver cache", output)),
            Err(e) => {
                warn!(error = %e, "resolver cache flush failed");
                steps.push(CommandOutcome::failed("flush resolver cache", &e));
            }
        }
    }

    fn finish(
        &self,
        action: DomainAction,
        pair: &DomainPair,
        addrs: ResolvedAddresses,
        rule_count: usize,
        steps: Vec<CommandOutcome>,
    ) -> DomainBlockOutcome {
        let status = OutcomeStatus::from_steps(&steps);
        info!(
            domain = %pair.base,
            %action,
            ipv4 = addrs.ipv4.len(),
            ipv6 = addrs.ipv6.len(),
            rule_count,
            ?status,
            "domain {}ed",
            action
        );
        DomainBlockOutcome {
            status,
            action,
            record: DomainBlockRecord::new(pair, &addrs),
            rule_count,
            steps,
            resolution_error: None,
            shared_addresses: BTreeSet::new(),
        }
    }
}

fn deny_intent(addr: IpAddr, tag: String) -> RuleIntent {
    RuleIntent::new(RuleTarget::Address(addr), Direction::Both, RuleAction::Deny).with_comment(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        MemoryOverrideStore, MemoryRuleStore, RecordingFlusher, StaticResolver,
    };
    use crate::application::reconciler::DEFAULT_MAX_DELETE_PASSES;
    use crate::ports::AddressFamily;

    type Orchestrator =
        DomainBlockOrchestrator<MemoryRuleStore, MemoryOverrideStore, StaticResolver, RecordingFlusher>;

    struct Fixture {
        orchestrator: Orchestrator,
        rules: Arc<Mutex<MemoryRuleStore>>,
        overrides: Arc<Mutex<MemoryOverrideStore>>,
    }

    fn fixture(resolver: StaticResolver, flusher: RecordingFlusher) -> Fixture {
        let rules = Arc::new(Mutex::new(MemoryRuleStore::new()));
        let overrides = Arc::new(Mutex::new(MemoryOverrideStore::new()));
        let reconciler = Arc::new(RuleReconciler::new(rules.clone(), DEFAULT_MAX_DELETE_PASSES));
        Fixture {
            orchestrator: DomainBlockOrchestrator::new(
                reconciler,
                overrides.clone(),
                DomainResolver::new(resolver),
                flusher,
            ),
            rules,
            overrides,
        }
    }

    fn example_resolver() -> StaticResolver {
        StaticResolver::new()
            .with("example.com", &["93.184.216.34", "2606:2800:220:1::1"])
            .with("www.example.com", &["93.184.216.34", "93.184.216.35"])
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_block_covers_both_layers() {
        let f = fixture(example_resolver(), RecordingFlusher::new());
        let outcome = f.orchestrator.block("WWW.Example.com.").await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.domains(), ["example.com", "www.example.com"]);
        assert_eq!(outcome.ipv4().len(), 2);
        assert_eq!(outcome.ipv6().len(), 1);
        assert_eq!(outcome.rule_count, 6);
        assert!(outcome.resolution_error.is_none());

        let names = f.overrides.lock().await.names();
        assert!(names.contains("example.com") && names.contains("www.example.com"));

        let rules = f.rules.lock().await;
        let stored = rules.rules();
        assert_eq!(stored.len(), 6);
        assert!(stored
            .iter()
            .all(|r| r.rule.action == RuleAction::Deny
                && r.comment.as_deref() == Some("Blocked example.com")));
    }

    #[tokio::test]
    async fn test_block_twice_does_not_duplicate() {
        let f = fixture(example_resolver(), RecordingFlusher::new());
        f.orchestrator.block("example.com").await.unwrap();
        let second = f.orchestrator.block("example.com").await.unwrap();

        assert_eq!(second.rule_count, 6);
        assert_eq!(f.rules.lock().await.rules().len(), 6);
        assert_eq!(f.overrides.lock().await.names().len(), 2);
    }

    #[tokio::test]
    async fn test_loopback_answers_are_skipped() {
        let resolver = StaticResolver::new().with("intranet.test", &["127.0.0.1", "::1", "10.0.0.5"]);
        let f = fixture(resolver, RecordingFlusher::new());
        let outcome = f.orchestrator.block("intranet.test").await.unwrap();

        assert_eq!(outcome.ipv4().len(), 1);
        assert!(outcome.ipv6().is_empty());
        let rules = f.rules.lock().await;
        assert!(rules.rules_for(&RuleTarget::Address(addr("127.0.0.1"))).is_empty());
        assert_eq!(rules.rules_for(&RuleTarget::Address(addr("10.0.0.5"))).len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_domain_is_still_sinkholed() {
        let resolver = StaticResolver::new()
            .failing("gone.example", AddressFamily::V4)
            .failing("gone.example", AddressFamily::V6)
            .failing("www.gone.example", AddressFamily::V4)
            .failing("www.gone.example", AddressFamily::V6);
        let f = fixture(resolver, RecordingFlusher::new());
        let outcome = f.orchestrator.block("gone.example").await.unwrap();

        assert_eq!(outcome.rule_count, 0);
        assert!(outcome.resolution_error.is_some());
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(f.overrides.lock().await.names().contains("gone.example"));
    }

    #[tokio::test]
    async fn test_www_variant_alone_resolving_is_success() {
        let resolver = StaticResolver::new()
            .failing("cdn-only.example", AddressFamily::V4)
            .failing("cdn-only.example", AddressFamily::V6)
            .with("www.cdn-only.example", &["198.51.100.44", "2001:db8::44"]);
        let f = fixture(resolver, RecordingFlusher::new());
        let outcome = f.orchestrator.block("cdn-only.example").await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.resolution_error.is_none());
        assert_eq!(outcome.ipv4().len(), 1);
        assert_eq!(outcome.ipv6().len(), 1);
        assert_eq!(outcome.rule_count, 4);
        assert_eq!(f.rules.lock().await.rules().len(), 4);
    }

    #[tokio::test]
    async fn test_shared_address_survives_unblocking_one_owner() {
        let resolver = StaticResolver::new()
            .with("a-site.com", &["203.0.113.5"])
            .with("b-site.com", &["203.0.113.5", "198.51.100.20"]);
        let f = fixture(resolver, RecordingFlusher::new());
        let shared = RuleTarget::Address(addr("203.0.113.5"));

        f.orchestrator.block("a-site.com").await.unwrap();
        f.orchestrator.block("b-site.com").await.unwrap();
        {
            let rules = f.rules.lock().await;
            assert_eq!(rules.rules_for(&shared).len(), 2);
            assert!(rules
                .rules()
                .iter()
                .filter(|r| r.rule.target == shared)
                .all(|r| r.comment.as_deref() == Some("Blocked a-site.com, b-site.com")));
        }

        let outcome = f.orchestrator.unblock("b-site.com").await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.rule_count, 2);
        assert!(outcome.shared_addresses.contains(&addr("203.0.113.5")));

        let blocked = f.orchestrator.list_blocked().await.unwrap();
        assert!(blocked.contains("a-site.com"));
        assert!(!blocked.contains("b-site.com"));
        {
            let rules = f.rules.lock().await;
            let stored = rules.rules();
            assert_eq!(stored.len(), 2);
            assert!(stored.iter().all(|r| r.rule.target == shared
                && r.comment.as_deref() == Some("Blocked a-site.com")));
        }

        let outcome = f.orchestrator.unblock("a-site.com").await.unwrap();
        assert_eq!(outcome.rule_count, 2);
        assert!(outcome.shared_addresses.is_empty());
        assert!(f.rules.lock().await.rules().is_empty());
    }

    #[tokio::test]
    async fn test_flush_failure_is_partial() {
        let f = fixture(example_resolver(), RecordingFlusher::failing());
        let outcome = f.orchestrator.block("example.com").await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Partial);
        assert_eq!(outcome.rule_count, 6);
        assert!(outcome.steps.iter().any(|s| !s.success && s.command == "flush resolver cache"));
    }

    #[tokio::test]
    async fn test_override_failure_does_not_stop_rules() {
        let f = fixture(example_resolver(), RecordingFlusher::new());
        f.overrides.lock().await.fail_writes();
        let outcome = f.orchestrator.block("example.com").await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Partial);
        assert_eq!(f.rules.lock().await.rules().len(), 6);
    }

    #[tokio::test]
    async fn test_unblock_recovers_addresses_from_tagged_rules() {
        let f = fixture(example_resolver(), RecordingFlusher::new());
        f.orchestrator.block("example.com").await.unwrap();

        // Once sinkholed, the names only resolve to the sinkhole.
        let sinkholed = StaticResolver::new();
        sinkholed.set("example.com", &[addr("0.0.0.0"), addr("::")]);
        sinkholed.set("www.example.com", &[addr("0.0.0.0"), addr("::")]);
        let orchestrator = DomainBlockOrchestrator::new(
            Arc::new(RuleReconciler::new(f.rules.clone(), DEFAULT_MAX_DELETE_PASSES)),
            f.overrides.clone(),
            DomainResolver::new(sinkholed),
            RecordingFlusher::new(),
        );

        let outcome = orchestrator.unblock("www.example.com").await.unwrap();
        assert_eq!(outcome.action, DomainAction::Unblock);
        assert_eq!(outcome.rule_count, 6);
        assert_eq!(outcome.ipv4().len(), 2);
        assert!(f.rules.lock().await.rules().is_empty());
        assert!(f.overrides.lock().await.names().is_empty());
    }

    #[tokio::test]
    async fn test_unblock_leaves_unrelated_rules() {
        let resolver = example_resolver().with("other.org", &["198.51.100.7"]);
        let f = fixture(resolver, RecordingFlusher::new());
        f.orchestrator.block("example.com").await.unwrap();
        f.orchestrator.block("other.org").await.unwrap();

        f.orchestrator.unblock("example.com").await.unwrap();

        let blocked = f.orchestrator.list_blocked().await.unwrap();
        assert_eq!(
            blocked.into_iter().collect::<Vec<_>>(),
            ["other.org", "www.other.org"]
        );
        let rules = f.rules.lock().await;
        assert_eq!(rules.rules().len(), 2);
        assert_eq!(rules.rules_for(&RuleTarget::Address(addr("198.51.100.7"))).len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_domain_rejected_before_any_change() {
        let f = fixture(example_resolver(), RecordingFlusher::new());
        let err = f.orchestrator.block("exa mple.com").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Validation(_)));
        assert_eq!(f.rules.lock().await.calls(), 0);
        assert!(f.overrides.lock().await.names().is_empty());
    }

    #[tokio::test]
    async fn test_apply_dispatches_on_action() {
        let f = fixture(example_resolver(), RecordingFlusher::new());
        f.orchestrator.apply("example.com", DomainAction::Block).await.unwrap();
        assert_eq!(f.orchestrator.list_blocked().await.unwrap().len(), 2);
        f.orchestrator.apply("example.com", DomainAction::Unblock).await.unwrap();
        assert!(f.orchestrator.list_blocked().await.unwrap().is_empty());
    }
}
