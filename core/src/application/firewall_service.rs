//! Firewall application service.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::domain_blocker::DomainBlockOrchestrator;
use super::reconciler::RuleReconciler;
use super::resolver::DomainResolver;
use crate::adapters::{
    CommandCacheFlusher, CommandRunner, HostsFile, SystemResolver, UfwRuleStore,
};
use crate::config::Settings;
use crate::domain::{
    validate_domain_action, validate_port, validate_protocol, validate_service,
    validate_toggle_action, Direction, DomainAction, DomainBlockOutcome, OutcomeStatus,
    PortSelector, Protocol, RawPort, ResetOutcome, RuleIntent, RuleTarget, ToggleOutcome,
};
use crate::error::Result;
use crate::ports::{CacheFlusher, NameOverrideStore, ResolverBackend, RuleStore};

/// The service wired to the real host: ufw, `/etc/hosts`, system DNS.
pub type HostFirewall =
    FirewallService<UfwRuleStore, HostsFile, SystemResolver, CommandCacheFlusher>;

/// Entry point for every firewall operation.
///
/// Owns the rule-store and override-store locks and hands them to the
/// reconciler and the domain orchestrator, so port, service and domain
/// operations all serialise on the same resources. Raw caller input is
/// validated here before anything is touched.
pub struct FirewallService<R, H, B, C>
where
    R: RuleStore,
    H: NameOverrideStore,
    B: ResolverBackend,
    C: CacheFlusher,
{
    rules: Arc<Mutex<R>>,
    reconciler: Arc<RuleReconciler<R>>,
    domains: DomainBlockOrchestrator<R, H, B, C>,
}

impl<R, H, B, C> FirewallService<R, H, B, C>
where
    R: RuleStore,
    H: NameOverrideStore,
    B: ResolverBackend,
    C: CacheFlusher,
{
    /// Create a service owning the given adapters.
    pub fn new(rules: R, overrides: H, resolver: B, flusher: C, max_delete_passes: usize) -> Self {
        Self::from_shared(
            Arc::new(Mutex::new(rules)),
            Arc::new(Mutex::new(overrides)),
            resolver,
            flusher,
            max_delete_passes,
        )
    }

    /// Create a service over stores the caller keeps handles to.
    pub fn from_shared(
        rules: Arc<Mutex<R>>,
        overrides: Arc<Mutex<H>>,
        resolver: B,
        flusher: C,
        max_delete_passes: usize,
    ) -> Self {
        let reconciler = Arc::new(RuleReconciler::new(rules.clone(), max_delete_passes));
        let domains = DomainBlockOrchestrator::new(
            reconciler.clone(),
            overrides,
            DomainResolver::new(resolver),
            flusher,
        );
        Self {
            rules,
            reconciler,
            domains,
        }
    }

    /// Allow (`on`) or deny (`off`) a named service in both directions.
    pub async fn toggle_service(&self, service: &str, action: &str) -> Result<ToggleOutcome> {
        let service = validate_service(service)?;
        let action = validate_toggle_action(action)?;
        let intent = RuleIntent::new(
            RuleTarget::Service(service),
            Direction::Both,
            action.rule_action(),
        );
        self.reconciler.reconcile(&intent, None).await
    }

    /// Allow (`on`) or deny (`off`) a port in both directions.
    ///
    /// `protocol` defaults to tcp. Privileged or protected ports that pass
    /// validation carry an advisory in the outcome.
    pub async fn toggle_port<'a>(
        &self,
        port: impl Into<RawPort<'a>>,
        action: &str,
        protocol: Option<&str>,
    ) -> Result<ToggleOutcome> {
        let validated = validate_port(port)?;
        let action = validate_toggle_action(action)?;
        let protocol = match protocol {
            Some(p) => validate_protocol(p)?,
            None => Protocol::Tcp,
        };

        let intent = RuleIntent::new(
            RuleTarget::Port(PortSelector::new(validated.port, protocol)),
            Direction::Both,
            action.rule_action(),
        );
        self.reconciler.reconcile(&intent, validated.advisory).await
    }

    pub async fn block_domain(&self, domain: &str) -> Result<DomainBlockOutcome> {
        self.domains.block(domain).await
    }

    pub async fn unblock_domain(&self, domain: &str) -> Result<DomainBlockOutcome> {
        self.domains.unblock(domain).await
    }

    /// Block or unblock, with the action given as `block` / `unblock`.
    pub async fn apply_domain_action(&self, domain: &str, action: &str) -> Result<DomainBlockOutcome> {
        let action: DomainAction = validate_domain_action(action)?;
        self.domains.apply(domain, action).await
    }

    pub async fn list_blocked_domains(&self) -> Result<BTreeSet<String>> {
        self.domains.list_blocked().await
    }

    /// Raw numbered rule listing.
    pub async fn get_status(&self) -> Result<String> {
        self.rules.lock().await.list_numbered_rules().await
    }

    /// Drop every rule and restore deny-incoming / allow-outgoing.
    ///
    /// The rule-store lock is held for the whole sequence.
    pub async fn emergency_reset(&self) -> ResetOutcome {
        let steps = self.rules.lock().await.reset().await;
        let status = OutcomeStatus::from_steps(&steps);
        if status == OutcomeStatus::Partial {
            warn!("emergency reset incomplete; check the firewall state manually");
        } else {
            info!("firewall reset to baseline policy");
        }
        ResetOutcome {
            status,
            steps,
            reset_at: Utc::now(),
        }
    }
}

impl HostFirewall {
    /// Wire the service to the host using `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let runner = CommandRunner::new(settings.use_sudo, settings.command_timeout());

        Ok(Self::new(
            UfwRuleStore::new(settings.ufw_path.clone(), runner.clone()),
            HostsFile::new(
                settings.hosts_path.clone(),
                settings.sinkhole_v4,
                settings.sinkhole_v6,
            ),
            SystemResolver::new(
                settings.getent_path.clone(),
                CommandRunner::new(false, settings.resolve_timeout()),
            ),
            CommandCacheFlusher::new(&settings.flush_command, runner)?,
            settings.max_delete_passes,
        ))
    }
}
