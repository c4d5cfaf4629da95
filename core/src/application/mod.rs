//! Application layer - Use case services.
//!
//! Services here orchestrate domain logic over the port traits. They are
//! generic over their collaborators so tests can inject the in-memory
//! adapters.

mod domain_blocker;
mod firewall_service;
mod reconciler;
mod resolver;
mod rule_listing;

pub use domain_blocker::DomainBlockOrchestrator;
pub use firewall_service::{FirewallService, HostFirewall};
pub use reconciler::{RuleReconciler, DEFAULT_MAX_DELETE_PASSES};
pub use resolver::DomainResolver;
pub use rule_listing::{
    address_owners, count_matching, parse_numbered, tagged_addresses, NumberedRule,
};
