//! Domain layer - Pure business logic and data models.
//!
//! This module contains domain entities that represent core business concepts.
//! These types have no I/O dependencies and can be tested in isolation.

mod domain_name;
mod outcome;
pub mod protected;
mod selector;
pub mod validation;

// Re-export all domain types
pub use domain_name::{
    block_tag, is_reserved_name, tag_owners, DomainAction, DomainBlockRecord, DomainPair, NameOverrideEntry,
    ResolvedAddresses,
};
pub use outcome::{
    CommandOutcome, DeleteOutcome, DomainBlockOutcome, OutcomeStatus, ResetOutcome, ToggleOutcome,
};
pub use selector::{
    Direction, FirewallRule, PortSelector, Protocol, RuleAction, RuleDirection, RuleIntent,
    RuleTarget, Service, ToggleAction,
};
pub use validation::{
    validate_domain, validate_domain_action, validate_port, validate_protocol, validate_service,
    validate_toggle_action, Advisory, RawPort, ValidatedPort,
};
