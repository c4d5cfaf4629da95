//! hostwall Core Library
//!
//! Host firewall control for a single Linux machine. Provides functionality to:
//! - Allow or deny ports and named services in both directions
//! - Block domains at name resolution and at the packet filter together
//! - Inspect the current rule set and restore a safe baseline
//! - Manage tool paths and timeouts through a JSON settings file
//!
//! Every mutation is idempotent: repeating an operation converges on the
//! same rule set instead of stacking duplicates. Ports reserved for remote
//! administration and for hostwall itself can never be denied.
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure business logic and data models
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: External system implementations
//! - `application`: Use case services
//!
//! # Platform Support
//! - Linux: Uses `ufw`, `/etc/hosts` and `resolvectl`
//! - Anywhere: the in-memory adapters in `adapters::memory`

// Hexagonal architecture layers
pub mod domain;
pub mod ports;
pub mod adapters;
pub mod application;

pub mod config;
pub mod error;

// Re-export domain types (primary API)
pub use domain::{
    Advisory, CommandOutcome, Direction, DomainAction, DomainBlockOutcome, DomainBlockRecord,
    DomainPair, FirewallRule, OutcomeStatus, PortSelector, Protocol, ResetOutcome, RuleAction,
    RuleDirection, RuleIntent, RuleTarget, Service, ToggleAction, ToggleOutcome,
};

// Re-export other commonly used types
pub use application::{FirewallService, HostFirewall};
pub use config::{ConfigStore, Settings};
pub use error::{Error, Result, ValidationError};
