//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with external systems. Implementations live in `adapters`.

mod override_store;
mod resolver;
mod rule_store;

pub use override_store::NameOverrideStore;
pub use resolver::{AddressFamily, CacheFlusher, ResolverBackend};
pub use rule_store::RuleStore;
