//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! Each adapter handles communication with external systems.

pub mod command;
pub mod hosts;
pub mod memory;
pub mod resolver;
pub mod ufw;

// Re-export main types for convenience
pub use command::{CommandRunner, CommandSpec};
pub use hosts::HostsFile;
pub use resolver::{CommandCacheFlusher, SystemResolver};
pub use ufw::UfwRuleStore;
