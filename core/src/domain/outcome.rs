//! Structured results returned by every mutating operation.
//!
//! External failures are recorded here step by step rather than returned as
//! errors, so a caller can see exactly which sub-commands need a retry.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain_name::{DomainAction, DomainBlockRecord};
use super::selector::{RuleAction, RuleTarget};
use super::validation::Advisory;
use crate::error::Error;

/// Result of one external sub-command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Human readable description of the step.
    pub command: String,
    pub success: bool,
    /// Tool output on success, error text on failure.
    pub output: String,
}

impl CommandOutcome {
    pub fn ok(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(command: impl Into<String>, error: &Error) -> Self {
        Self {
            command: command.into(),
            success: false,
            output: error.to_string(),
        }
    }
}

/// What happened when a rule was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// False when no matching rule existed.
    pub removed: bool,
    pub output: String,
}

/// Overall status of a multi-step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every step succeeded.
    Completed,
    /// At least one step failed; the rest were still applied.
    Partial,
}

impl OutcomeStatus {
    pub fn from_steps(steps: &[CommandOutcome]) -> Self {
        if steps.iter().all(|s| s.success) {
            OutcomeStatus::Completed
        } else {
            OutcomeStatus::Partial
        }
    }
}

/// Result of reconciling a port or service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    /// True when every step succeeded.
    pub success: bool,
    pub target: RuleTarget,
    pub action: RuleAction,
    /// Stale rules removed before applying.
    pub removed: usize,
    /// Rules applied.
    pub applied: usize,
    pub steps: Vec<CommandOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<Advisory>,
}

impl ToggleOutcome {
    pub fn failed_steps(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.steps.iter().filter(|s| !s.success)
    }
}

/// Result of blocking or unblocking a domain pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainBlockOutcome {
    pub status: OutcomeStatus,
    pub action: DomainAction,
    #[serde(flatten)]
    pub record: DomainBlockRecord,
    /// Rules installed (block) or removed (unblock).
    pub rule_count: usize,
    pub steps: Vec<CommandOutcome>,
    /// Set when neither variant could be resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
    /// Addresses left denied on unblock because another blocked domain
    /// still owns them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub shared_addresses: BTreeSet<IpAddr>,
}

impl DomainBlockOutcome {
    pub fn domains(&self) -> [&str; 2] {
        [
            self.record.base_domain.as_str(),
            self.record.www_domain.as_str(),
        ]
    }

    pub fn ipv4(&self) -> &BTreeSet<Ipv4Addr> {
        &self.record.ipv4
    }

    pub fn ipv6(&self) -> &BTreeSet<Ipv6Addr> {
        &self.record.ipv6
    }
}

/// Result of an emergency reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub status: OutcomeStatus,
    pub steps: Vec<CommandOutcome>,
    pub reset_at: DateTime<Utc>,
}
