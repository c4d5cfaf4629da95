//! Rule store port (interface).

use crate::domain::{CommandOutcome, DeleteOutcome, FirewallRule};
use crate::error::Result;

/// Port for the host's packet-filter rule table.
///
/// Implementations translate a `FirewallRule` into whatever the underlying
/// tool understands. Callers serialize access themselves; implementations
/// need not be safe against interleaved delete/apply sequences.
pub trait RuleStore: Send + Sync {
    /// Add one rule, optionally tagged with a comment.
    ///
    /// Returns the tool's output text.
    fn apply(
        &self,
        rule: &FirewallRule,
        comment: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Delete one rule matching `rule`.
    ///
    /// A missing rule is not an error: it yields `removed == false`.
    fn delete(
        &self,
        rule: &FirewallRule,
    ) -> impl std::future::Future<Output = Result<DeleteOutcome>> + Send;

    /// Current rules as numbered, ordered text.
    fn list_numbered_rules(&self) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Drop every rule and reinstate the baseline policy:
    /// deny incoming, allow outgoing, filter enabled.
    ///
    /// Each step is reported; a failed step does not skip the others.
    fn reset(&self) -> impl std::future::Future<Output = Vec<CommandOutcome>> + Send;
}
