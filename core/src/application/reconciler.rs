//! Idempotent rule reconciliation.
//!
//! A reconciliation applies the rules an intent asks for first, and only
//! then removes what contradicts them: the opposite polarity in each
//! direction that was applied, both polarities in directions the intent
//! does not cover, and surplus copies of the applied rules. Repeating the
//! same intent therefore never accumulates duplicates, even on a store that
//! appends blindly, and a failed apply leaves that direction as it was.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::domain::{
    Advisory, CommandOutcome, FirewallRule, RuleAction, RuleDirection, RuleIntent, RuleTarget,
    ToggleOutcome,
};
use crate::error::{Error, Result};
use crate::ports::RuleStore;

use super::rule_listing::count_matching;

/// Default bound on deletion passes.
pub const DEFAULT_MAX_DELETE_PASSES: usize = 10;

/// Brings the rule store in line with a `RuleIntent`.
///
/// The store sits behind a mutex shared with every other component that
/// mutates rules; the lock is held for a whole delete+apply sequence.
pub struct RuleReconciler<R: RuleStore> {
    store: Arc<Mutex<R>>,
    max_delete_passes: usize,
}

impl<R: RuleStore> RuleReconciler<R> {
    pub fn new(store: Arc<Mutex<R>>, max_delete_passes: usize) -> Self {
        Self {
            store,
            max_delete_passes: max_delete_passes.max(1),
        }
    }

    /// Acquire the rule-store lock.
    pub async fn lock(&self) -> MutexGuard<'_, R> {
        self.store.lock().await
    }

    /// Reject denying a protected target before anything is touched.
    pub fn ensure_permitted(intent: &RuleIntent) -> Result<()> {
        if intent.action == RuleAction::Deny {
            if let Some((port, reason)) = intent.target.protection() {
                return Err(Error::ProtectedResource { port, reason });
            }
        }
        Ok(())
    }

    /// Reconcile `intent` under the rule-store lock.
    pub async fn reconcile(
        &self,
        intent: &RuleIntent,
        advisory: Option<Advisory>,
    ) -> Result<ToggleOutcome> {
        Self::ensure_permitted(intent)?;
        let store = self.lock().await;
        Ok(self.reconcile_locked(&store, intent, advisory).await)
    }

    /// Reconcile with the lock already held by the caller.
    ///
    /// Protection must have been checked with `ensure_permitted`.
    pub async fn reconcile_locked(
        &self,
        store: &R,
        intent: &RuleIntent,
        advisory: Option<Advisory>,
    ) -> ToggleOutcome {
        let mut steps = Vec::new();

        let mut applied = Vec::new();
        for rule in intent.rules() {
            let label = format!("apply {}", rule);
            match store.apply(&rule, intent.comment.as_deref()).await {
                Ok(output) => {
                    debug!(rule = %rule, "rule applied");
                    applied.push(rule);
                    steps.push(CommandOutcome::ok(label, output));
                }
                Err(e) => {
                    warn!(rule = %rule, error = %e, "failed to apply rule; direction left as it was");
                    steps.push(CommandOutcome::failed(label, &e));
                }
            }
        }

        let covered = intent.direction.expand();
        let mut contradicting = Vec::new();
        for direction in RuleDirection::ALL {
            if !covered.contains(&direction) {
                contradicting.extend(
                    RuleAction::ALL
                        .iter()
                        .map(|&action| FirewallRule::new(direction, action, intent.target)),
                );
            } else if applied.iter().any(|rule| rule.direction == direction) {
                contradicting.push(FirewallRule::new(
                    direction,
                    intent.action.opposite(),
                    intent.target,
                ));
            }
        }

        let mut removed = self.purge_rules(store, &contradicting, &mut steps).await;
        removed += self.collapse(store, &applied, &mut steps).await;

        let success = steps.iter().all(|s| s.success);
        info!(
            selector = %intent.target,
            action = %intent.action,
            removed,
            applied = applied.len(),
            success,
            "reconciled"
        );

        ToggleOutcome {
            success,
            target: intent.target,
            action: intent.action,
            removed,
            applied: applied.len(),
            steps,
            warning: advisory,
        }
    }

    /// Delete every rule for `target` with one of `actions`, in both
    /// directions, returning how many were removed.
    pub async fn purge(
        &self,
        store: &R,
        target: RuleTarget,
        actions: &[RuleAction],
        steps: &mut Vec<CommandOutcome>,
    ) -> usize {
        let rules: Vec<FirewallRule> = RuleDirection::ALL
            .iter()
            .flat_map(|&direction| {
                actions
                    .iter()
                    .map(move |&action| FirewallRule::new(direction, action, target))
            })
            .collect();
        self.purge_rules(store, &rules, steps).await
    }

    /// Delete every copy of each rule in `rules`.
    ///
    /// Each pass tries one delete per rule. Passes repeat while they make
    /// progress, up to `max_delete_passes`, so legacy duplicates are cleared
    /// but a misbehaving store cannot loop forever.
    async fn purge_rules(
        &self,
        store: &R,
        rules: &[FirewallRule],
        steps: &mut Vec<CommandOutcome>,
    ) -> usize {
        let mut removed = 0;
        if rules.is_empty() {
            return removed;
        }

        for pass in 1..=self.max_delete_passes {
            let mut progressed = false;

            for rule in rules {
                if store_delete(store, rule, steps).await {
                    removed += 1;
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
            if pass == self.max_delete_passes {
                warn!(
                    rules = rules.len(),
                    passes = pass,
                    "deletion pass limit reached; rules may remain"
                );
            }
        }

        removed
    }

    /// Trim each freshly applied rule down to a single copy.
    ///
    /// The oldest copies go first, so the survivor carries the newest comment.
    async fn collapse(
        &self,
        store: &R,
        applied: &[FirewallRule],
        steps: &mut Vec<CommandOutcome>,
    ) -> usize {
        if applied.is_empty() {
            return 0;
        }

        let listing = match store.list_numbered_rules().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "failed to list rules; duplicates may remain");
                steps.push(CommandOutcome::failed("list rules", &e));
                return 0;
            }
        };

        let mut removed = 0;
        for rule in applied {
            let surplus = count_matching(&listing, rule).saturating_sub(1);
            for _ in 0..surplus {
                if !store_delete(store, rule, steps).await {
                    break;
                }
                removed += 1;
            }
        }
        removed
    }
}

/// Delete one copy of `rule`, recording the step. Returns whether a rule
/// was removed.
async fn store_delete<R: RuleStore>(
    store: &R,
    rule: &FirewallRule,
    steps: &mut Vec<CommandOutcome>,
) -> bool {
    let label = format!("delete {}", rule);
    match store.delete(rule).await {
        Ok(outcome) => {
            steps.push(CommandOutcome::ok(label, outcome.output));
            outcome.removed
        }
        Err(e) => {
            warn!(rule = %rule, error = %e, "failed to delete rule");
            steps.push(CommandOutcome::failed(label, &e));
            false
        }
    }
}
