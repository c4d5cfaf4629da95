//! Rule store backed by `ufw`.

use std::path::PathBuf;

use tracing::warn;

use super::command::{CommandRunner, CommandSpec};
use crate::domain::{
    CommandOutcome, DeleteOutcome, FirewallRule, RuleDirection, RuleTarget, Service,
};
use crate::error::{Error, Result};
use crate::ports::RuleStore;

/// Text ufw prints when asked to delete a rule that does not exist.
const NON_EXISTENT_MARKER: &str = "non-existent rule";

/// `ufw` driven through structured arguments.
pub struct UfwRuleStore {
    ufw_path: PathBuf,
    runner: CommandRunner,
}

impl UfwRuleStore {
    pub fn new(ufw_path: impl Into<PathBuf>, runner: CommandRunner) -> Self {
        Self {
            ufw_path: ufw_path.into(),
            runner,
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.ufw_path)
    }

    /// Arguments describing `rule`, shared by add and delete.
    pub fn rule_args(rule: &FirewallRule) -> Vec<String> {
        let mut args = vec![
            rule.action.as_str().to_string(),
            rule.direction.as_str().to_string(),
        ];
        match rule.target {
            RuleTarget::Port(selector) => args.push(selector.to_string()),
            RuleTarget::Service(service) => args.push(service_name(service).to_string()),
            RuleTarget::Address(addr) => {
                let keyword = match rule.direction {
                    RuleDirection::In => "from",
                    RuleDirection::Out => "to",
                };
                args.push(keyword.to_string());
                args.push(addr.to_string());
            }
        }
        args
    }

    fn apply_spec(&self, rule: &FirewallRule, comment: Option<&str>) -> CommandSpec {
        let spec = self.command().args(Self::rule_args(rule));
        match comment {
            Some(comment) => spec.arg("comment").arg(comment),
            None => spec,
        }
    }

    fn delete_spec(&self, rule: &FirewallRule) -> CommandSpec {
        self.command().arg("delete").args(Self::rule_args(rule))
    }
}

/// Name ufw resolves through `/etc/services`.
fn service_name(service: Service) -> &'static str {
    match service {
        Service::Dns => "domain",
        other => other.name(),
    }
}

impl RuleStore for UfwRuleStore {
    async fn apply(&self, rule: &FirewallRule, comment: Option<&str>) -> Result<String> {
        self.runner.run_checked(&self.apply_spec(rule, comment)).await
    }

    async fn delete(&self, rule: &FirewallRule) -> Result<DeleteOutcome> {
        let spec = self.delete_spec(rule);
        let output = self.runner.run(&spec).await?;

        if output.text.contains(NON_EXISTENT_MARKER) {
            return Ok(DeleteOutcome {
                removed: false,
                output: output.text,
            });
        }
        if !output.success {
            return Err(Error::ExternalCommand {
                command: spec.display(),
                reason: output.text,
            });
        }
        Ok(DeleteOutcome {
            removed: true,
            output: output.text,
        })
    }

    async fn list_numbered_rules(&self) -> Result<String> {
        self.runner
            .run_checked(&self.command().args(["status", "numbered"]))
            .await
    }

    async fn reset(&self) -> Vec<CommandOutcome> {
        // The filter is enabled last so it never runs without the baseline.
        let steps = [
            self.command().args(["--force", "reset"]),
            self.command().args(["default", "deny", "incoming"]),
            self.command().args(["default", "allow", "outgoing"]),
            self.command().args(["--force", "enable"]),
        ];

        let mut outcomes = Vec::with_capacity(steps.len());
        for spec in &steps {
            match self.runner.run_checked(spec).await {
                Ok(text) => outcomes.push(CommandOutcome::ok(spec.display(), text)),
                Err(e) => {
                    warn!(command = %spec.display(), error = %e, "reset step failed");
                    outcomes.push(CommandOutcome::failed(spec.display(), &e));
                }
            }
        }
        outcomes
    }
}
