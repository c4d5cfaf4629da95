//! Rule selectors, directions and intents.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::protected;

// ============================================================================
// Protocol
// ============================================================================

/// Transport protocol a port rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    /// Both tcp and udp.
    Any,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Tcp, Protocol::Udp, Protocol::Any];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Any => "any",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PortSelector
// ============================================================================

/// A validated port and protocol pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSelector {
    port: u16,
    protocol: Protocol,
}

impl PortSelector {
    /// Build a selector from an already validated port.
    ///
    /// Port 0 is never produced by the validator; callers constructing
    /// selectors by hand are expected to pass 1-65535.
    pub fn new(port: u16, protocol: Protocol) -> Self {
        Self { port, protocol }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl std::fmt::Display for PortSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.protocol {
            Protocol::Any => write!(f, "{}", self.port),
            proto => write!(f, "{}/{}", self.port, proto),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Known services that can be toggled by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Http,
    Https,
    Ssh,
    Dns,
    Ftp,
    Smtp,
}

impl Service {
    /// All known services.
    pub const ALL: [Service; 6] = [
        Service::Http,
        Service::Https,
        Service::Ssh,
        Service::Dns,
        Service::Ftp,
        Service::Smtp,
    ];

    /// Service name as understood by the packet filter.
    pub fn name(&self) -> &'static str {
        match self {
            Service::Http => "http",
            Service::Https => "https",
            Service::Ssh => "ssh",
            Service::Dns => "dns",
            Service::Ftp => "ftp",
            Service::Smtp => "smtp",
        }
    }

    /// Well-known ports of the service.
    ///
    /// Rules are applied by name; these are used for display and for the
    /// protected-port check.
    pub fn well_known_ports(&self) -> &'static [u16] {
        match self {
            Service::Http => &[80],
            Service::Https => &[443],
            Service::Ssh => &[22],
            Service::Dns => &[53],
            Service::Ftp => &[20, 21],
            Service::Smtp => &[25],
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Directions and actions
// ============================================================================

/// Requested traffic direction of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[default]
    Both,
}

impl Direction {
    /// Concrete rule directions this direction expands to.
    pub fn expand(&self) -> &'static [RuleDirection] {
        match self {
            Direction::In => &[RuleDirection::In],
            Direction::Out => &[RuleDirection::Out],
            Direction::Both => &[RuleDirection::In, RuleDirection::Out],
        }
    }
}

/// Direction of a single concrete rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    In,
    Out,
}

impl RuleDirection {
    pub const ALL: [RuleDirection; 2] = [RuleDirection::In, RuleDirection::Out];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleDirection::In => "in",
            RuleDirection::Out => "out",
        }
    }
}

impl std::fmt::Display for RuleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polarity of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl RuleAction {
    pub const ALL: [RuleAction; 2] = [RuleAction::Allow, RuleAction::Deny];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
        }
    }

    pub fn opposite(&self) -> RuleAction {
        match self {
            RuleAction::Allow => RuleAction::Deny,
            RuleAction::Deny => RuleAction::Allow,
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-facing on/off switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    On,
    Off,
}

impl ToggleAction {
    pub fn rule_action(&self) -> RuleAction {
        match self {
            ToggleAction::On => RuleAction::Allow,
            ToggleAction::Off => RuleAction::Deny,
        }
    }
}

impl std::fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToggleAction::On => f.write_str("on"),
            ToggleAction::Off => f.write_str("off"),
        }
    }
}

// ============================================================================
// Targets, rules and intents
// ============================================================================

/// What a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RuleTarget {
    Port(PortSelector),
    Service(Service),
    /// Remote address: "to" for outbound rules, "from" for inbound rules.
    Address(IpAddr),
}

impl RuleTarget {
    /// Reason the target may never be denied, if it is protected.
    ///
    /// Services are checked through their well-known ports so that a
    /// protected port cannot be denied by naming its service instead.
    pub fn protection(&self) -> Option<(u16, &'static str)> {
        match self {
            RuleTarget::Port(selector) => protected::reason(selector.port())
                .map(|reason| (selector.port(), reason)),
            RuleTarget::Service(service) => service
                .well_known_ports()
                .iter()
                .find_map(|&port| protected::reason(port).map(|reason| (port, reason))),
            RuleTarget::Address(_) => None,
        }
    }
}

impl std::fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleTarget::Port(selector) => write!(f, "{}", selector),
            RuleTarget::Service(service) => write!(f, "{}", service),
            RuleTarget::Address(addr) => write!(f, "{}", addr),
        }
    }
}

/// One concrete rule in the rule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirewallRule {
    pub direction: RuleDirection,
    pub action: RuleAction,
    pub target: RuleTarget,
}

impl FirewallRule {
    pub fn new(direction: RuleDirection, action: RuleAction, target: RuleTarget) -> Self {
        Self {
            direction,
            action,
            target,
        }
    }
}

impl std::fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.target, self.direction) {
            (RuleTarget::Address(addr), RuleDirection::In) => {
                write!(f, "{} in from {}", self.action, addr)
            }
            (RuleTarget::Address(addr), RuleDirection::Out) => {
                write!(f, "{} out to {}", self.action, addr)
            }
            (target, direction) => write!(f, "{} {} {}", self.action, direction, target),
        }
    }
}

/// Desired end state for a target. Not a rule itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleIntent {
    pub target: RuleTarget,
    pub direction: Direction,
    pub action: RuleAction,
    /// Tag written next to every applied rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RuleIntent {
    pub fn new(target: RuleTarget, direction: Direction, action: RuleAction) -> Self {
        Self {
            target,
            direction,
            action,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The concrete rules this intent should leave in the store.
    pub fn rules(&self) -> Vec<FirewallRule> {
        self.direction
            .expand()
            .iter()
            .map(|&direction| FirewallRule::new(direction, self.action, self.target))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_selector_display() {
        assert_eq!(PortSelector::new(8081, Protocol::Tcp).to_string(), "8081/tcp");
        assert_eq!(PortSelector::new(53, Protocol::Udp).to_string(), "53/udp");
        assert_eq!(PortSelector::new(9000, Protocol::Any).to_string(), "9000");
    }

    #[test]
    fn test_both_expands_to_in_and_out() {
        let intent = RuleIntent::new(
            RuleTarget::Service(Service::Http),
            Direction::Both,
            RuleAction::Deny,
        );
        let rules = intent.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].direction, RuleDirection::In);
        assert_eq!(rules[1].direction, RuleDirection::Out);
        assert!(rules.iter().all(|r| r.action == RuleAction::Deny));
    }

    #[test]
    fn test_service_protection_follows_ports() {
        assert_eq!(
            RuleTarget::Service(Service::Ssh).protection().map(|(p, _)| p),
            Some(22)
        );
        assert!(RuleTarget::Service(Service::Http).protection().is_none());
    }

    #[test]
    fn test_protocol_does_not_bypass_protection() {
        for proto in Protocol::ALL {
            let target = RuleTarget::Port(PortSelector::new(8080, proto));
            assert!(target.protection().is_some());
        }
    }

    #[test]
    fn test_address_rule_display() {
        let addr: IpAddr = "93.184.216.34".parse().unwrap();
        let out = FirewallRule::new(RuleDirection::Out, RuleAction::Deny, RuleTarget::Address(addr));
        let inbound =
            FirewallRule::new(RuleDirection::In, RuleAction::Deny, RuleTarget::Address(addr));
        assert_eq!(out.to_string(), "deny out to 93.184.216.34");
        assert_eq!(inbound.to_string(), "deny in from 93.184.216.34");
    }
}
