//! Input validation.
//!
//! Every function here is pure: no store is consulted and nothing is
//! mutated. Callers validate first and only then hand typed values to the
//! reconciler or the domain blocker.

use serde::{Deserialize, Serialize};

use super::protected::{self, PRIVILEGED_PORT_LIMIT};
use super::selector::{Protocol, Service, ToggleAction};
use super::domain_name::DomainAction;
use crate::error::ValidationError;

/// Longest permitted domain name.
const MAX_DOMAIN_LEN: usize = 253;
/// Longest permitted label inside a domain name.
const MAX_LABEL_LEN: usize = 63;

// ============================================================================
// Ports
// ============================================================================

/// Raw port input: a number or an integer-like string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPort<'a> {
    Number(i64),
    Text(&'a str),
}

impl From<i64> for RawPort<'_> {
    fn from(value: i64) -> Self {
        RawPort::Number(value)
    }
}

impl From<i32> for RawPort<'_> {
    fn from(value: i32) -> Self {
        RawPort::Number(value.into())
    }
}

impl From<u16> for RawPort<'_> {
    fn from(value: u16) -> Self {
        RawPort::Number(value.into())
    }
}

impl<'a> From<&'a str> for RawPort<'a> {
    fn from(value: &'a str) -> Self {
        RawPort::Text(value)
    }
}

impl<'a> From<&'a String> for RawPort<'a> {
    fn from(value: &'a String) -> Self {
        RawPort::Text(value.as_str())
    }
}

/// Non-fatal note attached to a valid port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Advisory {
    /// The port can be allowed but never denied.
    Protected { port: u16, reason: String },
    /// The port is below 1024; changing it needs elevated execution.
    Privileged { port: u16 },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::Protected { port, reason } => {
                write!(f, "Port {} is protected ({}) and can never be denied", port, reason)
            }
            Advisory::Privileged { port } => write!(
                f,
                "Port {} is a privileged port (<{}); hostwall must run with elevated privileges",
                port, PRIVILEGED_PORT_LIMIT
            ),
        }
    }
}

/// A port that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPort {
    pub port: u16,
    pub advisory: Option<Advisory>,
}

/// Validate a port number.
///
/// Protection takes precedence over the privileged-range advisory.
pub fn validate_port<'a>(value: impl Into<RawPort<'a>>) -> Result<ValidatedPort, ValidationError> {
    let number = match value.into() {
        RawPort::Number(n) => n,
        RawPort::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::NotANumber(text.to_string()))?,
    };

    let port = u16::try_from(number)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or(ValidationError::OutOfRange(number))?;

    let advisory = if let Some(reason) = protected::reason(port) {
        Some(Advisory::Protected {
            port,
            reason: reason.to_string(),
        })
    } else if port < PRIVILEGED_PORT_LIMIT {
        Some(Advisory::Privileged { port })
    } else {
        None
    };

    Ok(ValidatedPort { port, advisory })
}

// ============================================================================
// Protocols, services and actions
// ============================================================================

pub fn validate_protocol(value: &str) -> Result<Protocol, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        "any" => Ok(Protocol::Any),
        _ => Err(ValidationError::UnknownProtocol(value.to_string())),
    }
}

pub fn validate_service(value: &str) -> Result<Service, ValidationError> {
    let name = value.trim().to_ascii_lowercase();
    Service::ALL
        .into_iter()
        .find(|s| s.name() == name)
        .ok_or_else(|| ValidationError::UnknownService(value.to_string()))
}

pub fn validate_toggle_action(value: &str) -> Result<ToggleAction, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" => Ok(ToggleAction::On),
        "off" => Ok(ToggleAction::Off),
        _ => Err(ValidationError::UnknownAction {
            value: value.to_string(),
            expected: "'on' or 'off'",
        }),
    }
}

pub fn validate_domain_action(value: &str) -> Result<DomainAction, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "block" => Ok(DomainAction::Block),
        "unblock" => Ok(DomainAction::Unblock),
        _ => Err(ValidationError::UnknownAction {
            value: value.to_string(),
            expected: "'block' or 'unblock'",
        }),
    }
}

// ============================================================================
// Domains
// ============================================================================

/// Validate and canonicalise a domain name.
///
/// The result is lower-case without a trailing dot and contains only
/// letters, digits, hyphens and dots, so it is safe to write into the
/// override file and to pass as a command argument.
pub fn validate_domain(value: &str) -> Result<String, ValidationError> {
    let invalid = |reason| ValidationError::InvalidDomain {
        domain: value.to_string(),
        reason,
    };

    let domain = value.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(invalid("empty name"));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(invalid("longer than 253 characters"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("must contain at least two labels"));
    }
    for label in &labels {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label longer than 63 characters"));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(invalid("only letters, digits and hyphens are allowed"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels cannot start or end with a hyphen"));
        }
    }
    if labels.iter().all(|l| l.bytes().all(|b| b.is_ascii_digit())) {
        return Err(invalid("IP addresses are not domain names"));
    }

    Ok(domain)
}
