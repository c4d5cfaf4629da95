//! Error types for the hostwall-core library.

use thiserror::Error;

/// Result type alias for hostwall operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Input rejected before any store is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Port number outside 1-65535.
    #[error("Port {0} is out of range (1-65535)")]
    OutOfRange(i64),

    /// Port value is not an integer.
    #[error("Port '{0}' is not a number")]
    NotANumber(String),

    /// Protocol is not one of tcp, udp, any.
    #[error("Unknown protocol '{0}': use tcp, udp or any")]
    UnknownProtocol(String),

    /// Service is not in the known service set.
    #[error("Unknown service '{0}': use http, https, ssh, dns, ftp or smtp")]
    UnknownService(String),

    /// Domain name is malformed.
    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: &'static str },

    /// Action keyword is not recognised.
    #[error("Unknown action '{value}': use {expected}")]
    UnknownAction {
        value: String,
        expected: &'static str,
    },
}

/// Errors that can occur while managing host access rules.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Attempted to deny a protected port.
    #[error("Port {port} is protected and cannot be denied: {reason}")]
    ProtectedResource { port: u16, reason: &'static str },

    /// An external command could not be run or reported failure.
    #[error("Command `{command}` failed: {reason}")]
    ExternalCommand { command: String, reason: String },

    /// An external command exceeded its time budget.
    #[error("Command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// Neither address family could be resolved.
    #[error("Failed to resolve {domain}: {reason}")]
    Resolution { domain: String, reason: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

