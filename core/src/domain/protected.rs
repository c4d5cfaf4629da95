//! Ports that may never be denied.

use std::net::IpAddr;

/// Protected ports and why they must stay reachable.
///
/// Denying any of these would lock the operator out of the host or out of
/// hostwall itself.
pub const PROTECTED_PORTS: &[(u16, &str)] = &[
    (22, "SSH remote administration"),
    (8000, "hostwall API backend"),
    (8080, "hostwall dashboard"),
];

/// Ports below this value need elevated privileges to bind.
pub const PRIVILEGED_PORT_LIMIT: u16 = 1024;

/// Reason a port is protected, or `None`.
pub fn reason(port: u16) -> Option<&'static str> {
    PROTECTED_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, reason)| *reason)
}

pub fn is_protected(port: u16) -> bool {
    reason(port).is_some()
}

/// Loopback and unspecified addresses never get IP-level rules.
///
/// Sinkholed names resolve to these, and a deny rule on them would cut the
/// host off from itself.
pub fn is_excluded_address(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| v4.is_loopback() || v4.is_unspecified())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_ports() {
        assert!(is_protected(22));
        assert!(is_protected(8000));
        assert!(is_protected(8080));
        assert!(!is_protected(8081));
        assert!(!is_protected(443));
    }

    #[test]
    fn test_excluded_addresses() {
        for raw in ["127.0.0.1", "127.0.1.1", "0.0.0.0", "::1", "::", "::ffff:127.0.0.1"] {
            let addr: IpAddr = raw.parse().unwrap();
            assert!(is_excluded_address(&addr), "{raw} should be excluded");
        }
        for raw in ["93.184.216.34", "2606:2800:220:1::1"] {
            let addr: IpAddr = raw.parse().unwrap();
            assert!(!is_excluded_address(&addr), "{raw} should be allowed");
        }
    }
}
