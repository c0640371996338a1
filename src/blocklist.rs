//! Hostname and IP classification used by the built-in validator.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::Policy;

/// Hostnames refused before any DNS lookup. Subdomains match too.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.internal",
    "instance-data",
];

/// AWS/GCP/Azure and Alibaba Cloud instance metadata.
const METADATA_V4: [Ipv4Addr; 2] = [
    Ipv4Addr::new(169, 254, 169, 254),
    Ipv4Addr::new(100, 100, 100, 200),
];

/// AWS IPv6 instance metadata (fd00:ec2::254).
const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Why an address is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockReason {
    Unspecified,
    Loopback,
    LinkLocal,
    CloudMetadata,
    /// RFC 1918 or unique-local. Only refused under [`Policy::PublicOnly`].
    Private,
}

impl BlockReason {
    /// Reasons that no policy lifts.
    pub(crate) fn is_unconditional(self) -> bool {
        !matches!(self, BlockReason::Private)
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BlockReason::Unspecified => "unspecified address - blocked in all policies",
            BlockReason::Loopback => "loopback address - blocked in all policies",
            BlockReason::LinkLocal => "link-local address - blocked in all policies",
            BlockReason::CloudMetadata => "cloud metadata endpoint - blocked in all policies",
            BlockReason::Private => "private address - use AllowPrivate policy to permit",
        };
        f.write_str(msg)
    }
}

/// Return the blocklist entry `host` falls under, if any.
pub(crate) fn is_hostname_blocked(host: &str) -> Option<&'static str> {
    let host = host.to_ascii_lowercase();
    BLOCKED_HOSTNAMES.iter().copied().find(|blocked| {
        host == *blocked
            || host
                .strip_suffix(blocked)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Check an address against `policy`.
pub(crate) fn is_ip_blocked(ip: IpAddr, policy: Policy) -> Option<BlockReason> {
    classify(ip).filter(|reason| reason.is_unconditional() || !policy.allows_private())
}

/// Classify an address regardless of policy. `None` means globally routable
/// as far as this crate is concerned.
pub(crate) fn classify(ip: IpAddr) -> Option<BlockReason> {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<BlockReason> {
    if ip.is_unspecified() {
        Some(BlockReason::Unspecified)
    } else if ip.is_loopback() {
        Some(BlockReason::Loopback)
    } else if METADATA_V4.contains(&ip) {
        Some(BlockReason::CloudMetadata)
    } else if ip.is_link_local() {
        Some(BlockReason::LinkLocal)
    } else if ip.is_private() {
        Some(BlockReason::Private)
    } else {
        None
    }
}

fn classify_v6(ip: Ipv6Addr) -> Option<BlockReason> {
    if ip.is_unspecified() {
        return Some(BlockReason::Unspecified);
    }
    // ::1 must be caught before the IPv4-compatible check below reads it as 0.0.0.1
    if ip.is_loopback() {
        return Some(BlockReason::Loopback);
    }
    if let Some(v4) = ip.to_ipv4_mapped().or_else(|| ipv4_compatible(ip)) {
        return classify_v4(v4);
    }

    let first = ip.segments()[0];
    if ip == METADATA_V6 {
        Some(BlockReason::CloudMetadata)
    } else if first & 0xffc0 == 0xfe80 {
        Some(BlockReason::LinkLocal)
    } else if first & 0xfe00 == 0xfc00 {
        Some(BlockReason::Private)
    } else {
        None
    }
}

/// Deprecated `::a.b.c.d` form: first 96 bits zero.
fn ipv4_compatible(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let octets = ip.octets();
    if octets[..12].iter().all(|&b| b == 0) {
        Some(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(ip: &str, policy: Policy) -> Option<BlockReason> {
        is_ip_blocked(ip.parse().unwrap(), policy)
    }

    #[test]
    fn test_hostname_blocklist() {
        assert_eq!(
            is_hostname_blocked("METADATA.google.internal"),
            Some("metadata.google.internal")
        );
        assert!(is_hostname_blocked("sub.metadata.azure.internal").is_some());
        assert!(is_hostname_blocked("instance-data").is_some());
        assert!(is_hostname_blocked("example.com").is_none());
        // suffix without a label boundary is a different name
        assert!(is_hostname_blocked("notinstance-data").is_none());
    }

    #[test]
    fn test_unconditional_blocks() {
        for ip in [
            "0.0.0.0",
            "127.0.0.1",
            "127.255.255.255",
            "169.254.1.1",
            "169.254.169.254",
            "100.100.100.200",
            "::",
            "::1",
            "fe80::1",
            "fd00:ec2::254",
        ] {
            assert!(blocked(ip, Policy::AllowPrivate).is_some(), "{ip}");
            assert!(blocked(ip, Policy::PublicOnly).is_some(), "{ip}");
        }
    }

    #[test]
    fn test_private_depends_on_policy() {
        for ip in ["10.0.0.5", "172.16.0.1", "192.168.255.255", "fc00::1", "fd12:3456::1"] {
            assert_eq!(blocked(ip, Policy::PublicOnly), Some(BlockReason::Private), "{ip}");
            assert_eq!(blocked(ip, Policy::AllowPrivate), None, "{ip}");
        }
    }

    #[test]
    fn test_metadata_reason_wins_over_link_local() {
        assert_eq!(
            blocked("169.254.169.254", Policy::PublicOnly),
            Some(BlockReason::CloudMetadata)
        );
        assert_eq!(
            blocked("169.254.169.253", Policy::PublicOnly),
            Some(BlockReason::LinkLocal)
        );
    }

    #[test]
    fn test_embedded_ipv4_forms() {
        assert_eq!(blocked("::ffff:127.0.0.1", Policy::AllowPrivate), Some(BlockReason::Loopback));
        assert_eq!(blocked("::ffff:7f00:1", Policy::AllowPrivate), Some(BlockReason::Loopback));
        assert_eq!(
            blocked("::169.254.169.254", Policy::AllowPrivate),
            Some(BlockReason::CloudMetadata)
        );
        assert_eq!(blocked("::ffff:192.168.0.1", Policy::PublicOnly), Some(BlockReason::Private));
        assert_eq!(blocked("::ffff:192.168.0.1", Policy::AllowPrivate), None);
    }

    #[test]
    fn test_public_addresses_pass() {
        for ip in ["93.184.216.34", "172.15.255.255", "172.32.0.0", "2001:4860:4860::8888"] {
            assert_eq!(blocked(ip, Policy::PublicOnly), None, "{ip}");
        }
    }
}
