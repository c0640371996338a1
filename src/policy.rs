//! Policy configuration for URL validation.

use std::fmt;

/// Validation policy that controls which destinations a request may reach.
///
/// A client is bound to exactly one policy when it is built; there is no way
/// to change it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// Block private IPs, loopback, link-local, and metadata endpoints.
    /// This is the default and recommended for most use cases.
    #[default]
    PublicOnly,

    /// Allow private IPs, but still block loopback and metadata endpoints.
    /// Use for internal service-to-service calls within a trusted network.
    AllowPrivate,
}

impl Policy {
    /// Stable name, matching the constants exposed by the other bindings.
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::PublicOnly => "PUBLIC_ONLY",
            Policy::AllowPrivate => "ALLOW_PRIVATE",
        }
    }

    /// Whether RFC 1918 / unique-local destinations are permitted.
    pub fn allows_private(self) -> bool {
        matches!(self, Policy::AllowPrivate)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
