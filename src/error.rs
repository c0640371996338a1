//! Error types shared by the validator and every client adapter.

use std::net::IpAddr;
use thiserror::Error;

/// Errors returned by validation and by the guarded clients.
///
/// The first three variants are validation outcomes. Adapters hand them back
/// exactly as the validator produced them, so callers can tell a policy block
/// from a malformed URL from a resolution failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Destination is blocked by policy, either by hostname (`ip` is `None`)
    /// or by the address the hostname resolved to.
    #[error("SSRF blocked: {host} - {reason}")]
    SsrfBlocked {
        url: String,
        host: String,
        ip: Option<IpAddr>,
        reason: String,
    },

    /// Invalid URL syntax or forbidden scheme.
    #[error("Invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// DNS resolution failed.
    #[error("DNS error for {host}: {message}")]
    DnsError { host: String, message: String },

    /// The wrapped client failed after validation succeeded.
    #[error("HTTP error for {url}: {source}")]
    HttpError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A header value given to a request builder is not valid HTTP.
    #[error("Invalid value for header {name}")]
    InvalidHeader { name: &'static str },

    /// Redirect chain exceeded the configured limit.
    #[error("Too many redirects (max {max})")]
    TooManyRedirects { url: String, max: usize },

    /// No transport is mounted for the URL's prefix.
    #[error("No transport mounted for {url}")]
    NoAdapter { url: String },

    /// The session was closed before the request was issued.
    #[error("Session is closed")]
    SessionClosed,

    /// The requested client kind was compiled out.
    #[error("{kind} client unavailable: enable the `{feature}` feature")]
    ClientUnavailable {
        kind: &'static str,
        feature: &'static str,
    },

    /// Building the underlying reqwest client failed.
    #[error("Failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    pub(crate) fn ssrf_blocked(
        url: impl Into<String>,
        host: impl Into<String>,
        ip: Option<IpAddr>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SsrfBlocked {
            url: url.into(),
            host: host.into(),
            ip,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dns_error(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DnsError {
            host: host.into(),
            message: message.into(),
        }
    }

    pub(crate) fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::HttpError {
            url: url.into(),
            source,
        }
    }

    /// True for `SsrfBlocked`, `InvalidUrl` and `DnsError`.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SsrfBlocked { .. } | Self::InvalidUrl { .. } | Self::DnsError { .. }
        )
    }

    /// True if the request was refused by policy.
    pub fn is_ssrf_blocked(&self) -> bool {
        matches!(self, Self::SsrfBlocked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_discriminants() {
        let blocked = Error::ssrf_blocked("http://x/", "x", None, "nope");
        assert!(blocked.is_validation());
        assert!(blocked.is_ssrf_blocked());

        let invalid = Error::invalid_url("nope", "relative URL without a base");
        assert!(invalid.is_validation());
        assert!(!invalid.is_ssrf_blocked());

        let dns = Error::dns_error("x.invalid", "no record");
        assert!(dns.is_validation());

        assert!(!Error::SessionClosed.is_validation());
        assert!(!Error::NoAdapter { url: "ftp://x".into() }.is_validation());
    }

    #[test]
    fn test_display_includes_reason() {
        let err = Error::ssrf_blocked(
            "http://169.254.169.254/",
            "169.254.169.254",
            Some("169.254.169.254".parse().unwrap()),
            "link-local address",
        );
        assert_eq!(
            err.to_string(),
            "SSRF blocked: 169.254.169.254 - link-local address"
        );
    }
}
