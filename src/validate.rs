//! URL validation with DNS resolution, and the [`Validator`] seam the
//! client adapters call through.

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use crate::blocklist::{is_hostname_blocked, is_ip_blocked};
use crate::error::Error;
use crate::policy::Policy;
use crate::safe_url::SafeUrl;

/// Result of successful URL validation.
#[derive(Debug, Clone)]
pub struct Validated {
    /// The verified IP address the host resolved to.
    pub ip: IpAddr,

    /// Original hostname (use for Host header / SNI).
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Full URL (normalized).
    pub url: String,

    /// Whether HTTPS.
    pub https: bool,
}

/// The decision function every adapter consults before dispatch.
///
/// Implementations must be pure apart from DNS lookups and must return before
/// the caller opens a connection. They are not required to pin the resolved
/// address for that connection.
#[async_trait]
pub trait Validator: Send + Sync + fmt::Debug {
    /// Blocking form, for adapters that run on the caller's thread.
    fn validate_blocking(&self, url: &str, policy: Policy) -> Result<Validated, Error>;

    /// Suspending form, for adapters that run inside a task.
    async fn validate(&self, url: &str, policy: Policy) -> Result<Validated, Error>;
}

/// The built-in validator: [`validate`] and [`validate_sync`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlJail;

#[async_trait]
impl Validator for UrlJail {
    fn validate_blocking(&self, url: &str, policy: Policy) -> Result<Validated, Error> {
        validate_sync(url, policy)
    }

    async fn validate(&self, url: &str, policy: Policy) -> Result<Validated, Error> {
        validate(url, policy).await
    }
}

/// Validate a URL, resolve DNS, and check the IP against the policy.
///
/// # Example
///
/// ```rust,no_run
/// use url_jail_adapters::{validate, Policy};
///
/// # async fn example() -> Result<(), url_jail_adapters::Error> {
/// let result = validate("https://example.com/api", Policy::PublicOnly).await?;
/// println!("Safe to connect to {} ({})", result.host, result.ip);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// - [`Error::InvalidUrl`] if the URL is malformed or uses a forbidden scheme
/// - [`Error::SsrfBlocked`] if the hostname is on the blocklist or the
///   resolved address is refused by `policy`
/// - [`Error::DnsError`] if resolution fails
pub async fn validate(url: &str, policy: Policy) -> Result<Validated, Error> {
    let safe_url = SafeUrl::parse(url)?;
    let host = safe_url.host();

    if let Some(entry) = is_hostname_blocked(host) {
        return Err(Error::ssrf_blocked(
            url,
            host,
            None,
            format!("hostname {entry} is blocked"),
        ));
    }

    let addrs = resolve(host).await?;

    // any refused record refuses the host
    for &addr in &addrs {
        if let Some(reason) = is_ip_blocked(addr, policy) {
            return Err(Error::ssrf_blocked(url, host, Some(addr), reason.to_string()));
        }
    }
    let ip = addrs[0];

    Ok(Validated {
        ip,
        host: host.to_string(),
        port: safe_url.port(),
        url: safe_url.as_str().to_string(),
        https: safe_url.is_https(),
    })
}

/// Synchronous version of [`validate`].
///
/// Blocks the current thread during DNS resolution. Safe to call with no
/// runtime, from a multi-thread runtime worker, or from a current-thread
/// runtime (where the lookup runs on a helper thread).
pub fn validate_sync(url: &str, policy: Policy) -> Result<Validated, Error> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(validate(url, policy)))
        }
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(|| validate_on_fresh_runtime(url, policy))
                .join()
                .unwrap_or_else(|_| Err(Error::dns_error("runtime", "validation thread panicked")))
        }),
        Err(_) => validate_on_fresh_runtime(url, policy),
    }
}

fn validate_on_fresh_runtime(url: &str, policy: Policy) -> Result<Validated, Error> {
    let rt = Runtime::new().map_err(|e| Error::dns_error("runtime", e.to_string()))?;
    rt.block_on(validate(url, policy))
}

/// Resolve a hostname to all of its addresses, never empty. IP literals
/// skip DNS.
async fn resolve(host: &str) -> Result<Vec<IpAddr>, Error> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let resolver = TokioResolver::builder_tokio()
        .map_err(|e| Error::dns_error(host, e.to_string()))?
        .build();

    let response = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| Error::dns_error(host, e.to_string()))?;

    let addrs: Vec<IpAddr> = response.iter().collect();
    if addrs.is_empty() {
        return Err(Error::dns_error(host, "no IP addresses found"));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_block_metadata_literal() {
        let err = validate("http://169.254.169.254/", Policy::PublicOnly)
            .await
            .unwrap_err();
        match err {
            Error::SsrfBlocked { ip, .. } => {
                assert_eq!(ip, Some("169.254.169.254".parse().unwrap()))
            }
            other => panic!("expected SsrfBlocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_block_metadata_hostname_without_dns() {
        let err = validate("http://metadata.google.internal/", Policy::AllowPrivate)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SsrfBlocked { ip: None, .. }));
    }

    #[tokio::test]
    async fn test_private_literal_follows_policy() {
        assert!(validate("http://10.0.0.5/", Policy::PublicOnly).await.is_err());

        let ok = validate("http://10.0.0.5:8080/x", Policy::AllowPrivate)
            .await
            .unwrap();
        assert_eq!(ok.ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(ok.port, 8080);
        assert!(!ok.https);
    }

    #[tokio::test]
    async fn test_invalid_url_before_resolution() {
        let err = validate("not a url", Policy::PublicOnly).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_sync_outside_runtime() {
        let err = validate_sync("http://[::1]/", Policy::AllowPrivate).unwrap_err();
        assert!(err.is_ssrf_blocked());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_sync_inside_current_thread_runtime() {
        let ok = validate_sync("https://93.184.216.34/", Policy::PublicOnly).unwrap();
        assert_eq!(ok.port, 443);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_inside_multi_thread_runtime() {
        let err = UrlJail
            .validate_blocking("http://127.0.0.1/", Policy::AllowPrivate)
            .unwrap_err();
        assert!(err.is_ssrf_blocked());
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_validate_public_hostname() {
        let ok = validate("https://example.com/", Policy::PublicOnly).await.unwrap();
        assert_eq!(ok.host, "example.com");
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_unresolvable_host_is_dns_error() {
        let err = validate("http://does-not-exist.invalid/", Policy::PublicOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DnsError { .. }));
    }
}
