//! Test doubles shared by the adapter test modules.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Error, Policy, Validated, Validator};

#[derive(Debug, Clone, Copy)]
enum Verdict {
    Allow,
    Block,
    DnsFailure,
    /// Allow everything except this host.
    BlockHost(&'static str),
    /// Allow, but only after sleeping (async form only).
    SlowAllow(Duration),
}

/// Validator whose answer is fixed up front, recording every call.
#[derive(Debug)]
pub(crate) struct ScriptedValidator {
    verdict: Verdict,
    calls: Mutex<Vec<(String, Policy)>>,
}

impl ScriptedValidator {
    fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn allow_all() -> Self {
        Self::new(Verdict::Allow)
    }

    pub(crate) fn block_all() -> Self {
        Self::new(Verdict::Block)
    }

    pub(crate) fn dns_failure() -> Self {
        Self::new(Verdict::DnsFailure)
    }

    pub(crate) fn block_host(host: &'static str) -> Self {
        Self::new(Verdict::BlockHost(host))
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self::new(Verdict::SlowAllow(delay))
    }

    pub(crate) fn calls(&self) -> Vec<(String, Policy)> {
        self.calls.lock().clone()
    }

    fn decide(&self, url: &str, policy: Policy) -> Result<Validated, Error> {
        self.calls.lock().push((url.to_string(), policy));
        let parsed = url::Url::parse(url).map_err(|e| Error::invalid_url(url, e.to_string()))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        match self.verdict {
            Verdict::Block => Err(Error::ssrf_blocked(url, host, None, "scripted block")),
            Verdict::BlockHost(blocked) if host == blocked => {
                Err(Error::ssrf_blocked(url, host, None, "scripted block"))
            }
            Verdict::DnsFailure => Err(Error::dns_error(host, "scripted resolution failure")),
            Verdict::Allow | Verdict::SlowAllow(_) | Verdict::BlockHost(_) => Ok(Validated {
                ip: host
                    .trim_matches(|c| c == '[' || c == ']')
                    .parse()
                    .unwrap_or(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))),
                port: parsed.port_or_known_default().unwrap_or(80),
                https: parsed.scheme() == "https",
                url: parsed.to_string(),
                host,
            }),
        }
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    fn validate_blocking(&self, url: &str, policy: Policy) -> Result<Validated, Error> {
        self.decide(url, policy)
    }

    async fn validate(&self, url: &str, policy: Policy) -> Result<Validated, Error> {
        if let Verdict::SlowAllow(delay) = self.verdict {
            tokio::time::sleep(delay).await;
        }
        self.decide(url, policy)
    }
}

/// Start a wiremock server from synchronous test code.
///
/// The runtime must outlive the server handle, so both are returned.
#[cfg(any(feature = "pooled", feature = "dual"))]
pub(crate) fn blocking_mock_server() -> (tokio::runtime::Runtime, wiremock::MockServer) {
    let rt = tokio::runtime::Runtime::new().expect("test runtime");
    let server = rt.block_on(wiremock::MockServer::start());
    (rt, server)
}

/// Route `tracing` output to the test harness; `RUST_LOG` selects the level.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
