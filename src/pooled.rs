//! Synchronous session with per-scheme transports.
//!
//! A [`Session`] dispatches every request to the transport mounted for the
//! longest matching URL prefix. The factory mounts one
//! [`ValidatingTransport`] under both `http://` and `https://`, so every
//! request, whichever way it was built, passes one interception point before
//! the pooled [`HttpTransport`] sees it.
//!
//! Note: the request is sent to the hostname it was validated for, not to the
//! validated address, so TLS server-name checks keep working. DNS may change
//! between the two lookups; this session does not protect against rebinding.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Body, Client, Request, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::interceptor::{Interceptor, ValidationHook};
use crate::policy::Policy;
use crate::redirect;

/// Redirect limit for [`Session`].
pub const DEFAULT_MAX_REDIRECTS: usize = 30;

/// Sends one prepared request. Implementations own their connection handling.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> Result<Response, Error>;
}

/// Retry settings for [`HttpTransport`].
///
/// Connection failures are retried for any method. Timeouts are retried only
/// for idempotent methods, since the server may already have acted on the
/// request. Either way the body must be replayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Retry {
    pub total: u32,
    pub backoff_factor: Duration,
}

impl Retry {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            backoff_factor: Duration::ZERO,
        }
    }

    pub fn backoff_factor(mut self, factor: Duration) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Sleep before retry number `attempt` (1-based): `factor * 2^(attempt-1)`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(1 << exp)
    }

    fn is_retryable(err: &reqwest::Error, method: &Method) -> bool {
        err.is_connect() || (err.is_timeout() && is_idempotent(method))
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Pooled transport over `reqwest::blocking::Client`.
///
/// The client is built with redirects disabled; [`Session`] follows them so
/// each hop goes through the mounted transport again.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: Retry,
}

impl HttpTransport {
    pub fn new(retry: Retry) -> Result<Self, Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|source| Error::ClientBuild { source })?;
        Ok(Self { client, retry })
    }
}

impl Transport for HttpTransport {
    fn send(&self, mut request: Request) -> Result<Response, Error> {
        let url = request.url().to_string();
        let method = request.method().clone();
        let mut attempt = 0;
        loop {
            let spare = if attempt < self.retry.total {
                request.try_clone()
            } else {
                None
            };
            let err = match self.client.execute(request) {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            let Some(next) = spare.filter(|_| Retry::is_retryable(&err, &method)) else {
                return Err(Error::http(url, err));
            };
            attempt += 1;
            debug!(url = %url, attempt, error = %err, "retrying request");
            std::thread::sleep(self.retry.backoff(attempt));
            request = next;
        }
    }
}

/// Transport that validates the request URL before delegating.
///
/// A refused request never reaches `inner`, so it is neither sent nor retried.
#[derive(Debug, Clone)]
pub struct ValidatingTransport<T = HttpTransport> {
    hook: ValidationHook,
    inner: T,
}

impl<T: Transport> ValidatingTransport<T> {
    pub fn new(hook: ValidationHook, inner: T) -> Self {
        Self { hook, inner }
    }

    pub fn policy(&self) -> Policy {
        self.hook.policy()
    }
}

impl<T: Transport> Transport for ValidatingTransport<T> {
    fn send(&self, request: Request) -> Result<Response, Error> {
        self.hook.before_dispatch(request.url())?;
        self.inner.send(request)
    }
}

/// Synchronous HTTP session with mountable transports.
pub struct Session {
    /// Sorted longest prefix first.
    mounts: Vec<(String, Arc<dyn Transport>)>,
    max_redirects: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session with nothing mounted; every request fails with
    /// [`Error::NoAdapter`] until a transport is mounted.
    pub fn new() -> Self {
        Self {
            mounts: Vec::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Mount `transport` for URLs starting with `prefix` (case-insensitive).
    /// Mounting an existing prefix replaces its transport.
    pub fn mount(&mut self, prefix: &str, transport: Arc<dyn Transport>) {
        let prefix = prefix.to_ascii_lowercase();
        self.mounts.retain(|(existing, _)| *existing != prefix);
        self.mounts.push((prefix, transport));
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn set_max_redirects(&mut self, max: usize) {
        self.max_redirects = max;
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// The transport `url` would be sent through.
    pub fn transport_for(&self, url: &Url) -> Result<&Arc<dyn Transport>, Error> {
        let lowered = url.as_str().to_ascii_lowercase();
        self.mounts
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix.as_str()))
            .map(|(_, transport)| transport)
            .ok_or_else(|| Error::NoAdapter {
                url: url.to_string(),
            })
    }

    pub fn request(&self, method: Method, url: &str) -> SessionRequestBuilder<'_> {
        let request = Url::parse(url)
            .map(|url| Request::new(method, url))
            .map_err(|e| Error::invalid_url(url, e.to_string()));
        SessionRequestBuilder {
            session: self,
            request,
        }
    }

    pub fn get(&self, url: &str) -> SessionRequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> SessionRequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> SessionRequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> SessionRequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> SessionRequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> SessionRequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    /// Send a prepared request, following redirects through the mounted
    /// transports.
    ///
    /// 307/308 redirects whose body cannot be replayed are returned as is.
    pub fn send(&self, mut request: Request) -> Result<Response, Error> {
        let mut hops = 0;
        loop {
            let transport = self.transport_for(request.url())?;
            let method = request.method().clone();
            let url = request.url().clone();
            let headers = request.headers().clone();
            let timeout = request.timeout().copied();
            let replay = request.try_clone();

            let response = transport.send(request)?;

            let Some(hop) =
                redirect::next_hop(&method, &url, response.status(), response.headers())?
            else {
                return Ok(response);
            };
            let body = match (hop.keep_body, replay) {
                (false, _) => None,
                (true, Some(mut replay)) => replay.body_mut().take(),
                (true, None) => return Ok(response),
            };

            hops += 1;
            if hops > self.max_redirects {
                return Err(Error::TooManyRedirects {
                    url: url.to_string(),
                    max: self.max_redirects,
                });
            }
            debug!(from = %url, to = %hop.url, status = %response.status(), "following redirect");

            let mut next = Request::new(hop.method.clone(), hop.url.clone());
            *next.headers_mut() = redirect::carry_headers(&headers, &url, &hop);
            *next.body_mut() = body;
            *next.timeout_mut() = timeout;
            request = next;
        }
    }
}

/// Request under construction for a [`Session`].
///
/// URL errors are held until [`send`](Self::send) so they surface as
/// [`Error::InvalidUrl`] from the same call that would have dispatched.
pub struct SessionRequestBuilder<'a> {
    session: &'a Session,
    request: Result<Request, Error>,
}

impl SessionRequestBuilder<'_> {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if let Ok(request) = &mut self.request {
            request.headers_mut().insert(name, value);
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        if let Ok(request) = &mut self.request {
            request.headers_mut().extend(headers);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        if let Ok(request) = &mut self.request {
            *request.body_mut() = Some(body.into());
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        if let Ok(request) = &mut self.request {
            *request.timeout_mut() = Some(timeout);
        }
        self
    }

    /// Send `Authorization: Bearer <token>`. The header is not carried to a
    /// redirect target on another origin.
    pub fn bearer_auth(mut self, token: impl fmt::Display) -> Self {
        self.request = self.request.and_then(|mut request| {
            let value = redirect::bearer(&token.to_string())?;
            request.headers_mut().insert(AUTHORIZATION, value);
            Ok(request)
        });
        self
    }

    pub fn build(self) -> Result<Request, Error> {
        self.request
    }

    pub fn send(self) -> Result<Response, Error> {
        let request = self.request?;
        self.session.send(request)
    }
}
