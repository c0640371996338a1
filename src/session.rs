//! Async session with request trace hooks.
//!
//! A [`ClientSession`] owns one pooled `reqwest::Client`. Each
//! [`TraceConfig`] carries `on_request_start` hooks that are awaited before
//! the pool is touched: if any hook fails, the session never hands the
//! request to reqwest, so no connection is checked out or opened.
//!
//! Sessions are scoped resources. [`ClientSession::close`] drops the pool;
//! [`ClientSession::scoped`] closes it on every exit path, including a
//! refused request, a panic or cancellation of the scope.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Body, Method, Request, Response};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::interceptor::{AsyncInterceptor, ValidationHook};
use crate::policy::Policy;
use crate::redirect;
use crate::validate::{UrlJail, Validator};

/// Redirect limit for [`ClientSession`].
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Request lifecycle callbacks attached to a session.
#[derive(Clone, Default)]
pub struct TraceConfig {
    on_request_start: Vec<Arc<dyn AsyncInterceptor>>,
}

impl TraceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Awaited before each request (and each redirect hop) is dispatched.
    pub fn on_request_start(mut self, hook: Arc<dyn AsyncInterceptor>) -> Self {
        self.on_request_start.push(hook);
        self
    }
}

/// Builder for [`ClientSession`].
#[derive(Clone)]
pub struct ClientSessionBuilder {
    policy: Policy,
    validator: Arc<dyn Validator>,
    timeout: Option<Duration>,
    max_redirects: usize,
    traces: Vec<TraceConfig>,
}

impl Default for ClientSessionBuilder {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            validator: Arc::new(UrlJail),
            timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            traces: Vec::new(),
        }
    }
}

impl ClientSessionBuilder {
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Additional trace config; its hooks run after validation.
    pub fn trace_config(mut self, trace: TraceConfig) -> Self {
        self.traces.push(trace);
        self
    }

    pub fn build(self) -> Result<ClientSession, Error> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|source| Error::ClientBuild { source })?;

        let validation = TraceConfig::new().on_request_start(Arc::new(
            ValidationHook::with_validator(self.policy, self.validator),
        ));
        let mut traces = vec![validation];
        traces.extend(self.traces);

        Ok(ClientSession {
            client: RwLock::new(Some(client)),
            traces,
            policy: self.policy,
            max_redirects: self.max_redirects,
        })
    }

    /// Build a session, run `f` with it, and close it however `f` ends.
    pub async fn scope<F, Fut, T>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce(Arc<ClientSession>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let session = Arc::new(self.build()?);
        let _guard = CloseOnDrop(session.clone());
        f(session).await
    }
}

struct CloseOnDrop(Arc<ClientSession>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Async HTTP session whose requests pass the trace hooks first.
pub struct ClientSession {
    /// `None` once closed.
    client: RwLock<Option<reqwest::Client>>,
    traces: Vec<TraceConfig>,
    policy: Policy,
    max_redirects: usize,
}

impl ClientSession {
    pub fn builder() -> ClientSessionBuilder {
        ClientSessionBuilder::default()
    }

    /// Scoped session under `policy`; see [`ClientSessionBuilder::scope`].
    pub async fn scoped<F, Fut, T>(policy: Policy, f: F) -> Result<T, Error>
    where
        F: FnOnce(Arc<ClientSession>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        Self::builder().policy(policy).scope(f).await
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }

    /// Release the connection pool. Idempotent. In-flight requests keep
    /// their own handle and finish normally.
    pub fn close(&self) {
        if self.client.write().take().is_some() {
            debug!("client session closed");
        }
    }

    pub fn request(&self, method: Method, url: &str) -> SessionRequest<'_> {
        let request = Url::parse(url)
            .map(|url| Request::new(method, url))
            .map_err(|e| Error::invalid_url(url, e.to_string()));
        SessionRequest {
            session: self,
            request,
        }
    }

    pub fn get(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::HEAD, url)
    }

    fn pool(&self) -> Result<reqwest::Client, Error> {
        self.client.read().clone().ok_or(Error::SessionClosed)
    }

    async fn request_start(&self, url: &Url) -> Result<(), Error> {
        for hook in self.traces.iter().flat_map(|t| t.on_request_start.iter()) {
            hook.before_dispatch(url).await?;
        }
        Ok(())
    }

    /// Await the trace hooks, then send, following redirects.
    pub async fn send(&self, mut request: Request) -> Result<Response, Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let mut hops = 0;
        loop {
            self.request_start(request.url()).await?;
            // checked again: the session may have closed while a hook was pending
            let client = self.pool()?;

            let method = request.method().clone();
            let url = request.url().clone();
            let headers = request.headers().clone();
            let timeout = request.timeout().copied();
            let replay = request.try_clone();

            let response = client
                .execute(request)
                .await
                .map_err(|e| Error::http(url.as_str(), e))?;

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
            debug!(from = %url, to = %hop.url, "following redirect");

            let mut next = Request::new(hop.method.clone(), hop.url.clone());
            *next.headers_mut() = redirect::carry_headers(&headers, &url, &hop);
            *next.body_mut() = body;
            *next.timeout_mut() = timeout;
            request = next;
        }
    }
}

/// Request under construction for a [`ClientSession`].
pub struct SessionRequest<'a> {
    session: &'a ClientSession,
    request: Result<Request, Error>,
}

impl SessionRequest<'_> {
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

    pub async fn send(self) -> Result<Response, Error> {
        let request = self.request?;
        self.session.send(request).await
    }
}
