//! Blocking and async clients with request event hooks.
//!
//! [`Client`] wraps `reqwest::blocking::Client` and [`AsyncClient`] wraps
//! `reqwest::Client`. Each carries a list of request hooks that run, in
//! registration order, before the request is handed to reqwest. The
//! validation hook is registered first by the builder; dispatch does not start
//! until every hook has returned `Ok` (for the async client, until every hook
//! future has resolved).
//!
//! Redirects are followed like plain reqwest does (up to 10 hops), but by the
//! adapter rather than by reqwest, so the hooks run again for every hop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::interceptor::{AsyncInterceptor, Interceptor, ValidationHook};
use crate::policy::Policy;
use crate::redirect;
use crate::validate::{UrlJail, Validator};

/// Redirect limit, matching reqwest's default policy.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
struct Settings {
    policy: Policy,
    validator: Arc<dyn Validator>,
    timeout: Option<Duration>,
    follow_redirects: bool,
    max_redirects: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            validator: Arc::new(UrlJail),
            timeout: None,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

macro_rules! settings_setters {
    () => {
        /// Policy for the validation hook. Defaults to [`Policy::PublicOnly`].
        pub fn policy(mut self, policy: Policy) -> Self {
            self.settings.policy = policy;
            self
        }

        /// Validator behind the validation hook. Defaults to [`UrlJail`].
        pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
            self.settings.validator = validator;
            self
        }

        pub fn timeout(mut self, timeout: Duration) -> Self {
            self.settings.timeout = Some(timeout);
            self
        }

        /// On by default. When off, redirect responses are returned as is.
        pub fn follow_redirects(mut self, follow: bool) -> Self {
            self.settings.follow_redirects = follow;
            self
        }

        pub fn max_redirects(mut self, max: usize) -> Self {
            self.settings.max_redirects = max;
            self
        }
    };
}

// ==================== Blocking client ====================

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    settings: Settings,
    hooks: Vec<Arc<dyn Interceptor>>,
}

impl ClientBuilder {
    settings_setters!();

    /// Extra hook, run after the validation hook.
    pub fn request_hook(mut self, hook: Arc<dyn Interceptor>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        let mut builder =
            reqwest::blocking::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.settings.timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder
            .build()
            .map_err(|source| Error::ClientBuild { source })?;

        let validation = ValidationHook::with_validator(
            self.settings.policy,
            self.settings.validator.clone(),
        );
        let mut hooks: Vec<Arc<dyn Interceptor>> = vec![Arc::new(validation)];
        hooks.extend(self.hooks);

        Ok(Client {
            inner,
            hooks: hooks.into(),
            settings: self.settings,
        })
    }
}

/// Blocking client whose requests pass the request hooks first.
#[derive(Clone)]
pub struct Client {
    inner: reqwest::blocking::Client,
    hooks: Arc<[Arc<dyn Interceptor>]>,
    settings: Settings,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn policy(&self) -> Policy {
        self.settings.policy
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            request: parse_url(url).map(|url| reqwest::blocking::Request::new(method, url)),
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    fn run_hooks(&self, url: &Url) -> Result<(), Error> {
        self.hooks.iter().try_for_each(|hook| hook.before_dispatch(url))
    }

    /// Run the request hooks, then send.
    pub fn send(
        &self,
        mut request: reqwest::blocking::Request,
    ) -> Result<reqwest::blocking::Response, Error> {
        let mut hops = 0;
        loop {
            self.run_hooks(request.url())?;

            let method = request.method().clone();
            let url = request.url().clone();
            let headers = request.headers().clone();
            let timeout = request.timeout().copied();
            let replay = if self.settings.follow_redirects {
                request.try_clone()
            } else {
                None
            };

            let response = self
                .inner
                .execute(request)
                .map_err(|e| Error::http(url.as_str(), e))?;
            if !self.settings.follow_redirects {
                return Ok(response);
            }

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
            check_redirect_limit(hops, self.settings.max_redirects, &url)?;
            debug!(from = %url, to = %hop.url, "following redirect");

            let mut next = reqwest::blocking::Request::new(hop.method.clone(), hop.url.clone());
            *next.headers_mut() = redirect::carry_headers(&headers, &url, &hop);
            *next.body_mut() = body;
            *next.timeout_mut() = timeout;
            request = next;
        }
    }
}

/// Request under construction for a [`Client`].
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Result<reqwest::blocking::Request, Error>,
}

impl RequestBuilder<'_> {
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

    pub fn body(mut self, body: impl Into<reqwest::blocking::Body>) -> Self {
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

    pub fn send(self) -> Result<reqwest::blocking::Response, Error> {
        let request = self.request?;
        self.client.send(request)
    }
}

// ==================== Async client ====================

/// Builder for [`AsyncClient`].
#[derive(Default)]
pub struct AsyncClientBuilder {
    settings: Settings,
    hooks: Vec<Arc<dyn AsyncInterceptor>>,
}

impl AsyncClientBuilder {
    settings_setters!();

    /// Extra hook, awaited after the validation hook.
    pub fn request_hook(mut self, hook: Arc<dyn AsyncInterceptor>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<AsyncClient, Error> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.settings.timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder
            .build()
            .map_err(|source| Error::ClientBuild { source })?;

        let validation = ValidationHook::with_validator(
            self.settings.policy,
            self.settings.validator.clone(),
        );
        let mut hooks: Vec<Arc<dyn AsyncInterceptor>> = vec![Arc::new(validation)];
        hooks.extend(self.hooks);

        Ok(AsyncClient {
            inner,
            hooks: hooks.into(),
            settings: self.settings,
        })
    }
}

/// Async client whose requests await the request hooks first.
///
/// Dropping a request future while a hook is pending cancels the request
/// before reqwest is reached, so no connection is opened for it.
#[derive(Clone)]
pub struct AsyncClient {
    inner: reqwest::Client,
    hooks: Arc<[Arc<dyn AsyncInterceptor>]>,
    settings: Settings,
}

impl AsyncClient {
    pub fn builder() -> AsyncClientBuilder {
        AsyncClientBuilder::default()
    }

    pub fn policy(&self) -> Policy {
        self.settings.policy
    }

    pub fn request(&self, method: Method, url: &str) -> AsyncRequestBuilder<'_> {
        AsyncRequestBuilder {
            client: self,
            request: parse_url(url).map(|url| reqwest::Request::new(method, url)),
        }
    }

    pub fn get(&self, url: &str) -> AsyncRequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> AsyncRequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> AsyncRequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> AsyncRequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> AsyncRequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> AsyncRequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    async fn run_hooks(&self, url: &Url) -> Result<(), Error> {
        for hook in self.hooks.iter() {
            hook.before_dispatch(url).await?;
        }
        Ok(())
    }

    /// Await the request hooks, then send.
    pub async fn send(&self, mut request: reqwest::Request) -> Result<reqwest::Response, Error> {
        let mut hops = 0;
        loop {
            self.run_hooks(request.url()).await?;

            let method = request.method().clone();
            let url = request.url().clone();
            let headers = request.headers().clone();
            let timeout = request.timeout().copied();
            let replay = if self.settings.follow_redirects {
                request.try_clone()
            } else {
                None
            };

            let response = self
                .inner
                .execute(request)
                .await
                .map_err(|e| Error::http(url.as_str(), e))?;
            if !self.settings.follow_redirects {
                return Ok(response);
            }

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
            check_redirect_limit(hops, self.settings.max_redirects, &url)?;
            debug!(from = %url, to = %hop.url, "following redirect");

            let mut next = reqwest::Request::new(hop.method.clone(), hop.url.clone());
            *next.headers_mut() = redirect::carry_headers(&headers, &url, &hop);
            *next.body_mut() = body;
            *next.timeout_mut() = timeout;
            request = next;
        }
    }
}

/// Request under construction for an [`AsyncClient`].
pub struct AsyncRequestBuilder<'a> {
    client: &'a AsyncClient,
    request: Result<reqwest::Request, Error>,
}

impl AsyncRequestBuilder<'_> {
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

    pub fn body(mut self, body: impl Into<reqwest::Body>) -> Self {
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

    pub async fn send(self) -> Result<reqwest::Response, Error> {
        let request = self.request?;
        self.client.send(request).await
    }
}

fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| Error::invalid_url(url, e.to_string()))
}

fn check_redirect_limit(hops: usize, max: usize, url: &Url) -> Result<(), Error> {
    if hops > max {
        return Err(Error::TooManyRedirects {
            url: url.to_string(),
            max,
        });
    }
    Ok(())
}
