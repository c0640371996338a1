//! Pre-dispatch interceptors.
//!
//! Every adapter in this crate registers an interceptor when its client is
//! built and runs it before handing a request to reqwest. Blocking and
//! suspending interceptors are separate traits: blocking adapters call
//! [`Interceptor`] on the caller's thread, async adapters await
//! [`AsyncInterceptor`] inside the request task.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::policy::Policy;
use crate::validate::{UrlJail, Validator};

/// Hook run on the caller's thread before a request is sent.
pub trait Interceptor: Send + Sync {
    /// Returning `Err` aborts the request; the error reaches the caller as is.
    fn before_dispatch(&self, url: &Url) -> Result<(), Error>;
}

/// Hook awaited inside the request task before a request is sent.
#[async_trait]
pub trait AsyncInterceptor: Send + Sync {
    /// Returning `Err` aborts the request; the error reaches the caller as is.
    async fn before_dispatch(&self, url: &Url) -> Result<(), Error>;
}

/// Validates the request URL under a fixed policy.
///
/// One instance is attached per client and shared by all of its requests; it
/// keeps no per-request state.
#[derive(Debug, Clone)]
pub struct ValidationHook {
    policy: Policy,
    validator: Arc<dyn Validator>,
}

impl ValidationHook {
    /// Hook backed by the built-in [`UrlJail`] validator.
    pub fn new(policy: Policy) -> Self {
        Self::with_validator(policy, Arc::new(UrlJail))
    }

    pub fn with_validator(policy: Policy, validator: Arc<dyn Validator>) -> Self {
        Self { policy, validator }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    fn record(&self, url: &Url, outcome: Result<(), Error>) -> Result<(), Error> {
        match &outcome {
            Ok(()) => debug!(url = %url, policy = %self.policy, "request passed validation"),
            Err(err) => warn!(url = %url, policy = %self.policy, reason = %err, "request blocked"),
        }
        outcome
    }
}

impl Default for ValidationHook {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}

impl Interceptor for ValidationHook {
    fn before_dispatch(&self, url: &Url) -> Result<(), Error> {
        let outcome = self
            .validator
            .validate_blocking(url.as_str(), self.policy)
            .map(drop);
        self.record(url, outcome)
    }
}

#[async_trait]
impl AsyncInterceptor for ValidationHook {
    async fn before_dispatch(&self, url: &Url) -> Result<(), Error> {
        let outcome = self
            .validator
            .validate(url.as_str(), self.policy)
            .await
            .map(drop);
        self.record(url, outcome)
    }
}
