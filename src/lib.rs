//! # url-jail-adapters
//!
//! SSRF-guarded HTTP clients.
//!
//! Every request sent through a client built here is validated before it
//! leaves the process: the URL is parsed strictly, its hostname resolved,
//! and every resolved address checked against a [`Policy`]. A refused
//! request produces no network traffic and fails with the validation error
//! unchanged. Redirects are followed by the adapters themselves, so each hop
//! is validated too.
//!
//! Three client shapes are provided, each behind a cargo feature:
//!
//! - `pooled`: [`pooled::Session`], a blocking session with mountable transports
//! - `dual`: [`dual::Client`] and [`dual::AsyncClient`] with request hooks
//! - `session`: [`session::ClientSession`], an async session with trace hooks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use url_jail_adapters::{safe_async_client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! let client = safe_async_client()?;
//! let response = client.get("https://example.com/api").send().await?;
//! println!("{}", response.status());
//!
//! match client.get("http://169.254.169.254/latest/meta-data/").send().await {
//!     Err(Error::SsrfBlocked { reason, .. }) => println!("refused: {reason}"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Validation on its own is available through [`validate`] and
//! [`validate_sync`].

mod blocklist;
mod error;
mod factory;
mod interceptor;
mod policy;
mod safe_url;
mod validate;

#[cfg(any(feature = "pooled", feature = "dual", feature = "session"))]
mod redirect;

#[cfg(feature = "dual")]
pub mod dual;
#[cfg(feature = "pooled")]
pub mod pooled;
#[cfg(feature = "session")]
pub mod session;

#[cfg(test)]
mod testing;

pub use error::Error;
pub use factory::{ClientKind, FactoryOptions, SafeClient, DEFAULT_MAX_RETRIES};
pub use interceptor::{AsyncInterceptor, Interceptor, ValidationHook};
pub use policy::Policy;
pub use safe_url::SafeUrl;
pub use validate::{validate, validate_sync, UrlJail, Validated, Validator};

#[cfg(feature = "pooled")]
pub use factory::{safe_session, safe_session_with_policy, safe_session_with_retries};

#[cfg(feature = "dual")]
pub use factory::{
    safe_async_client, safe_async_client_with_policy, safe_client, safe_client_with_policy,
};

#[cfg(feature = "session")]
pub use factory::{safe_async_session, safe_async_session_with_policy};
