//! Factories for guarded clients.
//!
//! Each client kind lives behind its own cargo feature (`pooled`, `dual`,
//! `session`), so an application that only needs one of them compiles none
//! of the others. [`ClientKind`] is the runtime view of the same registry:
//! a kind's factory is looked up only when [`ClientKind::build`] is called,
//! and a kind whose feature is off reports [`Error::ClientUnavailable`].
//!
//! The plain factories use [`Policy::PublicOnly`]; each has a
//! `_with_policy` form.
//!
//! ```rust,no_run
//! use url_jail_adapters::{safe_session, safe_session_with_policy, Policy};
//!
//! # fn example() -> Result<(), url_jail_adapters::Error> {
//! let session = safe_session()?;
//! let internal = safe_session_with_policy(Policy::AllowPrivate)?;
//! let response = session.get("https://example.com/api").send()?;
//! // session.get("http://169.254.169.254/").send() fails with Error::SsrfBlocked
//! # Ok(())
//! # }
//! ```

use std::fmt;

use crate::error::Error;
use crate::policy::Policy;

#[cfg(feature = "pooled")]
use std::sync::Arc;

#[cfg(feature = "pooled")]
use crate::interceptor::ValidationHook;
#[cfg(feature = "pooled")]
use crate::pooled::{HttpTransport, Retry, Session, ValidatingTransport};

/// Retries used by [`safe_session`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Synchronous session that validates every request under
/// [`Policy::PublicOnly`].
///
/// `http://` and `https://` share one validating transport over a pooled
/// blocking client with [`DEFAULT_MAX_RETRIES`] retries.
#[cfg(feature = "pooled")]
pub fn safe_session() -> Result<Session, Error> {
    safe_session_with_policy(Policy::default())
}

#[cfg(feature = "pooled")]
pub fn safe_session_with_policy(policy: Policy) -> Result<Session, Error> {
    safe_session_with_retries(policy, DEFAULT_MAX_RETRIES)
}

/// [`safe_session`] with an explicit retry count for the pooled transport.
///
/// Refused requests are never retried: validation runs before the retrying
/// transport is reached.
#[cfg(feature = "pooled")]
pub fn safe_session_with_retries(policy: Policy, max_retries: u32) -> Result<Session, Error> {
    let transport = Arc::new(ValidatingTransport::new(
        ValidationHook::new(policy),
        HttpTransport::new(Retry::new(max_retries))?,
    ));
    let mut session = Session::new();
    session.mount("http://", transport.clone());
    session.mount("https://", transport);
    Ok(session)
}

/// Blocking client with the validation request hook installed, under
/// [`Policy::PublicOnly`].
#[cfg(feature = "dual")]
pub fn safe_client() -> Result<crate::dual::Client, Error> {
    safe_client_with_policy(Policy::default())
}

#[cfg(feature = "dual")]
pub fn safe_client_with_policy(policy: Policy) -> Result<crate::dual::Client, Error> {
    crate::dual::Client::builder().policy(policy).build()
}

/// Async client with the validation request hook installed, under
/// [`Policy::PublicOnly`].
#[cfg(feature = "dual")]
pub fn safe_async_client() -> Result<crate::dual::AsyncClient, Error> {
    safe_async_client_with_policy(Policy::default())
}

#[cfg(feature = "dual")]
pub fn safe_async_client_with_policy(policy: Policy) -> Result<crate::dual::AsyncClient, Error> {
    crate::dual::AsyncClient::builder().policy(policy).build()
}

/// Async session with the validation trace hook installed, under
/// [`Policy::PublicOnly`].
#[cfg(feature = "session")]
pub fn safe_async_session() -> Result<crate::session::ClientSession, Error> {
    safe_async_session_with_policy(Policy::default())
}

#[cfg(feature = "session")]
pub fn safe_async_session_with_policy(
    policy: Policy,
) -> Result<crate::session::ClientSession, Error> {
    crate::session::ClientSession::builder().policy(policy).build()
}

/// Options understood by every factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryOptions {
    pub policy: Policy,
    /// Only used by [`ClientKind::Session`].
    pub max_retries: u32,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl From<Policy> for FactoryOptions {
    fn from(policy: Policy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}

/// The client kinds this crate can guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Synchronous pooled session (`pooled` feature).
    Session,
    /// Blocking client with request hooks (`dual` feature).
    Client,
    /// Async client with request hooks (`dual` feature).
    AsyncClient,
    /// Async session with trace hooks (`session` feature).
    AsyncSession,
}

impl ClientKind {
    pub const ALL: [ClientKind; 4] = [
        ClientKind::Session,
        ClientKind::Client,
        ClientKind::AsyncClient,
        ClientKind::AsyncSession,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClientKind::Session => "session",
            ClientKind::Client => "client",
            ClientKind::AsyncClient => "async client",
            ClientKind::AsyncSession => "async session",
        }
    }

    /// Cargo feature that compiles this kind in.
    pub fn feature(self) -> &'static str {
        match self {
            ClientKind::Session => "pooled",
            ClientKind::Client | ClientKind::AsyncClient => "dual",
            ClientKind::AsyncSession => "session",
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            ClientKind::Session => cfg!(feature = "pooled"),
            ClientKind::Client | ClientKind::AsyncClient => cfg!(feature = "dual"),
            ClientKind::AsyncSession => cfg!(feature = "session"),
        }
    }

    /// Build a guarded client of this kind.
    pub fn build(self, options: &FactoryOptions) -> Result<SafeClient, Error> {
        match self {
            #[cfg(feature = "pooled")]
            ClientKind::Session => safe_session_with_retries(options.policy, options.max_retries)
                .map(SafeClient::Session),
            #[cfg(feature = "dual")]
            ClientKind::Client => safe_client_with_policy(options.policy).map(SafeClient::Client),
            #[cfg(feature = "dual")]
            ClientKind::AsyncClient => {
                safe_async_client_with_policy(options.policy).map(SafeClient::AsyncClient)
            }
            #[cfg(feature = "session")]
            ClientKind::AsyncSession => {
                safe_async_session_with_policy(options.policy).map(SafeClient::AsyncSession)
            }
            #[allow(unreachable_patterns)]
            kind => {
                let _ = options;
                Err(Error::ClientUnavailable {
                    kind: kind.name(),
                    feature: kind.feature(),
                })
            }
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A client produced by [`ClientKind::build`].
#[non_exhaustive]
pub enum SafeClient {
    #[cfg(feature = "pooled")]
    Session(Session),
    #[cfg(feature = "dual")]
    Client(crate::dual::Client),
    #[cfg(feature = "dual")]
    AsyncClient(crate::dual::AsyncClient),
    #[cfg(feature = "session")]
    AsyncSession(crate::session::ClientSession),
}

impl SafeClient {
    pub fn kind(&self) -> ClientKind {
        match *self {
            #[cfg(feature = "pooled")]
            SafeClient::Session(_) => ClientKind::Session,
            #[cfg(feature = "dual")]
            SafeClient::Client(_) => ClientKind::Client,
            #[cfg(feature = "dual")]
            SafeClient::AsyncClient(_) => ClientKind::AsyncClient,
            #[cfg(feature = "session")]
            SafeClient::AsyncSession(_) => ClientKind::AsyncSession,
        }
    }

    #[cfg(feature = "pooled")]
    pub fn into_session(self) -> Option<Session> {
        match self {
            SafeClient::Session(session) => Some(session),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "dual")]
    pub fn into_client(self) -> Option<crate::dual::Client> {
        match self {
            SafeClient::Client(client) => Some(client),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "dual")]
    pub fn into_async_client(self) -> Option<crate::dual::AsyncClient> {
        match self {
            SafeClient::AsyncClient(client) => Some(client),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "session")]
    pub fn into_async_session(self) -> Option<crate::session::ClientSession> {
        match self {
            SafeClient::AsyncSession(session) => Some(session),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}
