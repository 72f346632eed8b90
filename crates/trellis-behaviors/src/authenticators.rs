//! Built-in authenticators.
//!
//! [`BasicAuthenticator`] and [`BearerTokenAuthenticator`] only parse the
//! credentials; validation is delegated to a validator service registered
//! in the container. Closures can be registered as validators:
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_behaviors::authenticators::{BasicCredentialValidator, BasicCredentials};
//! use trellis_core::Container;
//!
//! let container = Container::new();
//! container.register_instance::<dyn BasicCredentialValidator>(Arc::new(
//!     |credentials: &BasicCredentials| {
//!         credentials.username == "admin" && credentials.password == "s3cret"
//!     },
//! ));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use trellis_core::{Authenticator, BoxFuture, Container, Resolve, TrellisResult};

/// Decoded `Basic` credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// The user name.
    pub username: String,
    /// The password; may contain colons.
    pub password: String,
}

impl BasicCredentials {
    /// Decodes the base64 `username:password` payload.
    ///
    /// Returns `None` for anything malformed: bad base64, non UTF-8 content
    /// or a missing colon. Only the first colon separates the fields.
    pub fn parse(encoded: &str) -> Option<Self> {
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Checks decoded `Basic` credentials.
pub trait BasicCredentialValidator: Send + Sync + 'static {
    /// Returns `true` if the credentials are valid.
    fn validate<'a>(&'a self, credentials: &'a BasicCredentials) -> BoxFuture<'a, bool>;
}

impl<F> BasicCredentialValidator for F
where
    F: Fn(&BasicCredentials) -> bool + Send + Sync + 'static,
{
    fn validate<'a>(&'a self, credentials: &'a BasicCredentials) -> BoxFuture<'a, bool> {
        let valid = self(credentials);
        Box::pin(async move { valid })
    }
}

/// Checks `Bearer` tokens.
pub trait BearerTokenValidator: Send + Sync + 'static {
    /// Returns `true` if the token is valid.
    fn validate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, bool>;
}

impl<F> BearerTokenValidator for F
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    fn validate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, bool> {
        let valid = self(token);
        Box::pin(async move { valid })
    }
}

/// Per-authenticator overrides of the challenge realm and 401 reason phrase.
///
/// Register an instance in the container to configure authenticator `A`;
/// unset values fall back to the configuration defaults.
pub struct AuthenticatorOptions<A> {
    realm: Option<String>,
    unauthorized_reason_phrase: Option<String>,
    _authenticator: PhantomData<fn() -> A>,
}

impl<A> AuthenticatorOptions<A> {
    /// Options with nothing overridden.
    pub fn new() -> Self {
        Self {
            realm: None,
            unauthorized_reason_phrase: None,
            _authenticator: PhantomData,
        }
    }

    /// Sets the realm of the challenge.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Sets the reason phrase of 401 responses.
    pub fn unauthorized_reason_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.unauthorized_reason_phrase = Some(phrase.into());
        self
    }
}

impl<A> Default for AuthenticatorOptions<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for AuthenticatorOptions<A> {
    fn clone(&self) -> Self {
        Self {
            realm: self.realm.clone(),
            unauthorized_reason_phrase: self.unauthorized_reason_phrase.clone(),
            _authenticator: PhantomData,
        }
    }
}

impl<A> fmt::Debug for AuthenticatorOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorOptions")
            .field("realm", &self.realm)
            .field("unauthorized_reason_phrase", &self.unauthorized_reason_phrase)
            .finish()
    }
}

/// `Basic` scheme authenticator.
///
/// Requires a [`BasicCredentialValidator`] in the container. Malformed
/// credentials fail authentication without reaching the validator.
pub struct BasicAuthenticator {
    validator: Arc<dyn BasicCredentialValidator>,
    options: Option<Arc<AuthenticatorOptions<BasicAuthenticator>>>,
}

impl Resolve for BasicAuthenticator {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            validator: container.resolve::<dyn BasicCredentialValidator>()?,
            options: container.try_resolve::<AuthenticatorOptions<Self>>(),
        })
    }
}

impl Authenticator for BasicAuthenticator {
    fn scheme(&self) -> &str {
        "Basic"
    }

    fn realm(&self) -> Option<&str> {
        self.options.as_ref()?.realm.as_deref()
    }

    fn unauthorized_reason_phrase(&self) -> Option<&str> {
        self.options.as_ref()?.unauthorized_reason_phrase.as_deref()
    }

    fn authenticate<'a>(&'a self, credentials: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match BasicCredentials::parse(credentials) {
                Some(credentials) => self.validator.validate(&credentials).await,
                None => false,
            }
        })
    }
}

/// `Bearer` scheme authenticator.
///
/// Requires a [`BearerTokenValidator`] in the container. An empty token
/// fails authentication without reaching the validator.
pub struct BearerTokenAuthenticator {
    validator: Arc<dyn BearerTokenValidator>,
    options: Option<Arc<AuthenticatorOptions<BearerTokenAuthenticator>>>,
}

impl Resolve for BearerTokenAuthenticator {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            validator: container.resolve::<dyn BearerTokenValidator>()?,
            options: container.try_resolve::<AuthenticatorOptions<Self>>(),
        })
    }
}

impl Authenticator for BearerTokenAuthenticator {
    fn scheme(&self) -> &str {
        "Bearer"
    }

    fn realm(&self) -> Option<&str> {
        self.options.as_ref()?.realm.as_deref()
    }

    fn unauthorized_reason_phrase(&self) -> Option<&str> {
        self.options.as_ref()?.unauthorized_reason_phrase.as_deref()
    }

    fn authenticate<'a>(&'a self, credentials: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let token = credentials.trim();
            !token.is_empty() && self.validator.validate(token).await
        })
    }
}
