//! Authentication behavior.
//!
//! Matches the scheme of the `Authorization` header against the action's
//! applicable authenticators. A request passes when the matching
//! authenticator accepts the credentials; anything else is answered with
//! `401 Unauthorized` and one `WWW-Authenticate` challenge per applicable
//! authenticator, in configured order:
//!
//! ```text
//! HTTP/1.1 401 Unauthorized
//! www-authenticate: Basic realm="admin"
//! www-authenticate: Bearer
//! ```
//!
//! The behavior is skipped for actions without authenticators, unless
//! `fail_if_no_authenticators_apply` is set, in which case a request that no
//! authenticator applies to is a configuration error.

use std::sync::Arc;

use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use tracing::{debug, warn};
use trellis_core::plugin::resolve_all;
use trellis_core::{
    ActionDescriptor, Authenticator, Behavior, BehaviorChain, BoxFuture, Configuration, Container,
    RequestMessage, Resolve, Response, ResponseExt, TrellisError, TrellisResult,
};

/// Guards actions with the configured authenticators.
pub struct AuthenticationBehavior {
    scope: Container,
    action: Arc<ActionDescriptor>,
    request: Arc<RequestMessage>,
    configuration: Arc<Configuration>,
}

impl Resolve for AuthenticationBehavior {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            scope: container.clone(),
            action: container.resolve::<ActionDescriptor>()?,
            request: container.resolve::<RequestMessage>()?,
            configuration: container.resolve::<Configuration>()?,
        })
    }
}

impl AuthenticationBehavior {
    fn challenge(&self, authenticator: &dyn Authenticator) -> Option<HeaderValue> {
        let realm = authenticator
            .realm()
            .or(self.configuration.default_authentication_realm.as_deref())
            .filter(|realm| !realm.is_empty());

        let challenge = match realm {
            Some(realm) => format!("{} realm=\"{realm}\"", authenticator.scheme()),
            None => authenticator.scheme().to_string(),
        };
        match HeaderValue::from_str(&challenge) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(scheme = authenticator.scheme(), "invalid authentication challenge skipped");
                None
            }
        }
    }

    fn unauthorized(
        &self,
        authenticators: &[Arc<dyn Authenticator>],
        failed: Option<&dyn Authenticator>,
    ) -> Response {
        let mut response = Response::with_status(StatusCode::UNAUTHORIZED);
        let phrase = failed
            .and_then(|authenticator| authenticator.unauthorized_reason_phrase())
            .unwrap_or(self.configuration.default_unauthorized_reason_phrase.as_str())
            .to_string();
        response.set_reason_phrase(phrase);

        for authenticator in authenticators {
            if let Some(challenge) = self.challenge(authenticator.as_ref()) {
                response.headers_mut().append(WWW_AUTHENTICATE, challenge);
            }
        }
        response
    }
}

impl Behavior for AuthenticationBehavior {
    fn should_run(&self) -> bool {
        !self.action.authenticators().is_empty()
            || self.configuration.fail_if_no_authenticators_apply
    }

    fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
        Box::pin(async move {
            let authenticators: Vec<_> = resolve_all(self.action.authenticators(), &self.scope)?
                .into_iter()
                .filter(|authenticator| authenticator.applies())
                .collect();

            if authenticators.is_empty() {
                if self.configuration.fail_if_no_authenticators_apply {
                    return Err(TrellisError::configuration(format!(
                        "no authenticators apply to {}",
                        self.action.action().full_name()
                    )));
                }
                return chain.invoke_next().await;
            }

            let Some((scheme, credentials)) = self
                .request
                .header(AUTHORIZATION)
                .and_then(|value| value.trim().split_once(' '))
            else {
                debug!("missing or malformed authorization header");
                return Ok(self.unauthorized(&authenticators, None));
            };

            let Some(authenticator) = authenticators
                .iter()
                .find(|authenticator| authenticator.scheme().eq_ignore_ascii_case(scheme))
            else {
                debug!(scheme, "no authenticator for scheme");
                return Ok(self.unauthorized(&authenticators, None));
            };

            if authenticator.authenticate(credentials.trim()).await {
                debug!(scheme, "request authenticated");
                return chain.invoke_next().await;
            }

            debug!(scheme, "credentials rejected");
            Ok(self.unauthorized(&authenticators, Some(authenticator.as_ref())))
        })
    }
}
