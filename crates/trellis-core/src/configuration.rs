//! Runtime configuration of the pipeline.
//!
//! [`Configuration`] holds one [`ConditionalPlugins`] collection per
//! extension point plus the policy knobs used by the default behaviors. It
//! is mutated during startup and shared read-only afterwards.

use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::extension::{
    ActionDecorator, Authenticator, Behavior, RequestBinder, RequestReader, ResponseHeaders,
    ResponseStatus, ResponseWriter,
};
use crate::message::RequestMessage;
use crate::plugin::{ConditionalPlugins, Plugin};

/// Default reason phrase of 401 responses.
pub const DEFAULT_UNAUTHORIZED_REASON_PHRASE: &str = "Unauthorized";

/// Default reason phrase of 500 responses.
pub const DEFAULT_ERROR_REASON_PHRASE: &str = "There was a problem processing your request.";

/// What the outermost catch does with errors that escaped the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledErrorMode {
    /// Answer with a 500 response.
    #[default]
    Respond,
    /// Return the error to the host.
    Propagate,
}

/// Predicate deciding whether error responses include diagnostics.
pub type ErrorDetailsPredicate = Arc<dyn Fn(&RequestMessage) -> bool + Send + Sync>;

/// Pipeline configuration.
pub struct Configuration {
    /// Behaviors, outermost first.
    pub behaviors: ConditionalPlugins<dyn Behavior>,
    /// Terminal behavior that runs the handler.
    pub default_behavior: Option<Plugin<dyn Behavior>>,
    /// Authenticators for the authentication behavior.
    pub authenticators: ConditionalPlugins<dyn Authenticator>,
    /// Request body readers.
    pub request_readers: ConditionalPlugins<dyn RequestReader>,
    /// Request binders, run in order.
    pub request_binders: ConditionalPlugins<dyn RequestBinder>,
    /// Response writers; order breaks ties in content negotiation.
    pub response_writers: ConditionalPlugins<dyn ResponseWriter>,
    /// Response status plugins.
    pub response_status: ConditionalPlugins<dyn ResponseStatus>,
    /// Response header plugins.
    pub response_headers: ConditionalPlugins<dyn ResponseHeaders>,
    /// Startup-time action decorators.
    pub action_decorators: ConditionalPlugins<dyn ActionDecorator>,
    /// Fail with a configuration error when authentication runs without
    /// any applicable authenticator.
    pub fail_if_no_authenticators_apply: bool,
    /// Reason phrase of 401 responses.
    pub default_unauthorized_reason_phrase: String,
    /// Realm advertised by authenticators without one.
    pub default_authentication_realm: Option<String>,
    /// Reason phrase of 500 responses.
    pub default_error_reason_phrase: String,
    /// Headers added to every successful response.
    pub default_response_headers: HeaderMap,
    /// What the outermost catch does with unhandled errors.
    pub unhandled_errors: UnhandledErrorMode,
    error_details: ErrorDetailsPredicate,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    /// An empty configuration: no plugins, no default behavior.
    pub fn new() -> Self {
        Self {
            behaviors: ConditionalPlugins::new(),
            default_behavior: None,
            authenticators: ConditionalPlugins::new(),
            request_readers: ConditionalPlugins::new(),
            request_binders: ConditionalPlugins::new(),
            response_writers: ConditionalPlugins::new(),
            response_status: ConditionalPlugins::new(),
            response_headers: ConditionalPlugins::new(),
            action_decorators: ConditionalPlugins::new(),
            fail_if_no_authenticators_apply: false,
            default_unauthorized_reason_phrase: DEFAULT_UNAUTHORIZED_REASON_PHRASE.to_string(),
            default_authentication_realm: None,
            default_error_reason_phrase: DEFAULT_ERROR_REASON_PHRASE.to_string(),
            default_response_headers: HeaderMap::new(),
            unhandled_errors: UnhandledErrorMode::Respond,
            error_details: Arc::new(|_: &RequestMessage| false),
        }
    }

    /// Always or never include diagnostics in error responses.
    pub fn show_error_details(&mut self, show: bool) -> &mut Self {
        self.error_details = Arc::new(move |_: &RequestMessage| show);
        self
    }

    /// Include diagnostics when `predicate` holds for the request.
    pub fn show_error_details_when<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&RequestMessage) -> bool + Send + Sync + 'static,
    {
        self.error_details = Arc::new(predicate);
        self
    }

    /// Whether error responses to `request` include diagnostics.
    pub fn should_show_error_details(&self, request: &RequestMessage) -> bool {
        (self.error_details)(request)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("behaviors", &self.behaviors)
            .field("default_behavior", &self.default_behavior)
            .field("authenticators", &self.authenticators)
            .field("request_readers", &self.request_readers)
            .field("request_binders", &self.request_binders)
            .field("response_writers", &self.response_writers)
            .field("response_status", &self.response_status)
            .field("response_headers", &self.response_headers)
            .field("action_decorators", &self.action_decorators)
            .field(
                "fail_if_no_authenticators_apply",
                &self.fail_if_no_authenticators_apply,
            )
            .field("unhandled_errors", &self.unhandled_errors)
            .finish_non_exhaustive()
    }
}
