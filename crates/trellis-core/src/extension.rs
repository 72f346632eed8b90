//! Extension points of the request pipeline.
//!
//! Each trait here is configured as a [`ConditionalPlugins`](crate::plugin::ConditionalPlugins)
//! collection on the [`Configuration`](crate::configuration::Configuration)
//! and resolved per request from the request scope. Implementations pull
//! their collaborators from the scope through [`Resolve`](crate::container::Resolve).
//!
//! # Example
//!
//! ```rust
//! use trellis_core::container::{Container, Resolve};
//! use trellis_core::{Behavior, BehaviorChain, BoxFuture, Response, TrellisResult};
//! use tracing::debug;
//!
//! struct Logging;
//!
//! impl Resolve for Logging {
//!     fn resolve(_: &Container) -> TrellisResult<Self> {
//!         Ok(Self)
//!     }
//! }
//!
//! impl Behavior for Logging {
//!     fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
//!         Box::pin(async move {
//!             let response = chain.invoke_next().await?;
//!             debug!(status = %response.status(), "action completed");
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::HeaderMap;
use mime::Mime;
use serde_json::Value;

use crate::action::ActionArguments;
use crate::cancellation::RequestCancellation;
use crate::descriptor::{ActionConfigurationContext, ActionDescriptor, Registry};
use crate::error::{TrellisError, TrellisResult};
use crate::message::{RequestMessage, Response};
use crate::plugin::Implements;
use crate::route::{ParameterDescriptor, QuerystringParameters, UrlParameters};

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A cross-cutting step of the behavior chain.
///
/// A behavior either calls [`BehaviorChain::invoke_next`] to continue, or
/// returns its own response to short-circuit everything after it.
pub trait Behavior: Send + Sync + 'static {
    /// Whether the behavior participates in the current request.
    ///
    /// Evaluated right after construction; behaviors returning `false` are
    /// skipped without being invoked.
    fn should_run(&self) -> bool {
        true
    }

    /// Runs the behavior.
    fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>>;
}

/// The remaining behaviors of the current request.
pub trait BehaviorChain: Send + Sync {
    /// Constructs and runs the next applicable behavior, or the action's
    /// default behavior once none are left.
    fn invoke_next(&self) -> BoxFuture<'_, TrellisResult<Response>>;
}

/// Validates credentials for one `Authorization` scheme.
pub trait Authenticator: Send + Sync + 'static {
    /// The scheme, matched case-insensitively (e.g. `Basic`).
    fn scheme(&self) -> &str;

    /// Realm advertised in the challenge; falls back to the configured default.
    fn realm(&self) -> Option<&str> {
        None
    }

    /// Reason phrase of the 401 response; falls back to the configured default.
    fn unauthorized_reason_phrase(&self) -> Option<&str> {
        None
    }

    /// Whether the authenticator takes part in the current request.
    fn applies(&self) -> bool {
        true
    }

    /// Validates the credentials that follow the scheme in the header.
    fn authenticate<'a>(&'a self, credentials: &'a str) -> BoxFuture<'a, bool>;
}

/// Outcome of reading a request body.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult<T> {
    /// The body was read.
    Success(T),
    /// The body could not be read; the message becomes a bad request.
    Failure(String),
}

/// Outcome of binding request values to action arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapResult<T = ()> {
    /// The values were bound.
    Success(T),
    /// The values could not be bound; the message becomes a bad request.
    Failure(String),
}

macro_rules! impl_into_result {
    ($($ty:ident),+) => {$(
        impl<T> $ty<T> {
            /// Converts into a result, failures becoming bad requests.
            pub fn into_result(self) -> TrellisResult<T> {
                match self {
                    Self::Success(value) => Ok(value),
                    Self::Failure(message) => Err(TrellisError::bad_request(message)),
                }
            }

            /// Returns `true` for `Success`.
            pub const fn is_success(&self) -> bool {
                matches!(self, Self::Success(_))
            }
        }
    )+};
}

impl_into_result!(ReadResult, MapResult);

/// What a request reader is asked to read.
#[derive(Debug, Clone)]
pub struct ReaderContext {
    /// The inbound request.
    pub request: Arc<RequestMessage>,
    /// The executing action.
    pub action: Arc<ActionDescriptor>,
    /// The body parameter being read.
    pub parameter: ParameterDescriptor,
    /// The parsed `Content-Type`, if any.
    pub content_type: Option<Mime>,
    /// Cancellation signal of the request.
    pub cancellation: RequestCancellation,
}

/// Deserializes the request body.
pub trait RequestReader: Send + Sync + 'static {
    /// Whether the reader can read this request.
    fn applies(&self, context: &ReaderContext) -> bool;

    /// Reads the body.
    fn read<'a>(&'a self, context: &'a ReaderContext) -> BoxFuture<'a, TrellisResult<ReadResult<Value>>>;
}

/// Where request binders get their values from.
#[derive(Debug, Clone)]
pub struct BinderContext {
    /// The inbound request.
    pub request: Arc<RequestMessage>,
    /// The executing action.
    pub action: Arc<ActionDescriptor>,
    /// Values matched from the path.
    pub url_parameters: Arc<UrlParameters>,
    /// Values from the querystring.
    pub querystring: Arc<QuerystringParameters>,
    /// Cancellation signal of the request.
    pub cancellation: RequestCancellation,
}

/// Populates action arguments from one part of the request.
pub trait RequestBinder: Send + Sync + 'static {
    /// Whether the binder has anything to bind for this action.
    fn applies(&self, context: &BinderContext) -> bool;

    /// Binds values into `arguments`.
    fn bind<'a>(
        &'a self,
        context: &'a BinderContext,
        arguments: &'a mut ActionArguments,
    ) -> BoxFuture<'a, TrellisResult<MapResult>>;
}

/// What a response writer is asked to write.
#[derive(Debug, Clone)]
pub struct WriterContext {
    /// The inbound request.
    pub request: Arc<RequestMessage>,
    /// The executing action.
    pub action: Arc<ActionDescriptor>,
    /// The value returned by the handler.
    pub value: Value,
    /// Cancellation signal of the request.
    pub cancellation: RequestCancellation,
}

/// Serializes the handler result into the response body.
pub trait ResponseWriter: Send + Sync + 'static {
    /// The media type produced, matched against `Accept`.
    fn media_type(&self) -> &Mime;

    /// Tie breaker between equally acceptable writers; higher wins.
    fn weight(&self) -> i32 {
        0
    }

    /// Whether the writer can write this value.
    fn applies(&self, _context: &WriterContext) -> bool {
        true
    }

    /// Writes the body and its `Content-Type`.
    fn write<'a>(
        &'a self,
        context: &'a WriterContext,
        response: &'a mut Response,
    ) -> BoxFuture<'a, TrellisResult<()>>;
}

/// Input of status and header plugins.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// The inbound request.
    pub request: Arc<RequestMessage>,
    /// The executing action.
    pub action: Arc<ActionDescriptor>,
    /// Whether the handler produced a body.
    pub has_body: bool,
}

/// Chooses the status code of a successful response.
pub trait ResponseStatus: Send + Sync + 'static {
    /// Whether the plugin wants to set the status.
    fn applies(&self, _context: &ResponseContext) -> bool {
        true
    }

    /// Sets the status (and optionally a reason phrase).
    fn set_status(&self, context: &ResponseContext, response: &mut Response);
}

/// Adds headers to a successful response.
pub trait ResponseHeaders: Send + Sync + 'static {
    /// Whether the plugin wants to add headers.
    fn applies(&self, _context: &ResponseContext) -> bool {
        true
    }

    /// The headers to append.
    fn headers(&self, context: &ResponseContext) -> HeaderMap;
}

/// Adjusts an action at startup.
///
/// Decorators run once while the action descriptor is built and may add
/// registrations to the action's request scopes.
pub trait ActionDecorator: Send + Sync + 'static {
    /// Decorates the action described by `context`.
    fn decorate(&self, context: &ActionConfigurationContext, registry: &mut Registry);
}

macro_rules! extension_point {
    ($($point:ident),+ $(,)?) => {$(
        impl<P: $point> Implements<dyn $point> for P {
            fn upcast(self: Arc<Self>) -> Arc<dyn $point> {
                self
            }
        }
    )+};
}

extension_point!(
    Behavior,
    Authenticator,
    RequestReader,
    RequestBinder,
    ResponseWriter,
    ResponseStatus,
    ResponseHeaders,
    ActionDecorator,
);
