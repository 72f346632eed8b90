//! # Trellis Core
//!
//! Core types and traits of the Trellis action pipeline.
//!
//! - [`Container`] - Scoped dependency container
//! - [`ConditionalPlugins`] - Ordered, predicate-filtered plugin registrations
//! - [`ActionMethod`] / [`RouteDescriptor`] - What an action is and how it is reached
//! - [`ActionDescriptor`] - An action with its plugins evaluated at startup
//! - [`Behavior`] / [`BehaviorChain`] - Cross-cutting steps around a handler
//! - [`TrellisError`] - Standard error type

#![doc(html_root_url = "https://docs.rs/trellis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod action;
pub mod cancellation;
pub mod configuration;
pub mod container;
pub mod descriptor;
mod error;
pub mod extension;
pub mod message;
pub mod metrics;
pub mod negotiation;
pub mod plugin;
pub mod route;

pub use action::{ActionArguments, ActionHandler, ActionInvocation, ActionMethod};
pub use cancellation::RequestCancellation;
pub use configuration::{Configuration, UnhandledErrorMode};
pub use container::{Container, InjectionError, Lifetime, Resolve};
pub use descriptor::{ActionConfigurationContext, ActionDescriptor, ActionDescriptorFactory, Registry};
pub use error::{ErrorCategory, TrellisError, TrellisResult, UnhandledError};
pub use extension::{
    ActionDecorator, Authenticator, Behavior, BehaviorChain, BinderContext, BoxFuture, MapResult,
    ReadResult, ReaderContext, RequestBinder, RequestReader, ResponseContext, ResponseHeaders,
    ResponseStatus, ResponseWriter, WriterContext,
};
pub use message::{
    ReasonPhrase, Request, RequestMessage, Response, ResponseExt, ResponseHeaderCollection,
    ResponseMessage,
};
pub use metrics::{ActionMetrics, Metrics};
pub use plugin::{ConditionalPlugin, ConditionalPlugins, Implements, Plugin, PluginType};
pub use route::{
    ParameterDescriptor, ParameterType, QuerystringParameters, RouteDescriptor, UrlParameters,
    UrlTemplate,
};
