//! # Trellis
//!
//! An extensible HTTP request pipeline. Actions are plain async functions
//! described by an [`ActionMethod`] and a [`RouteDescriptor`]; every
//! request runs through an ordered chain of behaviors whose membership is
//! decided per action by conditional plugin collections.
//!
//! - **Conditional plugins** – behaviors, authenticators, readers, binders
//!   and writers are ordered lists with per-action activation predicates
//! - **Scoped injection** – each request gets a child container holding the
//!   request, response, cancellation and route data, disposed on completion
//! - **Built-in behaviors** – error handling (400/500), authentication with
//!   `WWW-Authenticate` challenges, binding and content negotiation
//! - **Observability** – `tracing` spans per request, lock-free counters and
//!   Prometheus metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//! use http::Method;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConfigLoader::new()
//!         .with_production()
//!         .with_optional_file("trellis.toml")?
//!         .with_env_prefix("TRELLIS")
//!         .load()?;
//!     init_telemetry(&settings.telemetry())?;
//!
//!     let runtime = Trellis::builder()
//!         .with_settings(&settings)?
//!         .action(
//!             ActionMethod::new("Users", "get", |invocation: ActionInvocation| async move {
//!                 let id: i64 = invocation.arguments.get("id")?;
//!                 Ok(Some(json!({ "id": id })))
//!             })
//!             .allow_anonymous(),
//!             RouteDescriptor::new(Method::GET, "/users/{id}")?
//!                 .url_parameter("id", ParameterType::Integer),
//!         )
//!         .build()?;
//!
//!     // hand `runtime.handle(request)` to your HTTP server
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! Request → ErrorHandling → Authentication → DefaultBehavior
//!                                               │ bind → handler → write
//! Response ←────────────────────────────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/trellis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod defaults;
mod runtime;

pub use defaults::default_configuration;
pub use runtime::{Runtime, Trellis, TrellisBuilder};

pub use trellis_behaviors as behaviors;
pub use trellis_config as config;
pub use trellis_core as core;
pub use trellis_extract as extract;
pub use trellis_telemetry as telemetry;

pub use trellis_core::{
    ActionInvocation, ActionMethod, Configuration, Container, ParameterDescriptor, ParameterType,
    RouteDescriptor, TrellisError, TrellisResult,
};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{default_configuration, Runtime, Trellis, TrellisBuilder};

    pub use trellis_core::{
        ActionArguments, ActionInvocation, ActionMethod, Authenticator, Behavior, BehaviorChain,
        BoxFuture, Configuration, Container, Lifetime, ParameterDescriptor, ParameterType,
        Plugin, Request, RequestCancellation, RequestMessage, Resolve, Response, ResponseExt,
        RouteDescriptor, TrellisError, TrellisResult, UnhandledErrorMode,
    };

    pub use trellis_behaviors::{
        AuthenticationBehavior, AuthenticatorOptions, BasicAuthenticator,
        BasicCredentialValidator, BasicCredentials, BearerTokenAuthenticator,
        BearerTokenValidator, DefaultBehavior, ErrorHandlingBehavior,
    };

    pub use trellis_config::{ConfigLoader, TrellisConfig};
    pub use trellis_telemetry::{init_telemetry, TelemetryConfig};
}
