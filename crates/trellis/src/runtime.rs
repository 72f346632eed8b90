//! Startup and request dispatch.
//!
//! ```text
//! Trellis::builder()
//!     .configure(..) / .with_settings(..) / .register(..) / .action(..)
//!     .build()  ──►  Runtime { descriptors, invoker }
//!
//! Runtime::handle(request)
//!     route ──► 404 / 405
//!       │
//!       ▼
//!     BehaviorChainInvoker ──► Ok(response)
//!       │
//!       ▼ Err
//!     outermost catch: 400 for bad requests, 500 or propagate for the rest
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};
use tracing::{debug, info};
use trellis_behaviors::debug::internal_error_response;
use trellis_behaviors::BehaviorChainInvoker;
use trellis_config::TrellisConfig;
use trellis_core::{
    ActionDescriptor, ActionDescriptorFactory, ActionMethod, Configuration, Container, Metrics,
    Request, RequestCancellation, RequestMessage, Response, ResponseExt, RouteDescriptor,
    TrellisError, TrellisResult, UnhandledErrorMode,
};

use crate::defaults::default_configuration;

/// Entry point for building a [`Runtime`].
#[derive(Debug, Clone, Copy)]
pub struct Trellis;

impl Trellis {
    /// Starts from [`default_configuration`] and an empty root container.
    #[must_use]
    pub fn builder() -> TrellisBuilder {
        TrellisBuilder::new()
    }
}

/// Collects configuration, services and actions.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use trellis::{ActionMethod, RouteDescriptor, Trellis};
///
/// let runtime = Trellis::builder()
///     .action(
///         ActionMethod::new("Health", "get", |_| async { Ok(None) }).allow_anonymous(),
///         RouteDescriptor::new(Method::GET, "/health").unwrap(),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(runtime.actions().len(), 1);
/// ```
pub struct TrellisBuilder {
    configuration: Configuration,
    container: Container,
    actions: Vec<(ActionMethod, RouteDescriptor)>,
}

impl Default for TrellisBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrellisBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            configuration: default_configuration(),
            container: Container::new(),
            actions: Vec::new(),
        }
    }

    /// Replaces the configuration wholesale.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Mutates the configuration, e.g. to add authenticators or swap plugins.
    #[must_use]
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut Configuration),
    {
        configure(&mut self.configuration);
        self
    }

    /// Applies loaded settings on top of the current configuration.
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::Configuration` if the settings are invalid.
    pub fn with_settings(mut self, settings: &TrellisConfig) -> TrellisResult<Self> {
        settings
            .validate()
            .and_then(|()| settings.apply_to(&mut self.configuration))
            .map_err(|e| TrellisError::configuration(e.to_string()))?;
        Ok(self)
    }

    /// Registers services in the root container.
    #[must_use]
    pub fn register<F>(self, register: F) -> Self
    where
        F: FnOnce(&Container),
    {
        register(&self.container);
        self
    }

    /// Adds an action served at `route`.
    #[must_use]
    pub fn action(mut self, action: ActionMethod, route: RouteDescriptor) -> Self {
        self.actions.push((action, route));
        self
    }

    /// Resolves every action against the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TrellisError::Configuration` if no default behavior is
    /// configured, two actions share a method and route template, or an
    /// action decorator fails.
    pub fn build(self) -> TrellisResult<Runtime> {
        let mut seen = HashSet::new();
        for (action, route) in &self.actions {
            let key = (route.method().clone(), route.url_template().as_str().to_string());
            if !seen.insert(key) {
                return Err(TrellisError::configuration(format!(
                    "route {route} of {} is already served by another action",
                    action.full_name()
                )));
            }
        }

        let configuration = Arc::new(self.configuration);
        let invoker = BehaviorChainInvoker::new(self.container.clone(), configuration.clone());
        let actions = ActionDescriptorFactory::new(configuration, self.container.clone())
            .create_all(self.actions)?;

        info!(actions = actions.len(), "trellis runtime built");
        Ok(Runtime {
            actions: actions.into(),
            container: self.container,
            invoker,
        })
    }
}

impl fmt::Debug for TrellisBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrellisBuilder")
            .field("configuration", &self.configuration)
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

enum RouteMatch<'a> {
    Found(&'a Arc<ActionDescriptor>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// A built pipeline: immutable action descriptors plus the invoker.
///
/// Cheap to clone; clones share descriptors, container and metrics.
#[derive(Clone)]
pub struct Runtime {
    actions: Arc<[Arc<ActionDescriptor>]>,
    container: Container,
    invoker: BehaviorChainInvoker,
}

impl Runtime {
    /// The action descriptors, in registration order.
    pub fn actions(&self) -> &[Arc<ActionDescriptor>] {
        &self.actions
    }

    /// The configuration the descriptors were built from.
    pub fn configuration(&self) -> &Arc<Configuration> {
        self.invoker.configuration()
    }

    /// The root container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Process-wide request counters.
    pub fn metrics(&self) -> &Arc<Metrics> {
        self.invoker.metrics()
    }

    /// The action serving `method` on `path`, if any.
    pub fn find_action(&self, method: &Method, path: &str) -> Option<&Arc<ActionDescriptor>> {
        match self.route(method, path) {
            RouteMatch::Found(action) => Some(action),
            _ => None,
        }
    }

    /// Runs `request` through the chain of `action`, without routing or the
    /// outermost catch.
    pub async fn invoke(
        &self,
        action: Arc<ActionDescriptor>,
        request: Request,
        cancellation: RequestCancellation,
    ) -> TrellisResult<Response> {
        self.invoker.invoke(action, request, cancellation).await
    }

    /// Routes and runs `request`.
    pub async fn handle(&self, request: Request) -> TrellisResult<Response> {
        self.handle_with_cancellation(request, RequestCancellation::none())
            .await
    }

    /// Routes and runs `request`, observing `cancellation`.
    ///
    /// Returns `Err` for cancelled requests, and for unhandled errors when
    /// the configuration says to propagate them.
    pub async fn handle_with_cancellation(
        &self,
        request: Request,
        cancellation: RequestCancellation,
    ) -> TrellisResult<Response> {
        let request = Arc::new(RequestMessage::from_request(request).await);

        let action = match self.route(request.method(), request.path()) {
            RouteMatch::Found(action) => action.clone(),
            RouteMatch::MethodNotAllowed(allowed) => {
                debug!(method = %request.method(), path = %request.path(), "method not allowed");
                return Ok(method_not_allowed(&allowed));
            }
            RouteMatch::NotFound => {
                debug!(method = %request.method(), path = %request.path(), "no route");
                return Ok(Response::with_status(StatusCode::NOT_FOUND));
            }
        };

        match self
            .invoker
            .invoke_message(action, request.clone(), cancellation)
            .await
        {
            Ok(response) => Ok(response),
            Err(error) if error.is_bad_request() => {
                let mut response = Response::with_status(StatusCode::BAD_REQUEST);
                response.set_reason_phrase(error.to_string());
                Ok(response)
            }
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => match self.configuration().unhandled_errors {
                UnhandledErrorMode::Respond => Ok(internal_error_response(
                    self.configuration(),
                    &request,
                    &error,
                )),
                UnhandledErrorMode::Propagate => Err(error),
            },
        }
    }

    fn route(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let mut allowed = Vec::new();
        for action in self.actions.iter() {
            let route = action.route();
            if route.url_template().match_path(path).is_none() {
                continue;
            }
            if route.method() == method {
                return RouteMatch::Found(action);
            }
            allowed.push(route.method().clone());
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed(allowed)
        }
    }
}

fn method_not_allowed(allowed: &[Method]) -> Response {
    let mut response = Response::with_status(StatusCode::METHOD_NOT_ALLOWED);
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("actions", &self.actions.len())
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}
