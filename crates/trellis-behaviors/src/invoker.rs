//! The behavior chain invoker.
//!
//! Runs one request through the behavior chain of an action:
//!
//! ```text
//! Request ─► child scope ─► register request services ─► action registry
//!                                                              │
//!              dispose scope ◄── record metrics ◄── chain.invoke_next()
//! ```
//!
//! Services registered in every request scope:
//!
//! | Service | Contents |
//! |---------|----------|
//! | [`RequestMessage`] | the buffered request |
//! | [`ResponseMessage`] | the pre-allocated response |
//! | [`ResponseHeaderCollection`] | headers appended to the final response |
//! | [`RequestCancellation`] | the request's cancellation signal |
//! | [`ActionDescriptor`], [`ActionMethod`], [`RouteDescriptor`] | the executing action |
//! | [`UrlParameters`], [`QuerystringParameters`] | parsed path and querystring values |
//!
//! The scope is disposed when the request completes, whether it succeeded,
//! failed or the future was dropped.
//!
//! Bad requests and cancellations pass through unchanged. Every other error
//! is counted and wrapped once in [`TrellisError::Unhandled`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info_span, Instrument};
use trellis_core::metrics::{record_request, record_unhandled_error};
use trellis_core::{
    ActionDescriptor, BehaviorChain, Configuration, Container, Lifetime, Metrics,
    QuerystringParameters, Request, RequestCancellation, RequestMessage, Response,
    ResponseHeaderCollection, ResponseMessage, TrellisError, TrellisResult,
};
use uuid::Uuid;

use crate::chain::DefaultBehaviorChain;

/// Disposes the request scope when dropped.
struct ScopeGuard(Container);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// Invokes the behavior chain of actions for incoming requests.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example(action: std::sync::Arc<trellis_core::ActionDescriptor>, request: trellis_core::Request) {
/// use std::sync::Arc;
/// use trellis_behaviors::BehaviorChainInvoker;
/// use trellis_core::{Configuration, Container, RequestCancellation};
///
/// let invoker = BehaviorChainInvoker::new(Container::new(), Arc::new(Configuration::new()));
/// let response = invoker.invoke(action, request, RequestCancellation::none()).await;
/// # }
/// ```
#[derive(Clone)]
pub struct BehaviorChainInvoker {
    container: Container,
    configuration: Arc<Configuration>,
    metrics: Arc<Metrics>,
}

impl BehaviorChainInvoker {
    /// Creates an invoker over `container`.
    ///
    /// Registers the default behavior chain, the configuration and the
    /// process counters unless the container already provides them.
    pub fn new(container: Container, configuration: Arc<Configuration>) -> Self {
        if !container.contains::<dyn BehaviorChain>() {
            container.register_implementation::<dyn BehaviorChain, DefaultBehaviorChain>(
                Lifetime::Transient,
            );
        }
        if !container.contains::<Configuration>() {
            container.register_instance(configuration.clone());
        }
        let metrics = container.try_resolve::<Metrics>().unwrap_or_else(|| {
            let metrics = Arc::new(Metrics::new());
            container.register_instance(metrics.clone());
            metrics
        });

        Self {
            container,
            configuration,
            metrics,
        }
    }

    /// The process-wide request counters.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The configuration the invoker was created with.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Buffers `request` and runs it through the chain of `action`.
    pub async fn invoke(
        &self,
        action: Arc<ActionDescriptor>,
        request: Request,
        cancellation: RequestCancellation,
    ) -> TrellisResult<Response> {
        let message = RequestMessage::from_request(request).await;
        self.invoke_message(action, Arc::new(message), cancellation)
            .await
    }

    /// Runs an already buffered request through the chain of `action`.
    pub async fn invoke_message(
        &self,
        action: Arc<ActionDescriptor>,
        request: Arc<RequestMessage>,
        cancellation: RequestCancellation,
    ) -> TrellisResult<Response> {
        let span = info_span!(
            "request",
            request_id = %Uuid::now_v7(),
            method = %request.method(),
            path = %request.path(),
            action = %action.action().full_name(),
        );
        self.run(action, request, cancellation)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        action: Arc<ActionDescriptor>,
        request: Arc<RequestMessage>,
        cancellation: RequestCancellation,
    ) -> TrellisResult<Response> {
        let start = Instant::now();
        self.metrics.increment_total_requests();

        let scope = self.container.create_child();
        let _guard = ScopeGuard(scope.clone());
        let headers = Arc::new(ResponseHeaderCollection::new());
        self.register_request_services(&scope, &action, &request, &headers, cancellation);
        action.registry().apply_to(&scope);

        let result = match scope.resolve::<dyn BehaviorChain>() {
            Ok(chain) => chain.invoke_next().await,
            Err(error) => Err(error),
        };

        let elapsed = start.elapsed();
        action.metrics().record(elapsed);
        let name = action.action().full_name();

        match result {
            Ok(mut response) => {
                headers.apply_to(&mut response);
                record_request(&name, response.status().as_u16(), elapsed);
                debug!(
                    status = %response.status(),
                    duration_ms = %elapsed.as_millis(),
                    "request completed"
                );
                Ok(response)
            }
            Err(error) if error.is_bad_request() || error.is_cancelled() => {
                debug!(error = %error, "request ended without a response");
                Err(error)
            }
            Err(error) => {
                self.metrics.increment_unhandled_errors();
                record_unhandled_error(&name);
                error!(error = %error, duration_ms = %elapsed.as_millis(), "unhandled error");
                Err(TrellisError::unhandled(action.clone(), scope.clone(), error))
            }
        }
    }

    fn register_request_services(
        &self,
        scope: &Container,
        action: &Arc<ActionDescriptor>,
        request: &Arc<RequestMessage>,
        headers: &Arc<ResponseHeaderCollection>,
        cancellation: RequestCancellation,
    ) {
        let route = action.route();
        let url_parameters = route
            .url_template()
            .match_path(request.path())
            .unwrap_or_default();
        let querystring = request
            .query()
            .map(QuerystringParameters::parse)
            .unwrap_or_default();

        scope.register_instance(request.clone());
        scope.register_instance(Arc::new(ResponseMessage::new()));
        scope.register_instance(headers.clone());
        scope.register_instance(Arc::new(cancellation));
        scope.register_instance(action.clone());
        scope.register_instance(action.action().clone());
        scope.register_instance(route.clone());
        scope.register_instance(Arc::new(url_parameters));
        scope.register_instance(Arc::new(querystring));
    }
}

impl std::fmt::Debug for BehaviorChainInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorChainInvoker")
            .field("container", &self.container)
            .field("total_requests", &self.metrics.total_requests())
            .finish_non_exhaustive()
    }
}
