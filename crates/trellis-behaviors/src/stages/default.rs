//! The terminal behavior.
//!
//! Runs once every other behavior has passed the request on:
//!
//! 1. binds the action arguments with each applicable request binder;
//! 2. invokes the handler;
//! 3. applies the response status and header plugins;
//! 4. negotiates a response writer against `Accept` and writes the value.
//!
//! Binding failures surface as bad requests. When a value was produced but
//! no applicable writer matches `Accept`, the response is
//! `406 Not Acceptable`.

use std::sync::Arc;

use http::header::ACCEPT;
use http::StatusCode;
use tracing::debug;
use trellis_core::negotiation;
use trellis_core::plugin::resolve_all;
use trellis_core::{
    ActionArguments, ActionDescriptor, ActionInvocation, Behavior, BehaviorChain, BinderContext,
    BoxFuture, Container, QuerystringParameters, RequestBinder, RequestCancellation,
    RequestMessage, Resolve, Response, ResponseContext, ResponseExt, ResponseMessage,
    TrellisResult, UrlParameters, WriterContext,
};

/// Binds arguments, runs the handler and writes its result.
pub struct DefaultBehavior {
    scope: Container,
    action: Arc<ActionDescriptor>,
    request: Arc<RequestMessage>,
    response: Arc<ResponseMessage>,
    url_parameters: Arc<UrlParameters>,
    querystring: Arc<QuerystringParameters>,
    cancellation: RequestCancellation,
}

impl Resolve for DefaultBehavior {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            scope: container.clone(),
            action: container.resolve::<ActionDescriptor>()?,
            request: container.resolve::<RequestMessage>()?,
            response: container.resolve::<ResponseMessage>()?,
            url_parameters: container.resolve::<UrlParameters>()?,
            querystring: container.resolve::<QuerystringParameters>()?,
            cancellation: container
                .try_resolve::<RequestCancellation>()
                .map(|cancellation| (*cancellation).clone())
                .unwrap_or_default(),
        })
    }
}

impl DefaultBehavior {
    async fn bind(&self) -> TrellisResult<ActionArguments> {
        let context = BinderContext {
            request: self.request.clone(),
            action: self.action.clone(),
            url_parameters: self.url_parameters.clone(),
            querystring: self.querystring.clone(),
            cancellation: self.cancellation.clone(),
        };

        let mut arguments = ActionArguments::new();
        for plugin in self.action.request_binders() {
            let binder: Arc<dyn RequestBinder> = plugin.resolve(&self.scope)?;
            if !binder.applies(&context) {
                continue;
            }
            debug!(binder = %plugin.plugin_type(), "binding arguments");
            binder.bind(&context, &mut arguments).await?.into_result()?;
        }
        Ok(arguments)
    }

    fn apply_response_plugins(&self, response: &mut Response, has_body: bool) -> TrellisResult<()> {
        let context = ResponseContext {
            request: self.request.clone(),
            action: self.action.clone(),
            has_body,
        };

        for status in resolve_all(self.action.response_status(), &self.scope)? {
            if status.applies(&context) {
                status.set_status(&context, response);
            }
        }

        for plugin in resolve_all(self.action.response_headers(), &self.scope)? {
            if !plugin.applies(&context) {
                continue;
            }
            let headers = plugin.headers(&context);
            for (name, value) in &headers {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn write(&self, response: &mut Response, value: serde_json::Value) -> TrellisResult<bool> {
        let context = WriterContext {
            request: self.request.clone(),
            action: self.action.clone(),
            value,
            cancellation: self.cancellation.clone(),
        };

        let writers: Vec<_> = resolve_all(self.action.response_writers(), &self.scope)?
            .into_iter()
            .filter(|writer| writer.applies(&context))
            .collect();

        let selected = negotiation::select(
            self.request.header(ACCEPT),
            writers.iter().map(|writer| (writer.media_type(), writer.weight())),
        );
        let Some(writer) = selected.and_then(|index| writers.get(index)) else {
            return Ok(false);
        };

        debug!(media_type = %writer.media_type(), "writing response");
        writer.write(&context, response).await?;
        Ok(true)
    }
}

impl Behavior for DefaultBehavior {
    fn invoke<'a>(&'a self, _chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
        Box::pin(async move {
            self.cancellation.check()?;
            let arguments = self.bind().await?;
            self.cancellation.check()?;

            let invocation = ActionInvocation {
                scope: self.scope.clone(),
                arguments,
                cancellation: self.cancellation.clone(),
            };
            let value = self.action.action().handler().invoke(invocation).await?;

            let mut response = self.response.take();
            self.apply_response_plugins(&mut response, value.is_some())?;

            if let Some(value) = value {
                if !self.write(&mut response, value).await? {
                    debug!(accept = ?self.request.header(ACCEPT), "no acceptable response writer");
                    *response.status_mut() = StatusCode::NOT_ACCEPTABLE;
                    response.set_reason_phrase("No response writer matches the Accept header");
                }
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderValue, Method};
    use http_body_util::BodyExt;
    use serde_json::json;
    use trellis_core::{
        ActionDescriptorFactory, ActionMethod, Configuration, ParameterDescriptor, ParameterType,
        Plugin, RouteDescriptor, TrellisError,
    };
    use trellis_extract::{
        DefaultResponseHeaders, DefaultResponseStatus, JsonReader, JsonWriter, QuerystringBinder,
        ReaderBinder, StringWriter, UrlParameterBinder,
    };

    struct Unreachable;

    impl BehaviorChain for Unreachable {
        fn invoke_next(&self) -> BoxFuture<'_, TrellisResult<Response>> {
            Box::pin(async { Err(TrellisError::internal("terminal behavior continued the chain")) })
        }
    }

    fn configuration() -> Configuration {
        let mut configuration = Configuration::new();
        configuration.default_behavior = Some(Plugin::of::<DefaultBehavior>());
        configuration
            .request_binders
            .append::<UrlParameterBinder>()
            .append::<QuerystringBinder>()
            .append::<ReaderBinder>();
        configuration.request_readers.append::<JsonReader>();
        configuration
            .response_writers
            .append::<JsonWriter>()
            .append::<StringWriter>();
        configuration.response_status.append::<DefaultResponseStatus>();
        configuration.response_headers.append::<DefaultResponseHeaders>();
        configuration
    }

    fn scope_for(
        configuration: Configuration,
        action: ActionMethod,
        route: RouteDescriptor,
        request: http::Request<&'static str>,
    ) -> Container {
        let configuration = Arc::new(configuration);
        let descriptor = ActionDescriptorFactory::new(configuration.clone(), Container::new())
            .create(action, route)
            .unwrap();

        let (parts, body) = request.into_parts();
        let request = RequestMessage::from_parts(parts, Bytes::from_static(body.as_bytes()));
        let url_parameters = descriptor
            .route()
            .url_template()
            .match_path(request.path())
            .unwrap_or_default();
        let querystring = request
            .query()
            .map(QuerystringParameters::parse)
            .unwrap_or_default();

        let scope = Container::new();
        scope.register_instance(configuration);
        scope.register_instance(descriptor);
        scope.register_instance(Arc::new(request));
        scope.register_instance(Arc::new(ResponseMessage::new()));
        scope.register_instance(Arc::new(url_parameters));
        scope.register_instance(Arc::new(querystring));
        scope.register_instance(Arc::new(RequestCancellation::none()));
        scope
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn echo() -> ActionMethod {
        ActionMethod::new("Orders", "update", |invocation: ActionInvocation| async move {
            let id: i64 = invocation.arguments.get("id")?;
            let verbose: Option<bool> = invocation.arguments.get_optional("verbose")?;
            let order = invocation.arguments.value("order").cloned();
            Ok(Some(json!({ "id": id, "verbose": verbose, "order": order })))
        })
    }

    fn echo_route() -> RouteDescriptor {
        RouteDescriptor::new(Method::PUT, "/orders/{id}")
            .unwrap()
            .url_parameter("id", ParameterType::Integer)
            .querystring_parameter(ParameterDescriptor::new("verbose", ParameterType::Boolean).optional())
            .request_parameter(ParameterDescriptor::new("order", ParameterType::Json))
    }

    #[tokio::test]
    async fn test_binds_invokes_and_writes() {
        let request = http::Request::builder()
            .method(Method::PUT)
            .uri("/orders/42?verbose=true")
            .header("content-type", "application/json")
            .body(r#"{"sku":"A-1"}"#)
            .unwrap();
        let scope = scope_for(configuration(), echo(), echo_route(), request);

        let behavior = DefaultBehavior::resolve(&scope).unwrap();
        let response = behavior.invoke(&Unreachable).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "id": 42, "verbose": true, "order": { "sku": "A-1" } }));
    }

    #[tokio::test]
    async fn test_conversion_failure_is_bad_request() {
        let request = http::Request::builder()
            .method(Method::PUT)
            .uri("/orders/abc")
            .header("content-type", "application/json")
            .body("{}")
            .unwrap();
        let scope = scope_for(configuration(), echo(), echo_route(), request);

        let err = DefaultBehavior::resolve(&scope)
            .unwrap()
            .invoke(&Unreachable)
            .await
            .unwrap_err();
        assert!(err.is_bad_request());
        assert!(err.to_string().contains("'abc'"));
    }

    #[tokio::test]
    async fn test_no_value_is_no_content() {
        let mut configuration = configuration();
        configuration
            .default_response_headers
            .insert("cache-control", HeaderValue::from_static("no-store"));

        let action = ActionMethod::new("Orders", "delete", |_| async { Ok(None) });
        let route = RouteDescriptor::new(Method::DELETE, "/orders").unwrap();
        let request = http::Request::builder()
            .method(Method::DELETE)
            .uri("/orders")
            .body("")
            .unwrap();
        let scope = scope_for(configuration, action, route, request);

        let response = DefaultBehavior::resolve(&scope)
            .unwrap()
            .invoke(&Unreachable)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_accept_selects_writer() {
        let action = ActionMethod::new("Greeting", "get", |_| async { Ok(Some(json!("hello"))) });
        let route = RouteDescriptor::new(Method::GET, "/greeting").unwrap();
        let request = http::Request::builder()
            .uri("/greeting")
            .header("accept", "text/plain")
            .body("")
            .unwrap();
        let scope = scope_for(configuration(), action, route, request);

        let response = DefaultBehavior::resolve(&scope)
            .unwrap()
            .invoke(&Unreachable)
            .await
            .unwrap();
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(body_text(response).await, "hello");
    }

    #[tokio::test]
    async fn test_unacceptable_is_406() {
        let mut configuration = configuration();
        configuration
            .default_response_headers
            .insert("cache-control", HeaderValue::from_static("no-store"));
        let action = ActionMethod::new("Greeting", "get", |_| async { Ok(Some(json!({ "a": 1 }))) });
        let route = RouteDescriptor::new(Method::GET, "/greeting").unwrap();
        let request = http::Request::builder()
            .uri("/greeting")
            .header("accept", "text/plain")
            .body("")
            .unwrap();
        let scope = scope_for(configuration, action, route, request);

        let response = DefaultBehavior::resolve(&scope)
            .unwrap()
            .invoke(&Unreachable)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
        assert!(response.headers().get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_handler() {
        let action = ActionMethod::new("Greeting", "get", |_| async {
            Err(TrellisError::internal("handler should not run"))
        });
        let route = RouteDescriptor::new(Method::GET, "/greeting").unwrap();
        let request = http::Request::builder().uri("/greeting").body("").unwrap();
        let scope = scope_for(configuration(), action, route, request);

        let cancellation = RequestCancellation::none();
        cancellation.cancel();
        scope.register_instance(Arc::new(cancellation));

        let err = DefaultBehavior::resolve(&scope)
            .unwrap()
            .invoke(&Unreachable)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
