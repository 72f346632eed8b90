//! Request body binder.

use std::sync::Arc;

use tracing::debug;
use trellis_core::{
    ActionArguments, BinderContext, BoxFuture, Container, MapResult, ReadResult, ReaderContext,
    RequestBinder, RequestReader, Resolve, TrellisResult,
};

/// Binds the request body parameter through the action's request readers.
///
/// Readers are tried in configured order and the first one that applies
/// reads the body. An optional body parameter with an empty body is left
/// unbound; otherwise no applicable reader is a bad request.
#[derive(Debug, Clone)]
pub struct ReaderBinder {
    scope: Container,
}

impl Resolve for ReaderBinder {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self {
            scope: container.clone(),
        })
    }
}

impl RequestBinder for ReaderBinder {
    fn applies(&self, context: &BinderContext) -> bool {
        context.action.route().has_request()
    }

    fn bind<'a>(
        &'a self,
        context: &'a BinderContext,
        arguments: &'a mut ActionArguments,
    ) -> BoxFuture<'a, TrellisResult<MapResult>> {
        Box::pin(async move {
            let Some(parameter) = context.action.route().request_parameter_descriptor() else {
                return Ok(MapResult::Success(()));
            };
            if parameter.optional && context.request.body().is_empty() {
                return Ok(MapResult::Success(()));
            }

            let reader_context = ReaderContext {
                request: context.request.clone(),
                action: context.action.clone(),
                parameter: parameter.clone(),
                content_type: context.request.content_type(),
                cancellation: context.cancellation.clone(),
            };

            for plugin in context.action.request_readers() {
                let reader: Arc<dyn RequestReader> = plugin.resolve(&self.scope)?;
                if !reader.applies(&reader_context) {
                    continue;
                }

                debug!(reader = %plugin.plugin_type(), parameter = %parameter.name, "reading request body");
                return Ok(match reader.read(&reader_context).await? {
                    ReadResult::Success(value) => {
                        arguments.insert(parameter.name.clone(), value);
                        MapResult::Success(())
                    }
                    ReadResult::Failure(message) => MapResult::Failure(message),
                });
            }

            let content_type = context
                .request
                .header(http::header::CONTENT_TYPE)
                .unwrap_or("none");
            Ok(MapResult::Failure(format!(
                "No request reader can read content type '{content_type}'"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, FormReader, JsonReader};
    use http::Method;
    use serde_json::json;
    use trellis_core::{ParameterDescriptor, ParameterType, RouteDescriptor};

    fn route(optional: bool) -> RouteDescriptor {
        let parameter = ParameterDescriptor::new("user", ParameterType::Json);
        let parameter = if optional { parameter.optional() } else { parameter };
        RouteDescriptor::new(Method::POST, "/users")
            .unwrap()
            .request_parameter(parameter)
    }

    fn binder_context(optional: bool, content_type: &str, body: &'static str) -> BinderContext {
        let descriptor = testing::descriptor_with(route(optional), |configuration| {
            configuration.request_readers.append::<FormReader>();
            configuration.request_readers.append::<JsonReader>();
        });
        testing::binder_context(
            descriptor,
            testing::request("/users", &[("content-type", content_type)], body),
        )
    }

    fn binder() -> ReaderBinder {
        ReaderBinder::resolve(&Container::new()).unwrap()
    }

    #[tokio::test]
    async fn test_first_applicable_reader_wins() {
        let context = binder_context(false, "application/json", r#"{"name":"ada"}"#);
        let mut arguments = ActionArguments::new();
        let result = binder().bind(&context, &mut arguments).await.unwrap();

        assert!(result.is_success());
        assert_eq!(arguments.value("user"), Some(&json!({ "name": "ada" })));
    }

    #[tokio::test]
    async fn test_read_failure_becomes_map_failure() {
        let context = binder_context(false, "application/json", "not json");
        let mut arguments = ActionArguments::new();
        let result = binder().bind(&context, &mut arguments).await.unwrap();

        assert!(!result.is_success());
        assert!(arguments.is_empty());
    }

    #[tokio::test]
    async fn test_no_applicable_reader() {
        let context = binder_context(false, "image/png", "...");
        let mut arguments = ActionArguments::new();
        let result = binder().bind(&context, &mut arguments).await.unwrap();

        assert_eq!(
            result,
            MapResult::Failure("No request reader can read content type 'image/png'".to_string())
        );
        assert!(result.into_result().unwrap_err().is_bad_request());
    }

    #[tokio::test]
    async fn test_optional_empty_body() {
        let context = binder_context(true, "application/json", "");
        let mut arguments = ActionArguments::new();
        let result = binder().bind(&context, &mut arguments).await.unwrap();

        assert!(result.is_success());
        assert!(!arguments.contains("user"));
    }
}
