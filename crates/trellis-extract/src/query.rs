//! Querystring binder.

use trellis_core::{
    ActionArguments, BinderContext, BoxFuture, Container, MapResult, RequestBinder, Resolve,
    TrellisResult,
};

use crate::convert::bind_parameters;

/// Binds the querystring parameters declared on the route.
///
/// Names match case-insensitively. List parameters collect every
/// occurrence of the name; scalar parameters take the first.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuerystringBinder;

impl Resolve for QuerystringBinder {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl RequestBinder for QuerystringBinder {
    fn applies(&self, context: &BinderContext) -> bool {
        !context.action.route().querystring_parameters().is_empty()
    }

    fn bind<'a>(
        &'a self,
        context: &'a BinderContext,
        arguments: &'a mut ActionArguments,
    ) -> BoxFuture<'a, TrellisResult<MapResult>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let querystring = &context.querystring;
            Ok(bind_parameters(
                context.action.route().querystring_parameters(),
                "querystring",
                |name| {
                    querystring
                        .get(name)
                        .map(|values| values.iter().map(String::as_str).collect())
                        .unwrap_or_default()
                },
                arguments,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use http::Method;
    use serde_json::json;
    use trellis_core::{ParameterDescriptor, ParameterType, RouteDescriptor};

    fn route() -> RouteDescriptor {
        RouteDescriptor::new(Method::GET, "/search")
            .unwrap()
            .querystring_parameter(ParameterDescriptor::string("q"))
            .querystring_parameter(ParameterDescriptor::new("page", ParameterType::Integer).optional())
            .querystring_parameter(
                ParameterDescriptor::new("tag", ParameterType::List(Box::new(ParameterType::String)))
                    .optional(),
            )
    }

    #[tokio::test]
    async fn test_binds_values() {
        let context = testing::binder_context(
            testing::descriptor(route()),
            testing::request("/search?q=rust&page=2&tag=a&tag=b", &[], ""),
        );

        let mut arguments = ActionArguments::new();
        let result = QuerystringBinder.bind(&context, &mut arguments).await.unwrap();

        assert!(result.is_success());
        assert_eq!(arguments.value("q"), Some(&json!("rust")));
        assert_eq!(arguments.value("page"), Some(&json!(2)));
        assert_eq!(arguments.value("tag"), Some(&json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_names_ignore_case() {
        let context = testing::binder_context(
            testing::descriptor(route()),
            testing::request("/search?Q=rust&TAG=a&tag=b", &[], ""),
        );

        let mut arguments = ActionArguments::new();
        let result = QuerystringBinder.bind(&context, &mut arguments).await.unwrap();

        assert!(result.is_success());
        assert_eq!(arguments.value("q"), Some(&json!("rust")));
        assert_eq!(arguments.value("tag"), Some(&json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_optional_parameters_may_be_absent() {
        let context = testing::binder_context(
            testing::descriptor(route()),
            testing::request("/search?q=rust", &[], ""),
        );

        let mut arguments = ActionArguments::new();
        let result = QuerystringBinder.bind(&context, &mut arguments).await.unwrap();

        assert!(result.is_success());
        assert_eq!(arguments.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let context = testing::binder_context(
            testing::descriptor(route()),
            testing::request("/search?page=1", &[], ""),
        );

        let mut arguments = ActionArguments::new();
        let result = QuerystringBinder.bind(&context, &mut arguments).await.unwrap();
        assert_eq!(
            result,
            MapResult::Failure("Missing querystring parameter 'q'".to_string())
        );
    }
}
