//! URL parameter binder.

use trellis_core::{
    ActionArguments, BinderContext, BoxFuture, Container, MapResult, RequestBinder, Resolve,
    TrellisResult,
};

use crate::convert::bind_parameters;

/// Binds values matched from the URL template.
///
/// Each url parameter of the route is converted to its declared type; a
/// value that fails to convert is a bad request.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlParameterBinder;

impl Resolve for UrlParameterBinder {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl RequestBinder for UrlParameterBinder {
    fn applies(&self, context: &BinderContext) -> bool {
        !context.action.route().url_parameters().is_empty()
    }

    fn bind<'a>(
        &'a self,
        context: &'a BinderContext,
        arguments: &'a mut ActionArguments,
    ) -> BoxFuture<'a, TrellisResult<MapResult>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let url_parameters = &context.url_parameters;
            Ok(bind_parameters(
                context.action.route().url_parameters(),
                "url",
                |name| url_parameters.get(name).into_iter().collect(),
                arguments,
            ))
        })
    }
}
