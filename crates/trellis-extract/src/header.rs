//! Header binder.

use trellis_core::{
    ActionArguments, BinderContext, BoxFuture, Container, MapResult, RequestBinder, Resolve,
    TrellisResult,
};

use crate::convert::bind_parameters;

/// Binds request headers declared as header parameters on the route.
///
/// Header names match case-insensitively. Values that are not visible
/// ASCII are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderBinder;

impl Resolve for HeaderBinder {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl RequestBinder for HeaderBinder {
    fn applies(&self, context: &BinderContext) -> bool {
        !context.action.route().header_parameters().is_empty()
    }

    fn bind<'a>(
        &'a self,
        context: &'a BinderContext,
        arguments: &'a mut ActionArguments,
    ) -> BoxFuture<'a, TrellisResult<MapResult>> {
        Box::pin(async move {
            context.cancellation.check()?;

            let headers = context.request.headers();
            Ok(bind_parameters(
                context.action.route().header_parameters(),
                "header",
                |name| {
                    headers
                        .get_all(name)
                        .iter()
                        .filter_map(|value| value.to_str().ok())
                        .collect()
                },
                arguments,
            ))
        })
    }
}
