//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;

use bytes::Bytes;
use trellis_core::{
    ActionDescriptor, ActionDescriptorFactory, ActionMethod, Behavior, BehaviorChain,
    BinderContext, BoxFuture, Configuration, Container, Plugin, QuerystringParameters,
    RequestCancellation, RequestMessage, Resolve, Response, RouteDescriptor, TrellisResult,
};

struct Noop;

impl Resolve for Noop {
    fn resolve(_: &Container) -> TrellisResult<Self> {
        Ok(Self)
    }
}

impl Behavior for Noop {
    fn invoke<'a>(&'a self, _: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
        Box::pin(async { Ok(Response::default()) })
    }
}

pub(crate) fn descriptor_with(
    route: RouteDescriptor,
    configure: impl FnOnce(&mut Configuration),
) -> Arc<ActionDescriptor> {
    let mut configuration = Configuration::new();
    configuration.default_behavior = Some(Plugin::of::<Noop>());
    configure(&mut configuration);

    let action = ActionMethod::new("TestHandler", "run", |_| async { Ok(None) });
    ActionDescriptorFactory::new(Arc::new(configuration), Container::new())
        .create(action, route)
        .unwrap()
}

pub(crate) fn descriptor(route: RouteDescriptor) -> Arc<ActionDescriptor> {
    descriptor_with(route, |_| {})
}

pub(crate) fn request(uri: &str, headers: &[(&str, &str)], body: &'static str) -> Arc<RequestMessage> {
    let mut builder = http::Request::builder().method(http::Method::POST).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let (parts, ()) = builder.body(()).unwrap().into_parts();
    Arc::new(RequestMessage::from_parts(parts, Bytes::from_static(body.as_bytes())))
}

pub(crate) fn binder_context(
    action: Arc<ActionDescriptor>,
    request: Arc<RequestMessage>,
) -> BinderContext {
    let url_parameters = action
        .route()
        .url_template()
        .match_path(request.path())
        .unwrap_or_default();
    let querystring = request
        .query()
        .map(QuerystringParameters::parse)
        .unwrap_or_default();

    BinderContext {
        request,
        action,
        url_parameters: Arc::new(url_parameters),
        querystring: Arc::new(querystring),
        cancellation: RequestCancellation::none(),
    }
}
