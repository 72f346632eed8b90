//! Action descriptors.
//!
//! An [`ActionDescriptor`] is built once per action at startup by the
//! [`ActionDescriptorFactory`]: every conditional plugin collection of the
//! [`Configuration`] is evaluated against the action's
//! [`ActionConfigurationContext`], and the surviving plugins are frozen on
//! the descriptor. Requests only read it.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::action::ActionMethod;
use crate::configuration::Configuration;
use crate::container::{Container, Lifetime};
use crate::error::{TrellisError, TrellisResult};
use crate::extension::{
    ActionDecorator, Authenticator, Behavior, RequestBinder, RequestReader, ResponseHeaders,
    ResponseStatus, ResponseWriter,
};
use crate::metrics::ActionMetrics;
use crate::plugin::Plugin;
use crate::route::RouteDescriptor;

/// Input of plugin predicates and action decorators.
#[derive(Clone)]
pub struct ActionConfigurationContext {
    configuration: Arc<Configuration>,
    action: Arc<ActionMethod>,
    route: Arc<RouteDescriptor>,
}

impl ActionConfigurationContext {
    /// Creates a context for one action.
    pub fn new(
        configuration: Arc<Configuration>,
        action: Arc<ActionMethod>,
        route: Arc<RouteDescriptor>,
    ) -> Self {
        Self {
            configuration,
            action,
            route,
        }
    }

    /// The framework configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The action being configured.
    pub fn action(&self) -> &ActionMethod {
        &self.action
    }

    /// The route of the action.
    pub fn route(&self) -> &RouteDescriptor {
        &self.route
    }
}

impl fmt::Debug for ActionConfigurationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfigurationContext")
            .field("action", &self.action.full_name())
            .field("route", &self.route.to_string())
            .finish()
    }
}

type Registration = Arc<dyn Fn(&Container) + Send + Sync>;

/// Registrations applied to every request scope of one action.
///
/// Filled by [`ActionDecorator`]s at startup.
#[derive(Clone, Default)]
pub struct Registry {
    registrations: Vec<Registration>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shared instance in each request scope.
    pub fn register_instance<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Arc<T>) {
        self.registrations.push(Arc::new(move |scope: &Container| {
            scope.register_instance(instance.clone());
        }));
    }

    /// Registers a factory in each request scope.
    ///
    /// The registration is replayed into every request scope, so
    /// `Lifetime::Singleton` yields one instance per request, not one per
    /// action or process. Use [`register_instance`](Self::register_instance)
    /// for a value shared across requests.
    pub fn register_factory<T, F>(&mut self, lifetime: Lifetime, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> TrellisResult<Arc<T>> + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        self.registrations.push(Arc::new(move |scope: &Container| {
            let factory = factory.clone();
            scope.register_factory::<T, _>(lifetime, move |container| factory(container));
        }));
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Applies every registration to `scope`.
    pub fn apply_to(&self, scope: &Container) {
        for registration in &self.registrations {
            registration(scope);
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

/// Everything the pipeline needs to execute one action.
pub struct ActionDescriptor {
    action: Arc<ActionMethod>,
    route: Arc<RouteDescriptor>,
    behaviors: Vec<Plugin<dyn Behavior>>,
    default_behavior: Plugin<dyn Behavior>,
    authenticators: Vec<Plugin<dyn Authenticator>>,
    request_readers: Vec<Plugin<dyn RequestReader>>,
    request_binders: Vec<Plugin<dyn RequestBinder>>,
    response_writers: Vec<Plugin<dyn ResponseWriter>>,
    response_status: Vec<Plugin<dyn ResponseStatus>>,
    response_headers: Vec<Plugin<dyn ResponseHeaders>>,
    registry: Registry,
    metrics: ActionMetrics,
}

impl ActionDescriptor {
    /// The handler method.
    pub fn action(&self) -> &Arc<ActionMethod> {
        &self.action
    }

    /// The route.
    pub fn route(&self) -> &Arc<RouteDescriptor> {
        &self.route
    }

    /// Behaviors in execution order.
    pub fn behaviors(&self) -> &[Plugin<dyn Behavior>] {
        &self.behaviors
    }

    /// The terminal behavior.
    pub fn default_behavior(&self) -> &Plugin<dyn Behavior> {
        &self.default_behavior
    }

    /// Applicable authenticators.
    pub fn authenticators(&self) -> &[Plugin<dyn Authenticator>] {
        &self.authenticators
    }

    /// Applicable request readers.
    pub fn request_readers(&self) -> &[Plugin<dyn RequestReader>] {
        &self.request_readers
    }

    /// Applicable request binders.
    pub fn request_binders(&self) -> &[Plugin<dyn RequestBinder>] {
        &self.request_binders
    }

    /// Applicable response writers, in configured order.
    pub fn response_writers(&self) -> &[Plugin<dyn ResponseWriter>] {
        &self.response_writers
    }

    /// Applicable response status plugins.
    pub fn response_status(&self) -> &[Plugin<dyn ResponseStatus>] {
        &self.response_status
    }

    /// Applicable response header plugins.
    pub fn response_headers(&self) -> &[Plugin<dyn ResponseHeaders>] {
        &self.response_headers
    }

    /// Registrations applied to each request scope.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Per-action request metrics.
    pub fn metrics(&self) -> &ActionMetrics {
        &self.metrics
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.route, self.action.full_name())
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("action", &self.action.full_name())
            .field("route", &self.route.to_string())
            .field("behaviors", &self.behaviors)
            .field("default_behavior", &self.default_behavior)
            .field("authenticators", &self.authenticators.len())
            .field("request_readers", &self.request_readers.len())
            .field("request_binders", &self.request_binders.len())
            .field("response_writers", &self.response_writers.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builds action descriptors from the configuration.
pub struct ActionDescriptorFactory {
    configuration: Arc<Configuration>,
    container: Container,
}

impl ActionDescriptorFactory {
    /// Creates a factory; decorators are constructed from `container`.
    pub fn new(configuration: Arc<Configuration>, container: Container) -> Self {
        Self {
            configuration,
            container,
        }
    }

    /// Builds the descriptor of one action.
    pub fn create(
        &self,
        action: ActionMethod,
        route: RouteDescriptor,
    ) -> TrellisResult<Arc<ActionDescriptor>> {
        let context = ActionConfigurationContext::new(
            self.configuration.clone(),
            Arc::new(action),
            Arc::new(route),
        );
        let configuration = &self.configuration;

        let default_behavior = configuration.default_behavior.clone().ok_or_else(|| {
            TrellisError::configuration(format!(
                "no default behavior configured for {}",
                context.action().full_name()
            ))
        })?;

        let mut registry = Registry::new();
        for plugin in configuration.action_decorators.that_apply_to(&context) {
            let decorator: Arc<dyn ActionDecorator> = plugin.resolve(&self.container)?;
            decorator.decorate(&context, &mut registry);
            debug!(
                action = %context.action().full_name(),
                decorator = %plugin.plugin_type(),
                "applied action decorator"
            );
        }

        let descriptor = ActionDescriptor {
            behaviors: configuration.behaviors.that_apply_to(&context),
            default_behavior,
            authenticators: configuration.authenticators.that_apply_to(&context),
            request_readers: configuration.request_readers.that_apply_to(&context),
            request_binders: configuration.request_binders.that_apply_to(&context),
            response_writers: configuration.response_writers.that_apply_to(&context),
            response_status: configuration.response_status.that_apply_to(&context),
            response_headers: configuration.response_headers.that_apply_to(&context),
            registry,
            metrics: ActionMetrics::default(),
            action: context.action,
            route: context.route,
        };

        debug!(
            action = %descriptor.action.full_name(),
            route = %descriptor.route,
            behaviors = descriptor.behaviors.len(),
            authenticators = descriptor.authenticators.len(),
            "created action descriptor"
        );
        Ok(Arc::new(descriptor))
    }

    /// Builds the descriptors of several actions, failing on the first error.
    pub fn create_all<I>(&self, actions: I) -> TrellisResult<Vec<Arc<ActionDescriptor>>>
    where
        I: IntoIterator<Item = (ActionMethod, RouteDescriptor)>,
    {
        actions
            .into_iter()
            .map(|(action, route)| self.create(action, route))
            .collect()
    }
}

impl fmt::Debug for ActionDescriptorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptorFactory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Resolve;
    use crate::extension::{BehaviorChain, BoxFuture};
    use crate::message::Response;
    use http::Method;

    struct Terminal;
    struct Audit;
    struct Marker(&'static str);

    impl Resolve for Terminal {
        fn resolve(_: &Container) -> TrellisResult<Self> {
            Ok(Self)
        }
    }

    impl Resolve for Audit {
        fn resolve(_: &Container) -> TrellisResult<Self> {
            Ok(Self)
        }
    }

    impl Behavior for Terminal {
        fn invoke<'a>(&'a self, _: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
            Box::pin(async { Ok(Response::default()) })
        }
    }

    impl Behavior for Audit {
        fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
            chain.invoke_next()
        }
    }

    struct TagDecorator;

    impl Resolve for TagDecorator {
        fn resolve(_: &Container) -> TrellisResult<Self> {
            Ok(Self)
        }
    }

    impl ActionDecorator for TagDecorator {
        fn decorate(&self, context: &ActionConfigurationContext, registry: &mut Registry) {
            let tag: &'static str = if context.action().has_attribute("admin") {
                "admin"
            } else {
                "public"
            };
            registry.register_instance(Arc::new(Marker(tag)));
        }
    }

    fn action(name: &str) -> ActionMethod {
        ActionMethod::new("Handler", name, |_| async { Ok(None) })
    }

    fn route() -> RouteDescriptor {
        RouteDescriptor::new(Method::GET, "/items").unwrap()
    }

    #[test]
    fn test_missing_default_behavior_fails() {
        let factory = ActionDescriptorFactory::new(Arc::new(Configuration::new()), Container::new());
        let err = factory.create(action("list"), route()).unwrap_err();
        assert!(matches!(err, TrellisError::Configuration { .. }));
    }

    #[test]
    fn test_predicates_evaluated_per_action() {
        let mut configuration = Configuration::new();
        configuration.default_behavior = Some(Plugin::of::<Terminal>());
        configuration
            .behaviors
            .append_when::<Audit>(|ctx| ctx.action().has_attribute("audited"));

        let factory = ActionDescriptorFactory::new(Arc::new(configuration), Container::new());
        let plain = factory.create(action("list"), route()).unwrap();
        let audited = factory
            .create(action("delete").attribute("audited"), route())
            .unwrap();

        assert!(plain.behaviors().is_empty());
        assert_eq!(audited.behaviors().len(), 1);
        assert!(audited.behaviors()[0].is::<Audit>());
        assert!(audited.default_behavior().is::<Terminal>());
    }

    #[test]
    fn test_decorators_fill_registry() {
        let mut configuration = Configuration::new();
        configuration.default_behavior = Some(Plugin::of::<Terminal>());
        configuration.action_decorators.append::<TagDecorator>();

        let factory = ActionDescriptorFactory::new(Arc::new(configuration), Container::new());
        let descriptors = factory
            .create_all(vec![
                (action("list"), route()),
                (action("purge").attribute("admin"), route()),
            ])
            .unwrap();

        let tags: Vec<_> = descriptors
            .iter()
            .map(|descriptor| {
                assert_eq!(descriptor.registry().len(), 1);
                let scope = Container::new();
                descriptor.registry().apply_to(&scope);
                scope.resolve::<Marker>().unwrap().0
            })
            .collect();
        assert_eq!(tags, vec!["public", "admin"]);
    }

    #[test]
    fn test_registry_factory() {
        struct Counter(usize);

        let mut registry = Registry::new();
        registry.register_factory::<Counter, _>(Lifetime::Transient, |scope| {
            Ok(Arc::new(Counter(scope.depth())))
        });

        let scope = Container::new().create_child();
        registry.apply_to(&scope);
        assert_eq!(scope.resolve::<Counter>().unwrap().0, 1);
    }

    #[test]
    fn test_registry_singleton_is_per_scope() {
        struct Session;

        let mut registry = Registry::new();
        registry.register_factory::<Session, _>(Lifetime::Singleton, |_| Ok(Arc::new(Session)));

        let root = Container::new();
        let first = root.create_child();
        let second = root.create_child();
        registry.apply_to(&first);
        registry.apply_to(&second);

        let a = first.resolve::<Session>().unwrap();
        assert!(Arc::ptr_eq(&a, &first.resolve::<Session>().unwrap()));
        assert!(!Arc::ptr_eq(&a, &second.resolve::<Session>().unwrap()));
    }
}
