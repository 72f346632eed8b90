//! The behavior chain.
//!
//! A [`DefaultBehaviorChain`] is created per request from the action's
//! resolved behaviors. Behaviors are kept on a stack seeded in reverse, so
//! popping yields them in configured order:
//!
//! ```text
//! invoke_next() ─► pop ─► resolve ─► should_run? ──no──► discard, pop again
//!                   │                    │
//!                 empty                 yes
//!                   │                    ▼
//!                   ▼              behavior.invoke(chain)
//!         default_behavior.invoke(chain)
//! ```
//!
//! Skipped behaviors are filtered inside the same call, so they never take a
//! stack frame and cannot observe the rest of the chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use trellis_core::plugin::Implements;
use trellis_core::{
    ActionDescriptor, Behavior, BehaviorChain, BoxFuture, Container, Plugin, PluginType, Resolve,
    Response, TrellisError, TrellisResult,
};

/// Pop-based behavior chain for a single request.
pub struct DefaultBehaviorChain {
    scope: Container,
    action: Arc<ActionDescriptor>,
    pending: Mutex<Vec<Plugin<dyn Behavior>>>,
    invoked: Mutex<Vec<PluginType>>,
    skipped: Mutex<Vec<PluginType>>,
    completed: AtomicBool,
}

impl DefaultBehaviorChain {
    /// Creates the chain of `action`; behaviors are constructed from `scope`.
    pub fn new(scope: Container, action: Arc<ActionDescriptor>) -> Self {
        let pending = action.behaviors().iter().rev().cloned().collect();
        Self {
            scope,
            action,
            pending: Mutex::new(pending),
            invoked: Mutex::new(Vec::new()),
            skipped: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
        }
    }

    /// Behaviors not popped yet.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Types of the behaviors invoked so far, default behavior included.
    pub fn invoked(&self) -> Vec<PluginType> {
        self.invoked.lock().clone()
    }

    /// Types of the behaviors discarded because they declined to run.
    pub fn skipped(&self) -> Vec<PluginType> {
        self.skipped.lock().clone()
    }

    /// Returns `true` once the default behavior was invoked.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn pop(&self) -> Option<Plugin<dyn Behavior>> {
        self.pending.lock().pop()
    }
}

impl Resolve for DefaultBehaviorChain {
    fn resolve(container: &Container) -> TrellisResult<Self> {
        Ok(Self::new(
            container.clone(),
            container.resolve::<ActionDescriptor>()?,
        ))
    }
}

impl Implements<dyn BehaviorChain> for DefaultBehaviorChain {
    fn upcast(self: Arc<Self>) -> Arc<dyn BehaviorChain> {
        self
    }
}

impl BehaviorChain for DefaultBehaviorChain {
    fn invoke_next(&self) -> BoxFuture<'_, TrellisResult<Response>> {
        Box::pin(async move {
            while let Some(plugin) = self.pop() {
                let behavior = plugin.resolve(&self.scope)?;
                if !behavior.should_run() {
                    debug!(behavior = %plugin.plugin_type(), "behavior skipped");
                    self.skipped.lock().push(plugin.plugin_type());
                    continue;
                }

                debug!(behavior = %plugin.plugin_type(), "invoking behavior");
                self.invoked.lock().push(plugin.plugin_type());
                return behavior.invoke(self).await;
            }

            if self.completed.swap(true, Ordering::AcqRel) {
                return Err(TrellisError::configuration(format!(
                    "behavior chain of {} was continued after its default behavior ran",
                    self.action.action().full_name()
                )));
            }

            let plugin = self.action.default_behavior();
            let behavior = plugin.resolve(&self.scope)?;
            debug!(behavior = %plugin.plugin_type(), "invoking default behavior");
            self.invoked.lock().push(plugin.plugin_type());
            behavior.invoke(self).await
        })
    }
}

impl std::fmt::Debug for DefaultBehaviorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultBehaviorChain")
            .field("action", &self.action.action().full_name())
            .field("pending", &self.pending())
            .field("invoked", &self.invoked())
            .field("skipped", &self.skipped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use std::sync::atomic::AtomicUsize;
    use trellis_core::{
        ActionDescriptorFactory, ActionMethod, Configuration, ResponseExt, RouteDescriptor,
    };

    type Log = Arc<Mutex<Vec<&'static str>>>;

    macro_rules! spy {
        ($name:ident, runs = $runs:expr, short_circuit = $short:expr) => {
            struct $name {
                log: Log,
            }

            impl Resolve for $name {
                fn resolve(container: &Container) -> TrellisResult<Self> {
                    let log = container.resolve::<Mutex<Vec<&'static str>>>()?;
                    log.lock().push(concat!("construct ", stringify!($name)));
                    Ok(Self { log })
                }
            }

            impl Behavior for $name {
                fn should_run(&self) -> bool {
                    $runs
                }

                fn invoke<'a>(
                    &'a self,
                    chain: &'a dyn BehaviorChain,
                ) -> BoxFuture<'a, TrellisResult<Response>> {
                    Box::pin(async move {
                        self.log.lock().push(concat!("invoke ", stringify!($name)));
                        if $short {
                            return Ok(Response::with_status(StatusCode::FORBIDDEN));
                        }
                        chain.invoke_next().await
                    })
                }
            }
        };
    }

    spy!(First, runs = true, short_circuit = false);
    spy!(Skipped, runs = false, short_circuit = false);
    spy!(Second, runs = true, short_circuit = false);
    spy!(Guard, runs = true, short_circuit = true);
    spy!(Terminal, runs = true, short_circuit = true);

    fn chain_for(configure: impl FnOnce(&mut Configuration)) -> (DefaultBehaviorChain, Log) {
        let mut configuration = Configuration::new();
        configuration.default_behavior = Some(Plugin::of::<Terminal>());
        configure(&mut configuration);

        let action = ActionMethod::new("Spy", "run", |_| async { Ok(None) });
        let route = RouteDescriptor::new(Method::GET, "/").unwrap();
        let descriptor = ActionDescriptorFactory::new(Arc::new(configuration), Container::new())
            .create(action, route)
            .unwrap();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let scope = Container::new();
        scope.register_instance(log.clone());
        scope.register_instance(descriptor);
        (DefaultBehaviorChain::resolve(&scope).unwrap(), log)
    }

    #[tokio::test]
    async fn test_runs_in_configured_order_and_filters() {
        let (chain, log) = chain_for(|configuration| {
            configuration
                .behaviors
                .append::<First>()
                .append::<Skipped>()
                .append::<Second>();
        });

        let response = chain.invoke_next().await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            *log.lock(),
            vec![
                "construct First",
                "invoke First",
                "construct Skipped",
                "construct Second",
                "invoke Second",
                "construct Terminal",
                "invoke Terminal",
            ]
        );

        let invoked: Vec<_> = chain.invoked().iter().map(|t| t.short_name()).collect();
        assert_eq!(invoked, vec!["First", "Second", "Terminal"]);
        assert!(chain.skipped()[0].is::<Skipped>());
        assert!(chain.is_completed());
        assert_eq!(chain.pending(), 0);
    }

    #[tokio::test]
    async fn test_short_circuit_never_constructs_remainder() {
        let (chain, log) = chain_for(|configuration| {
            configuration
                .behaviors
                .append::<First>()
                .append::<Guard>()
                .append::<Second>();
        });

        let response = chain.invoke_next().await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            *log.lock(),
            vec!["construct First", "invoke First", "construct Guard", "invoke Guard"]
        );
        assert!(!chain.is_completed());
        assert_eq!(chain.pending(), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_runs_default_behavior() {
        let (chain, log) = chain_for(|_| {});
        chain.invoke_next().await.unwrap();
        assert_eq!(*log.lock(), vec!["construct Terminal", "invoke Terminal"]);
    }

    #[tokio::test]
    async fn test_continuing_after_default_behavior_fails() {
        let (chain, _log) = chain_for(|_| {});
        chain.invoke_next().await.unwrap();

        let err = chain.invoke_next().await.unwrap_err();
        assert!(matches!(err, TrellisError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_construction_errors_propagate() {
        struct Unresolvable;

        impl Resolve for Unresolvable {
            fn resolve(container: &Container) -> TrellisResult<Self> {
                container.resolve::<AtomicUsize>()?;
                Ok(Self)
            }
        }

        impl Behavior for Unresolvable {
            fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> {
                chain.invoke_next()
            }
        }

        let (chain, log) = chain_for(|configuration| {
            configuration.behaviors.append::<Unresolvable>();
        });
        let err = chain.invoke_next().await.unwrap_err();
        assert!(matches!(err, TrellisError::Injection(_)));
        assert!(log.lock().is_empty());
    }
}
