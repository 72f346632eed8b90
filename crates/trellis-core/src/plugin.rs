//! Conditional plugins.
//!
//! Every extensibility point of the pipeline (behaviors, authenticators,
//! readers, binders, writers, ...) is configured as an ordered
//! [`ConditionalPlugins`] collection. At startup the collection is filtered
//! once per action with [`ConditionalPlugins::that_apply_to`], producing the
//! [`Plugin`] list stored on the action descriptor. Per request each plugin
//! is resolved (constructed) from the request scope.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::plugin::ConditionalPlugins;
//! use trellis_core::container::{Container, Resolve};
//! use trellis_core::{Behavior, BehaviorChain, BoxFuture, Response, TrellisResult};
//!
//! struct Timing;
//! struct Audit;
//!
//! # impl Resolve for Timing { fn resolve(_: &Container) -> TrellisResult<Self> { Ok(Self) } }
//! # impl Resolve for Audit { fn resolve(_: &Container) -> TrellisResult<Self> { Ok(Self) } }
//! # impl Behavior for Timing {
//! #     fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> { chain.invoke_next() }
//! # }
//! # impl Behavior for Audit {
//! #     fn invoke<'a>(&'a self, chain: &'a dyn BehaviorChain) -> BoxFuture<'a, TrellisResult<Response>> { chain.invoke_next() }
//! # }
//! let mut behaviors = ConditionalPlugins::<dyn Behavior, u32>::new();
//! behaviors
//!     .append::<Timing>()
//!     .append_when::<Audit>(|answer| *answer == 42);
//!
//! assert_eq!(behaviors.that_apply_to(&7).len(), 1);
//! assert_eq!(behaviors.that_apply_to(&42).len(), 2);
//! ```

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::{Container, Resolve};
use crate::descriptor::ActionConfigurationContext;
use crate::error::{TrellisError, TrellisResult};

/// Upcast from a concrete plugin type to the extension point it implements.
///
/// Implemented for every type implementing one of the extension-point
/// traits of this crate, e.g. every `P: Behavior` is `Implements<dyn Behavior>`.
pub trait Implements<T: ?Sized>: Send + Sync + 'static {
    /// Converts the concrete instance into the extension-point trait object.
    fn upcast(self: Arc<Self>) -> Arc<T>;
}

/// Identity of a plugin: its concrete type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginType {
    id: TypeId,
    name: &'static str,
}

impl PluginType {
    /// Returns the identity of `P`.
    pub fn of<P: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<P>(),
            name: type_name::<P>(),
        }
    }

    /// Returns `true` if this is the identity of `P`.
    pub fn is<P: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<P>()
    }

    /// The fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let end = self.name.find('<').unwrap_or(self.name.len());
        let start = self.name[..end].rfind("::").map_or(0, |index| index + 2);
        &self.name[start..]
    }
}

impl fmt::Debug for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

type PluginFactory<T> = Arc<dyn Fn(&Container) -> TrellisResult<Arc<T>> + Send + Sync>;

enum Source<T: ?Sized> {
    Instance(Arc<T>),
    Factory {
        factory: PluginFactory<T>,
        singleton: Option<Arc<Mutex<Option<Arc<T>>>>>,
    },
}

impl<T: ?Sized> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(instance) => Self::Instance(instance.clone()),
            Self::Factory { factory, singleton } => Self::Factory {
                factory: factory.clone(),
                singleton: singleton.clone(),
            },
        }
    }
}

/// A resolvable plugin of extension point `T`.
///
/// A plugin is either a precomputed instance or a factory that constructs
/// the concrete type from a container. Singleton factories share one
/// instance, built against the root container, across every action and
/// request; clones of the plugin share that instance too.
pub struct Plugin<T: ?Sized> {
    plugin_type: PluginType,
    source: Source<T>,
}

impl<T: ?Sized> Clone for Plugin<T> {
    fn clone(&self) -> Self {
        Self {
            plugin_type: self.plugin_type,
            source: self.source.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Plugin<T> {
    fn factory_for<P: Resolve + Implements<T>>() -> PluginFactory<T> {
        Arc::new(|container: &Container| -> TrellisResult<Arc<T>> {
            let plugin = Arc::new(P::resolve(container)?);
            Ok(<P as Implements<T>>::upcast(plugin))
        })
    }

    /// A plugin constructed from the request scope every time it is resolved.
    pub fn of<P: Resolve + Implements<T>>() -> Self {
        Self {
            plugin_type: PluginType::of::<P>(),
            source: Source::Factory {
                factory: Self::factory_for::<P>(),
                singleton: None,
            },
        }
    }

    /// A plugin constructed once from the root container and then shared.
    pub fn singleton_of<P: Resolve + Implements<T>>() -> Self {
        Self {
            plugin_type: PluginType::of::<P>(),
            source: Source::Factory {
                factory: Self::factory_for::<P>(),
                singleton: Some(Arc::new(Mutex::new(None))),
            },
        }
    }

    /// A plugin backed by a precomputed instance.
    pub fn instance<P: Implements<T>>(instance: Arc<P>) -> Self {
        Self {
            plugin_type: PluginType::of::<P>(),
            source: Source::Instance(<P as Implements<T>>::upcast(instance)),
        }
    }

    /// The concrete type of this plugin.
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    /// Returns `true` if the concrete type is `P`.
    pub fn is<P: 'static>(&self) -> bool {
        self.plugin_type.is::<P>()
    }

    /// Returns `true` if one instance is shared by every resolution.
    pub fn is_singleton(&self) -> bool {
        match &self.source {
            Source::Instance(_) => true,
            Source::Factory { singleton, .. } => singleton.is_some(),
        }
    }

    /// Returns `true` if the plugin wraps a precomputed instance.
    pub fn has_instance(&self) -> bool {
        matches!(self.source, Source::Instance(_))
    }

    /// Returns the plugin instance, constructing it if necessary.
    ///
    /// Transient plugins are built with `scope`; singletons with its root.
    pub fn resolve(&self, scope: &Container) -> TrellisResult<Arc<T>> {
        match &self.source {
            Source::Instance(instance) => Ok(instance.clone()),
            Source::Factory {
                factory,
                singleton: None,
            } => factory(scope),
            Source::Factory {
                factory,
                singleton: Some(cache),
            } => {
                if let Some(instance) = cache.lock().as_ref() {
                    return Ok(instance.clone());
                }
                let created = factory(&scope.root())?;
                Ok(cache.lock().get_or_insert(created).clone())
            }
        }
    }
}

impl<T: ?Sized> fmt::Debug for Plugin<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Instance(_) => "instance",
            Source::Factory {
                singleton: Some(_), ..
            } => "singleton",
            Source::Factory { singleton: None, .. } => "transient",
        };
        f.debug_struct("Plugin")
            .field("type", &self.plugin_type)
            .field("kind", &kind)
            .finish()
    }
}

/// Resolves every plugin in order.
pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(
    plugins: &[Plugin<T>],
    scope: &Container,
) -> TrellisResult<Vec<Arc<T>>> {
    plugins.iter().map(|plugin| plugin.resolve(scope)).collect()
}

/// Activation predicate of a conditional plugin.
pub type Predicate<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// A plugin paired with an optional activation predicate.
pub struct ConditionalPlugin<T: ?Sized, C = ActionConfigurationContext> {
    plugin: Plugin<T>,
    predicate: Option<Predicate<C>>,
}

impl<T: ?Sized, C> Clone for ConditionalPlugin<T, C> {
    fn clone(&self) -> Self {
        Self {
            plugin: self.plugin.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static, C> ConditionalPlugin<T, C> {
    /// Wraps a plugin that always applies.
    pub fn new(plugin: Plugin<T>) -> Self {
        Self {
            plugin,
            predicate: None,
        }
    }

    /// A transient plugin of type `P` that always applies.
    pub fn of<P: Resolve + Implements<T>>() -> Self {
        Self::new(Plugin::of::<P>())
    }

    /// A singleton plugin of type `P` that always applies.
    pub fn singleton_of<P: Resolve + Implements<T>>() -> Self {
        Self::new(Plugin::singleton_of::<P>())
    }

    /// A precomputed instance that always applies.
    pub fn instance<P: Implements<T>>(instance: Arc<P>) -> Self {
        Self::new(Plugin::instance(instance))
    }

    /// Restricts the plugin to contexts matching `predicate`.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// The wrapped plugin.
    pub fn plugin(&self) -> &Plugin<T> {
        &self.plugin
    }

    /// The concrete type of the wrapped plugin.
    pub fn plugin_type(&self) -> PluginType {
        self.plugin.plugin_type()
    }

    /// Returns `true` if the plugin has an activation predicate.
    pub fn is_conditional(&self) -> bool {
        self.predicate.is_some()
    }

    /// Evaluates the activation predicate against `context`.
    pub fn applies_to(&self, context: &C) -> bool {
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate(context))
    }
}

impl<T: ?Sized, C> fmt::Debug for ConditionalPlugin<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalPlugin")
            .field("plugin", &self.plugin)
            .field("conditional", &self.predicate.is_some())
            .finish()
    }
}

/// An ordered, mutable collection of conditional plugins.
///
/// Order is significant and duplicates are allowed. Positional operations
/// (`insert_before`, `insert_after`, `replace`) identify plugins by type and
/// fail with a configuration error when the anchor type is absent.
pub struct ConditionalPlugins<T: ?Sized, C = ActionConfigurationContext> {
    plugins: Vec<ConditionalPlugin<T, C>>,
}

impl<T: ?Sized, C> Clone for ConditionalPlugins<T, C> {
    fn clone(&self) -> Self {
        Self {
            plugins: self.plugins.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static, C> Default for ConditionalPlugins<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static, C> ConditionalPlugins<T, C> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Number of configured plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Iterates over the configured plugins in order.
    pub fn iter(&self) -> impl Iterator<Item = &ConditionalPlugin<T, C>> {
        self.plugins.iter()
    }

    /// Types of the configured plugins in order.
    pub fn plugin_types(&self) -> Vec<PluginType> {
        self.plugins.iter().map(ConditionalPlugin::plugin_type).collect()
    }

    /// Returns `true` if a plugin of type `P` is configured.
    pub fn contains<P: 'static>(&self) -> bool {
        self.position_of::<P>().is_some()
    }

    fn position_of<P: 'static>(&self) -> Option<usize> {
        self.plugins.iter().position(|p| p.plugin_type().is::<P>())
    }

    fn anchor<P: 'static>(&self, operation: &str) -> TrellisResult<usize> {
        self.position_of::<P>().ok_or_else(|| {
            TrellisError::configuration(format!(
                "cannot {operation} {}: plugin is not configured",
                type_name::<P>()
            ))
        })
    }

    /// Appends a transient plugin of type `P`.
    pub fn append<P: Resolve + Implements<T>>(&mut self) -> &mut Self {
        self.append_plugin(ConditionalPlugin::of::<P>())
    }

    /// Appends a transient plugin of type `P` guarded by `predicate`.
    pub fn append_when<P: Resolve + Implements<T>>(
        &mut self,
        predicate: impl Fn(&C) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.append_plugin(ConditionalPlugin::of::<P>().when(predicate))
    }

    /// Appends a singleton plugin of type `P`.
    pub fn append_singleton<P: Resolve + Implements<T>>(&mut self) -> &mut Self {
        self.append_plugin(ConditionalPlugin::singleton_of::<P>())
    }

    /// Appends a precomputed instance.
    pub fn append_instance<P: Implements<T>>(&mut self, instance: Arc<P>) -> &mut Self {
        self.append_plugin(ConditionalPlugin::instance(instance))
    }

    /// Appends an already built conditional plugin.
    pub fn append_plugin(&mut self, plugin: ConditionalPlugin<T, C>) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    /// Prepends a transient plugin of type `P`.
    pub fn prepend<P: Resolve + Implements<T>>(&mut self) -> &mut Self {
        self.prepend_plugin(ConditionalPlugin::of::<P>())
    }

    /// Prepends a transient plugin of type `P` guarded by `predicate`.
    pub fn prepend_when<P: Resolve + Implements<T>>(
        &mut self,
        predicate: impl Fn(&C) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.prepend_plugin(ConditionalPlugin::of::<P>().when(predicate))
    }

    /// Prepends an already built conditional plugin.
    pub fn prepend_plugin(&mut self, plugin: ConditionalPlugin<T, C>) -> &mut Self {
        self.plugins.insert(0, plugin);
        self
    }

    /// Inserts `plugin` before the first plugin of type `Anchor`.
    pub fn insert_before<Anchor: 'static>(
        &mut self,
        plugin: ConditionalPlugin<T, C>,
    ) -> TrellisResult<&mut Self> {
        let index = self.anchor::<Anchor>("insert before")?;
        self.plugins.insert(index, plugin);
        Ok(self)
    }

    /// Inserts `plugin` after the first plugin of type `Anchor`.
    pub fn insert_after<Anchor: 'static>(
        &mut self,
        plugin: ConditionalPlugin<T, C>,
    ) -> TrellisResult<&mut Self> {
        let index = self.anchor::<Anchor>("insert after")?;
        self.plugins.insert(index + 1, plugin);
        Ok(self)
    }

    /// Starts replacing every plugin of type `Existing`.
    pub fn replace<Existing: 'static>(&mut self) -> Replace<'_, T, C, Existing> {
        Replace {
            plugins: self,
            existing: std::marker::PhantomData,
        }
    }

    /// Removes every plugin of type `P`. Removing an absent type is a no-op.
    pub fn remove<P: 'static>(&mut self) -> &mut Self {
        self.plugins.retain(|plugin| !plugin.plugin_type().is::<P>());
        self
    }

    /// Removes every plugin.
    pub fn clear(&mut self) -> &mut Self {
        self.plugins.clear();
        self
    }

    /// Plugins whose predicate holds for `context`, in configured order.
    pub fn that_apply_to(&self, context: &C) -> Vec<Plugin<T>> {
        self.plugins
            .iter()
            .filter(|plugin| plugin.applies_to(context))
            .map(|plugin| plugin.plugin().clone())
            .collect()
    }
}

impl<T: ?Sized, C> fmt::Debug for ConditionalPlugins<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.iter()).finish()
    }
}

/// Pending replacement returned by [`ConditionalPlugins::replace`].
pub struct Replace<'a, T: ?Sized, C, Existing> {
    plugins: &'a mut ConditionalPlugins<T, C>,
    existing: std::marker::PhantomData<fn() -> Existing>,
}

impl<'a, T: ?Sized + Send + Sync + 'static, C, Existing: 'static> Replace<'a, T, C, Existing> {
    /// Replaces with a transient plugin of type `P`, keeping each
    /// replaced plugin's predicate and position.
    pub fn with<P: Resolve + Implements<T>>(self) -> TrellisResult<&'a mut ConditionalPlugins<T, C>> {
        self.replace_each(|previous| ConditionalPlugin {
            plugin: Plugin::of::<P>(),
            predicate: previous.predicate.clone(),
        })
    }

    /// Replaces with `plugin`, predicate included.
    pub fn with_plugin(
        self,
        plugin: ConditionalPlugin<T, C>,
    ) -> TrellisResult<&'a mut ConditionalPlugins<T, C>> {
        self.replace_each(|_| plugin.clone())
    }

    fn replace_each<F>(self, mut replacement: F) -> TrellisResult<&'a mut ConditionalPlugins<T, C>>
    where
        F: FnMut(&ConditionalPlugin<T, C>) -> ConditionalPlugin<T, C>,
    {
        self.plugins.anchor::<Existing>("replace")?;
        for slot in &mut self.plugins.plugins {
            if slot.plugin_type().is::<Existing>() {
                *slot = replacement(slot);
            }
        }
        Ok(self.plugins)
    }
}
