//! Dependency injection container.
//!
//! The container is a tree: the application registers services on the root
//! container at startup, and every request gets a child scope that carries
//! request-specific services (request message, response message, action
//! descriptor, ...) on top of everything the root knows about.
//!
//! Resolution walks from the requesting scope up to the root. A registration
//! on a child shadows the same type on its ancestors.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::container::{Container, Lifetime};
//!
//! struct Database {
//!     url: String,
//! }
//!
//! let root = Container::new();
//! root.register_instance(Arc::new(Database { url: "postgres://localhost/db".into() }));
//!
//! let scope = root.create_child();
//! let db: Arc<Database> = scope.resolve().unwrap();
//! assert_eq!(db.url, "postgres://localhost/db");
//! scope.dispose();
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::{TrellisError, TrellisResult};
use crate::plugin::Implements;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone)]
pub struct InjectionError {
    /// The type name that could not be resolved.
    pub type_name: &'static str,
    /// The reason for the failure.
    pub reason: String,
}

impl fmt::Display for InjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to inject {}: {}", self.type_name, self.reason)
    }
}

impl std::error::Error for InjectionError {}

impl InjectionError {
    /// Creates a new injection error for a missing service.
    pub fn not_registered<T: ?Sized>() -> Self {
        Self {
            type_name: type_name::<T>(),
            reason: "service not registered".to_string(),
        }
    }

    /// Creates a new injection error for a scope that was already disposed.
    pub fn disposed<T: ?Sized>() -> Self {
        Self {
            type_name: type_name::<T>(),
            reason: "container has been disposed".to_string(),
        }
    }

    /// Creates a new injection error with a custom reason.
    pub fn custom<T: ?Sized>(reason: impl Into<String>) -> Self {
        Self {
            type_name: type_name::<T>(),
            reason: reason.into(),
        }
    }
}

/// How often a factory registration is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// A new instance for every resolution, built with the requesting scope.
    Transient,
    /// One instance, built with the registering container on first use.
    Singleton,
}

/// A service that releases resources when its owning scope is disposed.
pub trait Dispose: Send + Sync {
    /// Releases the resources held by this service.
    fn dispose(&self);
}

/// Constructor injection.
///
/// Every plugin type implements `Resolve` to pull its dependencies out of
/// the scope it is constructed in.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_core::container::{Container, Resolve};
/// use trellis_core::TrellisResult;
///
/// struct Clock;
///
/// struct Greeter {
///     clock: Arc<Clock>,
/// }
///
/// impl Resolve for Greeter {
///     fn resolve(container: &Container) -> TrellisResult<Self> {
///         Ok(Self { clock: container.resolve()? })
///     }
/// }
///
/// let container = Container::new();
/// container.register_instance(Arc::new(Clock));
/// assert!(container.create::<Greeter>().is_ok());
/// ```
pub trait Resolve: Sized + Send + Sync + 'static {
    /// Builds an instance from services available in `container`.
    fn resolve(container: &Container) -> TrellisResult<Self>;
}

type Erased = Box<dyn Any + Send + Sync>;
type ErasedFactory = Arc<dyn Fn(&Container) -> TrellisResult<Erased> + Send + Sync>;

enum Registration {
    Instance(Erased),
    Factory {
        lifetime: Lifetime,
        factory: ErasedFactory,
        cache: Mutex<Option<Erased>>,
    },
}

struct Entry {
    type_name: &'static str,
    registration: Registration,
}

struct Inner {
    parent: Option<Container>,
    depth: usize,
    entries: RwLock<HashMap<TypeId, Arc<Entry>>>,
    owned: Mutex<Vec<Arc<dyn Dispose>>>,
    disposed: AtomicBool,
}

/// A hierarchical dependency injection container.
///
/// `Container` is a cheap handle; clones refer to the same scope.
///
/// # Thread Safety
///
/// The container is `Send + Sync`. Registration and resolution can happen
/// concurrently; factories are never invoked while an internal lock is held.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates a new root container.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Self>) -> Self {
        let depth = parent.as_ref().map_or(0, |p| p.inner.depth + 1);
        Self {
            inner: Arc::new(Inner {
                parent,
                depth,
                entries: RwLock::new(HashMap::new()),
                owned: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a child scope that inherits every registration of `self`.
    #[must_use]
    pub fn create_child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Returns the parent scope, if any.
    pub fn parent(&self) -> Option<&Self> {
        self.inner.parent.as_ref()
    }

    /// Returns the root of this container tree.
    #[must_use]
    pub fn root(&self) -> Self {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.clone()
    }

    /// Distance from the root (the root has depth 0).
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Returns `true` if both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn insert(&self, type_id: TypeId, type_name: &'static str, registration: Registration) {
        trace!(service = type_name, depth = self.inner.depth, "registering service");
        self.inner.entries.write().insert(
            type_id,
            Arc::new(Entry {
                type_name,
                registration,
            }),
        );
    }

    /// Registers a shared instance. The container never disposes it.
    pub fn register_instance<T: ?Sized + Send + Sync + 'static>(&self, instance: Arc<T>) {
        self.insert(
            TypeId::of::<T>(),
            type_name::<T>(),
            Registration::Instance(Box::new(instance)),
        );
    }

    /// Registers an instance whose disposal is controlled by `dispose`.
    ///
    /// When `dispose` is `true` the instance is owned by this scope and
    /// disposed with it; otherwise it is shared and left alone.
    pub fn register_disposable<T: Dispose + 'static>(&self, instance: Arc<T>, dispose: bool) {
        if dispose {
            self.inner.owned.lock().push(instance.clone());
        }
        self.register_instance(instance);
    }

    /// Registers a factory for `T`.
    pub fn register_factory<T, F>(&self, lifetime: Lifetime, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self) -> TrellisResult<Arc<T>> + Send + Sync + 'static,
    {
        let factory: ErasedFactory =
            Arc::new(move |container: &Container| {
                factory(container).map(|value| Box::new(value) as Erased)
            });
        self.insert(
            TypeId::of::<T>(),
            type_name::<T>(),
            Registration::Factory {
                lifetime,
                factory,
                cache: Mutex::new(None),
            },
        );
    }

    /// Registers `T` to be built through its [`Resolve`] implementation.
    pub fn register_type<T: Resolve>(&self, lifetime: Lifetime) {
        self.register_factory::<T, _>(lifetime, |container| Ok(Arc::new(T::resolve(container)?)));
    }

    /// Registers `P` as the implementation of the service `I`.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use trellis_core::container::{Container, Lifetime, Resolve};
    /// use trellis_core::{Authenticator, BoxFuture, TrellisResult};
    ///
    /// struct AllowAll;
    ///
    /// impl Resolve for AllowAll {
    ///     fn resolve(_: &Container) -> TrellisResult<Self> {
    ///         Ok(Self)
    ///     }
    /// }
    ///
    /// impl Authenticator for AllowAll {
    ///     fn scheme(&self) -> &str {
    ///         "Anything"
    ///     }
    ///
    ///     fn authenticate<'a>(&'a self, _: &'a str) -> BoxFuture<'a, bool> {
    ///         Box::pin(async { true })
    ///     }
    /// }
    ///
    /// let container = Container::new();
    /// container.register_implementation::<dyn Authenticator, AllowAll>(Lifetime::Singleton);
    /// let auth: Arc<dyn Authenticator> = container.resolve().unwrap();
    /// assert_eq!(auth.scheme(), "Anything");
    /// ```
    pub fn register_implementation<I, P>(&self, lifetime: Lifetime)
    where
        I: ?Sized + Send + Sync + 'static,
        P: Resolve + Implements<I>,
    {
        self.register_factory::<I, _>(lifetime, |container| {
            Ok(<P as Implements<I>>::upcast(Arc::new(P::resolve(container)?)))
        });
    }

    fn find(&self, type_id: TypeId) -> Option<(Self, Arc<Entry>)> {
        let mut current = Some(self.clone());
        while let Some(container) = current {
            let found = container.inner.entries.read().get(&type_id).cloned();
            if let Some(entry) = found {
                return Some((container, entry));
            }
            current = container.inner.parent.clone();
        }
        None
    }

    fn resolve_self<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        if TypeId::of::<T>() != TypeId::of::<Self>() {
            return None;
        }
        let boxed: Box<dyn Any> = Box::new(Arc::new(self.clone()));
        boxed.downcast::<Arc<T>>().ok().map(|value| *value)
    }

    /// Resolves `T`, walking up the scope tree.
    ///
    /// Resolving [`Container`] itself always yields the requesting scope.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> TrellisResult<Arc<T>> {
        if let Some(this) = self.resolve_self::<T>() {
            return Ok(this);
        }
        if self.is_disposed() {
            return Err(InjectionError::disposed::<T>().into());
        }

        let (owner, entry) = self
            .find(TypeId::of::<T>())
            .ok_or_else(InjectionError::not_registered::<T>)?;

        match &entry.registration {
            Registration::Instance(value) => downcast::<T>(&**value),
            Registration::Factory {
                lifetime: Lifetime::Transient,
                factory,
                ..
            } => {
                let value = factory(self)?;
                downcast::<T>(&*value)
            }
            Registration::Factory {
                lifetime: Lifetime::Singleton,
                factory,
                cache,
            } => {
                if let Some(value) = cache.lock().as_ref() {
                    return downcast::<T>(&**value);
                }
                let created = factory(&owner)?;
                let mut cache = cache.lock();
                downcast::<T>(&**cache.get_or_insert(created))
            }
        }
    }

    /// Resolves `T`, returning `None` when it cannot be resolved.
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().ok()
    }

    /// Returns `true` if `T` is registered on this scope or an ancestor.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<Self>() || self.find(TypeId::of::<T>()).is_some()
    }

    /// Constructs an unregistered `T` with dependencies from this scope.
    pub fn create<T: Resolve>(&self) -> TrellisResult<T> {
        if self.is_disposed() {
            return Err(InjectionError::disposed::<T>().into());
        }
        T::resolve(self)
    }

    /// Constructs `T` with ad-hoc extra dependencies.
    ///
    /// `extras` registers the additional services on a throwaway child of
    /// this scope; `T` is resolved from that child.
    pub fn create_with<T, F>(&self, extras: F) -> TrellisResult<T>
    where
        T: Resolve,
        F: FnOnce(&Self),
    {
        let child = self.create_child();
        extras(&child);
        child.create::<T>()
    }

    /// Disposes the instances this scope owns.
    ///
    /// Owned instances are disposed in reverse registration order. Calling
    /// `dispose` more than once has no further effect. Registrations stay
    /// readable for diagnostics, but resolution fails afterwards.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let owned = std::mem::take(&mut *self.inner.owned.lock());
        trace!(
            depth = self.inner.depth,
            owned = owned.len(),
            "disposing container"
        );
        for instance in owned.iter().rev() {
            instance.dispose();
        }
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Type names registered directly on this scope, sorted.
    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .inner
            .entries
            .read()
            .values()
            .map(|entry| entry.type_name)
            .collect();
        names.sort_unstable();
        names
    }
}

fn downcast<T: ?Sized + Send + Sync + 'static>(
    value: &(dyn Any + Send + Sync),
) -> TrellisResult<Arc<T>> {
    value
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| {
            TrellisError::from(InjectionError::custom::<T>(
                "registered value has an unexpected type",
            ))
        })
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("depth", &self.inner.depth)
            .field("service_count", &self.inner.entries.read().len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct TestService {
        value: String,
    }

    impl TestService {
        fn new(value: &str) -> Self {
            Self {
                value: value.to_string(),
            }
        }
    }

    trait Greeting: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeting for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[derive(Default)]
    struct Tracked {
        disposals: AtomicUsize,
    }

    impl Dispose for Tracked {
        fn dispose(&self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let container = Container::new();
        container.register_instance(Arc::new(TestService::new("hello")));

        let service: Arc<TestService> = container.resolve().unwrap();
        assert_eq!(service.value, "hello");
    }

    #[test]
    fn test_resolve_missing() {
        let container = Container::new();
        let err = container.resolve::<TestService>().unwrap_err();
        assert!(err.to_string().contains("TestService"));
        assert!(err.to_string().contains("not registered"));
        assert!(container.try_resolve::<TestService>().is_none());
    }

    #[test]
    fn test_resolve_trait_object() {
        let container = Container::new();
        container.register_instance::<dyn Greeting>(Arc::new(English));

        let greeting: Arc<dyn Greeting> = container.resolve().unwrap();
        assert_eq!(greeting.greet(), "hello");
    }

    #[test]
    fn test_child_inherits_and_shadows() {
        let root = Container::new();
        root.register_instance(Arc::new(TestService::new("root")));

        let child = root.create_child();
        assert_eq!(child.resolve::<TestService>().unwrap().value, "root");

        child.register_instance(Arc::new(TestService::new("child")));
        assert_eq!(child.resolve::<TestService>().unwrap().value, "child");
        assert_eq!(root.resolve::<TestService>().unwrap().value, "root");
        assert_eq!(child.depth(), 1);
        assert!(child.root().ptr_eq(&root));
    }

    #[test]
    fn test_container_resolves_itself() {
        let root = Container::new();
        let scope = root.create_child();

        let resolved: Arc<Container> = scope.resolve().unwrap();
        assert!(resolved.ptr_eq(&scope));
        assert!(scope.contains::<Container>());
    }

    #[test]
    fn test_transient_vs_singleton_across_scopes() {
        static TRANSIENT: AtomicUsize = AtomicUsize::new(0);
        static SINGLETON: AtomicUsize = AtomicUsize::new(0);

        struct PerCall;
        struct Shared;

        let root = Container::new();
        root.register_factory::<PerCall, _>(Lifetime::Transient, |_| {
            TRANSIENT.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(PerCall))
        });
        root.register_factory::<Shared, _>(Lifetime::Singleton, |_| {
            SINGLETON.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Shared))
        });

        let first = root.create_child();
        let second = root.create_child();

        let a = first.resolve::<Shared>().unwrap();
        let b = second.resolve::<Shared>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(SINGLETON.load(Ordering::SeqCst), 1);

        let x = first.resolve::<PerCall>().unwrap();
        let y = second.resolve::<PerCall>().unwrap();
        assert!(!Arc::ptr_eq(&x, &y));
        assert_eq!(TRANSIENT.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_built_with_requesting_scope() {
        struct ScopeDepth(usize);

        let root = Container::new();
        root.register_factory::<ScopeDepth, _>(Lifetime::Transient, |scope| {
            Ok(Arc::new(ScopeDepth(scope.depth())))
        });

        let grandchild = root.create_child().create_child();
        assert_eq!(grandchild.resolve::<ScopeDepth>().unwrap().0, 2);
    }

    #[test]
    fn test_singleton_built_with_registering_container() {
        struct ScopeDepth(usize);

        let root = Container::new();
        root.register_factory::<ScopeDepth, _>(Lifetime::Singleton, |scope| {
            Ok(Arc::new(ScopeDepth(scope.depth())))
        });

        let scope = root.create_child();
        assert_eq!(scope.resolve::<ScopeDepth>().unwrap().0, 0);
    }

    #[test]
    fn test_register_type_resolves_from_requesting_scope() {
        struct Config(&'static str);
        struct Configured {
            config: Arc<Config>,
        }

        impl Resolve for Configured {
            fn resolve(container: &Container) -> TrellisResult<Self> {
                Ok(Self {
                    config: container.resolve()?,
                })
            }
        }

        let root = Container::new();
        root.register_type::<Configured>(Lifetime::Transient);
        let scope = root.create_child();
        scope.register_instance(Arc::new(Config("scoped")));

        assert_eq!(scope.resolve::<Configured>().unwrap().config.0, "scoped");
        assert!(root.resolve::<Configured>().is_err());
    }

    #[test]
    fn test_dispose_flag_round_trip() {
        let root = Container::new();
        let scope = root.create_child();

        let owned = Arc::new(Tracked::default());
        scope.register_disposable(owned.clone(), true);
        scope.dispose();
        assert_eq!(owned.disposals.load(Ordering::SeqCst), 1);

        let scope = root.create_child();
        let shared = Arc::new(Tracked::default());
        scope.register_disposable(shared.clone(), false);
        scope.dispose();
        assert_eq!(shared.disposals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispose_exactly_once() {
        let scope = Container::new().create_child();
        let owned = Arc::new(Tracked::default());
        scope.register_disposable(owned.clone(), true);

        scope.dispose();
        scope.dispose();
        scope.clone().dispose();
        assert_eq!(owned.disposals.load(Ordering::SeqCst), 1);
        assert!(scope.is_disposed());
    }

    #[test]
    fn test_dispose_in_reverse_order() {
        struct Ordered {
            name: &'static str,
            log: Arc<Mutex<Vec<&'static str>>>,
        }

        impl Dispose for Ordered {
            fn dispose(&self) {
                self.log.lock().push(self.name);
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let scope = Container::new();
        scope.register_disposable(
            Arc::new(Ordered {
                name: "first",
                log: log.clone(),
            }),
            true,
        );
        scope.register_disposable(
            Arc::new(Ordered {
                name: "second",
                log: log.clone(),
            }),
            true,
        );

        scope.dispose();
        assert_eq!(*log.lock(), vec!["second", "first"]);
    }

    #[test]
    fn test_resolve_after_dispose_fails() {
        let root = Container::new();
        root.register_instance(Arc::new(TestService::new("root")));
        let scope = root.create_child();
        scope.dispose();

        let err = scope.resolve::<TestService>().unwrap_err();
        assert!(err.to_string().contains("disposed"));
        assert!(root.resolve::<TestService>().is_ok());
        // registrations stay visible for diagnostics
        assert!(scope.contains::<TestService>());
    }

    #[test]
    fn test_create_with_extras() {
        struct Extra(u32);
        struct NeedsExtra(u32);

        impl Resolve for NeedsExtra {
            fn resolve(container: &Container) -> TrellisResult<Self> {
                Ok(Self(container.resolve::<Extra>()?.0))
            }
        }

        let root = Container::new();
        assert!(root.create::<NeedsExtra>().is_err());

        let built = root
            .create_with::<NeedsExtra, _>(|scope| scope.register_instance(Arc::new(Extra(7))))
            .unwrap();
        assert_eq!(built.0, 7);
        assert!(!root.contains::<Extra>());
    }

    #[test]
    fn test_registered_types() {
        let container = Container::new();
        container.register_instance(Arc::new(TestService::new("a")));
        let names = container.registered_types();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("TestService"));
    }

    #[test]
    fn test_container_debug() {
        let container = Container::new();
        container.register_instance(Arc::new(TestService::new("debug")));

        let debug = format!("{:?}", container);
        assert!(debug.contains("Container"));
        assert!(debug.contains("service_count"));
    }
}
