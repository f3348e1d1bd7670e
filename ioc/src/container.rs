//! The `Container` type: registration, lifetime-aware resolution and child scopes.

use crate::core::{
  downcast, erase, Erased, Factory, InstanceCache, Lifetime, Registration, ServiceKey, SyncFactory,
};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for one container in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
  fn next() -> Self {
    Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
  }

  pub fn get(&self) -> u64 {
    self.0
  }
}

impl fmt::Display for ScopeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "scope-{}", self.0)
  }
}

struct Inner {
  id: ScopeId,
  depth: usize,
  registrations: DashMap<ServiceKey, Registration>,
  scope_cache: InstanceCache,
  // Shared by every container descended from the same root.
  singletons: Arc<InstanceCache>,
  parent: Option<Container>,
}

/// A scoped dependency resolution container.
///
/// A container binds service keys to factories and a [`Lifetime`]. Child
/// scopes created with [`Container::create_scope`] see every registration of
/// their ancestors, share one singleton store with the whole chain, and keep a
/// private cache for scoped services.
///
/// `Container` is a cheap handle; clones refer to the same container.
///
/// # Examples
///
/// ```
/// use fibre_scope::Container;
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Session { config: Arc<Config> }
///
/// let root = Container::new();
/// root
///   .singleton(|_| Ok(Config { url: "postgres://localhost/app".into() }))
///   .scoped(|c| Ok(Session { config: c.resolve::<Config>()? }));
///
/// let request = root.create_scope();
/// let a = request.resolve::<Session>().unwrap();
/// let b = request.resolve::<Session>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(a.config.url, "postgres://localhost/app");
/// ```
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
  /// Creates a new, empty root container with its own singleton store.
  pub fn new() -> Self {
    let container = Self {
      inner: Arc::new(Inner {
        id: ScopeId::next(),
        depth: 0,
        registrations: DashMap::new(),
        scope_cache: InstanceCache::default(),
        singletons: Arc::new(InstanceCache::default()),
        parent: None,
      }),
    };
    debug!(scope_id = %container.id(), "created root container");
    container
  }

  pub fn id(&self) -> ScopeId {
    self.inner.id
  }

  /// Distance from the root container; the root is `0`.
  pub fn depth(&self) -> usize {
    self.inner.depth
  }

  pub fn parent(&self) -> Option<&Container> {
    self.inner.parent.as_ref()
  }

  pub fn is_root(&self) -> bool {
    self.inner.parent.is_none()
  }

  /// Whether two handles refer to the same container.
  pub fn ptr_eq(a: &Container, b: &Container) -> bool {
    Arc::ptr_eq(&a.inner, &b.inner)
  }

  // --- PRIVATE HELPERS ---

  pub(crate) fn insert(&self, key: ServiceKey, lifetime: Lifetime, factory: Factory) {
    debug!(
      service = key.type_name(),
      name = key.name(),
      %lifetime,
      scope_id = %self.id(),
      "registered service"
    );
    self
      .inner
      .registrations
      .insert(key, Registration { factory, lifetime });
  }

  fn add_internal<T, F>(&self, name: Option<&str>, lifetime: Lifetime, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    let factory: SyncFactory =
      Arc::new(move |c: &Container| factory(c).map(|v| erase(Arc::new(v))));
    self.insert(ServiceKey::for_name::<T>(name), lifetime, Factory::Sync(factory));
  }

  fn add_trait_internal<I, F>(&self, name: Option<&str>, lifetime: Lifetime, factory: F)
  where
    I: ?Sized + Any + Send + Sync,
    F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
  {
    let factory: SyncFactory = Arc::new(move |c: &Container| factory(c).map(erase));
    self.insert(ServiceKey::for_name::<I>(name), lifetime, Factory::Sync(factory));
  }

  fn add_instance_internal<T: Any + Send + Sync>(&self, name: Option<&str>, instance: T) {
    let instance = Arc::new(instance);
    let factory: SyncFactory =
      Arc::new(move |_: &Container| Ok(erase(Arc::clone(&instance))));
    self.insert(
      ServiceKey::for_name::<T>(name),
      Lifetime::Singleton,
      Factory::Sync(factory),
    );
  }

  /// Finds the nearest registration for `key`, walking from this container
  /// towards the root. The returned clone owns no lock on any table.
  pub(crate) fn lookup(&self, key: &ServiceKey) -> Option<Registration> {
    let mut current = Some(self);
    while let Some(container) = current {
      if let Some(registration) = container.inner.registrations.get(key) {
        return Some(registration.value().clone());
      }
      current = container.parent();
    }
    None
  }

  pub(crate) fn singleton_cache(&self) -> &InstanceCache {
    &self.inner.singletons
  }

  pub(crate) fn scope_cache(&self) -> &InstanceCache {
    &self.inner.scope_cache
  }

  pub(crate) fn unregistered(&self, key: &ServiceKey) -> Error {
    debug!(service = key.type_name(), name = key.name(), scope_id = %self.id(), "service not registered");
    Error::UnregisteredDependency { key: key.clone() }
  }

  fn resolve_key(&self, key: &ServiceKey) -> Result<Erased> {
    if let Some(instance) = self.singleton_cache().get(key) {
      trace!(service = key.type_name(), name = key.name(), "singleton cache hit");
      return Ok(instance);
    }

    let registration = self.lookup(key).ok_or_else(|| self.unregistered(key))?;
    let factory = match registration.factory {
      Factory::Sync(factory) => factory,
      #[cfg(feature = "tokio")]
      Factory::Async(_) => return Err(Error::AsyncFactoryRequiresAsync { key: key.clone() }),
    };

    match registration.lifetime {
      Lifetime::Singleton => self.singleton_cache().slot(key).get_or_try_init(|| {
        info!(service = key.type_name(), name = key.name(), scope_id = %self.id(), "instantiating singleton");
        factory(self)
      }),
      Lifetime::Scoped => {
        if let Some(instance) = self.scope_cache().get(key) {
          trace!(service = key.type_name(), scope_id = %self.id(), "scope cache hit");
          return Ok(instance);
        }
        self.scope_cache().slot(key).get_or_try_init(|| {
          debug!(service = key.type_name(), name = key.name(), scope_id = %self.id(), "instantiating scoped service");
          factory(self)
        })
      }
      Lifetime::Transient => {
        trace!(service = key.type_name(), name = key.name(), "creating transient instance");
        factory(self)
      }
    }
  }

  // --- PUBLIC API ---

  // --- Lifetime Registration ---

  /// Registers `T` with one instance shared by the whole container chain.
  pub fn singleton<T, F>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.add_internal(None, Lifetime::Singleton, factory);
    self
  }

  /// Registers `T` with one instance per resolving container.
  pub fn scoped<T, F>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.add_internal(None, Lifetime::Scoped, factory);
    self
  }

  /// Registers `T` with a fresh instance on every resolution.
  pub fn transient<T, F>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.add_internal(None, Lifetime::Transient, factory);
    self
  }

  /// Alias of [`Container::scoped`].
  pub fn register<T, F>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.scoped(factory)
  }

  pub fn add<T, F>(&self, lifetime: Lifetime, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.add_internal(None, lifetime, factory);
    self
  }

  pub fn add_with_name<T, F>(&self, name: &str, lifetime: Lifetime, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
  {
    self.add_internal(Some(name), lifetime, factory);
    self
  }

  // --- Trait Registration ---

  /// Registers a trait object, e.g. `add_trait::<dyn Greeter, _>(..)`.
  pub fn add_trait<I, F>(&self, lifetime: Lifetime, factory: F) -> &Self
  where
    I: ?Sized + Any + Send + Sync,
    F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
  {
    self.add_trait_internal(None, lifetime, factory);
    self
  }

  pub fn add_trait_with_name<I, F>(&self, name: &str, lifetime: Lifetime, factory: F) -> &Self
  where
    I: ?Sized + Any + Send + Sync,
    F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
  {
    self.add_trait_internal(Some(name), lifetime, factory);
    self
  }

  // --- Instance Registration ---

  /// Registers an already constructed value as a singleton.
  pub fn add_instance<T: Any + Send + Sync>(&self, instance: T) -> &Self {
    self.add_instance_internal(None, instance);
    self
  }

  pub fn add_instance_with_name<T: Any + Send + Sync>(&self, name: &str, instance: T) -> &Self {
    self.add_instance_internal(Some(name), instance);
    self
  }

  /// Whether `T` is registered on this container or any ancestor.
  pub fn is_registered<T: ?Sized + Any>(&self) -> bool {
    self.lookup(&ServiceKey::of::<T>()).is_some()
  }

  pub fn is_registered_named<T: ?Sized + Any>(&self, name: &str) -> bool {
    self.lookup(&ServiceKey::named::<T>(name)).is_some()
  }

  // --- Resolution ---

  /// Resolves `T` according to its registered lifetime.
  ///
  /// Singletons already constructed anywhere in the chain are returned first.
  /// Otherwise the nearest registration, searching from this container up to
  /// the root, decides how the instance is produced. Factories receive this
  /// container, so their own dependencies resolve in the same scope.
  ///
  /// # Errors
  ///
  /// - [`Error::UnregisteredDependency`] if no container in the chain has a
  ///   registration for `T`.
  /// - [`Error::AsyncFactoryRequiresAsync`] if `T` was registered with an
  ///   async factory.
  /// - Whatever the factory returns; failed constructions are not cached.
  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    let instance = self.resolve_key(&key)?;
    downcast::<T>(&key, &instance)
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    let key = ServiceKey::named::<T>(name);
    let instance = self.resolve_key(&key)?;
    downcast::<T>(&key, &instance)
  }

  // --- Scopes ---

  /// Creates a child scope.
  ///
  /// The child starts with no registrations of its own and an empty scope
  /// cache, falls back to this container for lookups, and shares this
  /// container's singleton store.
  pub fn create_scope(&self) -> Container {
    let child = Self {
      inner: Arc::new(Inner {
        id: ScopeId::next(),
        depth: self.inner.depth + 1,
        registrations: DashMap::new(),
        scope_cache: InstanceCache::default(),
        singletons: Arc::clone(&self.inner.singletons),
        parent: Some(self.clone()),
      }),
    };
    debug!(
      scope_id = %child.id(),
      parent_id = %self.id(),
      depth = child.depth(),
      "created child scope"
    );
    child
  }

  /// Drops every constructed singleton in this container's chain.
  ///
  /// Registrations are kept, so the next resolution constructs a new instance.
  /// A singleton whose factory is running during the call is not cleared: it
  /// is published once the factory returns and then shared as usual. This is
  /// a test isolation hook; clearing while other threads resolve is allowed
  /// but only the instances already built are discarded.
  pub fn clear_singletons(&self) {
    debug!(
      scope_id = %self.id(),
      count = self.singleton_cache().len(),
      "clearing singleton instances"
    );
    self.singleton_cache().clear();
  }

  /// Drops this container's own scoped instances.
  pub fn clear_scope_cache(&self) {
    self.scope_cache().clear();
  }

  /// Number of singletons constructed so far in this chain.
  pub fn singleton_count(&self) -> usize {
    self.singleton_cache().len()
  }

  /// Number of scoped instances cached by this container.
  pub fn scoped_count(&self) -> usize {
    self.scope_cache().len()
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("id", &self.inner.id)
      .field("depth", &self.inner.depth)
      .field("registrations", &self.inner.registrations.len())
      .field("scoped_instances", &self.inner.scope_cache.len())
      .finish()
  }
}
