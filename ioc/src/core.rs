//! Core, non-public data structures shared by the container and the scope tracker.

use crate::container::Container;
use crate::error::{Error, Result};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[cfg(feature = "tokio")]
use futures_util::future::BoxFuture;

/// A type-erased instance. The concrete value is always an `Arc<T>` for the
/// `T` named by the instance's key, which is what lets trait objects be stored.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

pub(crate) type SyncFactory = Arc<dyn Fn(&Container) -> Result<Erased> + Send + Sync>;

#[cfg(feature = "tokio")]
pub(crate) type AsyncFactory =
  Arc<dyn Fn(Container) -> BoxFuture<'static, Result<Erased>> + Send + Sync>;

pub(crate) fn erase<T: ?Sized + Any + Send + Sync>(instance: Arc<T>) -> Erased {
  Arc::new(instance)
}

pub(crate) fn downcast<T: ?Sized + Any + Send + Sync>(
  key: &ServiceKey,
  erased: &Erased,
) -> Result<Arc<T>> {
  erased
    .downcast_ref::<Arc<T>>()
    .cloned()
    .ok_or_else(|| Error::TypeMismatch { key: key.clone() })
}

/// The identity a service is registered and requested under.
///
/// Two keys are equal when they name the same type and the same optional name.
/// The type name is carried for diagnostics only.
#[derive(Clone)]
pub struct ServiceKey {
  type_id: TypeId,
  type_name: &'static str,
  name: Option<String>,
}

impl ServiceKey {
  /// The unnamed key for `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      name: None,
    }
  }

  /// The key for `T` registered under `name`.
  pub fn named<T: ?Sized + Any>(name: &str) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      name: Some(name.to_owned()),
    }
  }

  pub(crate) fn for_name<T: ?Sized + Any>(name: Option<&str>) -> Self {
    match name {
      Some(n) => Self::named::<T>(n),
      None => Self::of::<T>(),
    }
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }
}

impl PartialEq for ServiceKey {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id && self.name == other.name
  }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
    self.name.hash(state);
  }
}

impl fmt::Debug for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "Key({}, Name({}))", self.type_name, name),
      None => write!(f, "Key({})", self.type_name),
    }
  }
}

impl fmt::Display for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "`{}` named '{}'", self.type_name, name),
      None => write!(f, "`{}`", self.type_name),
    }
  }
}

/// How long a resolved instance is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
  /// One instance for the whole container chain.
  Singleton,
  /// One instance per container (per scope).
  Scoped,
  /// A new instance on every resolution.
  Transient,
}

impl fmt::Display for Lifetime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Lifetime::Singleton => "singleton",
      Lifetime::Scoped => "scoped",
      Lifetime::Transient => "transient",
    };
    f.write_str(s)
  }
}

#[derive(Clone)]
pub(crate) enum Factory {
  Sync(SyncFactory),
  #[cfg(feature = "tokio")]
  Async(AsyncFactory),
}

/// A stored registration. Cloning only bumps the factory's refcount, which is
/// how lookups release the registration table before running the factory.
#[derive(Clone)]
pub(crate) struct Registration {
  pub(crate) factory: Factory,
  pub(crate) lifetime: Lifetime,
}

/// A lazily filled, write-once cache slot for one service key.
///
/// Synchronous callers initialize through the blocking cell. Async callers
/// serialize on `init` so a second caller suspends instead of blocking a
/// worker thread while the first one awaits its factory.
#[derive(Default)]
pub(crate) struct Slot {
  value: OnceCell<Erased>,
  #[cfg(feature = "tokio")]
  init: tokio::sync::Mutex<()>,
}

impl Slot {
  pub(crate) fn get(&self) -> Option<&Erased> {
    self.value.get()
  }

  /// Double-checked construction: the cell's fast path is a plain load, and
  /// only callers that find it empty contend for the per-slot lock.
  /// A failed factory leaves the slot empty.
  pub(crate) fn get_or_try_init<F>(&self, init: F) -> Result<Erased>
  where
    F: FnOnce() -> Result<Erased>,
  {
    self.value.get_or_try_init(init).cloned()
  }

  #[cfg(feature = "tokio")]
  pub(crate) async fn get_or_try_init_async<F, Fut>(&self, construct: F) -> Result<Erased>
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Erased>>,
  {
    if let Some(instance) = self.value.get() {
      return Ok(instance.clone());
    }

    let _guard = self.init.lock().await;
    if let Some(instance) = self.value.get() {
      return Ok(instance.clone());
    }

    let instance = construct().await?;
    // A synchronous caller may have published first; its instance wins.
    Ok(self.value.get_or_init(|| instance).clone())
  }
}

/// A map of lazily constructed instances, used for both the shared singleton
/// store and each container's private scope cache.
#[derive(Default)]
pub(crate) struct InstanceCache {
  slots: DashMap<ServiceKey, Arc<Slot>>,
}

impl InstanceCache {
  /// Returns the instance for `key` if it has already been constructed.
  pub(crate) fn get(&self, key: &ServiceKey) -> Option<Erased> {
    self.slots.get(key).and_then(|slot| slot.value().get().cloned())
  }

  /// Returns the slot for `key`, creating an empty one if needed.
  ///
  /// The map guard is released before returning so factories run against the
  /// slot can freely touch other keys of the same map.
  pub(crate) fn slot(&self, key: &ServiceKey) -> Arc<Slot> {
    if let Some(slot) = self.slots.get(key) {
      return Arc::clone(slot.value());
    }
    let slot = self.slots.entry(key.clone()).or_default();
    Arc::clone(slot.value())
  }

  /// Number of constructed instances.
  pub(crate) fn len(&self) -> usize {
    self
      .slots
      .iter()
      .filter(|entry| entry.value().get().is_some())
      .count()
  }

  /// Drops every constructed instance.
  ///
  /// Slots still being initialized are kept, so a construction in flight
  /// publishes into the live cache instead of racing a second one.
  pub(crate) fn clear(&self) {
    let built: Vec<ServiceKey> = self
      .slots
      .iter()
      .filter(|entry| entry.value().get().is_some())
      .map(|entry| entry.key().clone())
      .collect();
    for key in built {
      // Instances drop after the shard lock is released.
      let removed = self.slots.remove(&key);
      drop(removed);
    }
  }
}
