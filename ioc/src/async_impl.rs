//! Async factories and async resolution for [`Container`].

use crate::container::Container;
use crate::core::{downcast, erase, AsyncFactory, Erased, Factory, Lifetime, ServiceKey};
use crate::error::Result;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, trace};

impl Container {
  fn add_async_internal<T, F, Fut>(&self, name: Option<&str>, lifetime: Lifetime, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let factory: AsyncFactory = Arc::new(move |c: Container| {
      factory(c)
        .map(|result| result.map(|v| erase(Arc::new(v))))
        .boxed()
    });
    self.insert(ServiceKey::for_name::<T>(name), lifetime, Factory::Async(factory));
  }

  /// Registers `T` as a singleton built by an async factory.
  ///
  /// Concurrent first resolutions through [`Container::resolve_async`] run the
  /// factory once; the other callers suspend until it has published.
  ///
  /// # Examples
  ///
  /// ```
  /// use fibre_scope::Container;
  ///
  /// struct Pool { size: usize }
  ///
  /// # #[tokio::main(flavor = "current_thread")]
  /// # async fn main() {
  /// let root = Container::new();
  /// root.singleton_async(|_| async { Ok(Pool { size: 8 }) });
  ///
  /// let pool = root.create_scope().resolve_async::<Pool>().await.unwrap();
  /// assert_eq!(pool.size, 8);
  /// # }
  /// ```
  pub fn singleton_async<T, F, Fut>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    self.add_async_internal(None, Lifetime::Singleton, factory);
    self
  }

  pub fn scoped_async<T, F, Fut>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    self.add_async_internal(None, Lifetime::Scoped, factory);
    self
  }

  pub fn transient_async<T, F, Fut>(&self, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    self.add_async_internal(None, Lifetime::Transient, factory);
    self
  }

  pub fn add_async_with_name<T, F, Fut>(&self, name: &str, lifetime: Lifetime, factory: F) -> &Self
  where
    T: Any + Send + Sync,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    self.add_async_internal(Some(name), lifetime, factory);
    self
  }

  async fn resolve_key_async(&self, key: &ServiceKey) -> Result<Erased> {
    if let Some(instance) = self.singleton_cache().get(key) {
      trace!(service = key.type_name(), name = key.name(), "singleton cache hit");
      return Ok(instance);
    }

    let registration = self.lookup(key).ok_or_else(|| self.unregistered(key))?;
    let cache = match registration.lifetime {
      Lifetime::Singleton => self.singleton_cache(),
      Lifetime::Scoped => {
        if let Some(instance) = self.scope_cache().get(key) {
          trace!(service = key.type_name(), scope_id = %self.id(), "scope cache hit");
          return Ok(instance);
        }
        self.scope_cache()
      }
      Lifetime::Transient => {
        trace!(service = key.type_name(), name = key.name(), "creating transient instance");
        return match registration.factory {
          Factory::Sync(factory) => factory(self),
          Factory::Async(factory) => factory(self.clone()).await,
        };
      }
    };

    let lifetime = registration.lifetime;
    let slot = cache.slot(key);
    match registration.factory {
      Factory::Sync(factory) => slot.get_or_try_init(|| {
        info!(service = key.type_name(), %lifetime, scope_id = %self.id(), "instantiating service");
        factory(self)
      }),
      Factory::Async(factory) => {
        slot
          .get_or_try_init_async(|| {
            debug!(service = key.type_name(), %lifetime, scope_id = %self.id(), "awaiting async factory");
            factory(self.clone())
          })
          .await
      }
    }
  }

  /// Resolves `T`, awaiting async factories where needed.
  ///
  /// Follows the same lookup and caching rules as [`Container::resolve`] and
  /// also accepts services registered with synchronous factories.
  pub async fn resolve_async<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    let instance = self.resolve_key_async(&key).await?;
    downcast::<T>(&key, &instance)
  }

  pub async fn resolve_named_async<T: ?Sized + Any + Send + Sync>(
    &self,
    name: &str,
  ) -> Result<Arc<T>> {
    let key = ServiceKey::named::<T>(name);
    let instance = self.resolve_key_async(&key).await?;
    downcast::<T>(&key, &instance)
  }
}
