//! Hooks a host framework calls around one logical unit of work (e.g. one request).

use crate::container::Container;
use crate::error::{Error, Result};
use crate::global::{default_container, remove_current, set_current};
use std::marker::PhantomData;
use tracing::debug;

#[cfg(feature = "tokio")]
use std::future::Future;

/// Keeps a container current until dropped.
///
/// Dropping the guard ends the unit on every exit path, including early
/// returns and unwinding. Inside a [`with_current`](crate::with_current) task
/// the binding is task-local; otherwise it is tied to the creating thread.
#[must_use = "the unit of work ends as soon as the guard is dropped"]
pub struct UnitGuard {
  container: Container,
  _not_send: PhantomData<*const ()>,
}

impl UnitGuard {
  fn install(container: Container) -> Self {
    set_current(container.clone());
    Self {
      container,
      _not_send: PhantomData,
    }
  }

  /// The container bound to this unit.
  pub fn container(&self) -> &Container {
    &self.container
  }
}

impl Drop for UnitGuard {
  fn drop(&mut self) {
    // Unbound during thread teardown, where there is nothing left to pop.
    let removed = remove_current(&self.container);
    drop(removed);
    debug!(
      scope_id = %self.container.id(),
      scoped_instances = self.container.scoped_count(),
      "ended unit of work"
    );
  }
}

fn new_unit_scope() -> Result<Container> {
  let scope = default_container()
    .ok_or(Error::NoDefaultContainerConfigured)?
    .create_scope();
  debug!(scope_id = %scope.id(), "began unit of work");
  Ok(scope)
}

/// Starts a unit of work in the running context: creates a child scope of the default
/// container and makes it current until the returned guard is dropped.
///
/// # Examples
///
/// ```
/// use fibre_scope::{begin_unit, set_default, Container};
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// let root = Container::new();
/// root.scoped(|c| Ok(RequestId(c.id().get())));
/// set_default(root);
///
/// let unit = begin_unit().unwrap();
/// let a = fibre_scope::resolve::<RequestId>().unwrap();
/// let b = fibre_scope::resolve::<RequestId>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// drop(unit);
/// ```
pub fn begin_unit() -> Result<UnitGuard> {
  Ok(UnitGuard::install(new_unit_scope()?))
}

/// Makes an explicit container current until the guard drops, e.g. to
/// substitute a fake container in tests.
pub fn override_current(container: Container) -> UnitGuard {
  debug!(scope_id = %container.id(), "overriding current container");
  UnitGuard::install(container)
}

/// Runs `future` as one unit of work with a fresh child scope of the default
/// container as its current container.
///
/// The scope is discarded when the future completes or is cancelled.
#[cfg(feature = "tokio")]
pub async fn run_unit<F: Future>(future: F) -> Result<F::Output> {
  let scope = new_unit_scope()?;
  let id = scope.id();
  let output = crate::global::with_current(scope, future).await;
  debug!(scope_id = %id, "ended unit of work");
  Ok(output)
}
