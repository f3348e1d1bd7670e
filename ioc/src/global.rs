//! The process-wide default container and the context-local "current" container.
//!
//! Ambient resolution asks [`current`] for the active container instead of
//! having a container threaded through every call. The lookup order is:
//!
//! 1. the innermost container of the running tokio task, if the task was
//!    entered through [`with_current`],
//! 2. otherwise the innermost container pushed on this thread,
//! 3. the default container installed with [`set_default`].
//!
//! [`set_current`], [`clear_current`] and unit guards write to the task's
//! stack when one is reachable and to the thread's stack otherwise. Async units
//! must therefore start with [`with_current`] (or `run_unit`): a task can
//! migrate between worker threads and several tasks share a thread.

use crate::container::Container;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(feature = "tokio")]
use std::future::Future;

// Installed once at startup, replaced only for test isolation.
static DEFAULT_CONTAINER: Lazy<RwLock<Option<Container>>> = Lazy::new(|| RwLock::new(None));

thread_local! {
  static THREAD_CURRENT: RefCell<Vec<Container>> = const { RefCell::new(Vec::new()) };
}

#[cfg(feature = "tokio")]
tokio::task_local! {
  static TASK_CURRENT: RefCell<Vec<Container>>;
}

/// Runs `f` against the stack of the running context: the task's stack inside
/// [`with_current`], the thread's stack otherwise. `None` during thread-local
/// teardown.
fn with_stack<R>(f: impl FnOnce(&RefCell<Vec<Container>>) -> R) -> Option<R> {
  #[cfg(feature = "tokio")]
  if TASK_CURRENT.try_with(|_| ()).is_ok() {
    return TASK_CURRENT.try_with(f).ok();
  }
  THREAD_CURRENT.try_with(f).ok()
}

/// Installs the fallback container used when no unit of work is active.
///
/// Replacing an existing default orphans its singletons; they are not merged
/// into the new container.
pub fn set_default(container: Container) {
  let previous = DEFAULT_CONTAINER.write().replace(container);
  debug!(replaced = previous.is_some(), "installed default container");
}

pub fn default_container() -> Option<Container> {
  DEFAULT_CONTAINER.read().clone()
}

/// Makes `container` current until the matching [`clear_current`].
///
/// Calls nest: clearing restores whichever container was current before.
///
/// Inside a future run by [`with_current`] (or `run_unit`) the binding belongs
/// to that task, so other tasks polled on the same thread never see it.
/// Outside one it belongs to the calling thread, which is only safe for
/// synchronous units: async units must be entered through [`with_current`].
pub fn set_current(container: Container) {
  debug!(scope_id = %container.id(), "set current container");
  if with_stack(|stack| stack.borrow_mut().push(container)).is_none() {
    warn!("set_current called during thread teardown");
  }
}

/// Ends the innermost [`set_current`] of this task or thread and returns its
/// container.
pub fn clear_current() -> Option<Container> {
  let cleared = with_stack(|stack| stack.borrow_mut().pop()).flatten();
  match &cleared {
    Some(container) => debug!(scope_id = %container.id(), "cleared current container"),
    None => warn!("clear_current called with no current container"),
  }
  cleared
}

/// Removes one specific container from the current stack, wherever it sits.
///
/// The removed handle is returned so it is dropped after the stack's borrow
/// ends; instance destructors may consult the tracker.
pub(crate) fn remove_current(container: &Container) -> Option<Container> {
  with_stack(|stack| {
    let mut stack = stack.borrow_mut();
    let pos = stack.iter().rposition(|c| Container::ptr_eq(c, container))?;
    Some(stack.remove(pos))
  })
  .flatten()
}

fn unit_current() -> Option<Container> {
  with_stack(|stack| stack.borrow().last().cloned()).flatten()
}

/// Whether a unit of work has a container bound, as opposed to falling back to
/// the default.
pub fn has_current() -> bool {
  unit_current().is_some()
}

/// Returns the active container.
///
/// # Errors
///
/// [`Error::NoDefaultContainerConfigured`] if no unit-bound container is active
/// and [`set_default`] has not been called.
pub fn current() -> Result<Container> {
  unit_current()
    .or_else(default_container)
    .ok_or(Error::NoDefaultContainerConfigured)
}

/// Clears the default container and the current containers of this task or
/// thread.
///
/// Meant for test isolation. Singletons cached by the old default are dropped
/// along with it once nothing else references that container chain.
pub fn reset() {
  let previous = DEFAULT_CONTAINER.write().take();
  if let Some(previous) = &previous {
    previous.clear_singletons();
  }
  // Dropped outside the borrow.
  let stale = with_stack(|stack| std::mem::take(&mut *stack.borrow_mut()));
  drop(stale);
  drop(previous);
  debug!("reset default and current containers");
}

/// Runs `future` with `container` as the current container of the task.
///
/// The binding is part of the future: it is visible across every await point
/// and gone once the future completes or is dropped.
#[cfg(feature = "tokio")]
pub async fn with_current<F: Future>(container: Container, future: F) -> F::Output {
  TASK_CURRENT.scope(RefCell::new(vec![container]), future).await
}

/// Wraps `future` so it observes the caller's current container.
///
/// Task-local values are not inherited by spawned tasks; wrap the child
/// future before handing it to `tokio::spawn` to keep it in the same unit.
///
/// ```
/// use fibre_scope::{inherit_current, with_current, Container};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scope = Container::new();
/// let outer = scope.clone();
/// with_current(scope, async move {
///   let child = tokio::spawn(inherit_current(async {
///     fibre_scope::current().unwrap()
///   }));
///   assert!(Container::ptr_eq(&child.await.unwrap(), &outer));
/// })
/// .await;
/// # }
/// ```
#[cfg(feature = "tokio")]
pub fn inherit_current<F: Future>(future: F) -> impl Future<Output = F::Output> {
  let captured = unit_current();
  async move {
    match captured {
      Some(container) => TASK_CURRENT.scope(RefCell::new(vec![container]), future).await,
      None => future.await,
    }
  }
}

// --- Ambient resolution ---

/// Resolves `T` from the [`current`] container.
pub fn resolve<T: ?Sized + Any + Send + Sync>() -> Result<Arc<T>> {
  current()?.resolve::<T>()
}

pub fn resolve_named<T: ?Sized + Any + Send + Sync>(name: &str) -> Result<Arc<T>> {
  current()?.resolve_named::<T>(name)
}

#[cfg(feature = "tokio")]
pub async fn resolve_async<T: ?Sized + Any + Send + Sync>() -> Result<Arc<T>> {
  current()?.resolve_async::<T>().await
}

#[cfg(feature = "tokio")]
pub async fn resolve_named_async<T: ?Sized + Any + Send + Sync>(name: &str) -> Result<Arc<T>> {
  current()?.resolve_named_async::<T>(name).await
}
