//! # Fibre Scope
//!
//! A scoped, thread-safe dependency resolution container for Rust.
//!
//! Services are registered against a key (a type, optionally with a name) with
//! one of three lifetimes:
//!
//! - **Singleton**: built once and shared by a root container and every scope
//!   created from it.
//! - **Scoped**: built once per container, so each logical unit of work (for
//!   example one request) gets its own instance.
//! - **Transient**: built on every resolution.
//!
//! ## Core Concepts
//!
//! - **Container**: holds registrations and caches. [`Container::create_scope`]
//!   creates a child that inherits registrations and singletons from its
//!   ancestors and keeps its own scoped instances.
//! - **Current container**: [`set_default`] installs the application container.
//!   A unit of work makes a child scope current with [`begin_unit`] (threads) or
//!   `run_unit` (async tasks), and code inside it resolves services with
//!   [`resolve`] or the [`resolve!`] macro without holding a container.
//! - **Factories** receive the resolving container and return a [`Result`], so
//!   nested `resolve` failures propagate with `?`.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_scope::{begin_unit, resolve, set_default, Container};
//! use std::sync::Arc;
//!
//! struct Config { dsn: String }
//! struct Session { config: Arc<Config> }
//! struct Logger;
//!
//! let root = Container::new();
//! root
//!   .singleton(|_| Ok(Config { dsn: "postgres://localhost/app".into() }))
//!   .scoped(|c| Ok(Session { config: c.resolve::<Config>()? }))
//!   .transient(|_| Ok(Logger));
//! set_default(root);
//!
//! let first = {
//!   let _unit = begin_unit().unwrap();
//!   let session = resolve!(Session);
//!   assert!(Arc::ptr_eq(&session, &resolve!(Session)));
//!   assert!(!Arc::ptr_eq(&resolve!(Logger), &resolve!(Logger)));
//!   session
//! };
//!
//! let _unit = begin_unit().unwrap();
//! let second = resolve!(Session);
//! assert!(!Arc::ptr_eq(&first, &second));
//! assert!(Arc::ptr_eq(&first.config, &second.config));
//! ```

#[cfg(feature = "tokio")]
mod async_impl;
mod container;
mod core;
mod error;
mod global;
mod macros;
mod unit;

pub use crate::core::{Lifetime, ServiceKey};
pub use container::{Container, ScopeId};
pub use error::{BoxError, Error, Result};
pub use global::{
  clear_current, current, default_container, has_current, reset, resolve, resolve_named,
  set_current, set_default,
};
#[cfg(feature = "tokio")]
pub use global::{inherit_current, resolve_async, resolve_named_async, with_current};
#[cfg(feature = "tokio")]
pub use unit::run_unit;
pub use unit::{begin_unit, override_current, UnitGuard};
