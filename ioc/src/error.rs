use thiserror::Error;

use crate::core::ServiceKey;

/// A boxed error produced by a service factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for registration lookups and service resolution.
#[derive(Debug, Error)]
pub enum Error {
  /// Resolution walked to the root of the container chain without finding a
  /// registration for the requested service.
  #[error("no registration found for service {key}")]
  UnregisteredDependency { key: ServiceKey },

  /// Ambient resolution was attempted before a default container was installed.
  #[error("no default container configured; call `set_default` first")]
  NoDefaultContainerConfigured,

  /// The service was registered with an async factory but resolved synchronously.
  #[error("service {key} has an async factory and must be resolved with `resolve_async`")]
  AsyncFactoryRequiresAsync { key: ServiceKey },

  /// A cached instance did not have the type its key promised.
  #[error("cached instance for service {key} has an unexpected type")]
  TypeMismatch { key: ServiceKey },

  /// The factory itself failed.
  #[error("service factory failed: {0}")]
  Factory(#[source] BoxError),
}

impl Error {
  /// Wraps an arbitrary error raised inside a factory.
  ///
  /// Errors that are already an [`Error`] (for example a failed nested
  /// `resolve`) should be propagated with `?` instead so they reach the caller
  /// unchanged.
  pub fn factory<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    Error::Factory(err.into())
  }

  /// The key of the service this error is about, if any.
  pub fn key(&self) -> Option<&ServiceKey> {
    match self {
      Error::UnregisteredDependency { key }
      | Error::AsyncFactoryRequiresAsync { key }
      | Error::TypeMismatch { key } => Some(key),
      Error::NoDefaultContainerConfigured | Error::Factory(_) => None,
    }
  }
}

/// A specialized `Result` type for `fibre_scope` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
