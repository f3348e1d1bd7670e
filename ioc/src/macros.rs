//! Public macros for ambient service resolution.

/// Resolves a service from the current container.
///
/// This macro panics if the service cannot be resolved, which makes missing
/// registrations fail loudly. Use [`try_resolve!`] to get the `Result`.
///
/// # Panics
///
/// If there is no current or default container, the service is not
/// registered, or its factory fails.
///
/// # Examples
///
/// ```
/// use fibre_scope::{resolve, set_default, Container, Lifetime};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// let root = Container::new();
/// root.add_instance_with_name("greeting", String::from("hi"));
/// root.add_trait::<dyn Greeter, _>(Lifetime::Singleton, |_| {
///   Ok(Arc::new(EnglishGreeter) as Arc<dyn Greeter>)
/// });
/// set_default(root);
///
/// assert_eq!(*resolve!(String, "greeting"), "hi");
/// assert_eq!(resolve!(trait Greeter).greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  (trait $trait_ident:ident) => {
    $crate::resolve::<dyn $trait_ident>().unwrap_or_else(|err| {
      panic!(
        "Failed to resolve required trait service {}: {}",
        std::any::type_name::<dyn $trait_ident>(),
        err
      )
    })
  };

  (trait $trait_ident:ident, $name:expr) => {
    $crate::resolve_named::<dyn $trait_ident>($name).unwrap_or_else(|err| {
      panic!(
        "Failed to resolve required trait service {} with name '{}': {}",
        std::any::type_name::<dyn $trait_ident>(),
        $name,
        err
      )
    })
  };

  ($type:ty) => {
    $crate::resolve::<$type>().unwrap_or_else(|err| {
      panic!(
        "Failed to resolve required service {}: {}",
        std::any::type_name::<$type>(),
        err
      )
    })
  };

  ($type:ty, $name:expr) => {
    $crate::resolve_named::<$type>($name).unwrap_or_else(|err| {
      panic!(
        "Failed to resolve required service {} with name '{}': {}",
        std::any::type_name::<$type>(),
        $name,
        err
      )
    })
  };
}

/// Like [`resolve!`], but returns the `Result` instead of panicking.
#[macro_export]
macro_rules! try_resolve {
  (trait $trait_ident:ident) => {
    $crate::resolve::<dyn $trait_ident>()
  };

  (trait $trait_ident:ident, $name:expr) => {
    $crate::resolve_named::<dyn $trait_ident>($name)
  };

  ($type:ty) => {
    $crate::resolve::<$type>()
  };

  ($type:ty, $name:expr) => {
    $crate::resolve_named::<$type>($name)
  };
}
