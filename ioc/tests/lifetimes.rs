use fibre_scope::{Container, Error, Lifetime, ServiceKey};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// --- Test Fixtures ---

struct Config {
  url: String,
}

struct Session {
  config: Arc<Config>,
}

struct Logger;

trait Greeter: Send + Sync {
  fn greet(&self) -> String;
}

struct EnglishGreeter;
impl Greeter for EnglishGreeter {
  fn greet(&self) -> String {
    "Hello!".to_string()
  }
}

#[derive(Debug)]
struct BrokenDependency;

impl std::fmt::Display for BrokenDependency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("dependency is broken")
  }
}

impl std::error::Error for BrokenDependency {}

fn app_container() -> Container {
  let root = Container::new();
  root
    .singleton(|_| {
      Ok(Config {
        url: "postgres://localhost/app".to_string(),
      })
    })
    .scoped(|c| {
      Ok(Session {
        config: c.resolve::<Config>()?,
      })
    })
    .transient(|_| Ok(Logger));
  root
}

// --- Lifetime Tests ---

#[test]
fn test_request_lifetimes_scenario() {
  // Arrange
  let root = app_container();
  let s1 = root.create_scope();
  let s2 = root.create_scope();

  // Act & Assert
  assert!(Arc::ptr_eq(
    &s1.resolve::<Config>().unwrap(),
    &s2.resolve::<Config>().unwrap()
  ));
  assert!(Arc::ptr_eq(
    &s1.resolve::<Session>().unwrap(),
    &s1.resolve::<Session>().unwrap()
  ));
  assert!(!Arc::ptr_eq(
    &s1.resolve::<Session>().unwrap(),
    &s2.resolve::<Session>().unwrap()
  ));
  assert!(!Arc::ptr_eq(
    &s1.resolve::<Logger>().unwrap(),
    &s1.resolve::<Logger>().unwrap()
  ));
}

#[test]
fn test_scoped_factory_resolves_dependencies_from_same_scope() {
  let root = app_container();
  let scope = root.create_scope();

  let session = scope.resolve::<Session>().unwrap();

  assert_eq!(session.config.url, "postgres://localhost/app");
  assert!(Arc::ptr_eq(&session.config, &root.resolve::<Config>().unwrap()));
}

#[test]
fn test_singleton_factory_runs_once() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  let root = Container::new();
  root.singleton(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(Config {
      url: String::new(),
    })
  });

  let first = root.resolve::<Config>().unwrap();
  let second = root.create_scope().resolve::<Config>().unwrap();
  let third = root.create_scope().create_scope().resolve::<Config>().unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert!(Arc::ptr_eq(&first, &third));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(root.singleton_count(), 1);
}

#[test]
fn test_transient_is_fresh_every_time() {
  static CREATED: AtomicUsize = AtomicUsize::new(0);
  struct Ticket(usize);

  let root = Container::new();
  root.transient(|_| Ok(Ticket(CREATED.fetch_add(1, Ordering::SeqCst))));
  let scope = root.create_scope();

  let a = scope.resolve::<Ticket>().unwrap();
  let b = scope.resolve::<Ticket>().unwrap();

  assert_ne!(a.0, b.0);
  assert!(!Arc::ptr_eq(&a, &b));
  assert_eq!(scope.scoped_count(), 0);
  assert_eq!(root.singleton_count(), 0);
}

#[test]
fn test_register_is_an_alias_for_scoped() {
  struct Unit;
  let root = Container::new();
  root.register(|_| Ok(Unit));
  let s1 = root.create_scope();
  let s2 = root.create_scope();

  let a = s1.resolve::<Unit>().unwrap();

  assert!(Arc::ptr_eq(&a, &s1.resolve::<Unit>().unwrap()));
  assert!(!Arc::ptr_eq(&a, &s2.resolve::<Unit>().unwrap()));
}

#[test]
fn test_explicit_lifetime_registration() {
  struct Counter;
  let root = Container::new();
  root.add(Lifetime::Transient, |_| Ok(Counter));

  let a = root.resolve::<Counter>().unwrap();
  let b = root.resolve::<Counter>().unwrap();

  assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn test_named_registrations_are_distinct() {
  let root = Container::new();
  root
    .add_instance_with_name("primary", String::from("db-1"))
    .add_with_name("replica", Lifetime::Singleton, |_| Ok(String::from("db-2")));

  assert_eq!(*root.resolve_named::<String>("primary").unwrap(), "db-1");
  assert_eq!(*root.resolve_named::<String>("replica").unwrap(), "db-2");
  assert!(matches!(
    root.resolve::<String>(),
    Err(Error::UnregisteredDependency { .. })
  ));
}

#[test]
fn test_instance_registration_hands_out_same_arc() {
  struct Settings {
    retries: u32,
  }
  let root = Container::new();
  root.add_instance(Settings { retries: 3 });

  let a = root.resolve::<Settings>().unwrap();
  let b = root.create_scope().resolve::<Settings>().unwrap();

  assert_eq!(a.retries, 3);
  assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_trait_object_resolution() {
  let root = Container::new();
  root.add_trait::<dyn Greeter, _>(Lifetime::Scoped, |_| {
    Ok(Arc::new(EnglishGreeter) as Arc<dyn Greeter>)
  });
  let scope = root.create_scope();

  let a = scope.resolve::<dyn Greeter>().unwrap();
  let b = scope.resolve::<dyn Greeter>().unwrap();

  assert_eq!(a.greet(), "Hello!");
  assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_named_trait_object_resolution() {
  struct GermanGreeter;
  impl Greeter for GermanGreeter {
    fn greet(&self) -> String {
      "Hallo!".to_string()
    }
  }
  let root = Container::new();
  root.add_trait_with_name::<dyn Greeter, _>("german", Lifetime::Singleton, |_| {
    Ok(Arc::new(GermanGreeter) as Arc<dyn Greeter>)
  });

  assert_eq!(root.resolve_named::<dyn Greeter>("german").unwrap().greet(), "Hallo!");
  assert!(root.resolve::<dyn Greeter>().is_err());
}

// --- Error Tests ---

#[test]
fn test_unregistered_dependency_reports_key() {
  struct Missing;
  let root = Container::new();

  let err = root.create_scope().resolve::<Missing>().err().unwrap();

  match &err {
    Error::UnregisteredDependency { key } => assert_eq!(*key, ServiceKey::of::<Missing>()),
    other => panic!("unexpected error: {other}"),
  }
  assert!(err.to_string().contains("Missing"));
}

#[test]
fn test_nested_unregistered_error_propagates_unchanged() {
  struct NeedsMissing;
  struct Missing;
  let root = Container::new();
  root.scoped(|c| {
    c.resolve::<Missing>()?;
    Ok(NeedsMissing)
  });

  let err = root.resolve::<NeedsMissing>().err().unwrap();

  assert_eq!(err.key(), Some(&ServiceKey::of::<Missing>()));
}

#[test]
fn test_failed_factory_is_not_cached() {
  struct Flaky;
  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&attempts);
  let root = Container::new();
  root.singleton(move |_| {
    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
      return Err(Error::factory(BrokenDependency));
    }
    Ok(Flaky)
  });

  let first = root.resolve::<Flaky>();
  let second = root.resolve::<Flaky>();
  let third = root.resolve::<Flaky>();

  assert!(matches!(first, Err(Error::Factory(_))));
  assert!(Arc::ptr_eq(&second.unwrap(), &third.unwrap()));
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_factory_error_source_is_preserved() {
  struct Broken;
  let root = Container::new();
  root.transient(|_| -> fibre_scope::Result<Broken> { Err(Error::factory(BrokenDependency)) });

  let err = root.resolve::<Broken>().err().unwrap();

  let source = std::error::Error::source(&err).unwrap();
  assert_eq!(source.to_string(), "dependency is broken");
}

// --- Cache Maintenance ---

#[test]
fn test_clear_singletons_rebuilds_on_next_resolve() {
  let root = app_container();
  let scope = root.create_scope();
  let before = scope.resolve::<Config>().unwrap();

  scope.clear_singletons();
  let after = root.resolve::<Config>().unwrap();

  assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_clear_scope_cache_only_affects_that_scope() {
  let root = app_container();
  let s1 = root.create_scope();
  let s2 = root.create_scope();
  let s1_before = s1.resolve::<Session>().unwrap();
  let s2_before = s2.resolve::<Session>().unwrap();

  s1.clear_scope_cache();

  assert!(!Arc::ptr_eq(&s1_before, &s1.resolve::<Session>().unwrap()));
  assert!(Arc::ptr_eq(&s2_before, &s2.resolve::<Session>().unwrap()));
}

#[test]
fn test_scoped_instances_drop_with_scope() {
  static DROPS: AtomicUsize = AtomicUsize::new(0);
  struct Connection;
  impl Drop for Connection {
    fn drop(&mut self) {
      DROPS.fetch_add(1, Ordering::SeqCst);
    }
  }

  let root = Container::new();
  root.scoped(|_| Ok(Connection));
  let scope = root.create_scope();
  let conn = scope.resolve::<Connection>().unwrap();

  drop(conn);
  assert_eq!(DROPS.load(Ordering::SeqCst), 0);
  drop(scope);
  assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}
