//! Simulates a request-handling server: one scope per request, shared
//! singletons, per-request sessions and fresh loggers.
//!
//! Run with `RUST_LOG=fibre_scope=debug cargo run --example request_scope`.

use fibre_scope::{resolve_async, run_unit, set_default, Container, Error};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct DatabaseConfig {
  connection_string: String,
}

struct DatabaseSession {
  id: u64,
  config: Arc<DatabaseConfig>,
}

struct UserRepository {
  db: Arc<DatabaseSession>,
}

impl UserRepository {
  fn get_user(&self, user_id: u32) -> String {
    format!(
      "user {} via session {} on {}",
      user_id, self.db.id, self.db.config.connection_string
    )
  }
}

struct RequestLogger {
  id: u64,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn setup_container() -> Container {
  let container = Container::new();
  container
    .singleton_async(|_| async {
      // Stands in for loading configuration from a remote store.
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok(DatabaseConfig {
        connection_string: "postgresql://localhost/mydb".to_string(),
      })
    })
    .scoped_async(|c| async move {
      Ok(DatabaseSession {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        config: c.resolve_async::<DatabaseConfig>().await?,
      })
    })
    .scoped_async(|c| async move {
      Ok(UserRepository {
        db: c.resolve_async::<DatabaseSession>().await?,
      })
    })
    .transient(|_| {
      Ok(RequestLogger {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
      })
    });
  container
}

async fn handle_request(user_id: u32) -> Result<String, Error> {
  let repo = resolve_async::<UserRepository>().await?;
  let session = resolve_async::<DatabaseSession>().await?;
  let logger = resolve_async::<RequestLogger>().await?;

  assert!(Arc::ptr_eq(&repo.db, &session));
  println!("[logger {}] handling user {}", logger.id, user_id);
  Ok(repo.get_user(user_id))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  set_default(setup_container());

  let requests: Vec<_> = (1..=3)
    .map(|user_id| tokio::spawn(run_unit(handle_request(user_id))))
    .collect();

  for request in requests {
    match request.await {
      Ok(Ok(Ok(response))) => println!("{}", response),
      Ok(Ok(Err(err))) | Ok(Err(err)) => eprintln!("request failed: {}", err),
      Err(join_err) => eprintln!("request task panicked: {}", join_err),
    }
  }
  Ok(())
}
