//! Thread-per-unit usage: each worker thread opens a unit of work, resolves
//! through the ambient current container and closes the unit on drop.

use fibre_scope::{begin_unit, resolve, set_default, Container};
use std::sync::Arc;
use std::thread;

struct AppConfig {
  name: &'static str,
}

struct Job {
  worker: usize,
  config: Arc<AppConfig>,
}

fn main() {
  let container = Container::new();
  container.singleton(|_| Ok(AppConfig { name: "batch" }));
  set_default(container);

  let workers: Vec<_> = (0..4)
    .map(|worker| {
      thread::spawn(move || {
        let unit = begin_unit().expect("default container is installed");
        unit
          .container()
          .scoped(move |c| Ok(Job { worker, config: c.resolve::<AppConfig>()? }));

        let job = resolve!(Job);
        assert!(Arc::ptr_eq(&job, &resolve!(Job)));
        format!("{} job on worker {}", job.config.name, job.worker)
      })
    })
    .collect();

  for worker in workers {
    println!("{}", worker.join().expect("worker panicked"));
  }
}
