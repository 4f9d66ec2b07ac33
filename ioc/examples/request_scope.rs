use fibre_scope::{resolve, Builder, ContainerError, Definition, APP, REQUEST};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// A shared connection pool, built once for the whole application.
struct Pool {
  dsn: String,
}

// A per-request handler that borrows the pool.
struct Handler {
  request_id: usize,
  pool: Arc<Pool>,
}

fn main() -> Result<(), ContainerError> {
  let next_request = Arc::new(AtomicUsize::new(1));

  let mut builder = Builder::with_default_scopes();
  builder.add([
    Definition::from_fn("pool", APP, |_| {
      println!("Opening pool...");
      Pool {
        dsn: "postgres://localhost/app".to_string(),
      }
    })
    .with_release(|pool: &Pool| println!("Closing pool {}", pool.dsn)),
    Definition::new("handler", REQUEST, move |ctn| {
      Ok::<_, ContainerError>(Handler {
        request_id: next_request.fetch_add(1, Ordering::SeqCst),
        pool: ctn.safe_get_as("pool")?,
      })
    })
    .with_release(|handler: &Handler| println!("Finished request #{}", handler.request_id)),
  ])?;

  let app = builder.build();

  for _ in 0..3 {
    let request = app.sub_container()?;
    let handler = resolve!(request, Handler, "handler");
    println!(
      "Handling request #{} with {}",
      handler.request_id, handler.pool.dsn
    );
    request.delete()?;
  }

  app.delete()
}
