use fibre_scope::{Builder, Container, ContainerError, Definition, APP, REQUEST, SUB_REQUEST};
use pretty_assertions::assert_eq;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// --- Test Fixtures ---

struct Database {
  id: usize,
}

struct RequestContext {
  id: usize,
  db: Arc<Database>,
}

struct Counters {
  built: AtomicUsize,
  released: AtomicUsize,
}

impl Counters {
  fn new() -> Arc<Self> {
    Arc::new(Self {
      built: AtomicUsize::new(0),
      released: AtomicUsize::new(0),
    })
  }
}

/// `db` in the app scope, `ctx` in the request scope, `step` in the sub-request scope.
fn build_app(counters: &Arc<Counters>) -> Container {
  let (db_built, db_released) = (Arc::clone(counters), Arc::clone(counters));
  let (ctx_built, ctx_released) = (Arc::clone(counters), Arc::clone(counters));
  let step_released = Arc::clone(counters);

  let mut builder = Builder::with_default_scopes();
  builder
    .add([
      Definition::from_fn("db", APP, move |_| Database {
        id: db_built.built.fetch_add(1, Ordering::SeqCst),
      })
      .with_release(move |_: &Database| {
        db_released.released.fetch_add(1, Ordering::SeqCst);
      }),
      Definition::new("ctx", REQUEST, move |ctn| {
        Ok::<_, ContainerError>(RequestContext {
          id: ctx_built.built.fetch_add(1, Ordering::SeqCst),
          db: ctn.safe_get_as("db")?,
        })
      })
      .with_release(move |_: &RequestContext| {
        ctx_released.released.fetch_add(1, Ordering::SeqCst);
      }),
      Definition::from_fn("step", SUB_REQUEST, |_| String::from("step"))
        .with_release(move |_: &String| {
          step_released.released.fetch_add(1, Ordering::SeqCst);
        }),
    ])
    .unwrap();
  builder.build()
}

// --- Scope Tests ---

#[test]
fn test_root_scoped_object_is_shared_by_all_descendants() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);
  let request_a = app.sub_container().unwrap();
  let request_b = app.sub_container().unwrap();
  let sub = request_b.sub_container().unwrap();

  // Act
  let from_a = request_a.get_as::<Database>("db");
  let from_b = request_b.get_as::<Database>("db");
  let from_sub = sub.get_as::<Database>("db");

  // Assert
  assert!(Arc::ptr_eq(&from_a, &from_b));
  assert!(Arc::ptr_eq(&from_a, &from_sub));
  assert!(Arc::ptr_eq(&from_a, &app.get_as::<Database>("db")));
  assert_eq!(from_a.id, 0);
}

#[test]
fn test_request_scoped_object_is_per_container() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);
  let request_a = app.sub_container().unwrap();
  let request_b = app.sub_container().unwrap();

  // Act
  let a1 = request_a.get_as::<RequestContext>("ctx");
  let a2 = request_a.get_as::<RequestContext>("ctx");
  let b = request_b.get_as::<RequestContext>("ctx");
  // Resolved from a sub-request, it is the one of the enclosing request.
  let from_sub = request_a.sub_container().unwrap().get_as::<RequestContext>("ctx");

  // Assert
  assert!(Arc::ptr_eq(&a1, &a2));
  assert!(Arc::ptr_eq(&a1, &from_sub));
  assert!(!Arc::ptr_eq(&a1, &b));
  assert_ne!(a1.id, b.id);
  assert!(Arc::ptr_eq(&a1.db, &b.db));
}

#[test]
fn test_strict_lookup_cannot_reach_narrower_scope() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);
  let request = app.sub_container().unwrap();

  // Act
  let from_app = app.safe_get("ctx").unwrap_err();
  let from_request = request.safe_get("step").unwrap_err();

  // Assert
  match from_app {
    ContainerError::ScopeUnreachable {
      name,
      definition_scope,
      container_scope,
    } => {
      assert_eq!(name, "ctx");
      assert_eq!(definition_scope, REQUEST);
      assert_eq!(container_scope, APP);
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(matches!(from_request, ContainerError::ScopeUnreachable { .. }));
  assert_eq!(counters.built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unscoped_lookup_builds_in_ephemeral_chain_until_clean() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);

  // Act
  let ctx1 = app.unscoped_get("ctx");
  let ctx2 = app.unscoped_get("ctx");

  // Assert: the ephemeral request container is reused until cleaned.
  assert!(Arc::ptr_eq(&ctx1, &ctx2));
  assert_eq!(app.child_count(), 1);

  app.clean().unwrap();
  assert_eq!(app.child_count(), 0);
  assert_eq!(counters.released.load(Ordering::SeqCst), 1);

  // After cleaning, a new ephemeral chain builds a new object.
  let ctx3 = app.unscoped_get("ctx");
  assert!(!Arc::ptr_eq(&ctx1, &ctx3));
  app.clean().unwrap();
}

#[test]
fn test_unscoped_lookup_spans_several_scopes() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);

  // Act: `step` is two scopes below the root.
  let mut step: Option<Arc<String>> = None;
  app.unscoped_fill("step", &mut step).unwrap();
  let ctx = app.unscoped_get("ctx");

  // Assert
  assert_eq!(step.as_deref().map(String::as_str), Some("step"));
  assert!(ctx.downcast_ref::<RequestContext>().is_some());
  assert_eq!(app.child_count(), 1);

  app.clean().unwrap();
  // `step` and `ctx` are released with the ephemeral chain, `db` stays with the root.
  assert_eq!(counters.released.load(Ordering::SeqCst), 2);
  app.delete().unwrap();
  assert_eq!(counters.released.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unscoped_lookup_of_general_object_uses_ancestor() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);
  let request = app.sub_container().unwrap();

  // Act
  let db = request.unscoped_safe_get("db").unwrap();

  // Assert: no ephemeral container is needed.
  assert_eq!(request.child_count(), 0);
  assert!(Arc::ptr_eq(
    &db.downcast::<Database>().unwrap(),
    &app.get_as::<Database>("db")
  ));
}

#[test]
fn test_clean_without_ephemeral_chain_is_noop() {
  let counters = Counters::new();
  let app = build_app(&counters);
  app.clean().unwrap();
  assert!(!app.is_closed());
}

#[test]
fn test_sub_container_stops_at_most_specific_scope() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);
  let sub = app.sub_container().unwrap().sub_container().unwrap();

  // Act
  let err = sub.sub_container().unwrap_err();

  // Assert
  assert!(matches!(err, ContainerError::NoMoreScopes { ref scope } if scope == SUB_REQUEST));
}

#[test]
fn test_scope_introspection() {
  // Arrange
  let counters = Counters::new();
  let app = build_app(&counters);
  let request = app.sub_container().unwrap();

  // Assert
  assert_eq!(app.scope(), APP);
  assert_eq!(request.scope(), REQUEST);
  assert_eq!(request.scopes().iter().collect::<Vec<_>>(), vec![APP, REQUEST, SUB_REQUEST]);
  assert_eq!(request.parent_scopes(), &[APP.to_string()]);
  assert_eq!(request.sub_scopes(), &[SUB_REQUEST.to_string()]);
  assert_eq!(request.parent(), Some(app.clone()));
  assert_eq!(app.parent(), None);
}

#[test]
fn test_dependency_on_narrower_scope_fails_the_build() {
  // Arrange: an app-scoped object cannot depend on a request-scoped one.
  let mut builder = Builder::with_default_scopes();
  builder
    .add([
      Definition::from_fn("user", REQUEST, |_| String::from("alice")),
      Definition::new("cache", APP, |ctn| {
        let user = ctn.safe_get_as::<String>("user")?;
        Ok::<_, ContainerError>(format!("cache for {user}"))
      }),
    ])
    .unwrap();
  let request = builder.build().sub_container().unwrap();

  // Act
  let err = request.safe_get("cache").unwrap_err();

  // Assert
  match err {
    ContainerError::BuildFailed { name, source } => {
      assert_eq!(name, "cache");
      assert!(source.to_string().contains("more specific"));
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn test_app_request_scenario() {
  // Arrange
  let released = Arc::new(AtomicUsize::new(0));
  let on_release = Arc::clone(&released);
  let next_id = Arc::new(AtomicUsize::new(0));

  let mut builder = Builder::new(["App", "Request"]).unwrap();
  builder
    .add([
      Definition::from_fn("db", "App", |_| String::from("connection"))
        .with_release(move |_: &String| {
          on_release.fetch_add(1, Ordering::SeqCst);
        }),
      Definition::from_fn("req-id", "Request", move |_| next_id.fetch_add(1, Ordering::SeqCst)).unshared(),
    ])
    .unwrap();
  let root = builder.build();
  let first = root.sub_container().unwrap();
  let second = root.sub_container().unwrap();

  // Act & Assert: shared across requests.
  assert!(Arc::ptr_eq(&first.get_as::<String>("db"), &second.get_as::<String>("db")));

  // Unshared: two lookups, two instances.
  let id1 = first.get_as::<usize>("req-id");
  let id2 = first.get_as::<usize>("req-id");
  assert!(!Arc::ptr_eq(&id1, &id2));

  // Out of reach from the root, except through the unscoped API.
  assert!(matches!(
    root.safe_get("req-id"),
    Err(ContainerError::ScopeUnreachable { .. })
  ));
  assert!(root.unscoped_safe_get("req-id").is_ok());
  assert_eq!(root.child_count(), 3);
  root.clean().unwrap();
  assert_eq!(root.child_count(), 2);

  // Teardown releases `db` exactly once.
  first.delete().unwrap();
  second.delete().unwrap();
  root.delete().unwrap();
  assert_eq!(released.load(Ordering::SeqCst), 1);
}
