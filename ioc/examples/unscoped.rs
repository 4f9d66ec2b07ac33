use fibre_scope::{Builder, ContainerError, Definition, APP, REQUEST, SUB_REQUEST};

fn main() -> Result<(), ContainerError> {
  let mut builder = Builder::with_default_scopes();
  builder.add([
    Definition::from_fn("audit", SUB_REQUEST, |_| String::from("audit trail"))
      .with_release(|_: &String| println!("Audit trail released")),
    Definition::from_fn("user", REQUEST, |_| String::from("guest")),
  ])?;
  builder.set("version", "1.0.0")?;

  let app = builder.build();
  println!("Root scope: {} (sub-scopes: {:?})", app.scope(), app.sub_scopes());

  // `audit` lives two scopes below the root.
  match app.safe_get("audit") {
    Err(err @ ContainerError::ScopeUnreachable { .. }) => println!("Strict lookup: {}", err),
    other => println!("Unexpected: {:?}", other.map(|_| ())),
  }

  let mut audit = None;
  app.unscoped_fill::<String>("audit", &mut audit)?;
  println!("Unscoped lookup: {:?}", audit.as_deref());
  println!("Live sub-containers: {}", app.child_count());

  app.clean()?;
  println!("Live sub-containers after clean: {}", app.child_count());

  let version = app.get_as::<&'static str>("version");
  println!("Version {} ({}-scoped)", version, APP);
  println!("`user` is {}-scoped", REQUEST);

  app.delete()
}
