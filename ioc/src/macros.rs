//! Public macros for ergonomic, typed resolution.

/// Resolves a typed object from a container, panicking if it cannot be resolved.
///
/// Use it where a missing object is a programmer error. Inside build functions
/// prefer `ctn.safe_get_as::<T>(name)?`, which reports the failure instead.
///
/// # Panics
///
/// Panics if the object is unknown, out of scope, fails to build, or is not of
/// the requested type.
///
/// # Examples
///
/// ```
/// use fibre_scope::{resolve, Builder, Definition, APP};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///   fn greet(&self) -> String;
/// }
/// struct English;
/// impl Greeter for English {
///   fn greet(&self) -> String {
///     "Hello!".to_string()
///   }
/// }
///
/// let mut builder = Builder::with_default_scopes();
/// builder
///   .add([
///     Definition::from_fn("port", APP, |_| 8080_u16),
///     Definition::from_fn("greeter", APP, |_| Arc::new(English) as Arc<dyn Greeter>),
///   ])
///   .unwrap();
/// let app = builder.build();
///
/// let port = resolve!(app, u16, "port");
/// assert_eq!(*port, 8080);
///
/// let greeter = resolve!(app, trait Greeter, "greeter");
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  // Arm for objects registered as `Arc<dyn Trait>`: resolve!(ctn, trait MyTrait, "name")
  ($ctn:expr, trait $trait_ident:ident, $name:expr) => {
    $crate::maybe_resolve!($ctn, trait $trait_ident, $name).unwrap_or_else(|| {
      panic!(
        "Failed to resolve required trait object '{}': {}",
        $name,
        ::std::any::type_name::<dyn $trait_ident>()
      )
    })
  };

  // Arm for a concrete type: resolve!(ctn, MyService, "name")
  ($ctn:expr, $type:ty, $name:expr) => {
    match $ctn.safe_get_as::<$type>($name) {
      Ok(object) => object,
      Err(err) => panic!(
        "Failed to resolve required object '{}' as {}: {}",
        $name,
        ::std::any::type_name::<$type>(),
        err
      ),
    }
  };
}

/// Like [`resolve!`], but returns an `Option` instead of panicking.
///
/// ```
/// use fibre_scope::{maybe_resolve, Builder};
///
/// let app = Builder::with_default_scopes().build();
/// assert!(maybe_resolve!(app, String, "missing").is_none());
/// ```
#[macro_export]
macro_rules! maybe_resolve {
  ($ctn:expr, trait $trait_ident:ident, $name:expr) => {
    $ctn
      .safe_get_as::<::std::sync::Arc<dyn $trait_ident>>($name)
      .ok()
      .map(|object| ::std::sync::Arc::clone(&*object))
  };

  ($ctn:expr, $type:ty, $name:expr) => {
    $ctn.safe_get_as::<$type>($name).ok()
  };
}
