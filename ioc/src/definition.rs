//! Blueprints describing how, where and for how long an object is built.

use std::any::{type_name, Any, TypeId};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{ContainerError, Result as ContainerResult};

/// A built object, type-erased. Use [`Container::safe_get_as`] or
/// [`Container::fill`] to get it back with its concrete type.
pub type Object = Arc<dyn Any + Send + Sync>;

/// The error a build function may fail with.
pub type BuildError = Box<dyn StdError + Send + Sync>;

pub(crate) type BuildFn = dyn Fn(&Container) -> Result<Object, BuildError> + Send + Sync;
// Returns `false` if the object was not of the type the callback expects.
pub(crate) type ReleaseFn = dyn Fn(&Object) -> bool + Send + Sync;

/// An immutable blueprint for one named object.
///
/// A definition names the scope its object belongs to, the function that builds
/// it and, optionally, a release callback run when the owning container is
/// deleted. The build function receives the container the object is built in and
/// can resolve its own dependencies through it.
///
/// ```
/// use fibre_scope::{Definition, REQUEST};
///
/// struct Session {
///   user: String,
/// }
///
/// let def = Definition::new("session", REQUEST, |_ctn| {
///   Ok::<_, std::io::Error>(Session { user: "guest".into() })
/// })
/// .with_release(|session: &Session| println!("closing session for {}", session.user));
///
/// assert_eq!(def.name(), "session");
/// assert!(def.has_release());
/// ```
#[derive(Clone)]
pub struct Definition {
  pub(crate) name: String,
  pub(crate) scope: String,
  pub(crate) build: Arc<BuildFn>,
  pub(crate) unshared: bool,
  pub(crate) release: Option<Arc<ReleaseFn>>,
  pub(crate) type_name: &'static str,
  type_id: TypeId,
  // The type the release callback expects, checked against `type_id` by `check`.
  release_type: Option<(TypeId, &'static str)>,
  prebuilt: bool,
}

impl Definition {
  /// Creates a shared definition whose object is built by `build`.
  pub fn new<T, E, F>(name: impl Into<String>, scope: impl Into<String>, build: F) -> Self
  where
    T: Any + Send + Sync,
    E: Into<BuildError>,
    F: Fn(&Container) -> Result<T, E> + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      scope: scope.into(),
      build: Arc::new(move |ctn: &Container| -> Result<Object, BuildError> {
        match build(ctn) {
          Ok(value) => Ok(Arc::new(value)),
          Err(e) => Err(e.into()),
        }
      }),
      unshared: false,
      release: None,
      type_name: type_name::<T>(),
      type_id: TypeId::of::<T>(),
      release_type: None,
      prebuilt: false,
    }
  }

  /// Like [`Definition::new`] for build functions that cannot fail.
  pub fn from_fn<T, F>(name: impl Into<String>, scope: impl Into<String>, build: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> T + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      scope: scope.into(),
      build: Arc::new(move |ctn: &Container| -> Result<Object, BuildError> { Ok(Arc::new(build(ctn))) }),
      unshared: false,
      release: None,
      type_name: type_name::<T>(),
      type_id: TypeId::of::<T>(),
      release_type: None,
      prebuilt: false,
    }
  }

  /// Creates a definition for an object that already exists.
  ///
  /// Every lookup returns a clone of the same `Arc`, so such a definition
  /// cannot be made [`unshared`](Definition::unshared): [`Builder::add`](crate::Builder::add)
  /// rejects it.
  pub fn instance<T>(name: impl Into<String>, scope: impl Into<String>, value: T) -> Self
  where
    T: Any + Send + Sync,
  {
    let object: Object = Arc::new(value);
    Self {
      name: name.into(),
      scope: scope.into(),
      build: Arc::new(move |_: &Container| -> Result<Object, BuildError> { Ok(Arc::clone(&object)) }),
      unshared: false,
      release: None,
      type_name: type_name::<T>(),
      type_id: TypeId::of::<T>(),
      release_type: None,
      prebuilt: true,
    }
  }

  /// Marks the definition as unshared: every lookup builds a fresh object and
  /// nothing is cached.
  ///
  /// Not allowed on [`Definition::instance`] definitions.
  pub fn unshared(mut self) -> Self {
    self.unshared = true;
    self
  }

  /// Sets the callback run on the object when its container is deleted.
  ///
  /// `T` has to be the type the build function produces. A definition whose
  /// callback expects anything else is rejected by
  /// [`Builder::add`](crate::Builder::add) with `InvalidDefinition`.
  pub fn with_release<T, F>(mut self, release: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(&T) + Send + Sync + 'static,
  {
    self.release = Some(Arc::new(move |object: &Object| match (**object).downcast_ref::<T>() {
      Some(value) => {
        release(value);
        true
      }
      None => false,
    }));
    self.release_type = Some((TypeId::of::<T>(), type_name::<T>()));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn scope(&self) -> &str {
    &self.scope
  }

  pub fn is_unshared(&self) -> bool {
    self.unshared
  }

  pub fn has_release(&self) -> bool {
    self.release.is_some()
  }

  /// Rejects definitions that could never behave as declared.
  pub(crate) fn check(&self) -> ContainerResult<()> {
    if self.prebuilt && self.unshared {
      return Err(ContainerError::InvalidDefinition {
        name: self.name.clone(),
        reason: "a pre-built instance cannot be unshared".to_string(),
      });
    }
    match self.release_type {
      Some((id, release_name)) if id != self.type_id => Err(ContainerError::InvalidDefinition {
        name: self.name.clone(),
        reason: format!(
          "the release callback takes {} but the build function produces {}",
          release_name, self.type_name
        ),
      }),
      _ => Ok(()),
    }
  }

  pub(crate) fn release(&self, object: &Object) {
    let Some(release) = &self.release else {
      return;
    };
    if !release(object) {
      tracing::warn!(
        name = %self.name,
        expected = self.type_name,
        "release callback skipped: object has an unexpected type"
      );
    }
  }
}

impl fmt::Debug for Definition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Definition")
      .field("name", &self.name)
      .field("scope", &self.scope)
      .field("type", &self.type_name)
      .field("unshared", &self.unshared)
      .field("has_release", &self.release.is_some())
      .finish_non_exhaustive()
  }
}
