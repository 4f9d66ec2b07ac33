use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::container::Container;
use crate::definition::Definition;
use crate::error::{ContainerError, Result};
use crate::scope::ScopeChain;

/// A definition together with the position of its scope in the chain.
pub(crate) struct Registered {
  pub(crate) def: Definition,
  pub(crate) scope_index: usize,
}

/// The frozen set of definitions shared by every container of one tree.
pub(crate) struct Registry {
  pub(crate) chain: ScopeChain,
  definitions: HashMap<String, Registered>,
}

impl Registry {
  pub(crate) fn get(&self, name: &str) -> Option<&Registered> {
    self.definitions.get(name)
  }
}

/// Collects definitions and produces the root [`Container`].
///
/// All validation happens here: a definition with an unknown scope, a name
/// that is already taken or a release callback for the wrong type is rejected
/// by [`Builder::add`], so a container never sees an invalid registry.
///
/// ```
/// use fibre_scope::{Builder, Definition, APP, REQUEST};
///
/// let mut builder = Builder::with_default_scopes();
/// builder
///   .add([
///     Definition::from_fn("config", APP, |_| String::from("postgres://localhost")),
///     Definition::from_fn("request-id", REQUEST, |_| 42_u64).unshared(),
///   ])
///   .unwrap();
///
/// let app = builder.build();
/// let request = app.sub_container().unwrap();
/// assert_eq!(*request.get_as::<u64>("request-id"), 42);
/// ```
pub struct Builder {
  chain: ScopeChain,
  definitions: HashMap<String, Definition>,
}

impl Builder {
  /// Creates a builder over the given scopes, most general first.
  ///
  /// An empty list selects the default chain `app`, `request`, `subrequest`.
  pub fn new<I, S>(scopes: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Ok(Self::from_chain(ScopeChain::new(scopes)?))
  }

  /// Creates a builder over an already validated chain.
  pub fn from_chain(chain: ScopeChain) -> Self {
    Self {
      chain,
      definitions: HashMap::new(),
    }
  }

  /// Creates a builder over the default chain `app`, `request`, `subrequest`.
  pub fn with_default_scopes() -> Self {
    Self::from_chain(ScopeChain::default())
  }

  pub fn scopes(&self) -> &ScopeChain {
    &self.chain
  }

  /// Registers one or more definitions.
  ///
  /// The batch is validated as a whole: if any definition is rejected, none of
  /// them are registered.
  pub fn add<I>(&mut self, defs: I) -> Result<()>
  where
    I: IntoIterator<Item = Definition>,
  {
    let defs: Vec<Definition> = defs.into_iter().collect();

    let mut batch_names = HashSet::with_capacity(defs.len());
    for def in &defs {
      if !self.chain.contains(&def.scope) {
        return Err(ContainerError::UnknownScope {
          name: def.name.clone(),
          scope: def.scope.clone(),
        });
      }
      if self.definitions.contains_key(&def.name) || !batch_names.insert(def.name.as_str()) {
        return Err(ContainerError::DuplicateName(def.name.clone()));
      }
      def.check()?;
    }

    for def in defs {
      tracing::trace!(name = %def.name, scope = %def.scope, "definition registered");
      self.definitions.insert(def.name.clone(), def);
    }
    Ok(())
  }

  /// Registers an already built value as a shared object of the most general scope.
  pub fn set<T>(&mut self, name: impl Into<String>, value: T) -> Result<()>
  where
    T: Any + Send + Sync,
  {
    let def = Definition::instance(name, self.chain.root().to_string(), value);
    self.add([def])
  }

  pub fn is_defined(&self, name: &str) -> bool {
    self.definitions.contains_key(name)
  }

  pub fn definition(&self, name: &str) -> Option<&Definition> {
    self.definitions.get(name)
  }

  /// Creates the root container, in the most general scope.
  ///
  /// Nothing is built yet; objects are created on first lookup. The builder can
  /// keep being used afterwards: later registrations do not affect containers
  /// that were already built.
  pub fn build(&self) -> Container {
    tracing::debug!(
      scopes = ?self.chain,
      definitions = self.definitions.len(),
      "building root container"
    );
    Container::root(Arc::new(self.registry()))
  }

  fn registry(&self) -> Registry {
    let definitions = self
      .definitions
      .values()
      .map(|def| {
        // `add` guarantees the scope is in the chain.
        let scope_index = self.chain.index_of(&def.scope).unwrap_or_default();
        (
          def.name.clone(),
          Registered {
            def: def.clone(),
            scope_index,
          },
        )
      })
      .collect();

    Registry {
      chain: self.chain.clone(),
      definitions,
    }
  }
}

impl Default for Builder {
  fn default() -> Self {
    Self::with_default_scopes()
  }
}

impl std::fmt::Debug for Builder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Builder")
      .field("scopes", &self.chain)
      .field("definitions", &self.definitions.len())
      .finish()
  }
}
