//! The `Container` handle and the resolution engine behind it.

use std::any::{type_name, Any};
use std::cmp::Ordering as ScopeOrdering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::builder::Registry;
use crate::core::{BuildOutcome, PendingBuild, ResolutionGuard};
use crate::definition::{Definition, Object};
use crate::error::{ContainerError, Result};
use crate::lifecycle::Lifecycle;
use crate::scope::ScopeChain;

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a lookup may descend into scopes the container has not entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
  Scoped,
  Unscoped,
}

/// The tree links of a node, guarded by one lock.
pub(crate) struct Nodes {
  pub(crate) lifecycle: Lifecycle,
  pub(crate) children: HashMap<u64, Arc<ContainerInner>>,
  pub(crate) ephemeral: Option<Arc<ContainerInner>>,
}

pub(crate) struct ContainerInner {
  pub(crate) id: u64,
  pub(crate) registry: Arc<Registry>,
  pub(crate) scope_index: usize,
  pub(crate) parent: Option<Weak<ContainerInner>>,
  pub(crate) nodes: Mutex<Nodes>,
  pub(crate) instances: DashMap<String, Object>,
  pending: Mutex<HashMap<String, Arc<PendingBuild>>>,
  // Unshared objects that have a release callback to run at teardown.
  pub(crate) unshared: Mutex<Vec<(String, Object)>>,
}

/// A node of the scope tree.
///
/// A `Container` lives in exactly one scope of its [`ScopeChain`]. It builds and
/// caches the objects whose definition belongs to that scope, delegates objects
/// of more general scopes to its parent, and refuses (or, through the
/// `unscoped_*` methods, works around) objects of more specific scopes.
///
/// `Container` is a cheap handle: cloning it does not create a new node. A node
/// is owned by its parent until it is deleted, and the node itself only keeps a
/// weak link back to the parent. The handle pins every ancestor, so dropping
/// the root handle never cuts a live child off from the objects above it.
#[derive(Clone)]
pub struct Container {
  pub(crate) inner: Arc<ContainerInner>,
  // Most general first.
  ancestors: Arc<[Arc<ContainerInner>]>,
}

impl ContainerInner {
  fn new(registry: Arc<Registry>, scope_index: usize, parent: Option<Weak<ContainerInner>>) -> Self {
    Self {
      id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
      registry,
      scope_index,
      parent,
      nodes: Mutex::new(Nodes {
        lifecycle: Lifecycle::Open,
        children: HashMap::new(),
        ephemeral: None,
      }),
      instances: DashMap::new(),
      pending: Mutex::new(HashMap::new()),
      unshared: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn scope(&self) -> &str {
    &self.registry.chain.as_slice()[self.scope_index]
  }

  pub(crate) fn is_open(&self) -> bool {
    self.nodes.lock().lifecycle == Lifecycle::Open
  }

  pub(crate) fn closed_error(&self) -> ContainerError {
    ContainerError::ContainerClosed {
      scope: self.scope().to_string(),
    }
  }

  fn ensure_open(&self) -> Result<()> {
    if self.is_open() {
      Ok(())
    } else {
      Err(self.closed_error())
    }
  }

  /// Creates a node in the next scope. The caller decides where to attach it.
  fn new_child(self: &Arc<Self>) -> Result<Arc<ContainerInner>> {
    let next = self.scope_index + 1;
    if next >= self.registry.chain.len() {
      return Err(ContainerError::NoMoreScopes {
        scope: self.scope().to_string(),
      });
    }
    Ok(Arc::new(ContainerInner::new(
      Arc::clone(&self.registry),
      next,
      Some(Arc::downgrade(self)),
    )))
  }

  fn parent_node(&self) -> Result<Arc<ContainerInner>> {
    // Only the root has no parent, and nothing is ever delegated past the root.
    // Every lookup starts from a handle that pins this node's ancestors.
    let parent = self.parent.as_ref().and_then(Weak::upgrade);
    parent.ok_or_else(|| {
      let parent_scope = self.registry.chain.get(self.scope_index.saturating_sub(1));
      ContainerError::ContainerClosed {
        scope: parent_scope.unwrap_or_default().to_string(),
      }
    })
  }

  /// Returns the live ephemeral child, creating it on first use.
  fn ephemeral_child(self: &Arc<Self>) -> Result<Arc<ContainerInner>> {
    let mut nodes = self.nodes.lock();
    if nodes.lifecycle != Lifecycle::Open {
      return Err(self.closed_error());
    }
    if let Some(child) = &nodes.ephemeral {
      return Ok(Arc::clone(child));
    }
    let child = self.new_child()?;
    tracing::debug!(
      parent_scope = self.scope(),
      scope = child.scope(),
      "ephemeral container created"
    );
    nodes.ephemeral = Some(Arc::clone(&child));
    Ok(child)
  }

  fn resolve(self: &Arc<Self>, name: &str, lookup: Lookup) -> Result<Object> {
    self.ensure_open()?;
    let entry = self
      .registry
      .get(name)
      .ok_or_else(|| ContainerError::UnknownName(name.to_string()))?;

    match entry.scope_index.cmp(&self.scope_index) {
      ScopeOrdering::Less => {
        tracing::trace!(name, scope = self.scope(), "delegating to parent container");
        self.parent_node()?.resolve(name, lookup)
      }
      ScopeOrdering::Equal => self.resolve_local(&entry.def),
      ScopeOrdering::Greater => match lookup {
        Lookup::Scoped => Err(ContainerError::ScopeUnreachable {
          name: name.to_string(),
          definition_scope: entry.def.scope.clone(),
          container_scope: self.scope().to_string(),
        }),
        Lookup::Unscoped => self.ephemeral_child()?.resolve(name, lookup),
      },
    }
  }

  fn cached(&self, name: &str) -> Option<Object> {
    self.instances.get(name).map(|entry| Arc::clone(entry.value()))
  }

  fn resolve_local(self: &Arc<Self>, def: &Definition) -> Result<Object> {
    let _guard = ResolutionGuard::enter(self.id, &def.name)?;

    if def.unshared {
      return self.build_unshared(def);
    }
    if let Some(object) = self.cached(&def.name) {
      tracing::trace!(name = %def.name, scope = self.scope(), "cache hit");
      return Ok(object);
    }

    loop {
      // Choose a single leader per name. Everybody else waits on its outcome.
      let (pending, am_leader) = {
        let mut pending = self.pending.lock();
        // The leader stores the instance before clearing its marker, so this
        // catches a build that finished since the optimistic check above.
        if let Some(object) = self.cached(&def.name) {
          return Ok(object);
        }
        match pending.get(&def.name) {
          Some(existing) => (Arc::clone(existing), false),
          None => {
            let created = Arc::new(PendingBuild::new());
            pending.insert(def.name.clone(), Arc::clone(&created));
            (created, true)
          }
        }
      };

      if am_leader {
        return self.lead_build(def, pending);
      }

      match pending.wait() {
        BuildOutcome::Built(object) => return Ok(object),
        BuildOutcome::Failed(err) => return Err(err),
        BuildOutcome::Aborted => {
          tracing::debug!(name = %def.name, "in-flight build aborted, retrying");
        }
      }
    }
  }

  fn lead_build(self: &Arc<Self>, def: &Definition, pending: Arc<PendingBuild>) -> Result<Object> {
    let mut leader = LeaderGuard {
      container: self,
      name: &def.name,
      pending,
      finished: false,
    };

    let result = self.invoke_build(def).and_then(|object| self.store(def, object));
    leader.finish(match &result {
      Ok(object) => BuildOutcome::Built(Arc::clone(object)),
      Err(err) => BuildOutcome::Failed(err.clone()),
    });
    result
  }

  fn store(&self, def: &Definition, object: Object) -> Result<Object> {
    self.instances.insert(def.name.clone(), Arc::clone(&object));
    if self.is_open() {
      return Ok(object);
    }

    // Teardown started while we were building. Whoever removes the entry
    // releases it, so the callback still runs once.
    tracing::warn!(
      name = %def.name,
      scope = self.scope(),
      "build finished after the container started closing"
    );
    if let Some((_, late)) = self.instances.remove(&def.name) {
      def.release(&late);
    }
    Err(self.closed_error())
  }

  fn build_unshared(self: &Arc<Self>, def: &Definition) -> Result<Object> {
    let object = self.invoke_build(def)?;
    if def.has_release() {
      self.unshared.lock().push((def.name.clone(), Arc::clone(&object)));
    }
    if self.is_open() {
      return Ok(object);
    }

    let late = {
      let mut unshared = self.unshared.lock();
      unshared
        .iter()
        .position(|(_, o)| Arc::ptr_eq(o, &object))
        .map(|pos| unshared.swap_remove(pos))
    };
    if let Some((_, late)) = late {
      def.release(&late);
    }
    Err(self.closed_error())
  }

  fn invoke_build(self: &Arc<Self>, def: &Definition) -> Result<Object> {
    tracing::debug!(
      name = %def.name,
      scope = self.scope(),
      unshared = def.unshared,
      "building object"
    );
    let handle = Container::from_node(Arc::clone(self));
    (def.build)(&handle).map_err(|err| match err.downcast::<ContainerError>() {
      // A cycle is reported as-is, however deep in the dependency graph it was found.
      Ok(inner) if matches!(*inner, ContainerError::CyclicDependency { .. }) => *inner,
      Ok(inner) => ContainerError::BuildFailed {
        name: def.name.clone(),
        source: Arc::new(*inner),
      },
      Err(other) => ContainerError::BuildFailed {
        name: def.name.clone(),
        source: Arc::from(other),
      },
    })
  }
}

/// Clears the pending marker of a build and publishes its outcome, even if the
/// build function unwinds.
struct LeaderGuard<'a> {
  container: &'a ContainerInner,
  name: &'a str,
  pending: Arc<PendingBuild>,
  finished: bool,
}

impl LeaderGuard<'_> {
  fn finish(&mut self, outcome: BuildOutcome) {
    {
      let mut pending = self.container.pending.lock();
      if pending
        .get(self.name)
        .is_some_and(|current| Arc::ptr_eq(current, &self.pending))
      {
        pending.remove(self.name);
      }
    }
    self.pending.complete(outcome);
    self.finished = true;
  }
}

impl Drop for LeaderGuard<'_> {
  fn drop(&mut self) {
    if !self.finished {
      tracing::debug!(name = self.name, "build unwound before completing");
      self.finish(BuildOutcome::Aborted);
    }
  }
}

impl Container {
  pub(crate) fn root(registry: Arc<Registry>) -> Self {
    Self {
      inner: Arc::new(ContainerInner::new(registry, 0, None)),
      ancestors: Arc::from(Vec::new()),
    }
  }

  /// Wraps a node reached through the tree, pinning the ancestors it can still reach.
  fn from_node(inner: Arc<ContainerInner>) -> Self {
    let mut ancestors = Vec::new();
    let mut link = inner.parent.as_ref().and_then(Weak::upgrade);
    while let Some(node) = link {
      link = node.parent.as_ref().and_then(Weak::upgrade);
      ancestors.push(node);
    }
    ancestors.reverse();
    Self {
      inner,
      ancestors: ancestors.into(),
    }
  }

  /// The scope this container lives in.
  pub fn scope(&self) -> &str {
    self.inner.scope()
  }

  /// The full scope chain of the tree.
  pub fn scopes(&self) -> &ScopeChain {
    &self.inner.registry.chain
  }

  /// Scopes more general than this container's, most general first.
  pub fn parent_scopes(&self) -> &[String] {
    &self.inner.registry.chain.as_slice()[..self.inner.scope_index]
  }

  /// Scopes more specific than this container's.
  pub fn sub_scopes(&self) -> &[String] {
    &self.inner.registry.chain.as_slice()[self.inner.scope_index + 1..]
  }

  /// The parent container, or `None` for the root.
  pub fn parent(&self) -> Option<Container> {
    let (parent, rest) = self.ancestors.split_last()?;
    Some(Container {
      inner: Arc::clone(parent),
      ancestors: rest.into(),
    })
  }

  /// Number of live sub-containers, the ephemeral one included.
  pub fn child_count(&self) -> usize {
    let nodes = self.inner.nodes.lock();
    nodes.children.len() + usize::from(nodes.ephemeral.is_some())
  }

  /// Creates a container in the next scope of the chain, with this one as parent.
  ///
  /// The new container is owned by this one until it is deleted.
  pub fn sub_container(&self) -> Result<Container> {
    let mut nodes = self.inner.nodes.lock();
    if nodes.lifecycle != Lifecycle::Open {
      return Err(self.inner.closed_error());
    }
    let child = self.inner.new_child()?;
    tracing::debug!(
      parent_scope = self.scope(),
      scope = child.scope(),
      "sub-container created"
    );
    nodes.children.insert(child.id, Arc::clone(&child));
    let ancestors = self
      .ancestors
      .iter()
      .cloned()
      .chain(std::iter::once(Arc::clone(&self.inner)))
      .collect();
    Ok(Container {
      inner: child,
      ancestors,
    })
  }

  // --- Resolution ---

  /// Retrieves an object, building it if needed.
  ///
  /// The object has to belong to this container's scope or a more general one.
  /// Objects of a more general scope are built and cached in the matching
  /// ancestor, so every descendant of that ancestor shares them.
  pub fn safe_get(&self, name: &str) -> Result<Object> {
    self.inner.resolve(name, Lookup::Scoped)
  }

  /// Like [`Container::safe_get`], but panics on error.
  pub fn get(&self, name: &str) -> Object {
    self
      .safe_get(name)
      .unwrap_or_else(|err| panic!("Failed to get '{}': {}", name, err))
  }

  /// Retrieves an object and casts it to `T`.
  pub fn safe_get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    downcast(name, self.safe_get(name)?)
  }

  /// Like [`Container::safe_get_as`], but panics on error.
  pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Arc<T> {
    self
      .safe_get_as(name)
      .unwrap_or_else(|err| panic!("Failed to get '{}': {}", name, err))
  }

  /// Retrieves an object and writes it into `dst`.
  ///
  /// Fails with `TypeMismatch` if the object is not a `T`; `dst` is left
  /// untouched on error.
  pub fn fill<T: Any + Send + Sync>(&self, name: &str, dst: &mut Option<Arc<T>>) -> Result<()> {
    *dst = Some(self.safe_get_as(name)?);
    Ok(())
  }

  /// Retrieves an object even if it belongs to a scope more specific than this
  /// container's.
  ///
  /// The missing intermediate containers are created as an ephemeral chain owned
  /// by this container. It is reused by later unscoped lookups and stays alive
  /// until [`Container::clean`] is called.
  pub fn unscoped_safe_get(&self, name: &str) -> Result<Object> {
    self.inner.resolve(name, Lookup::Unscoped)
  }

  /// Like [`Container::unscoped_safe_get`], but panics on error.
  pub fn unscoped_get(&self, name: &str) -> Object {
    self
      .unscoped_safe_get(name)
      .unwrap_or_else(|err| panic!("Failed to get '{}': {}", name, err))
  }

  /// Like [`Container::fill`], through [`Container::unscoped_safe_get`].
  pub fn unscoped_fill<T: Any + Send + Sync>(&self, name: &str, dst: &mut Option<Arc<T>>) -> Result<()> {
    *dst = Some(downcast(name, self.unscoped_safe_get(name)?)?);
    Ok(())
  }
}

fn downcast<T: Any + Send + Sync>(name: &str, object: Object) -> Result<Arc<T>> {
  object.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
    name: name.to_string(),
    expected: type_name::<T>(),
  })
}

impl PartialEq for Container {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Eq for Container {}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("id", &self.inner.id)
      .field("scope", &self.scope())
      .field("lifecycle", &self.lifecycle())
      .field("instances", &self.inner.instances.len())
      .finish_non_exhaustive()
  }
}
