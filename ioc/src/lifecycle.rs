//! Container teardown: deletion, ephemeral cleanup and the closed state.

use std::sync::{Arc, Weak};

use crate::container::{Container, ContainerInner};
use crate::error::{ContainerError, Result};

/// The lifecycle of a container. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Accepts lookups and sub-container creation.
  Open,
  /// Teardown is in progress. New operations are rejected.
  Closing,
  /// Torn down. Every operation fails with `ContainerClosed`.
  Closed,
}

impl ContainerInner {
  /// Tears the container down.
  ///
  /// Without `force`, fails if any child is still alive. With `force`, children
  /// are torn down first, deepest first, whatever other handles they may have.
  fn teardown(self: &Arc<Self>, force: bool) -> Result<()> {
    let children: Vec<Arc<ContainerInner>> = {
      let mut nodes = self.nodes.lock();
      if nodes.lifecycle != Lifecycle::Open {
        return Err(self.closed_error());
      }
      let live = nodes.children.len() + usize::from(nodes.ephemeral.is_some());
      if live > 0 && !force {
        return Err(ContainerError::StillHasChildren {
          scope: self.scope().to_string(),
          children: live,
        });
      }
      nodes.lifecycle = Lifecycle::Closing;
      let mut children: Vec<_> = nodes.children.drain().map(|(_, child)| child).collect();
      children.extend(nodes.ephemeral.take());
      children
    };

    tracing::debug!(
      scope = self.scope(),
      children = children.len(),
      instances = self.instances.len(),
      "deleting container"
    );

    for child in children {
      if let Err(err) = child.teardown(true) {
        tracing::trace!(%err, "sub-container was already closing");
      }
    }

    self.release_objects();
    self.detach();
    self.nodes.lock().lifecycle = Lifecycle::Closed;
    Ok(())
  }

  /// Runs the release callback of every object this container built.
  fn release_objects(&self) {
    let names: Vec<String> = self.instances.iter().map(|entry| entry.key().clone()).collect();
    for name in names {
      // A build finishing concurrently may have removed (and released) it already.
      if let Some((name, object)) = self.instances.remove(&name) {
        if let Some(entry) = self.registry.get(&name) {
          tracing::trace!(name = %name, scope = self.scope(), "releasing object");
          entry.def.release(&object);
        }
      }
    }

    let unshared = std::mem::take(&mut *self.unshared.lock());
    for (name, object) in unshared {
      if let Some(entry) = self.registry.get(&name) {
        entry.def.release(&object);
      }
    }
  }

  /// Removes this container from its parent's child slots.
  fn detach(&self) {
    let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) else {
      return;
    };
    let mut nodes = parent.nodes.lock();
    nodes.children.remove(&self.id);
    if nodes.ephemeral.as_ref().is_some_and(|e| e.id == self.id) {
      nodes.ephemeral = None;
    }
  }
}

impl Container {
  /// Releases every object of this container and closes it.
  ///
  /// Fails with `StillHasChildren` while any sub-container (ordinary or
  /// ephemeral) is alive: delete them first, or use
  /// [`Container::delete_with_sub_containers`].
  pub fn delete(&self) -> Result<()> {
    self.inner.teardown(false)
  }

  /// Deletes every sub-container, deepest first, then this container.
  ///
  /// Sub-containers are torn down even if other threads still hold handles to
  /// them; those handles then fail with `ContainerClosed`, and objects they
  /// already retrieved may have been released under them.
  pub fn delete_with_sub_containers(&self) -> Result<()> {
    self.inner.teardown(true)
  }

  /// Deletes the ephemeral chain created by the `unscoped_*` lookups, if any.
  pub fn clean(&self) -> Result<()> {
    let ephemeral = {
      let mut nodes = self.inner.nodes.lock();
      if nodes.lifecycle != Lifecycle::Open {
        return Err(self.inner.closed_error());
      }
      nodes.ephemeral.take()
    };
    match ephemeral {
      Some(child) => {
        tracing::debug!(scope = self.scope(), "cleaning ephemeral containers");
        child.teardown(true)
      }
      None => Ok(()),
    }
  }

  /// Returns `true` once the container has been deleted.
  pub fn is_closed(&self) -> bool {
    self.lifecycle() == Lifecycle::Closed
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.inner.nodes.lock().lifecycle
  }
}
