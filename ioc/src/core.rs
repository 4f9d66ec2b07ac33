//! Core, non-public building blocks of the resolution engine.

use std::cell::RefCell;

use once_cell::sync::OnceCell;

use crate::definition::Object;
use crate::error::{ContainerError, Result};

thread_local! {
  // The builds currently running on this thread, outermost first. A key showing
  // up twice means a definition transitively depends on itself.
  static RESOLVING_STACK: RefCell<Vec<ResolutionKey>> = const { RefCell::new(Vec::new()) };
}

/// Identifies one build: a definition name inside one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolutionKey {
  pub(crate) container: u64,
  pub(crate) name: String,
}

/// An RAII guard that detects circular dependencies.
///
/// Entering pushes the key on the thread-local stack, or fails with
/// `CyclicDependency` if the same name is already being built in the same
/// container. Dropping the guard pops the key.
pub(crate) struct ResolutionGuard {
  key: ResolutionKey,
}

impl ResolutionGuard {
  pub(crate) fn enter(container: u64, name: &str) -> Result<Self> {
    let key = ResolutionKey {
      container,
      name: name.to_owned(),
    };
    RESOLVING_STACK.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(start) = stack.iter().position(|k| *k == key) {
        let mut chain: Vec<String> = stack[start..].iter().map(|k| k.name.clone()).collect();
        chain.push(key.name.clone());
        return Err(ContainerError::CyclicDependency {
          name: key.name.clone(),
          chain,
        });
      }
      stack.push(key.clone());
      Ok(())
    })?;
    Ok(Self { key })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(pos) = stack.iter().rposition(|k| *k == self.key) {
        stack.remove(pos);
      }
    });
  }
}

/// How an in-flight build ended.
#[derive(Clone)]
pub(crate) enum BuildOutcome {
  Built(Object),
  Failed(ContainerError),
  /// The builder unwound before producing a result. Waiters should retry.
  Aborted,
}

/// The single-flight marker for a name being built in a container.
///
/// The first caller becomes the leader and runs the build; every other caller
/// blocks on [`PendingBuild::wait`] until the leader publishes the outcome.
pub(crate) struct PendingBuild {
  outcome: OnceCell<BuildOutcome>,
}

impl PendingBuild {
  pub(crate) fn new() -> Self {
    Self {
      outcome: OnceCell::new(),
    }
  }

  /// Publishes the outcome and wakes all waiters. Only the first call wins.
  pub(crate) fn complete(&self, outcome: BuildOutcome) {
    let _ = self.outcome.set(outcome);
  }

  /// Blocks the current thread until the leader has finished.
  pub(crate) fn wait(&self) -> BuildOutcome {
    self.outcome.wait().clone()
  }
}
