use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// The error type for every fallible `fibre_scope` operation.
///
/// Registration errors (`InvalidChain`, `UnknownScope`, `DuplicateName`,
/// `InvalidDefinition`) are only
/// ever produced by the [`Builder`](crate::Builder). Everything else comes from a
/// [`Container`](crate::Container).
///
/// The error is cheap to clone so that a failed build can be reported to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum ContainerError {
  #[error("invalid scope chain: {reason}")]
  InvalidChain { reason: String },

  #[error("definition '{name}' uses scope '{scope}' which is not part of the scope chain")]
  UnknownScope { name: String, scope: String },

  #[error("a definition named '{0}' is already registered")]
  DuplicateName(String),

  #[error("definition '{name}' is invalid: {reason}")]
  InvalidDefinition { name: String, reason: String },

  #[error("no definition registered under the name '{0}'")]
  UnknownName(String),

  #[error(
    "'{name}' belongs to scope '{definition_scope}', which is more specific than the container scope '{container_scope}'"
  )]
  ScopeUnreachable {
    name: String,
    definition_scope: String,
    container_scope: String,
  },

  #[error("circular dependency detected while building '{name}': {}", .chain.join(" -> "))]
  CyclicDependency { name: String, chain: Vec<String> },

  #[error("could not build '{name}': {source}")]
  BuildFailed {
    name: String,
    #[source]
    source: Arc<dyn StdError + Send + Sync>,
  },

  #[error("'{name}' could not be cast to {expected}")]
  TypeMismatch { name: String, expected: &'static str },

  #[error("container in scope '{scope}' still has {children} sub-container(s)")]
  StillHasChildren { scope: String, children: usize },

  #[error("container in scope '{scope}' is closed")]
  ContainerClosed { scope: String },

  #[error("container in scope '{scope}' is already at the most specific scope")]
  NoMoreScopes { scope: String },
}

impl ContainerError {
  /// Returns `true` for errors that can only be raised while registering definitions.
  pub fn is_registration_error(&self) -> bool {
    matches!(
      self,
      ContainerError::InvalidChain { .. }
        | ContainerError::UnknownScope { .. }
        | ContainerError::DuplicateName(_)
        | ContainerError::InvalidDefinition { .. }
    )
  }
}

/// A specialized `Result` type for `fibre_scope` operations.
pub type Result<T, E = ContainerError> = std::result::Result<T, E>;
