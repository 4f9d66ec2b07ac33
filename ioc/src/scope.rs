//! Scope identifiers and the ordered chain of lifetimes a container tree follows.

use std::collections::HashSet;
use std::fmt;

use crate::error::{ContainerError, Result};

/// The application-wide scope. Most general scope of the default chain.
pub const APP: &str = "app";
/// The per-request scope.
pub const REQUEST: &str = "request";
/// The scope nested under a request.
pub const SUB_REQUEST: &str = "subrequest";

/// An ordered list of distinct scope names, most general first.
///
/// The chain fixes the shape of every container tree built from it: the root
/// container lives in the first scope, and each call to
/// [`Container::sub_container`](crate::Container::sub_container) moves exactly
/// one step towards the end of the chain.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<String>", into = "Vec<String>"))]
pub struct ScopeChain {
  scopes: Vec<String>,
}

impl ScopeChain {
  /// Validates and freezes a list of scopes.
  ///
  /// An empty list yields the default chain (`app`, `request`, `subrequest`).
  /// Duplicated or empty names are rejected with `InvalidChain`.
  pub fn new<I, S>(scopes: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
    if scopes.is_empty() {
      return Ok(Self::default());
    }

    let mut seen = HashSet::with_capacity(scopes.len());
    for scope in &scopes {
      if scope.is_empty() {
        return Err(ContainerError::InvalidChain {
          reason: "scope names cannot be empty".to_string(),
        });
      }
      if !seen.insert(scope.as_str()) {
        return Err(ContainerError::InvalidChain {
          reason: format!("scope '{}' appears more than once", scope),
        });
      }
    }
    Ok(Self { scopes })
  }

  /// Position of `scope` in the chain, `0` being the most general.
  pub fn index_of(&self, scope: &str) -> Option<usize> {
    self.scopes.iter().position(|s| s == scope)
  }

  /// Returns the scope at `index`, if the chain is that long.
  pub fn get(&self, index: usize) -> Option<&str> {
    self.scopes.get(index).map(String::as_str)
  }

  pub fn contains(&self, scope: &str) -> bool {
    self.index_of(scope).is_some()
  }

  /// The most general scope.
  pub fn root(&self) -> &str {
    &self.scopes[0]
  }

  pub fn len(&self) -> usize {
    self.scopes.len()
  }

  /// Always `false`: a chain holds at least one scope.
  pub fn is_empty(&self) -> bool {
    self.scopes.is_empty()
  }

  pub fn as_slice(&self) -> &[String] {
    &self.scopes
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.scopes.iter().map(String::as_str)
  }
}

impl Default for ScopeChain {
  fn default() -> Self {
    Self {
      scopes: vec![APP.to_string(), REQUEST.to_string(), SUB_REQUEST.to_string()],
    }
  }
}

impl fmt::Debug for ScopeChain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(&self.scopes).finish()
  }
}

impl TryFrom<Vec<String>> for ScopeChain {
  type Error = ContainerError;

  fn try_from(scopes: Vec<String>) -> Result<Self> {
    Self::new(scopes)
  }
}

impl From<ScopeChain> for Vec<String> {
  fn from(chain: ScopeChain) -> Self {
    chain.scopes
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_input_uses_default_chain() {
    let chain = ScopeChain::new(Vec::<String>::new()).unwrap();
    assert_eq!(chain, ScopeChain::default());
    assert_eq!(chain.root(), APP);
    assert_eq!(chain.index_of(SUB_REQUEST), Some(2));
  }

  #[test]
  fn duplicates_are_rejected() {
    let err = ScopeChain::new(["app", "request", "app"]).unwrap_err();
    assert!(matches!(err, ContainerError::InvalidChain { .. }));
  }

  #[test]
  fn empty_names_are_rejected() {
    let err = ScopeChain::new(["app", ""]).unwrap_err();
    assert!(matches!(err, ContainerError::InvalidChain { .. }));
  }

  #[test]
  fn custom_chain_keeps_order() {
    let chain = ScopeChain::new(["process", "session"]).unwrap();
    assert_eq!(chain.iter().collect::<Vec<_>>(), vec!["process", "session"]);
    assert_eq!(chain.get(1), Some("session"));
    assert_eq!(chain.get(2), None);
    assert!(!chain.contains("request"));
  }
}
