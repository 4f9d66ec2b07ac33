// Requires the `serde` feature.

use fibre_scope::{Builder, Definition, ScopeChain};
use pretty_assertions::assert_eq;

#[test]
fn test_scope_chain_from_json_config() {
  // Arrange
  let raw = r#"{ "scopes": ["process", "job", "step"] }"#;

  #[derive(serde::Deserialize)]
  struct Config {
    scopes: ScopeChain,
  }

  // Act
  let config: Config = serde_json::from_str(raw).unwrap();
  let mut builder = Builder::from_chain(config.scopes);
  builder.add([Definition::from_fn("runner", "job", |_| 3_u8)]).unwrap();
  let job = builder.build().sub_container().unwrap();

  // Assert
  assert_eq!(job.scope(), "job");
  assert_eq!(*job.get_as::<u8>("runner"), 3);
}

#[test]
fn test_invalid_scope_chain_is_rejected_while_parsing() {
  let err = serde_json::from_str::<ScopeChain>(r#"["app", "request", "app"]"#).unwrap_err();
  assert!(err.to_string().contains("appears more than once"));
}

#[test]
fn test_empty_scope_list_means_default_chain() {
  let chain: ScopeChain = serde_json::from_str("[]").unwrap();
  assert_eq!(chain, ScopeChain::default());
  assert_eq!(serde_json::to_string(&chain).unwrap(), r#"["app","request","subrequest"]"#);
}
