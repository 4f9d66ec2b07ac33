//! # Fibre Scope
//!
//! A thread-safe, scope-aware dependency injection container for Rust.
//!
//! Objects are described by [`Definition`]s and built lazily, on first lookup.
//! Every definition belongs to a scope of an ordered [`ScopeChain`] (by default
//! `app`, `request`, `subrequest`), and containers form a tree that mirrors the
//! chain: the root lives in the most general scope and each
//! [`Container::sub_container`] call moves one scope further.
//!
//! ## Core Concepts
//!
//! - **Builder**: validates the chain and the definitions, then builds the root container.
//! - **Container**: a node of the scope tree. It caches the objects of its own
//!   scope and delegates more general ones to its ancestors, so they are shared
//!   by every descendant.
//! - **Single-flight**: concurrent lookups of an object that is not built yet
//!   trigger exactly one build; all callers get the same object.
//! - **Teardown**: [`Container::delete`] runs the release callback of every
//!   object the container built. Parents are released after their children.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_scope::{Builder, Definition, APP, REQUEST};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! struct Database {
//!   url: String,
//! }
//!
//! struct RequestId(u64);
//!
//! let next_id = Arc::new(AtomicU64::new(1));
//!
//! let mut builder = Builder::with_default_scopes();
//! builder
//!   .add([
//!     Definition::from_fn("db", APP, |_| Database {
//!       url: "postgres://localhost/app".to_string(),
//!     })
//!     .with_release(|db: &Database| println!("closing {}", db.url)),
//!     Definition::from_fn("request-id", REQUEST, move |_| {
//!       RequestId(next_id.fetch_add(1, Ordering::SeqCst))
//!     }),
//!   ])
//!   .unwrap();
//!
//! let app = builder.build();
//!
//! // Each request gets its own container, but they share the database.
//! let first = app.sub_container().unwrap();
//! let second = app.sub_container().unwrap();
//! let db1 = first.get_as::<Database>("db");
//! let db2 = second.get_as::<Database>("db");
//! assert!(Arc::ptr_eq(&db1, &db2));
//! assert_ne!(
//!   first.get_as::<RequestId>("request-id").0,
//!   second.get_as::<RequestId>("request-id").0
//! );
//!
//! first.delete().unwrap();
//! second.delete().unwrap();
//! app.delete().unwrap(); // prints "closing postgres://localhost/app"
//! ```

mod builder;
mod container;
mod core;
mod definition;
mod error;
mod lifecycle;
mod macros;
mod scope;

pub use builder::Builder;
pub use container::Container;
pub use definition::{BuildError, Definition, Object};
pub use error::{ContainerError, Result};
pub use lifecycle::Lifecycle;
pub use scope::{ScopeChain, APP, REQUEST, SUB_REQUEST};
