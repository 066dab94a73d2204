//! Tessera Database - the coordinator of the Tessera relational engine.
//!
//! This crate ties the layers together:
//!
//! - `Indexer`: owns every table, commits diffs and runs the fixpoint loop
//!   that keeps views current
//! - `IndexerConfig`: fixpoint bound and snapshot options
//! - `install_view_catalog`: keeps views stored as catalog facts registered
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{fact, Value};
//! use tessera_database::Indexer;
//! use tessera_query::{field, Mapping, Query};
//!
//! let mut indexer = Indexer::new();
//! let counts = Query::new("counts")
//!     .select("foo", Mapping::new())
//!     .group([("foo", "a")])
//!     .aggregate("count", Mapping::new())
//!     .project([("a", field("foo", "a")), ("count", field("count", "count"))]);
//! indexer.as_view(counts).unwrap();
//!
//! let mut diff = indexer.diff();
//! diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }, fact! { "a" => 2, "b" => 4 }]);
//! indexer.apply_diff(&diff).unwrap();
//! assert_eq!(indexer.find("counts", Some(&fact! { "a" => 2 }))[0].get("count"), Some(&Value::from(2)));
//! ```

pub mod catalog;
pub mod config;
pub mod indexer;

pub use catalog::{install_view_catalog, RECOMPILE};
pub use config::{IndexerConfig, DEFAULT_MAX_FIXPOINT_ROUNDS};
pub use indexer::{Indexer, TriggerFn};
