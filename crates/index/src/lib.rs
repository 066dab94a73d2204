//! Tessera Index - incrementally maintained lookup caches for tables.
//!
//! A table grows one `IndexCache` per distinct `KeyShape` it is looked up
//! by. Caches are built lazily on the first lookup with a shape and then kept
//! current by folding each committed change into them:
//!
//! - `KeyShape`: the sorted set of fields a lookup binds
//! - `IndexCache`: nested value → value → … → facts map for one shape
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use tessera_core::fact;
//! use tessera_index::{IndexCache, KeyShape};
//!
//! let facts = vec![Rc::new(fact! { "a" => 1, "b" => 2 })];
//! let mut cache = IndexCache::build(KeyShape::new(["a"]), &facts);
//! assert_eq!(cache.lookup(&fact! { "a" => 1 }).len(), 1);
//!
//! cache.collect(&[], &facts);
//! assert!(cache.lookup(&fact! { "a" => 1 }).is_empty());
//! ```

pub mod cache;
pub mod shape;

pub use cache::IndexCache;
pub use shape::KeyShape;
