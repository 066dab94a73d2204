//! Tessera Storage - set-semantics tables and change batches.
//!
//! This crate provides the storage layer:
//!
//! - `Table`: a de-duplicated set of facts with lazily built index caches
//! - `TableStore`: owner of every table; commits diffs
//! - `Diff` / `TableDiff`: pending, mergeable, reversible change batches
//! - `FactSource`: read access used by diffs and query execution
//!
//! # Example
//!
//! ```rust
//! use tessera_core::fact;
//! use tessera_storage::{Diff, TableStore};
//!
//! let mut store = TableStore::new();
//! let mut diff = Diff::new();
//! diff.add("foo", fact! { "a" => 1 });
//! diff.add("foo", fact! { "a" => 1 });
//!
//! let changes = store.apply(&diff);
//! assert_eq!(changes["foo"].adds.len(), 1);
//! assert_eq!(store.find("foo", None).len(), 1);
//! ```

pub mod diff;
pub mod source;
pub mod store;
pub mod table;

pub use diff::{Diff, TableDiff};
pub use source::FactSource;
pub use store::{Changes, TableStore};
pub use table::{Table, TableChanges};
