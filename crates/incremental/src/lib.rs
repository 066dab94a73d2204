//! Tessera Incremental - change counting and trigger tracking for view maintenance.
//!
//! Views are kept current by re-executing them when a table they read changes
//! and applying only the difference to their backing table. This crate holds
//! the pieces of that loop that do not depend on facts or queries:
//!
//! - `Delta<T>` and [`consolidate`]: signed multiset counting of a change batch
//! - [`diff_outputs`]: old output vs. new output of a re-executed view
//! - `TriggerGraph`: which views read which tables
//!
//! # Example
//!
//! ```
//! use tessera_incremental::{batch_from, consolidate};
//!
//! // add "x" twice and remove it once: net +1
//! let net = consolidate(batch_from(vec!["x", "x"], vec!["x"]), |s| *s);
//! assert_eq!(net[0].diff, 1);
//! ```

pub mod delta;
pub mod materialize;
pub mod trigger;

pub use delta::{batch_from, consolidate, Delta, DeltaBatch};
pub use materialize::{diff_outputs, OutputChanges};
pub use trigger::TriggerGraph;
