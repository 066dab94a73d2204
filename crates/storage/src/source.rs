//! Read access to facts, as seen by diffs and query execution.

use std::rc::Rc;
use tessera_core::Fact;

/// Anything that can resolve fact lookups by table name.
///
/// Lookups take `&mut self` because index caches are built on first use.
pub trait FactSource {
    /// Returns the facts of `table` matching every field of `query`.
    ///
    /// `None` or an empty query returns the whole table; an unknown table
    /// returns nothing.
    fn find(&mut self, table: &str, query: Option<&Fact>) -> Vec<Rc<Fact>>;

    /// Returns the field list of `table`; empty when unknown or not yet inferred.
    fn fields(&self, table: &str) -> &[String];
}
