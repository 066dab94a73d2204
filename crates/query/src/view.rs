//! Views: queries or unions materialized as tables.

use crate::context::QueryContext;
use crate::query::Query;
use crate::union::Union;
use std::collections::BTreeMap;
use std::rc::Rc;
use tessera_core::{Fact, Result};
use tracing::warn;

/// A view definition.
#[derive(Clone, Debug)]
pub enum View {
    /// Join/aggregate view
    Query(Query),
    /// Merge-and-dedup view
    Union(Union),
}

impl View {
    /// Returns the view name, which is also its table name.
    pub fn name(&self) -> &str {
        match self {
            View::Query(query) => query.name(),
            View::Union(union) => union.name(),
        }
    }

    /// Returns the catalog kind of the view.
    pub fn kind(&self) -> &'static str {
        match self {
            View::Query(_) => "query",
            View::Union(_) => "union",
        }
    }

    /// Returns the tables the view reads.
    pub fn tables(&self) -> Vec<String> {
        match self {
            View::Query(query) => query.tables(),
            View::Union(union) => union.tables(),
        }
    }

    /// Returns true if the view consumes per-table change batches.
    pub fn wants_changes(&self) -> bool {
        matches!(self, View::Union(union) if union.is_stateful())
    }

    /// Executes the view and returns its output facts.
    ///
    /// `None` means the view produces nothing to materialize: a query
    /// without a projection.
    pub fn exec<C: QueryContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        changes: Option<&BTreeMap<String, Vec<Rc<Fact>>>>,
    ) -> Result<Option<Vec<Fact>>> {
        match self {
            View::Query(query) => {
                let output = query.exec(ctx)?;
                if output.results.is_none() {
                    warn!(view = %query.name(), "query view has no projection; nothing to materialize");
                }
                Ok(output.results)
            }
            View::Union(union) => Ok(Some(union.exec(ctx, changes))),
        }
    }
}

impl From<Query> for View {
    fn from(query: Query) -> Self {
        View::Query(query)
    }
}

impl From<Union> for View {
    fn from(union: Union) -> Self {
        View::Union(union)
    }
}
