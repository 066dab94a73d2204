//! Keeping cataloged views registered.
//!
//! Views can be stored as facts (see `tessera_query::catalog`). Installing
//! the catalog registers a trigger on the catalog tables that rebuilds every
//! cataloged view whenever those facts change.

use crate::indexer::Indexer;
use std::collections::BTreeSet;
use tessera_core::{Result, Value};
use tessera_query::catalog::{compile_view, remove_changeset, TABLES, VIEW};
use tracing::{debug, warn};

/// Name of the trigger that rebuilds cataloged views.
pub const RECOMPILE: &str = "recompile";

/// Declares the catalog tables and registers the recompile trigger.
///
/// Views already cataloged are registered right away. Installed before a
/// snapshot load, the load itself registers the stored views.
pub fn install_view_catalog(indexer: &mut Indexer) -> Result<()> {
    for (table, fields) in TABLES {
        indexer.add_table(table, fields.iter().copied());
    }
    let mut installed = BTreeSet::new();
    indexer.trigger(RECOMPILE, TABLES.iter().map(|(table, _)| *table), move |indexer| {
        recompile(indexer, &mut installed)?;
        Ok(None)
    })
}

/// Rebuilds and re-registers every cataloged view.
///
/// A view that fails to compile or run is dropped from the catalog. Views
/// this trigger registered earlier that are no longer cataloged are removed.
fn recompile(indexer: &mut Indexer, installed: &mut BTreeSet<String>) -> Result<()> {
    let mut current = BTreeSet::new();
    for entry in indexer.find(VIEW, None) {
        let view_id = match entry.get("view").and_then(Value::as_str) {
            Some(view_id) => view_id.to_string(),
            None => continue,
        };
        if entry.get("kind").and_then(Value::as_str) == Some("table") {
            continue;
        }
        match compile_view(indexer, &view_id).and_then(|view| indexer.as_view(view)) {
            Ok(()) => {
                current.insert(view_id);
            }
            Err(err) => {
                warn!(view = %view_id, error = %err, "dropping cataloged view");
                let removal = remove_changeset(indexer, &view_id);
                indexer.apply_diff(&removal)?;
            }
        }
    }

    for stale in installed.difference(&current) {
        if indexer.view(stale).is_some() {
            indexer.remove_view(stale)?;
        }
    }
    debug!(views = current.len(), "catalog recompiled");
    *installed = current;
    Ok(())
}
