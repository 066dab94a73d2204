//! Execution context for queries and unions.

use crate::functions::FunctionRegistry;
use std::rc::Rc;
use tessera_core::Fact;
use tessera_storage::{FactSource, TableStore};

/// What a query needs from its environment: table lookups and functions.
pub trait QueryContext: FactSource {
    /// Returns the functions calculations and aggregates resolve against.
    fn functions(&self) -> &FunctionRegistry;
}

/// A store paired with a function registry, for running queries without a
/// coordinator.
#[derive(Debug, Default)]
pub struct StoreContext {
    /// Tables queried
    pub store: TableStore,
    /// Functions available to queries
    pub functions: FunctionRegistry,
}

impl StoreContext {
    /// Creates an empty store with the builtin functions.
    pub fn new() -> Self {
        Self::with_store(TableStore::new())
    }

    /// Wraps an existing store, with the builtin functions.
    pub fn with_store(store: TableStore) -> Self {
        Self {
            store,
            functions: FunctionRegistry::with_builtins(),
        }
    }
}

impl FactSource for StoreContext {
    fn find(&mut self, table: &str, query: Option<&Fact>) -> Vec<Rc<Fact>> {
        self.store.find(table, query)
    }

    fn fields(&self, table: &str) -> &[String] {
        FactSource::fields(&self.store, table)
    }
}

impl QueryContext for StoreContext {
    fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}
