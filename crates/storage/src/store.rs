//! Store of all tables.
//!
//! This module provides the `TableStore` struct which owns every table and
//! commits diffs against them.

use crate::diff::Diff;
use crate::source::FactSource;
use crate::table::{Table, TableChanges};
use std::collections::BTreeMap;
use std::rc::Rc;
use tessera_core::Fact;
use tracing::trace;

/// Real changes per table produced by committing a diff.
pub type Changes = BTreeMap<String, TableChanges>;

/// Owner of every table, keyed by name.
#[derive(Debug, Default)]
pub struct TableStore {
    /// Table name → Table mapping.
    tables: BTreeMap<String, Table>,
}

impl TableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table's fields, creating the table if needed.
    ///
    /// Declaring an empty field list on an existing table keeps its fields.
    pub fn add_table<I, S>(&mut self, name: &str, fields: I) -> &mut Table
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let table = self.table(name);
        if !fields.is_empty() {
            table.set_fields(fields);
        }
        table
    }

    /// Returns a table, creating an empty one if it does not exist.
    pub fn table(&mut self, name: &str) -> &mut Table {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name))
    }

    /// Gets a reference to a table.
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Gets a mutable reference to a table.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Checks if a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Iterates over all tables in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Returns the facts of a table matching a query.
    pub fn find(&mut self, name: &str, query: Option<&Fact>) -> Vec<Rc<Fact>> {
        match (self.tables.get_mut(name), query) {
            (None, _) => Vec::new(),
            (Some(table), None) => table.facts().to_vec(),
            (Some(table), Some(query)) => table.lookup(query),
        }
    }

    /// Applies candidate adds and removes to one table.
    pub fn update_table(&mut self, name: &str, adds: &[Rc<Fact>], removes: &[Rc<Fact>]) -> TableChanges {
        let changes = self.table(name).update(adds, removes);
        trace!(
            table = name,
            adds = changes.adds.len(),
            removes = changes.removes.len(),
            "table updated"
        );
        changes
    }

    /// Commits every table diff of `diff`.
    ///
    /// Returns the real changes of the tables that actually changed.
    pub fn apply(&mut self, diff: &Diff) -> Changes {
        let mut changes = Changes::new();
        for (name, table_diff) in diff.tables() {
            if table_diff.is_empty() {
                continue;
            }
            let real = self.update_table(name, &table_diff.adds, &table_diff.removes);
            if !real.is_empty() {
                changes.insert(name.to_string(), real);
            }
        }
        changes
    }

    /// Empties a table, keeping its fields and index shapes.
    pub fn clear_table(&mut self, name: &str) {
        if let Some(table) = self.tables.get_mut(name) {
            table.clear();
        }
    }

    /// Empties every table.
    pub fn clear(&mut self) {
        for table in self.tables.values_mut() {
            table.clear();
        }
    }

    /// Returns the number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Returns the total fact count across all tables.
    pub fn total_facts(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    /// Returns the fact count of every table.
    pub fn facts_per_table(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.len()))
            .collect()
    }
}

impl FactSource for TableStore {
    fn find(&mut self, table: &str, query: Option<&Fact>) -> Vec<Rc<Fact>> {
        TableStore::find(self, table, query)
    }

    fn fields(&self, table: &str) -> &[String] {
        self.tables.get(table).map(|t| t.fields()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::fact;

    fn seeded() -> TableStore {
        let mut store = TableStore::new();
        let mut diff = Diff::new();
        diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }]);
        diff.add("bar", fact! { "a" => 2, "c" => 5 });
        store.apply(&diff);
        store
    }

    #[test]
    fn test_apply_creates_tables() {
        let store = seeded();
        assert_eq!(store.table_names(), vec!["bar", "foo"]);
        assert_eq!(store.total_facts(), 3);
        assert_eq!(store.facts_per_table().get("foo"), Some(&2));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut store = seeded();
        let mut diff = Diff::new();
        diff.add("foo", fact! { "a" => 9, "b" => 9 });
        let first = store.apply(&diff);
        let second = store.apply(&diff);
        assert_eq!(first.get("foo").map(|c| c.adds.len()), Some(1));
        assert!(second.is_empty());
    }

    #[test]
    fn test_find() {
        let mut store = seeded();
        assert_eq!(store.find("foo", None).len(), 2);
        assert_eq!(store.find("foo", Some(&fact! { "a" => 2 })).len(), 1);
        assert_eq!(store.find("foo", Some(&Fact::new())).len(), 2);
        assert!(store.find("foo", Some(&fact! { "a" => 7 })).is_empty());
        assert!(store.find("missing", None).is_empty());
        assert!(!store.has_table("missing"));
    }

    #[test]
    fn test_add_table_declares_fields() {
        let mut store = TableStore::new();
        store.add_table("people", ["name", "age"]);
        assert_eq!(FactSource::fields(&store, "people"), &["name".to_string(), "age".to_string()]);
        store.add_table("people", Vec::<String>::new());
        assert_eq!(FactSource::fields(&store, "people").len(), 2);
        assert!(FactSource::fields(&store, "missing").is_empty());
    }

    #[test]
    fn test_clear_table() {
        let mut store = seeded();
        store.clear_table("foo");
        assert!(store.find("foo", None).is_empty());
        assert_eq!(store.total_facts(), 1);
        store.clear();
        assert_eq!(store.total_facts(), 0);
    }
}
