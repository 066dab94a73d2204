//! Pending change batches.
//!
//! A `Diff` collects candidate adds and removes per table. Nothing happens
//! until it is applied; until then it is a plain value that can be merged
//! with other diffs or reversed.

use crate::source::FactSource;
use std::collections::BTreeMap;
use std::rc::Rc;
use tessera_core::Fact;

/// Candidate adds and removes for one table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableDiff {
    /// Facts to add
    pub adds: Vec<Rc<Fact>>,
    /// Facts to remove
    pub removes: Vec<Rc<Fact>>,
}

impl TableDiff {
    /// Returns true if the table diff carries nothing.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Returns the reverse of this table diff (adds ↔ removes).
    pub fn get_reverse(&self) -> Self {
        Self {
            adds: self.removes.clone(),
            removes: self.adds.clone(),
        }
    }
}

/// A pending, mergeable batch of per-table changes.
#[derive(Clone, Debug, Default)]
pub struct Diff {
    tables: BTreeMap<String, TableDiff>,
    len: usize,
}

impl Diff {
    /// Creates an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_table(&mut self, table: &str) -> &mut TableDiff {
        self.tables.entry(table.to_string()).or_default()
    }

    /// Queues one fact to be added.
    pub fn add(&mut self, table: &str, fact: impl Into<Rc<Fact>>) -> &mut Self {
        self.ensure_table(table).adds.push(fact.into());
        self.len += 1;
        self
    }

    /// Queues several facts to be added.
    pub fn add_many<I, F>(&mut self, table: &str, facts: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Rc<Fact>>,
    {
        let adds = &mut self.ensure_table(table).adds;
        let before = adds.len();
        adds.extend(facts.into_iter().map(Into::into));
        let added = adds.len() - before;
        self.len += added;
        self
    }

    /// Queues explicit facts to be removed, without looking anything up.
    pub fn remove_facts<I, F>(&mut self, table: &str, facts: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Rc<Fact>>,
    {
        let removes = &mut self.ensure_table(table).removes;
        let before = removes.len();
        removes.extend(facts.into_iter().map(Into::into));
        let removed = removes.len() - before;
        self.len += removed;
        self
    }

    /// Queues the removal of every fact in `table` matching `query`.
    ///
    /// The query is resolved against `source` now, so the removed set is a
    /// snapshot of the table at this moment. `None` removes the whole table.
    pub fn remove<S>(&mut self, source: &mut S, table: &str, query: Option<&Fact>) -> &mut Self
    where
        S: FactSource + ?Sized,
    {
        let found = source.find(table, query);
        self.remove_facts(table, found)
    }

    /// Appends every table diff of `other` to this one.
    pub fn merge(&mut self, other: &Diff) -> &mut Self {
        for (table, diff) in &other.tables {
            self.add_many(table, diff.adds.iter().cloned());
            self.remove_facts(table, diff.removes.iter().cloned());
        }
        self
    }

    /// Returns a diff with every add and remove swapped.
    pub fn reverse(&self) -> Diff {
        Diff {
            tables: self
                .tables
                .iter()
                .map(|(name, diff)| (name.clone(), diff.get_reverse()))
                .collect(),
            len: self.len,
        }
    }

    /// Returns the number of queued facts.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the pending changes for one table.
    pub fn table(&self, table: &str) -> Option<&TableDiff> {
        self.tables.get(table)
    }

    /// Iterates over `(table, changes)` in table-name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableDiff)> {
        self.tables.iter().map(|(name, diff)| (name.as_str(), diff))
    }
}
