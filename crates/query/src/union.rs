//! Merge-and-dedup views.
//!
//! A `Union` remaps the facts of several sources onto one field set and keys
//! them by the mapped fields of its first source. `union` sources set a key
//! to their record, `ununion` sources tombstone it; the output is every key
//! that is not tombstoned, in first-seen order.

use crate::ast::Column;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::rc::Rc;
use tessera_core::{Fact, FactKey};
use tessera_storage::FactSource;
use tracing::trace;

/// Whether a source adds or tombstones its records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Records are part of the output
    Union,
    /// Records are removed from the output
    Ununion,
}

impl SourceKind {
    /// Returns the catalog name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Union => "union",
            SourceKind::Ununion => "ununion",
        }
    }
}

/// One source of a union.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionSource {
    /// Table read
    pub table: String,
    /// Output field → source column
    pub mapping: Vec<(String, Column)>,
    /// Adds or tombstones
    pub kind: SourceKind,
}

impl UnionSource {
    fn remap(&self, fact: &Fact) -> Fact {
        let mut out = Fact::new();
        for (to, column) in &self.mapping {
            match column {
                Column::Field(from) => {
                    if let Some(value) = fact.get(from) {
                        out.insert(to.as_str(), value.clone());
                    }
                }
                Column::Constant(value) => {
                    out.insert(to.as_str(), value.clone());
                }
            }
        }
        out
    }
}

/// The dedup table: key → record, `None` for a tombstone.
#[derive(Clone, Debug, Default)]
struct Hashes {
    entries: HashMap<FactKey, Option<Rc<Fact>>>,
    order: Vec<FactKey>,
}

impl Hashes {
    fn set(&mut self, key: FactKey, record: Option<Rc<Fact>>) {
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, record);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn live(&self) -> Vec<Fact> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key)?.as_deref().cloned())
            .collect()
    }
}

/// A union view definition.
#[derive(Clone, Debug)]
pub struct Union {
    name: String,
    pub(crate) sources: Vec<UnionSource>,
    pub(crate) stateful: bool,
    hasher: Vec<String>,
    hashes: Hashes,
    initialized: bool,
}

impl Union {
    /// Creates an empty union. The name is also the name of its view table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            stateful: false,
            hasher: Vec::new(),
            hashes: Hashes::default(),
            initialized: false,
        }
    }

    /// Returns the union name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sources in declaration order.
    pub fn sources(&self) -> &[UnionSource] {
        &self.sources
    }

    fn push<I, K>(mut self, kind: SourceKind, table: &str, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, Column)>,
        K: Into<String>,
    {
        let mapping: Vec<(String, Column)> = mapping.into_iter().map(|(k, c)| (k.into(), c)).collect();
        if self.sources.is_empty() {
            let mut hasher: Vec<String> = mapping.iter().map(|(k, _)| k.clone()).collect();
            hasher.sort();
            hasher.dedup();
            self.hasher = hasher;
        }
        self.sources.push(UnionSource {
            table: table.to_string(),
            mapping,
            kind,
        });
        self.reset();
        self
    }

    /// Adds the remapped facts of `table`.
    pub fn union<I, K>(self, table: &str, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, Column)>,
        K: Into<String>,
    {
        self.push(SourceKind::Union, table, mapping)
    }

    /// Tombstones the remapped facts of `table`.
    pub fn ununion<I, K>(self, table: &str, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, Column)>,
        K: Into<String>,
    {
        self.push(SourceKind::Ununion, table, mapping)
    }

    /// Keeps the dedup table across executions.
    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self.reset();
        self
    }

    /// Returns true if the union keeps its dedup table.
    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    fn reset(&mut self) {
        self.hashes.clear();
        self.initialized = false;
    }

    /// Returns the source tables, in declaration order.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for source in &self.sources {
            if !tables.contains(&source.table) {
                tables.push(source.table.clone());
            }
        }
        tables
    }

    /// Executes the union.
    ///
    /// A stateful union that has run once folds only the adds in `changes`
    /// (facts added per table since its last run) when they are given;
    /// otherwise every source is scanned.
    pub fn exec<C: FactSource + ?Sized>(&mut self, ctx: &mut C, changes: Option<&BTreeMap<String, Vec<Rc<Fact>>>>) -> Vec<Fact> {
        let incremental = match changes {
            Some(changes) if self.stateful && self.initialized => Some(changes),
            _ => None,
        };
        if incremental.is_none() {
            self.hashes.clear();
        }

        for source in &self.sources {
            let facts = match incremental {
                Some(changes) => changes.get(&source.table).cloned().unwrap_or_default(),
                None => ctx.find(&source.table, None),
            };
            for fact in facts {
                let record = source.remap(&fact);
                let key = record.key(&self.hasher);
                match source.kind {
                    SourceKind::Union => self.hashes.set(key, Some(Rc::new(record))),
                    SourceKind::Ununion => self.hashes.set(key, None),
                }
            }
        }
        self.initialized = true;

        let live = self.hashes.live();
        trace!(union = %self.name, incremental = incremental.is_some(), facts = live.len(), "union executed");
        live
    }
}
