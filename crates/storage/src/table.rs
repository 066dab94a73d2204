//! Set-semantics fact storage for a single table.
//!
//! A `Table` holds each distinct fact once. Identity is the fact's values on
//! the table's field list; the field list is declared up front or inferred
//! from the first fact written. A view's backing table identifies facts by
//! every field they carry, since its rows may change shape between runs.

use hashbrown::HashMap;
use std::rc::Rc;
use tessera_core::{Fact, FactKey};
use tessera_incremental::{batch_from, consolidate};
use tessera_index::{IndexCache, KeyShape};
use tracing::debug;

/// The facts a batch actually added to and removed from a table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableChanges {
    /// Facts that were absent and are now present
    pub adds: Vec<Rc<Fact>>,
    /// Facts that were present and are now absent
    pub removes: Vec<Rc<Fact>>,
}

impl TableChanges {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Returns the number of changed facts.
    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }
}

/// A named set of facts with lazily built index caches.
#[derive(Debug)]
pub struct Table {
    name: String,
    fields: Vec<String>,
    facts: Vec<Rc<Fact>>,
    /// Identity → position in `facts`
    positions: HashMap<FactKey, usize>,
    indexes: HashMap<KeyShape, IndexCache>,
    is_view: bool,
}

impl Table {
    /// Creates an empty table whose fields are inferred on first write.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            facts: Vec::new(),
            positions: HashMap::new(),
            indexes: HashMap::new(),
            is_view: false,
        }
    }

    /// Creates an empty table with declared fields.
    pub fn with_fields<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(name);
        table.fields = fields.into_iter().map(Into::into).collect();
        table
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field list; empty until declared or inferred.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns true if the table declares (or has inferred) `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Replaces the field list, re-identifying the stored facts.
    ///
    /// Facts that become identical under the new fields collapse to the first.
    pub fn set_fields(&mut self, fields: Vec<String>) {
        if fields == self.fields {
            return;
        }
        self.fields = fields;
        self.rekey();
    }

    /// Rebuilds `positions` under the current identity.
    fn rekey(&mut self) {
        let facts = std::mem::take(&mut self.facts);
        self.positions.clear();
        for fact in facts {
            let key = self.identity(&fact);
            if !self.positions.contains_key(&key) {
                self.positions.insert(key, self.facts.len());
                self.facts.push(fact);
            }
        }
        for cache in self.indexes.values_mut() {
            cache.clear();
            cache.collect(&self.facts, &[]);
        }
    }

    fn identity(&self, fact: &Fact) -> FactKey {
        if self.is_view {
            fact.full_key()
        } else {
            fact.key(&self.fields)
        }
    }

    /// Adds any field a view row carries that the field list lacks.
    fn widen_fields(&mut self, facts: &[Rc<Fact>]) {
        for fact in facts {
            for (field, _) in fact.iter() {
                if !self.has_field(field) {
                    self.fields.push(field.clone());
                }
            }
        }
    }

    /// Returns the stored facts in storage order.
    pub fn facts(&self) -> &[Rc<Fact>] {
        &self.facts
    }

    /// Returns the number of facts.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if the table holds no facts.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Returns true if a fact with the same identity is stored.
    pub fn contains(&self, fact: &Fact) -> bool {
        self.positions.contains_key(&self.identity(fact))
    }

    /// Returns true if this table is the backing table of a view.
    pub fn is_view(&self) -> bool {
        self.is_view
    }

    /// Marks or unmarks this table as a view's backing table.
    ///
    /// Switching re-identifies the stored facts; leaving view mode collapses
    /// facts that are identical on the field list.
    pub fn set_view(&mut self, is_view: bool) {
        if self.is_view != is_view {
            self.is_view = is_view;
            self.rekey();
        }
    }

    /// Applies a batch of candidate adds and removes.
    ///
    /// Candidates are counted per identity (+1 per add, -1 per remove). A
    /// positive net count adds the fact if absent; a negative one removes it
    /// if present; everything else is a no-op. Index caches are folded with
    /// the real changes only.
    pub fn update(&mut self, adds: &[Rc<Fact>], removes: &[Rc<Fact>]) -> TableChanges {
        if self.fields.is_empty() {
            if let Some(example) = adds.first().or_else(|| removes.first()) {
                self.fields = example.field_names();
            }
        }

        let batch = batch_from(adds.iter().cloned(), removes.iter().cloned());
        let net = consolidate(batch, |fact| self.identity(fact));

        let mut changes = TableChanges::default();
        for delta in net {
            let key = self.identity(&delta.data);
            if delta.is_insert() && !self.positions.contains_key(&key) {
                self.positions.insert(key, self.facts.len());
                self.facts.push(Rc::clone(&delta.data));
                changes.adds.push(delta.data);
            } else if delta.is_delete() {
                if let Some(ix) = self.positions.remove(&key) {
                    // swap the last fact into the hole
                    let removed = self.facts.swap_remove(ix);
                    if let Some(moved) = self.facts.get(ix) {
                        let moved = self.identity(moved);
                        self.positions.insert(moved, ix);
                    }
                    changes.removes.push(removed);
                }
            }
        }

        if self.is_view {
            self.widen_fields(&changes.adds);
        }
        if !changes.is_empty() {
            for cache in self.indexes.values_mut() {
                cache.collect(&changes.adds, &changes.removes);
            }
        }
        changes
    }

    /// Returns the facts matching every field of `query`.
    ///
    /// An empty query returns the whole table. Otherwise the lookup goes
    /// through the index cache for the query's key shape, building it on
    /// first use.
    pub fn lookup(&mut self, query: &Fact) -> Vec<Rc<Fact>> {
        if query.is_empty() {
            return self.facts.clone();
        }
        self.index(KeyShape::of(query)).lookup(query)
    }

    /// Returns the index cache for a shape, building it if needed.
    pub fn index(&mut self, shape: KeyShape) -> &IndexCache {
        let name = &self.name;
        let facts = &self.facts;
        self.indexes.entry(shape).or_insert_with_key(|shape| {
            debug!(table = %name, shape = %shape, facts = facts.len(), "building index cache");
            IndexCache::build(shape.clone(), facts)
        })
    }

    /// Returns true if a cache exists for this shape.
    pub fn has_index(&self, shape: &KeyShape) -> bool {
        self.indexes.contains_key(shape)
    }

    /// Returns the number of index caches.
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Removes every fact, keeping fields and emptying (not dropping) caches.
    pub fn clear(&mut self) {
        self.facts.clear();
        self.positions.clear();
        for cache in self.indexes.values_mut() {
            cache.clear();
        }
    }
}
