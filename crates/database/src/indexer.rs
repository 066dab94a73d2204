//! The coordinator: owns every table, applies diffs and keeps views current.
//!
//! Views and custom triggers are registered against the tables they read.
//! Applying a diff commits it to the base tables, empties the tables of every
//! view downstream of a change, then re-runs triggers breadth-first: each run
//! is diffed against the trigger's materialized table and only a real change
//! schedules its own dependents for the next round. Propagation ends when a
//! round changes nothing and every emptied view has produced its output
//! again.
//!
//! # Example
//!
//! ```rust
//! use tessera_core::fact;
//! use tessera_database::Indexer;
//! use tessera_query::{field, Mapping, Query};
//!
//! let mut indexer = Indexer::new();
//! let view = Query::new("pairs")
//!     .select("foo", Mapping::new())
//!     .select("bar", [("a", field("foo", "a"))])
//!     .project([("b", field("foo", "b")), ("c", field("bar", "c"))]);
//! indexer.as_view(view).unwrap();
//!
//! let mut diff = indexer.diff();
//! diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }]);
//! diff.add("bar", fact! { "a" => 2, "c" => 5 });
//! indexer.apply_diff(&diff).unwrap();
//!
//! let pairs = indexer.find("pairs", None);
//! assert_eq!(pairs.len(), 1);
//! assert_eq!(pairs[0].as_ref(), &fact! { "b" => 3, "c" => 5 });
//! ```

use crate::config::IndexerConfig;
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tessera_core::{Error, Fact, Result};
use tessera_incremental::{diff_outputs, TriggerGraph};
use tessera_index::KeyShape;
use tessera_query::{FunctionRegistry, FunctionSpec, Implementation, QueryContext, View};
use tessera_storage::{Changes, Diff, FactSource, Table, TableChanges, TableStore};
use tracing::{debug, info, instrument, trace, Span};

/// Facts added per source table since a trigger last ran.
type Inbox = BTreeMap<String, Vec<Rc<Fact>>>;

/// A custom trigger body. Facts it returns are materialized as the table
/// named after the trigger; `None` leaves that table alone.
pub type TriggerFn = Box<dyn FnMut(&mut Indexer) -> Result<Option<Vec<Fact>>>>;

/// Owner of all tables, views and triggers.
pub struct Indexer {
    store: TableStore,
    functions: FunctionRegistry,
    views: BTreeMap<String, View>,
    custom: BTreeMap<String, TriggerFn>,
    triggers: TriggerGraph,
    config: IndexerConfig,
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("tables", &self.store.table_count())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("custom_triggers", &self.custom.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl Indexer {
    /// Creates an empty indexer with the builtin functions and default config.
    pub fn new() -> Self {
        Self::with_config(IndexerConfig::default())
    }

    /// Creates an empty indexer with the given config.
    pub fn with_config(config: IndexerConfig) -> Self {
        Self {
            store: TableStore::new(),
            functions: FunctionRegistry::with_builtins(),
            views: BTreeMap::new(),
            custom: BTreeMap::new(),
            triggers: TriggerGraph::new(),
            config,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Returns a fresh, empty diff.
    pub fn diff(&self) -> Diff {
        Diff::new()
    }

    // ---------------------------------------------------------------
    // Tables
    // ---------------------------------------------------------------

    /// Declares a table's fields, creating the table if needed.
    pub fn add_table<I, S>(&mut self, name: &str, fields: I) -> &mut Table
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.add_table(name, fields)
    }

    /// Returns a table, creating an empty one if needed.
    pub fn table(&mut self, name: &str) -> &mut Table {
        self.store.table(name)
    }

    /// Gets a table if it exists.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.store.get(name)
    }

    /// Empties a table and its index caches. Dependent views are not re-run.
    pub fn clear_table(&mut self, name: &str) {
        self.store.clear_table(name);
    }

    /// Builds the index cache of `table` for a key shape ahead of the first
    /// lookup on it.
    pub fn index<I, S>(&mut self, table: &str, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.table(table).index(KeyShape::new(keys));
    }

    /// Returns the facts of `table` matching every field of `query`.
    pub fn find(&mut self, table: &str, query: Option<&Fact>) -> Vec<Rc<Fact>> {
        self.store.find(table, query)
    }

    /// Returns the first fact of `table` matching `query`.
    pub fn find_one(&mut self, table: &str, query: Option<&Fact>) -> Option<Rc<Fact>> {
        self.store.find(table, query).into_iter().next()
    }

    /// Returns the total fact count across all tables.
    pub fn total_facts(&self) -> usize {
        self.store.total_facts()
    }

    /// Returns the fact count of every table.
    pub fn facts_per_table(&self) -> BTreeMap<String, usize> {
        self.store.facts_per_table()
    }

    /// Drops every view and empties every table.
    ///
    /// Custom triggers stay registered; declared fields and index shapes are
    /// kept.
    pub fn clear(&mut self) {
        let views = std::mem::take(&mut self.views);
        self.store.clear();
        for name in views.keys() {
            self.triggers.unregister(name);
            if let Some(table) = self.store.get_mut(name) {
                table.set_view(false);
            }
        }
        info!(views = views.len(), "indexer cleared");
    }

    // ---------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------

    /// Registers a function for calculations and aggregates.
    pub fn define(&mut self, name: &str, spec: FunctionSpec, implementation: Implementation) -> Result<()> {
        self.functions.define(name, spec, implementation)
    }

    // ---------------------------------------------------------------
    // Diffs and propagation
    // ---------------------------------------------------------------

    /// Commits a diff and propagates it through every dependent view.
    ///
    /// Returns the real changes of the tables the diff touched. When
    /// propagation does not settle within `max_fixpoint_rounds` the error is
    /// `NonConvergent` and tables keep the state reached so far.
    #[instrument(skip(self, diff), fields(facts = diff.len()))]
    pub fn apply_diff(&mut self, diff: &Diff) -> Result<Changes> {
        let changes = self.store.apply(diff);
        debug!(
            tables = changes.len(),
            facts = changes.values().map(TableChanges::len).sum::<usize>(),
            "diff committed"
        );
        self.propagate(&changes)?;
        Ok(changes)
    }

    fn propagate(&mut self, changes: &Changes) -> Result<()> {
        let affected = self
            .triggers
            .transitive_dependents(changes.keys().map(String::as_str));
        if affected.is_empty() {
            return Ok(());
        }
        for name in &affected {
            self.store.clear_table(name);
        }

        let mut pending: HashSet<String> = affected.iter().cloned().collect();
        let mut inboxes: HashMap<String, Inbox> = HashMap::new();
        let mut queue = Vec::new();
        for (table, real) in changes {
            self.schedule(table, real, &mut queue, &mut inboxes);
        }

        let mut rounds = 0;
        loop {
            while !queue.is_empty() {
                if let Some(max) = self.config.max_fixpoint_rounds {
                    if rounds >= max {
                        return Err(Error::non_convergent(queue[0].clone(), rounds));
                    }
                }
                rounds += 1;
                debug!(round = rounds, triggers = queue.len(), "fixpoint round");

                let mut next = Vec::new();
                for name in std::mem::take(&mut queue) {
                    pending.remove(&name);
                    let inbox = inboxes.remove(&name);
                    if let Some(real) = self.execute_trigger(&name, inbox)? {
                        if !real.is_empty() {
                            self.schedule(&name, &real, &mut next, &mut inboxes);
                        }
                    }
                }
                queue = next;
            }
            // emptied views none of whose inputs changed
            queue = affected
                .iter()
                .filter(|name| pending.contains(name.as_str()))
                .cloned()
                .collect();
            if queue.is_empty() {
                break;
            }
        }
        debug!(rounds, triggers = affected.len(), "fixpoint reached");
        Ok(())
    }

    /// Queues the dependents of a changed table, handing its adds to those
    /// that fold change batches.
    fn schedule(&self, table: &str, real: &TableChanges, queue: &mut Vec<String>, inboxes: &mut HashMap<String, Inbox>) {
        for dependent in self.triggers.dependents(table) {
            if self.views.get(dependent).map_or(false, View::wants_changes) {
                inboxes
                    .entry(dependent.clone())
                    .or_default()
                    .entry(table.to_string())
                    .or_default()
                    .extend(real.adds.iter().cloned());
            }
            if !queue.contains(dependent) {
                queue.push(dependent.clone());
            }
        }
    }

    /// Runs one trigger and materializes its output.
    ///
    /// The trigger is taken out of its map while it runs, so it may use the
    /// indexer freely.
    fn execute_trigger(&mut self, name: &str, inbox: Option<Inbox>) -> Result<Option<TableChanges>> {
        let output = if let Some(mut view) = self.views.remove(name) {
            trace!(view = name, kind = view.kind(), "executing view");
            let inbox = if view.wants_changes() {
                Some(inbox.unwrap_or_default())
            } else {
                None
            };
            let result = view.exec(self, inbox.as_ref());
            if self.triggers.contains(name) {
                self.views.entry(name.to_string()).or_insert(view);
            }
            result?
        } else if let Some(mut exec) = self.custom.remove(name) {
            trace!(trigger = name, "executing custom trigger");
            let result = exec(self);
            if self.triggers.contains(name) {
                self.custom.entry(name.to_string()).or_insert(exec);
            }
            result?
        } else {
            return Ok(None);
        };
        Ok(output.map(|facts| self.materialize(name, facts)))
    }

    /// Replaces the contents of a trigger's table with `output`, touching
    /// only what differs. Rows are compared on every field they carry.
    fn materialize(&mut self, name: &str, output: Vec<Fact>) -> TableChanges {
        let table = self.store.table(name);
        table.set_view(true);
        let next: Vec<Rc<Fact>> = output.into_iter().map(Rc::new).collect();
        let delta = diff_outputs(table.facts(), next, |fact| fact.full_key());
        self.store.update_table(name, &delta.adds, &delta.removes)
    }

    // ---------------------------------------------------------------
    // Views and triggers
    // ---------------------------------------------------------------

    /// Materializes a query or union as the table named after it.
    ///
    /// A view already registered under that name is replaced; its output is
    /// reconciled with the new definition's rather than reversed first. The
    /// view runs once and its output propagates before this returns. If
    /// that first run fails the view is not registered.
    #[instrument(skip(self, view), fields(view = tracing::field::Empty))]
    pub fn as_view(&mut self, view: impl Into<View>) -> Result<()> {
        let view = view.into();
        let name = view.name().to_string();
        Span::current().record("view", name.as_str());

        self.custom.remove(&name);
        self.triggers.register(&name, view.tables());
        self.store.table(&name).set_view(true);
        self.views.insert(name.clone(), view);

        let real = match self.execute_trigger(&name, None) {
            Ok(real) => real,
            Err(err) => {
                self.views.remove(&name);
                self.triggers.unregister(&name);
                return Err(err);
            }
        };
        debug!(facts = self.store.get(&name).map_or(0, Table::len), "view materialized");

        if let Some(real) = real.filter(|real| !real.is_empty()) {
            let mut changes = Changes::new();
            changes.insert(name, real);
            self.propagate(&changes)?;
        }
        Ok(())
    }

    /// Unregisters a view or custom trigger and removes its output.
    pub fn remove_view(&mut self, name: &str) -> Result<()> {
        let was_view = self.views.remove(name).is_some();
        let was_trigger = self.custom.remove(name).is_some();
        if !was_view && !was_trigger {
            return Err(Error::view_not_found(name));
        }
        self.triggers.unregister(name);

        let mut diff = Diff::new();
        diff.remove(&mut self.store, name, None);
        debug!(view = name, facts = diff.len(), "view removed");
        self.apply_diff(&diff)?;
        if let Some(table) = self.store.get_mut(name) {
            table.set_view(false);
        }
        Ok(())
    }

    /// Registers a custom trigger run whenever one of `tables` changes.
    ///
    /// Like a view, the trigger runs once on registration and its output
    /// propagates before this returns. If that first run fails the trigger
    /// is not registered.
    #[instrument(skip(self, tables, exec))]
    pub fn trigger<I, S, F>(&mut self, name: &str, tables: I, exec: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&mut Indexer) -> Result<Option<Vec<Fact>>> + 'static,
    {
        self.views.remove(name);
        self.triggers.register(name, tables);
        self.custom.insert(name.to_string(), Box::new(exec));

        let real = match self.execute_trigger(name, None) {
            Ok(real) => real,
            Err(err) => {
                self.custom.remove(name);
                self.triggers.unregister(name);
                return Err(err);
            }
        };
        if let Some(real) = real.filter(|real| !real.is_empty()) {
            let mut changes = Changes::new();
            changes.insert(name.to_string(), real);
            self.propagate(&changes)?;
        }
        Ok(())
    }

    /// Runs an unregistered view once against the current tables.
    pub fn execute(&mut self, view: &mut View) -> Result<Option<Vec<Fact>>> {
        view.exec(self, None)
    }

    /// Returns a registered view.
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    /// Returns the names of the registered views.
    pub fn view_names(&self) -> Vec<&str> {
        self.views.keys().map(String::as_str).collect()
    }

    /// Returns true if a view or custom trigger is registered under `name`.
    pub fn has_trigger(&self, name: &str) -> bool {
        self.triggers.contains(name)
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    fn dump(&self) -> BTreeMap<&str, Vec<&Fact>> {
        self.store
            .iter()
            .filter(|table| self.config.serialize_views || !table.is_view())
            .map(|table| (table.name(), table.facts().iter().map(|fact| &**fact).collect()))
            .collect()
    }

    /// Serializes every table as `{table: [fact, ...]}`.
    ///
    /// View tables are left out unless `serialize_views` is set.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.dump())?)
    }

    /// Returns the snapshot as a JSON value.
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.dump())?)
    }

    /// Replays a snapshot as one add-only diff.
    pub fn load(&mut self, blob: &str) -> Result<()> {
        let tables: BTreeMap<String, Vec<Fact>> = serde_json::from_str(blob)?;
        let mut diff = Diff::new();
        for (name, facts) in tables {
            diff.add_many(&name, facts);
        }
        let changes = self.apply_diff(&diff)?;
        info!(tables = changes.len(), facts = diff.len(), "snapshot loaded");
        Ok(())
    }
}

impl FactSource for Indexer {
    fn find(&mut self, table: &str, query: Option<&Fact>) -> Vec<Rc<Fact>> {
        self.store.find(table, query)
    }

    fn fields(&self, table: &str) -> &[String] {
        FactSource::fields(&self.store, table)
    }
}

impl QueryContext for Indexer {
    fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}
