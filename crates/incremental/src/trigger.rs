//! Table → dependent trigger adjacency.
//!
//! Every view (and custom trigger) is registered against the tables it reads.
//! Since a view's output is itself a table, dependents may chain, and may
//! form cycles for recursive views.

use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

/// Tracks which triggers read which tables.
#[derive(Debug, Default)]
pub struct TriggerGraph {
    /// Map from table name to triggers that read it, in registration order
    table_dependents: HashMap<String, Vec<String>>,
    /// Map from trigger name to the tables it reads
    trigger_sources: HashMap<String, Vec<String>>,
}

impl TriggerGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `trigger` on every table in `tables`, replacing any previous
    /// registration under the same name.
    pub fn register<I, S>(&mut self, trigger: &str, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unregister(trigger);
        let mut sources: Vec<String> = Vec::new();
        for table in tables {
            let table = table.into();
            if sources.contains(&table) {
                continue;
            }
            self.table_dependents
                .entry(table.clone())
                .or_default()
                .push(trigger.to_string());
            sources.push(table);
        }
        self.trigger_sources.insert(trigger.to_string(), sources);
    }

    /// Removes a trigger from every table it was registered on.
    ///
    /// Returns the tables it read, or None if it was not registered.
    pub fn unregister(&mut self, trigger: &str) -> Option<Vec<String>> {
        let sources = self.trigger_sources.remove(trigger)?;
        for table in &sources {
            if let Some(deps) = self.table_dependents.get_mut(table) {
                deps.retain(|dep| dep != trigger);
                if deps.is_empty() {
                    self.table_dependents.remove(table);
                }
            }
        }
        Some(sources)
    }

    /// Returns true if a trigger is registered under this name.
    pub fn contains(&self, trigger: &str) -> bool {
        self.trigger_sources.contains_key(trigger)
    }

    /// Returns the triggers that read `table`.
    pub fn dependents(&self, table: &str) -> &[String] {
        self.table_dependents
            .get(table)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the tables a trigger reads.
    pub fn sources(&self, trigger: &str) -> &[String] {
        self.trigger_sources
            .get(trigger)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns every trigger reachable from `tables`, breadth-first, each once.
    pub fn transitive_dependents<'a, I>(&self, tables: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for table in tables {
            queue.push_back(table);
        }
        while let Some(table) = queue.pop_front() {
            for dep in self.dependents(table) {
                if seen.insert(dep.as_str()) {
                    out.push(dep.clone());
                    queue.push_back(dep.as_str());
                }
            }
        }
        out
    }

    /// Returns the number of registered triggers.
    pub fn len(&self) -> usize {
        self.trigger_sources.len()
    }

    /// Returns true if no trigger is registered.
    pub fn is_empty(&self) -> bool {
        self.trigger_sources.is_empty()
    }

    /// Returns an iterator over registered trigger names.
    pub fn trigger_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.trigger_sources.keys().map(|s| s.as_str())
    }
}
