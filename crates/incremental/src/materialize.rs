//! Diffing a view's fresh output against its materialized state.
//!
//! A view is re-executed in full; what gets applied to its backing table is
//! only the difference between the rows it held and the rows it now produces.

use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

/// Rows to add to and remove from a materialized view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputChanges<T> {
    /// Rows produced now but not held before
    pub adds: Vec<T>,
    /// Rows held before but no longer produced
    pub removes: Vec<T>,
}

impl<T> OutputChanges<T> {
    /// Returns true if the output did not change.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }
}

/// Compares `previous` rows with `next` rows by identity.
///
/// Duplicate rows in `next` collapse to their first occurrence. Adds follow
/// the order of `next`; removes follow the order of `previous`.
pub fn diff_outputs<T, K, F>(previous: &[T], next: Vec<T>, mut key_fn: F) -> OutputChanges<T>
where
    T: Clone,
    K: Hash + Eq,
    F: FnMut(&T) -> K,
{
    let before: HashSet<K> = previous.iter().map(&mut key_fn).collect();
    let mut after: HashMap<K, ()> = HashMap::with_capacity(next.len());
    let mut adds = Vec::new();
    for row in next {
        let key = key_fn(&row);
        if after.contains_key(&key) {
            continue;
        }
        if !before.contains(&key) {
            adds.push(row);
        }
        after.insert(key, ());
    }
    let removes = previous
        .iter()
        .filter(|row| !after.contains_key(&key_fn(*row)))
        .cloned()
        .collect();
    OutputChanges { adds, removes }
}
