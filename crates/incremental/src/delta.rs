//! Signed change counting.
//!
//! A `Delta` pairs an item with a signed multiplicity: `+1` per add, `-1` per
//! remove. [`consolidate`] folds a batch of deltas into one net delta per
//! identity, which is how a batch of candidate adds and removes is reduced to
//! the changes that actually matter.

use core::hash::Hash;
use hashbrown::HashMap;

/// A signed change to a data item.
///
/// - `+1` means one add
/// - `-1` means one remove
/// - Other values are the net of several adds/removes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta<T> {
    /// The data being changed
    pub data: T,
    /// Net multiplicity of the change
    pub diff: i32,
}

impl<T> Delta<T> {
    /// Creates a delta with an explicit multiplicity.
    pub fn new(data: T, diff: i32) -> Self {
        Self { data, diff }
    }

    /// Creates an add delta (+1).
    #[inline]
    pub fn insert(data: T) -> Self {
        Self { data, diff: 1 }
    }

    /// Creates a remove delta (-1).
    #[inline]
    pub fn delete(data: T) -> Self {
        Self { data, diff: -1 }
    }

    /// Returns true if this is a net add.
    #[inline]
    pub fn is_insert(&self) -> bool {
        self.diff > 0
    }

    /// Returns true if this is a net remove.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.diff < 0
    }
}

/// A batch of deltas.
pub type DeltaBatch<T> = Vec<Delta<T>>;

/// Builds a batch from candidate adds followed by candidate removes.
pub fn batch_from<T>(adds: impl IntoIterator<Item = T>, removes: impl IntoIterator<Item = T>) -> DeltaBatch<T> {
    adds.into_iter()
        .map(Delta::insert)
        .chain(removes.into_iter().map(Delta::delete))
        .collect()
}

/// Sums the diffs of a batch per identity.
///
/// The result holds one delta per distinct key, in the order each key was
/// first seen, carrying the first item seen for it. Keys whose diffs cancel
/// are kept with `diff == 0`; callers decide what a zero means.
pub fn consolidate<T, K, F>(batch: DeltaBatch<T>, mut key_fn: F) -> DeltaBatch<T>
where
    K: Hash + Eq,
    F: FnMut(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(batch.len());
    let mut out: DeltaBatch<T> = Vec::with_capacity(batch.len());
    for delta in batch {
        let key = key_fn(&delta.data);
        match positions.get(&key) {
            Some(&ix) => out[ix].diff += delta.diff,
            None => {
                positions.insert(key, out.len());
                out.push(delta);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_insert() {
        let d = Delta::insert(42);
        assert!(d.is_insert());
        assert!(!d.is_delete());
        assert_eq!(d.diff, 1);
        assert_eq!(d.data, 42);
    }

    #[test]
    fn test_delta_delete() {
        let d = Delta::delete("x");
        assert!(d.is_delete());
        assert_eq!(d.diff, -1);
    }

    #[test]
    fn test_consolidate_cancels() {
        let batch = batch_from(vec![1, 2, 1], vec![2, 3]);
        let net = consolidate(batch, |x| *x);
        assert_eq!(
            net,
            vec![Delta::new(1, 2), Delta::new(2, 0), Delta::new(3, -1)]
        );
    }

    #[test]
    fn test_consolidate_keeps_first_item() {
        let batch = batch_from(vec![("a", 1), ("a", 2)], vec![]);
        let net = consolidate(batch, |(k, _)| *k);
        assert_eq!(net.len(), 1);
        assert_eq!(net[0].data, ("a", 1));
        assert_eq!(net[0].diff, 2);
    }

    #[test]
    fn test_consolidate_first_seen_order() {
        let batch = batch_from(vec![3, 1], vec![2, 3]);
        let order: Vec<i32> = consolidate(batch, |x| *x).into_iter().map(|d| d.data).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
