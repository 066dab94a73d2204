//! Facts: the tuples stored in tables.
//!
//! A `Fact` maps field names to scalar values. Two facts of the same table are
//! the same fact when their values agree on the table's field list; the
//! `FactKey` computed by [`Fact::key`] is that identity.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// One tuple of a table, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fact {
    fields: BTreeMap<String, Value>,
}

impl Fact {
    /// Creates an empty fact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Fact::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Returns the value of a field.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns true if the fact has the field.
    #[inline]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the fact has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(field, value)` pairs in field-name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Returns the field names in field-name order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Computes the identity of this fact restricted to `fields`.
    ///
    /// Missing fields contribute `None`, so facts that lack a field never
    /// collide with facts holding any value for it.
    pub fn key(&self, fields: &[String]) -> FactKey {
        FactKey(fields.iter().map(|f| self.fields.get(f).cloned()).collect())
    }

    /// Computes the identity of this fact over all of its own fields.
    pub fn full_key(&self) -> FactKey {
        FactKey(self.fields.values().cloned().map(Some).collect())
    }
}

impl<K, V> FromIterator<(K, V)> for Fact
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Fact {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Identity of a fact over an ordered field list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FactKey(Vec<Option<Value>>);

impl FactKey {
    /// Returns the key components.
    pub fn values(&self) -> &[Option<Value>] {
        &self.0
    }
}

/// Builds a [`Fact`] from `field => value` pairs.
///
/// ```
/// use tessera_core::fact;
///
/// let f = fact! { "a" => 1, "name" => "x" };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fact {
    () => {
        $crate::Fact::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {
        $crate::Fact::new()$(.with($field, $value))+
    };
}
