//! Key shapes: the sorted field set an index cache is keyed on.

use core::fmt;
use tessera_core::{Fact, Value};

/// A sorted, de-duplicated set of field names.
///
/// Two lookups that name the same fields, in any order, share one shape and
/// therefore one index cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyShape {
    fields: Vec<String>,
}

impl KeyShape {
    /// Creates a shape from field names in any order.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        fields.sort();
        fields.dedup();
        Self { fields }
    }

    /// Creates the shape of a lookup query: the query fact's own fields.
    pub fn of(query: &Fact) -> Self {
        // a fact's field names are already sorted and unique
        Self {
            fields: query.field_names(),
        }
    }

    /// Returns the sorted field names.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the number of key fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the shape has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Extracts this shape's key values from a fact, in shape order.
    ///
    /// Returns None if the fact lacks any key field.
    pub fn extract<'a>(&self, fact: &'a Fact) -> Option<Vec<&'a Value>> {
        self.fields.iter().map(|f| fact.get(f)).collect()
    }
}

impl fmt::Display for KeyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields.join("|"))
    }
}
