//! Builder-level definitions shared by queries, unions and the view catalog.

use core::fmt;
use tessera_core::Value;

/// The reserved alias under which a query's row rank can be referenced.
pub const ORDINAL: &str = "ordinal";

/// Reference to a field of an aliased step.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Alias of the select, calculate or aggregate step.
    pub source: String,
    /// Field name within that step's fact.
    pub field: String,
}

impl FieldRef {
    /// Creates a new field reference.
    pub fn new(source: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            field: field.into(),
        }
    }
}

impl From<(&str, &str)> for FieldRef {
    fn from((source, field): (&str, &str)) -> Self {
        Self::new(source, field)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.field)
    }
}

/// Where a mapped value comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    /// A field of an earlier step.
    Field(FieldRef),
    /// A literal.
    Constant(Value),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Field(field) => field.fmt(f),
            Binding::Constant(value) => write!(f, "{:?}", value),
        }
    }
}

/// Shorthand for `Binding::Field`.
pub fn field(source: impl Into<String>, field: impl Into<String>) -> Binding {
    Binding::Field(FieldRef::new(source, field))
}

/// Shorthand for `Binding::Constant`.
pub fn constant(value: impl Into<Value>) -> Binding {
    Binding::Constant(value.into())
}

/// An ordered list of `target field → binding` pairs.
pub type Mapping = Vec<(String, Binding)>;

pub(crate) fn mapping<I, K>(pairs: I) -> Mapping
where
    I: IntoIterator<Item = (K, Binding)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, b)| (k.into(), b)).collect()
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl Direction {
    /// Returns the catalog name of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "ascending",
            Direction::Descending => "descending",
        }
    }

    /// Parses a catalog name; anything but "descending" is ascending.
    pub fn parse(name: &str) -> Self {
        if name == "descending" {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }
}

/// A sort key: a field reference and a direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    /// Field sorted on
    pub field: FieldRef,
    /// Sort direction
    pub direction: Direction,
}

impl SortKey {
    /// Ascending sort on `source.field`.
    pub fn asc(source: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            field: FieldRef::new(source, field),
            direction: Direction::Ascending,
        }
    }

    /// Descending sort on `source.field`.
    pub fn desc(source: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            field: FieldRef::new(source, field),
            direction: Direction::Descending,
        }
    }
}

impl From<(&str, &str)> for SortKey {
    fn from((source, field): (&str, &str)) -> Self {
        Self::asc(source, field)
    }
}

impl From<(&str, &str, Direction)> for SortKey {
    fn from((source, field, direction): (&str, &str, Direction)) -> Self {
        Self {
            field: FieldRef::new(source, field),
            direction,
        }
    }
}

impl From<FieldRef> for SortKey {
    fn from(field: FieldRef) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
        }
    }
}

/// Result limits of a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limit {
    /// Maximum number of groups (or rows, when ungrouped).
    pub results: Option<usize>,
    /// Maximum number of members admitted per group.
    pub per_group: Option<usize>,
    /// Members (or rows) skipped before admitting any.
    pub offset: Option<usize>,
}

impl Limit {
    /// Limits the number of results.
    pub fn results(n: usize) -> Self {
        Self {
            results: Some(n),
            ..Self::default()
        }
    }

    /// Limits the members of each group.
    pub fn per_group(n: usize) -> Self {
        Self {
            per_group: Some(n),
            ..Self::default()
        }
    }

    /// Skips the first `n` members.
    pub fn offset(n: usize) -> Self {
        Self {
            offset: Some(n),
            ..Self::default()
        }
    }

    /// Sets the offset.
    pub fn with_offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    /// Overrides the fields that `other` sets.
    pub fn merge(&mut self, other: Limit) {
        if other.results.is_some() {
            self.results = other.results;
        }
        if other.per_group.is_some() {
            self.per_group = other.per_group;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
    }
}

/// A union source column: a field of the source fact or a literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// A field of the source fact.
    Field(String),
    /// A literal.
    Constant(Value),
}

/// Shorthand for `Column::Field`.
pub fn column(field: impl Into<String>) -> Column {
    Column::Field(field.into())
}
