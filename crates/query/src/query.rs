//! Declarative query builder.
//!
//! A `Query` is an ordered list of steps plus optional grouping, sorting,
//! limits and a projection. Every builder call marks the query dirty; the
//! next execution compiles it into a plan, which is reused until the query
//! changes again.
//!
//! # Example
//!
//! ```rust
//! use tessera_core::fact;
//! use tessera_query::{field, Mapping, Query, StoreContext};
//! use tessera_storage::Diff;
//!
//! let mut ctx = StoreContext::new();
//! let mut diff = Diff::new();
//! diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }]);
//! diff.add("bar", fact! { "a" => 2, "c" => 5 });
//! ctx.store.apply(&diff);
//!
//! let mut query = Query::new("joined")
//!     .select_as("foo", Mapping::new(), "foo")
//!     .select_as("bar", [("a", field("foo", "a"))], "bar")
//!     .project([("b", field("foo", "b")), ("c", field("bar", "c"))]);
//!
//! let output = query.exec(&mut ctx).unwrap();
//! assert_eq!(output.results, Some(vec![fact! { "b" => 3, "c" => 5 }]));
//! ```

use crate::ast::{mapping, Binding, FieldRef, Limit, Mapping, SortKey};
use crate::context::QueryContext;
use crate::plan::{compile, Plan};
use std::rc::Rc;
use std::time::Instant;
use tessera_core::{Fact, Result};
use tracing::{debug, info};

/// One unprojected slot: the fact bound by a step, if any.
pub type Slot = Option<Rc<Fact>>;

/// Kind of a query step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Nested-loop join over a table
    Select,
    /// Anti-join guard
    Deselect,
    /// Per-row function call
    Calculate,
    /// Per-group fold
    Aggregate,
}

impl StepKind {
    /// Returns the catalog name of the step kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Select => "select",
            StepKind::Deselect => "deselect",
            StepKind::Calculate => "calculate",
            StepKind::Aggregate => "aggregate",
        }
    }
}

/// A declared step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// What the step does
    pub kind: StepKind,
    /// Table name for joins, function name otherwise
    pub source: String,
    /// Join map or function arguments
    pub mapping: Mapping,
    /// Name later steps use to reference this one
    pub alias: Option<String>,
}

/// The output of one query execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOutput {
    /// Projected facts, if the query has a projection
    pub results: Option<Vec<Fact>>,
    /// Flat buffer of `stride`-long unprojected rows
    pub unprojected: Vec<Slot>,
    /// Group (or rank) of each row admitted by the aggregate loop
    pub group_info: Option<Vec<Option<usize>>>,
    /// Slots per unprojected row
    pub stride: usize,
    row_count: usize,
}

impl QueryOutput {
    pub(crate) fn new(
        results: Option<Vec<Fact>>,
        unprojected: Vec<Slot>,
        group_info: Option<Vec<Option<usize>>>,
        stride: usize,
        row_count: usize,
    ) -> Self {
        Self {
            results,
            unprojected,
            group_info,
            stride,
            row_count,
        }
    }

    /// Returns the number of unprojected rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Iterates over the unprojected rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Slot]> {
        let stride = self.stride;
        (0..self.row_count).map(move |ix| &self.unprojected[ix * stride..(ix + 1) * stride])
    }
}

/// A query view definition.
#[derive(Clone, Debug)]
pub struct Query {
    name: String,
    pub(crate) steps: Vec<Step>,
    pub(crate) groups: Vec<FieldRef>,
    pub(crate) sorts: Vec<SortKey>,
    pub(crate) limit: Option<Limit>,
    pub(crate) ordinal: bool,
    pub(crate) projection: Option<Mapping>,
    dirty: bool,
    plan: Option<Plan>,
}

impl Query {
    /// Creates an empty query. The name is also the name of its view table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            groups: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            ordinal: false,
            projection: None,
            dirty: true,
            plan: None,
        }
    }

    /// Returns the query name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns true if the query changed since it was last compiled.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn push<I, K>(mut self, kind: StepKind, source: &str, pairs: I, alias: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.steps.push(Step {
            kind,
            source: source.to_string(),
            mapping: mapping(pairs),
            alias: alias.map(str::to_string),
        });
        self.dirty = true;
        self
    }

    /// Joins `table`, aliased by its own name.
    pub fn select<I, K>(self, table: &str, join: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Select, table, join, Some(table))
    }

    /// Joins `table` under `alias`.
    ///
    /// Each join entry `field → binding` narrows the table to facts whose
    /// `field` equals the binding's value.
    pub fn select_as<I, K>(self, table: &str, join: I, alias: &str) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Select, table, join, Some(alias))
    }

    /// Keeps a row only if no fact of `table` matches the join map.
    pub fn deselect<I, K>(self, table: &str, join: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Deselect, table, join, None)
    }

    /// Calls `function` for every joined row, aliased by the function name.
    pub fn calculate<I, K>(self, function: &str, args: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Calculate, function, args, Some(function))
    }

    /// Calls `function` for every joined row under `alias`.
    pub fn calculate_as<I, K>(self, function: &str, args: I, alias: &str) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Calculate, function, args, Some(alias))
    }

    /// Folds every admitted row of a group, aliased by the function name.
    pub fn aggregate<I, K>(self, function: &str, args: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Aggregate, function, args, Some(function))
    }

    /// Folds every admitted row of a group under `alias`.
    pub fn aggregate_as<I, K>(self, function: &str, args: I, alias: &str) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.push(StepKind::Aggregate, function, args, Some(alias))
    }

    /// Groups rows by the given fields.
    pub fn group<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        self.groups.extend(fields.into_iter().map(Into::into));
        self.dirty = true;
        self
    }

    /// Sorts rows (within groups) by the given keys.
    pub fn sort<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SortKey>,
    {
        self.sorts.extend(keys.into_iter().map(Into::into));
        self.dirty = true;
        self
    }

    /// Limits results, members per group, or skips members.
    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit.get_or_insert_with(Limit::default).merge(limit);
        self.dirty = true;
        self
    }

    /// Adds the row rank under the reserved alias `ordinal`.
    pub fn ordinal(mut self) -> Self {
        self.ordinal = true;
        self.dirty = true;
        self
    }

    /// Maps bound fields (or literals) into output facts.
    pub fn project<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        self.projection = Some(mapping(fields));
        self.dirty = true;
        self
    }

    /// Returns true if the query has a projection.
    pub fn has_projection(&self) -> bool {
        self.projection.is_some()
    }

    /// Returns the tables read by the query's joins, in declaration order.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for step in &self.steps {
            let is_join = matches!(step.kind, StepKind::Select | StepKind::Deselect);
            if is_join && !tables.contains(&step.source) {
                tables.push(step.source.clone());
            }
        }
        tables
    }

    /// Compiles the query into a plan, validating every reference.
    pub fn compile<C: QueryContext + ?Sized>(&mut self, ctx: &C) -> Result<()> {
        let plan = compile(self, ctx)?;
        debug!(query = %self.name, stride = plan.stride, "query compiled");
        self.plan = Some(plan);
        self.dirty = false;
        Ok(())
    }

    fn prepare<C: QueryContext + ?Sized>(&mut self, ctx: &C) -> Result<()> {
        if self.dirty || self.plan.is_none() {
            self.compile(ctx)?;
        }
        Ok(())
    }

    /// Executes the query, compiling it first if it changed.
    pub fn exec<C: QueryContext + ?Sized>(&mut self, ctx: &mut C) -> Result<QueryOutput> {
        self.prepare(&*ctx)?;
        Ok(match &self.plan {
            Some(plan) => plan.execute(ctx),
            None => QueryOutput::default(),
        })
    }

    /// Executes the query, logging the compiled plan and the elapsed time.
    pub fn debug<C: QueryContext + ?Sized>(&mut self, ctx: &mut C) -> Result<QueryOutput> {
        let started = Instant::now();
        self.prepare(&*ctx)?;
        let output = match &self.plan {
            Some(plan) => {
                debug!(query = %self.name, plan = ?plan, "query plan");
                plan.execute(ctx)
            }
            None => QueryOutput::default(),
        };
        info!(
            query = %self.name,
            rows = output.row_count(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query executed"
        );
        Ok(output)
    }
}
