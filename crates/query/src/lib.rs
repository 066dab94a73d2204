//! Tessera Query - Query and union views for the Tessera relational engine.
//!
//! This crate provides the view definitions and their execution:
//!
//! - `ast`: Field references, bindings, sort keys and limits
//! - `functions`: Function registry and the builtin primitives
//! - `query`: Declarative join/aggregate builder, compiled to a plan on demand
//! - `union`: Merge-and-dedup views with optional persistent state
//! - `view`: The `View` sum of both
//! - `catalog`: View definitions stored as facts
//! - `context`: What execution needs from its environment

pub mod ast;
mod builtins;
pub mod catalog;
pub mod context;
mod executor;
pub mod functions;
mod plan;
pub mod query;
pub mod union;
pub mod view;

pub use ast::{column, constant, field, Binding, Column, Direction, FieldRef, Limit, Mapping, SortKey, ORDINAL};
pub use context::{QueryContext, StoreContext};
pub use functions::{fail, succeed, FunctionDef, FunctionRegistry, FunctionSpec, Implementation};
pub use query::{Query, QueryOutput, Slot, Step, StepKind};
pub use union::{SourceKind, Union, UnionSource};
pub use view::View;
