//! Tessera Core - Fact and value types for the Tessera relational engine.
//!
//! This crate provides the fundamental types shared by every layer:
//!
//! - `Value`: a scalar field value (boolean, number or string)
//! - `Fact`: a tuple mapping field names to values
//! - `FactKey`: the identity of a fact over a table's field list
//! - `Error` / `Result`: engine errors
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{fact, Value};
//!
//! let f = fact! { "name" => "ada", "age" => 36 };
//! assert_eq!(f.get("age"), Some(&Value::from(36)));
//! ```

pub mod error;
pub mod fact;
pub mod value;

pub use error::{Error, Result};
pub use fact::{Fact, FactKey};
pub use value::Value;
