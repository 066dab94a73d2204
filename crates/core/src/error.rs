//! Error types for the Tessera engine.
//!
//! Only programmer errors are reported: references to undeclared aliases or
//! fields, unknown functions, and views that never settle. Data-shape
//! mismatches (missing tables, unmatched lookups) yield empty results instead.

use thiserror::Error;

/// Result type alias for Tessera operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Tessera operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A join, argument or projection map names an alias no earlier step declared.
    #[error("Invalid alias used: {alias}")]
    InvalidAlias { alias: String },
    /// A field is absent from a table whose fields are declared.
    #[error("Table '{table}' doesn't have a field '{field}'. Available fields: {}", available.join(", "))]
    UnknownField {
        table: String,
        field: String,
        available: Vec<String>,
    },
    /// No function is registered under this name.
    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },
    /// A function parameter has no binding.
    #[error("Function '{function}' is missing argument '{param}'")]
    MissingArgument { function: String, param: String },
    /// A function definition is inconsistent with its implementation.
    #[error("Invalid definition for function '{name}': {message}")]
    InvalidFunction { name: String, message: String },
    /// The trigger loop exceeded its round budget.
    #[error("View '{view}' did not converge after {rounds} rounds")]
    NonConvergent { view: String, rounds: usize },
    /// A view name has no registered definition.
    #[error("View not found: {name}")]
    ViewNotFound { name: String },
    /// A cataloged view cannot be rebuilt.
    #[error("Invalid view '{view}': {message}")]
    InvalidView { view: String, message: String },
    /// Snapshot encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates an invalid alias error.
    pub fn invalid_alias(alias: impl Into<String>) -> Self {
        Error::InvalidAlias {
            alias: alias.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(table: impl Into<String>, field: impl Into<String>, available: &[String]) -> Self {
        Error::UnknownField {
            table: table.into(),
            field: field.into(),
            available: available.to_vec(),
        }
    }

    /// Creates an unknown function error.
    pub fn unknown_function(name: impl Into<String>) -> Self {
        Error::UnknownFunction { name: name.into() }
    }

    /// Creates a missing argument error.
    pub fn missing_argument(function: impl Into<String>, param: impl Into<String>) -> Self {
        Error::MissingArgument {
            function: function.into(),
            param: param.into(),
        }
    }

    /// Creates an invalid function definition error.
    pub fn invalid_function(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidFunction {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a non-convergence error.
    pub fn non_convergent(view: impl Into<String>, rounds: usize) -> Self {
        Error::NonConvergent {
            view: view.into(),
            rounds,
        }
    }

    /// Creates a view not found error.
    pub fn view_not_found(name: impl Into<String>) -> Self {
        Error::ViewNotFound { name: name.into() }
    }

    /// Creates an invalid view error.
    pub fn invalid_view(view: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidView {
            view: view.into(),
            message: message.into(),
        }
    }
}
