//! Registered primitives callable from `calculate` and `aggregate` steps.
//!
//! A function is a name, a parameter list and flags, bound to one of three
//! implementation kinds. Plain scalar functions produce one fact per call
//! (or none, which drops the row), `multi`/`filter` functions produce any
//! number of facts, and aggregates fold each admitted row into a running
//! state fact.

use core::fmt;
use hashbrown::HashMap;
use std::rc::Rc;
use tessera_core::{fact, Error, Fact, Result, Value};

/// Scalar implementation: arguments in parameter order → one result fact.
pub type ScalarFn = Rc<dyn Fn(&[Value]) -> Option<Fact>>;
/// Multi-row implementation: arguments → zero or more result facts.
pub type MultiFn = Rc<dyn Fn(&[Value]) -> Vec<Fact>>;
/// Aggregate implementation: folds one row's arguments into the state.
pub type AggregateFn = Rc<dyn Fn(&mut Fact, &[Value])>;

/// The callable behind a function definition.
#[derive(Clone)]
pub enum Implementation {
    /// One result per call
    Scalar(ScalarFn),
    /// Zero or more results per call
    Multi(MultiFn),
    /// Folds rows into a group state
    Aggregate(AggregateFn),
}

impl Implementation {
    /// Wraps a scalar closure.
    pub fn scalar(f: impl Fn(&[Value]) -> Option<Fact> + 'static) -> Self {
        Implementation::Scalar(Rc::new(f))
    }

    /// Wraps a multi-row closure.
    pub fn multi(f: impl Fn(&[Value]) -> Vec<Fact> + 'static) -> Self {
        Implementation::Multi(Rc::new(f))
    }

    /// Wraps an aggregate closure.
    pub fn aggregate(f: impl Fn(&mut Fact, &[Value]) + 'static) -> Self {
        Implementation::Aggregate(Rc::new(f))
    }

    fn kind(&self) -> &'static str {
        match self {
            Implementation::Scalar(_) => "scalar",
            Implementation::Multi(_) => "multi",
            Implementation::Aggregate(_) => "aggregate",
        }
    }
}

/// Parameters and flags of a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Parameter names, in call order
    pub params: Vec<String>,
    /// Yields zero or more rows per call
    pub multi: bool,
    /// Yields `[{success: true}]` or nothing; its result is not stored
    pub filter: bool,
    /// Its result is not stored in the row
    pub no_return: bool,
}

impl FunctionSpec {
    /// Creates a spec with the given parameters and no flags.
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Marks the function as multi-row.
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Marks the function as a filter.
    pub fn filter(mut self) -> Self {
        self.filter = true;
        self
    }

    /// Marks the function's result as not stored.
    pub fn no_return(mut self) -> Self {
        self.no_return = true;
        self
    }
}

/// A registered function.
#[derive(Clone)]
pub struct FunctionDef {
    name: String,
    spec: FunctionSpec,
    implementation: Implementation,
}

impl FunctionDef {
    /// Returns the function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameters and flags.
    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    /// Returns the parameter names.
    pub fn params(&self) -> &[String] {
        &self.spec.params
    }

    /// Returns the implementation.
    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    /// Returns true if this is an aggregate.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.implementation, Implementation::Aggregate(_))
    }

    /// Returns true if a calculation with this function keeps a slot in the
    /// unprojected row.
    pub fn is_stored(&self) -> bool {
        !self.spec.filter && !self.spec.no_return
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("kind", &self.implementation.kind())
            .finish()
    }
}

/// The filter result of a passing comparison.
pub fn succeed() -> Vec<Fact> {
    vec![fact! { "success" => true }]
}

/// The filter result of a failing comparison.
pub fn fail() -> Vec<Fact> {
    Vec::new()
}

/// Name → function map consulted when queries compile.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Rc<FunctionDef>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the builtin primitives.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register(&mut registry);
        registry
    }

    /// Defines (or redefines) a function.
    ///
    /// Multi-row implementations need the `multi` or `filter` flag and those
    /// flags need a multi-row implementation; aggregates take neither.
    pub fn define(&mut self, name: &str, spec: FunctionSpec, implementation: Implementation) -> Result<()> {
        let fans_out = spec.multi || spec.filter;
        match &implementation {
            Implementation::Multi(_) if !fans_out => {
                return Err(Error::invalid_function(name, "multi-row implementation needs the multi or filter flag"));
            }
            Implementation::Scalar(_) if fans_out => {
                return Err(Error::invalid_function(name, "multi and filter functions need a multi-row implementation"));
            }
            Implementation::Aggregate(_) if fans_out || spec.no_return => {
                return Err(Error::invalid_function(name, "aggregates take no multi, filter or no_return flag"));
            }
            _ => {}
        }
        self.functions.insert(
            name.to_string(),
            Rc::new(FunctionDef {
                name: name.to_string(),
                spec,
                implementation,
            }),
        );
        Ok(())
    }

    /// Looks up a function.
    pub fn get(&self, name: &str) -> Option<Rc<FunctionDef>> {
        self.functions.get(name).cloned()
    }

    /// Returns true if a function is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Returns the defined names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of defined functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
