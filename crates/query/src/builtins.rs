//! Builtin primitives: aggregates, comparisons, arithmetic and text.

use crate::functions::{fail, succeed, FunctionRegistry, FunctionSpec, Implementation};
use core::cmp::Ordering;
use tessera_core::{fact, Fact, Value};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let mut all: Vec<(&str, FunctionSpec, Implementation)> = vec![
        ("count", FunctionSpec::default(), Implementation::aggregate(count)),
        ("sum", FunctionSpec::new(["value"]), Implementation::aggregate(sum)),
        ("average", FunctionSpec::new(["value"]), Implementation::aggregate(average)),
        ("min", FunctionSpec::new(["value"]), Implementation::aggregate(|state, args| extreme(state, args, "min", Ordering::Less))),
        ("max", FunctionSpec::new(["value"]), Implementation::aggregate(|state, args| extreme(state, args, "max", Ordering::Greater))),
        ("lowercase", FunctionSpec::new(["text"]), Implementation::scalar(lowercase)),
    ];
    let comparisons: [(&str, fn(Ordering) -> bool); 4] = [
        (">", Ordering::is_gt),
        ("<", Ordering::is_lt),
        (">=", Ordering::is_ge),
        ("<=", Ordering::is_le),
    ];
    let arithmetic: [(&str, fn(f64, f64) -> f64); 5] = [
        ("+", |a, b| a + b),
        ("-", |a, b| a - b),
        ("*", |a, b| a * b),
        ("/", |a, b| a / b),
        ("^", f64::powf),
    ];

    all.push(("=", FunctionSpec::new(["a", "b"]).filter(), Implementation::multi(|args| verdict(args[0] == args[1]))));
    all.push(("!=", FunctionSpec::new(["a", "b"]).filter(), Implementation::multi(|args| verdict(args[0] != args[1]))));
    for (name, test) in comparisons {
        all.push((
            name,
            FunctionSpec::new(["a", "b"]).filter(),
            Implementation::multi(move |args| {
                verdict(args[0].compare_same_kind(&args[1]).map(test).unwrap_or(false))
            }),
        ));
    }
    for (name, op) in arithmetic {
        all.push((
            name,
            FunctionSpec::new(["a", "b"]),
            Implementation::scalar(move |args| {
                let result = op(args[0].as_f64()?, args[1].as_f64()?);
                // non-finite results have no snapshot form
                result.is_finite().then(|| fact! { "result" => result })
            }),
        ));
    }

    for (name, spec, implementation) in all {
        let defined = registry.define(name, spec, implementation);
        debug_assert!(defined.is_ok(), "builtin {} rejected: {:?}", name, defined);
    }
}

fn verdict(pass: bool) -> Vec<Fact> {
    if pass {
        succeed()
    } else {
        fail()
    }
}

fn number(state: &Fact, field: &str) -> f64 {
    state.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn count(state: &mut Fact, _args: &[Value]) {
    let n = number(state, "count") + 1.0;
    state.insert("count", n);
}

fn sum(state: &mut Fact, args: &[Value]) {
    if let Some(v) = args[0].as_f64() {
        let total = number(state, "sum") + v;
        state.insert("sum", total);
    }
}

fn average(state: &mut Fact, args: &[Value]) {
    if let Some(v) = args[0].as_f64() {
        let total = number(state, "sum") + v;
        let n = number(state, "count") + 1.0;
        state.insert("sum", total);
        state.insert("count", n);
        state.insert("average", total / n);
    }
}

fn extreme(state: &mut Fact, args: &[Value], field: &str, wanted: Ordering) {
    let replace = match state.get(field) {
        None => true,
        Some(current) => args[0].compare_same_kind(current) == Some(wanted),
    };
    if replace {
        state.insert(field, args[0].clone());
    }
}

fn lowercase(args: &[Value]) -> Option<Fact> {
    let text = args[0].as_str()?;
    Some(fact! { "result" => text.to_lowercase() })
}
