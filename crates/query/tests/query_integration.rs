//! Integration tests for query execution: joins, anti-joins, functions,
//! grouping, sorting and limits.

use tessera_core::{fact, Error, Fact};
use tessera_query::{
    constant, field, FunctionSpec, Implementation, Limit, Mapping, Query, SortKey, StoreContext,
};
use tessera_storage::Diff;

/// Helper to create a context holding `foo` and `bar`.
fn sample() -> StoreContext {
    let mut ctx = StoreContext::new();
    let mut diff = Diff::new();
    diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }, fact! { "a" => 2, "b" => 4 }]);
    diff.add("bar", fact! { "a" => 2, "c" => 5 });
    ctx.store.apply(&diff);
    ctx
}

fn results(query: &mut Query, ctx: &mut StoreContext) -> Vec<Fact> {
    query.exec(ctx).unwrap().results.unwrap_or_default()
}

#[test]
fn test_join_projects_matching_pairs() {
    let mut ctx = StoreContext::new();
    let mut diff = Diff::new();
    diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }]);
    diff.add("bar", fact! { "a" => 2, "c" => 5 });
    ctx.store.apply(&diff);

    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .select("bar", [("a", field("foo", "a"))])
        .project([("b", field("foo", "b")), ("c", field("bar", "c"))]);
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "b" => 3, "c" => 5 }]);
}

#[test]
fn test_unprojected_rows_have_fixed_stride() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .select("bar", [("a", field("foo", "a"))]);
    let output = query.exec(&mut ctx).unwrap();
    assert!(output.results.is_none());
    assert_eq!(output.stride, 2);
    assert_eq!(output.row_count(), 2);
    assert_eq!(output.unprojected.len(), 4);
    for row in output.rows() {
        assert_eq!(row[1].as_deref(), Some(&fact! { "a" => 2, "c" => 5 }));
    }
}

#[test]
fn test_group_and_count() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .aggregate("count", Mapping::new())
        .project([("a", field("foo", "a")), ("count", field("count", "count"))]);
    assert_eq!(
        results(&mut query, &mut ctx),
        vec![fact! { "a" => 1, "count" => 1 }, fact! { "a" => 2, "count" => 2 }]
    );
}

#[test]
fn test_groups_follow_sort_order() {
    let mut ctx = StoreContext::new();
    let mut diff = Diff::new();
    diff.add_many("foo", vec![fact! { "a" => 3, "b" => 1 }, fact! { "a" => 1, "b" => 1 }, fact! { "a" => 3, "b" => 2 }]);
    ctx.store.apply(&diff);

    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .aggregate_as("sum", [("value", field("foo", "b"))], "total")
        .project([("a", field("foo", "a")), ("sum", field("total", "sum"))]);
    assert_eq!(
        results(&mut query, &mut ctx),
        vec![fact! { "a" => 1, "sum" => 1 }, fact! { "a" => 3, "sum" => 3 }]
    );
}

#[test]
fn test_per_group_limit() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .limit(Limit::per_group(1))
        .project([("a", field("foo", "a")), ("b", field("foo", "b"))]);
    let out = results(&mut query, &mut ctx);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get("a"), Some(&1.into()));
    assert_eq!(out[1].get("a"), Some(&2.into()));
}

#[test]
fn test_grouping_without_aggregates_projects_once_per_group() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .limit(Limit::per_group(2))
        .project([("a", field("foo", "a")), ("b", field("foo", "b"))]);
    let out = results(&mut query, &mut ctx);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], fact! { "a" => 1, "b" => 2 });
    assert_eq!(out[1].get("a"), Some(&2.into()));
}

#[test]
fn test_per_group_limit_with_sort_and_offset() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .sort([SortKey::desc("foo", "b")])
        .limit(Limit::per_group(1).with_offset(1))
        .project([("b", field("foo", "b"))]);
    // group a=1 has nothing past the offset; group a=2 skips b=4
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "b" => 3 }]);
}

#[test]
fn test_results_limit_counts_groups() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .sort([SortKey::desc("foo", "a")])
        .limit(Limit::results(1))
        .project([("b", field("foo", "b"))]);
    // groups are always ascending; only a=1 fits
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "b" => 2 }]);
}

#[test]
fn test_sort_and_limit_ungrouped() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .sort([SortKey::desc("foo", "b")])
        .limit(Limit::results(2).with_offset(0))
        .ordinal()
        .project([("b", field("foo", "b")), ("rank", field("ordinal", "ordinal"))]);
    assert_eq!(
        results(&mut query, &mut ctx),
        vec![fact! { "b" => 4, "rank" => 0 }, fact! { "b" => 3, "rank" => 1 }]
    );
}

#[test]
fn test_ungrouped_aggregate_is_one_row() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .aggregate("average", [("value", field("foo", "b"))])
        .project([("avg", field("average", "average"))]);
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "avg" => 3 }]);
}

#[test]
fn test_anti_join() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .deselect("bar", [("a", field("foo", "a"))])
        .project([("b", field("foo", "b"))]);
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "b" => 2 }]);

    let mut diff = Diff::new();
    diff.add("bar", fact! { "a" => 1, "c" => 0 });
    ctx.store.apply(&diff);
    assert!(results(&mut query, &mut ctx).is_empty());
}

#[test]
fn test_join_on_constant() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", [("a", constant(2))])
        .project([("b", field("foo", "b"))]);
    let mut out = results(&mut query, &mut ctx);
    out.sort();
    assert_eq!(out, vec![fact! { "b" => 3 }, fact! { "b" => 4 }]);
}

#[test]
fn test_missing_join_field_matches_nothing() {
    let mut ctx = sample();
    ctx.store.add_table("loose", ["a", "x"]);
    let mut diff = Diff::new();
    diff.add("loose", fact! { "x" => 1 });
    ctx.store.apply(&diff);

    let mut query = Query::new("q")
        .select("loose", Mapping::new())
        .select("foo", [("a", field("loose", "a"))])
        .project([("b", field("foo", "b"))]);
    assert!(results(&mut query, &mut ctx).is_empty());
}

#[test]
fn test_filter_and_arithmetic() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .calculate(">", [("a", field("foo", "b")), ("b", constant(2))])
        .calculate_as("*", [("a", field("foo", "b")), ("b", constant(10))], "scaled")
        .project([("x", field("scaled", "result"))]);
    let mut out = results(&mut query, &mut ctx);
    out.sort();
    assert_eq!(out, vec![fact! { "x" => 30 }, fact! { "x" => 40 }]);
}

#[test]
fn test_multi_function_fans_out() {
    let mut ctx = sample();
    ctx.functions
        .define(
            "range",
            FunctionSpec::new(["n"]).multi(),
            Implementation::multi(|args| {
                let n = args[0].as_i64().unwrap_or(0);
                (0..n).map(|i| fact! { "i" => i }).collect()
            }),
        )
        .unwrap();

    let mut query = Query::new("q")
        .select("foo", [("a", constant(1))])
        .calculate("range", [("n", field("foo", "b"))])
        .project([("i", field("range", "i"))]);
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "i" => 0 }, fact! { "i" => 1 }]);
}

#[test]
fn test_unresolved_argument_drops_row() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .calculate("+", [("a", field("foo", "missing")), ("b", constant(1))])
        .project([("x", field("+", "result"))]);
    assert!(results(&mut query, &mut ctx).is_empty());
}

#[test]
fn test_scalar_without_result_drops_row() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .calculate("lowercase", [("text", field("foo", "b"))])
        .project([("x", field("lowercase", "result"))]);
    assert!(results(&mut query, &mut ctx).is_empty());
}

#[test]
fn test_projection_omits_missing_fields() {
    let mut ctx = StoreContext::new();
    ctx.store.add_table("sparse", ["a", "d"]);
    let mut diff = Diff::new();
    diff.add("sparse", fact! { "a" => 1 });
    ctx.store.apply(&diff);

    let mut query = Query::new("q")
        .select("sparse", Mapping::new())
        .project([("a", field("sparse", "a")), ("d", field("sparse", "d")), ("k", constant("tag"))]);
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "a" => 1, "k" => "tag" }]);
}

#[test]
fn test_projection_is_not_deduplicated() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", [("a", constant(2))])
        .project([("a", field("foo", "a"))]);
    assert_eq!(results(&mut query, &mut ctx), vec![fact! { "a" => 2 }, fact! { "a" => 2 }]);
}

#[test]
fn test_compile_error_surfaces_from_exec() {
    let mut ctx = sample();
    let mut query = Query::new("q").select("foo", [("a", field("ghost", "a"))]);
    assert!(matches!(query.exec(&mut ctx), Err(Error::InvalidAlias { .. })));
}

#[test]
fn test_plan_is_reused_until_changed() {
    let mut ctx = sample();
    let mut query = Query::new("q").select("foo", Mapping::new());
    query.exec(&mut ctx).unwrap();
    assert!(!query.is_dirty());
    query.exec(&mut ctx).unwrap();
    assert!(!query.is_dirty());

    let mut query = query.project([("a", field("foo", "a"))]);
    assert!(query.is_dirty());
    assert_eq!(results(&mut query, &mut ctx).len(), 3);
}

#[test]
fn test_debug_matches_exec() {
    let mut ctx = sample();
    let mut query = Query::new("q")
        .select("foo", Mapping::new())
        .sort([("foo", "b")])
        .project([("b", field("foo", "b"))]);
    let debugged = query.debug(&mut ctx).unwrap();
    let executed = query.exec(&mut ctx).unwrap();
    assert_eq!(debugged, executed);
}
