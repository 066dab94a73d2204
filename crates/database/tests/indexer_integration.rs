//! Integration tests for the indexer: view maintenance, the fixpoint loop,
//! snapshots, custom triggers and the view catalog.

use std::rc::Rc;
use tessera_core::{fact, Error, Fact, Value};
use tessera_database::{install_view_catalog, Indexer, IndexerConfig};
use tessera_query::catalog::{remove_changeset, VIEW};
use tessera_query::{column, field, Limit, Mapping, Query, Union, View};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper to create an indexer holding `foo` and `bar`.
fn sample() -> Indexer {
    init_tracing();
    let mut indexer = Indexer::new();
    let mut diff = indexer.diff();
    diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }, fact! { "a" => 2, "b" => 4 }]);
    diff.add("bar", fact! { "a" => 2, "c" => 5 });
    indexer.apply_diff(&diff).unwrap();
    indexer
}

fn sorted(facts: Vec<Rc<Fact>>) -> Vec<Fact> {
    let mut facts: Vec<Fact> = facts.iter().map(|f| f.as_ref().clone()).collect();
    facts.sort();
    facts
}

fn contents(indexer: &mut Indexer, table: &str) -> Vec<Fact> {
    sorted(indexer.find(table, None))
}

fn pairs_view() -> Query {
    Query::new("pairs")
        .select("foo", Mapping::new())
        .select("bar", [("a", field("foo", "a"))])
        .project([("b", field("foo", "b")), ("c", field("bar", "c"))])
}

// ---------------------------------------------------------------------------
// Views over base tables
// ---------------------------------------------------------------------------

#[test]
fn test_join_view() {
    let mut indexer = Indexer::new();
    let mut diff = indexer.diff();
    diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 2, "b" => 3 }]);
    diff.add("bar", fact! { "a" => 2, "c" => 5 });
    indexer.apply_diff(&diff).unwrap();

    indexer.as_view(pairs_view()).unwrap();
    assert_eq!(contents(&mut indexer, "pairs"), vec![fact! { "b" => 3, "c" => 5 }]);
}

#[test]
fn test_group_count_view() {
    let mut indexer = sample();
    let view = Query::new("counts")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .aggregate("count", Mapping::new())
        .project([("a", field("foo", "a")), ("count", field("count", "count"))]);
    indexer.as_view(view).unwrap();
    assert_eq!(
        contents(&mut indexer, "counts"),
        vec![fact! { "a" => 1, "count" => 1 }, fact! { "a" => 2, "count" => 2 }]
    );
}

#[test]
fn test_per_group_limit_view() {
    let mut indexer = sample();
    let view = Query::new("firsts")
        .select("foo", Mapping::new())
        .group([("foo", "a")])
        .limit(Limit::per_group(1))
        .project([("a", field("foo", "a")), ("b", field("foo", "b"))]);
    indexer.as_view(view).unwrap();

    let rows = contents(&mut indexer, "firsts");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|f| f.get("a") == Some(&Value::from(2))).count(), 1);
}

#[test]
fn test_view_converges_in_one_apply() {
    let mut indexer = sample();
    indexer.as_view(pairs_view()).unwrap();

    let mut diff = indexer.diff();
    diff.add("bar", fact! { "a" => 1, "c" => 7 });
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(
        contents(&mut indexer, "pairs"),
        vec![
            fact! { "b" => 2, "c" => 7 },
            fact! { "b" => 3, "c" => 5 },
            fact! { "b" => 4, "c" => 5 },
        ]
    );

    // nothing left dirty: an empty diff changes nothing
    let before = indexer.facts_per_table();
    let changes = indexer.apply_diff(&indexer.diff()).unwrap();
    assert!(changes.is_empty());
    assert_eq!(indexer.facts_per_table(), before);
}

#[test]
fn test_anti_join_row_disappears() {
    let mut indexer = sample();
    let view = Query::new("lonely")
        .select("foo", Mapping::new())
        .deselect("bar", [("a", field("foo", "a"))])
        .project([("a", field("foo", "a")), ("b", field("foo", "b"))]);
    indexer.as_view(view).unwrap();
    assert_eq!(contents(&mut indexer, "lonely"), vec![fact! { "a" => 1, "b" => 2 }]);

    let mut diff = indexer.diff();
    diff.add("bar", fact! { "a" => 1, "c" => 0 });
    indexer.apply_diff(&diff).unwrap();
    assert!(contents(&mut indexer, "lonely").is_empty());
}

#[test]
fn test_chained_views() {
    let mut indexer = sample();
    indexer.as_view(pairs_view()).unwrap();
    let totals = Query::new("totals")
        .select("pairs", Mapping::new())
        .aggregate_as("sum", [("value", field("pairs", "b"))], "total")
        .project([("sum", field("total", "sum"))]);
    indexer.as_view(totals).unwrap();
    assert_eq!(contents(&mut indexer, "totals"), vec![fact! { "sum" => 7 }]);

    let mut diff = indexer.diff();
    diff.remove(&mut indexer, "foo", Some(&fact! { "b" => 4 }));
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(contents(&mut indexer, "totals"), vec![fact! { "sum" => 3 }]);
}

#[test]
fn test_recursive_closure_tracks_removes() {
    init_tracing();
    let mut indexer = Indexer::new();
    let mut diff = indexer.diff();
    diff.add_many(
        "edge",
        vec![fact! { "from" => 1, "to" => 2 }, fact! { "from" => 2, "to" => 3 }, fact! { "from" => 3, "to" => 4 }],
    );
    indexer.apply_diff(&diff).unwrap();

    let path = Union::new("path")
        .union("edge", [("from", column("from")), ("to", column("to"))])
        .union("hop", [("from", column("from")), ("to", column("to"))]);
    let hop = Query::new("hop")
        .select("path", Mapping::new())
        .select("edge", [("from", field("path", "to"))])
        .project([("from", field("path", "from")), ("to", field("edge", "to"))]);
    indexer.as_view(path).unwrap();
    indexer.as_view(hop).unwrap();
    assert_eq!(indexer.find("path", None).len(), 6);

    let mut diff = indexer.diff();
    diff.remove(&mut indexer, "edge", Some(&fact! { "from" => 2 }));
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(
        contents(&mut indexer, "path"),
        vec![fact! { "from" => 1, "to" => 2 }, fact! { "from" => 3, "to" => 4 }]
    );
}

#[test]
fn test_oscillating_view_is_non_convergent() {
    init_tracing();
    let mut indexer = Indexer::with_config(IndexerConfig::new().max_fixpoint_rounds(Some(5)));
    let flip = Query::new("flip")
        .select("seed", Mapping::new())
        .deselect("flip", [("x", field("seed", "x"))])
        .project([("x", field("seed", "x"))]);
    indexer.as_view(flip).unwrap();

    let mut diff = indexer.diff();
    diff.add("seed", fact! { "x" => 1 });
    match indexer.apply_diff(&diff) {
        Err(Error::NonConvergent { view, rounds }) => {
            assert_eq!(view, "flip");
            assert_eq!(rounds, 5);
        }
        other => panic!("expected NonConvergent, got {:?}", other),
    }
    // the base table change is kept
    assert_eq!(indexer.find("seed", None).len(), 1);
}

#[test]
fn test_view_registered_before_data() {
    init_tracing();
    let mut indexer = Indexer::new();
    indexer.as_view(pairs_view()).unwrap();
    assert!(indexer.find("pairs", None).is_empty());

    let mut diff = indexer.diff();
    diff.add("foo", fact! { "a" => 9, "b" => 1 });
    diff.add("bar", fact! { "a" => 9, "c" => 2 });
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(contents(&mut indexer, "pairs"), vec![fact! { "b" => 1, "c" => 2 }]);
}

#[test]
fn test_redefining_a_view_replaces_its_output() {
    let mut indexer = sample();
    indexer.as_view(pairs_view()).unwrap();
    let narrower = Query::new("pairs")
        .select("foo", Mapping::new())
        .select("bar", [("a", field("foo", "a"))])
        .project([("c", field("bar", "c"))]);
    indexer.as_view(narrower).unwrap();
    assert_eq!(contents(&mut indexer, "pairs"), vec![fact! { "c" => 5 }]);
}

#[test]
fn test_redefining_a_view_with_a_wider_projection() {
    init_tracing();
    let mut indexer = Indexer::new();
    let mut diff = indexer.diff();
    diff.add_many("foo", vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 1, "b" => 3 }]);
    indexer.apply_diff(&diff).unwrap();

    indexer
        .as_view(Query::new("v").select("foo", Mapping::new()).project([("a", field("foo", "a"))]))
        .unwrap();
    assert_eq!(contents(&mut indexer, "v"), vec![fact! { "a" => 1 }]);

    let wider = Query::new("v")
        .select("foo", Mapping::new())
        .project([("a", field("foo", "a")), ("b", field("foo", "b"))]);
    indexer.as_view(wider).unwrap();
    assert_eq!(
        contents(&mut indexer, "v"),
        vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 1, "b" => 3 }]
    );
    assert!(indexer.get_table("v").map_or(false, |table| table.has_field("b")));
}

#[test]
fn test_view_rows_missing_a_field_stay_distinct() {
    init_tracing();
    let mut indexer = Indexer::new();
    indexer.add_table("foo", ["a", "b"]);
    let mut diff = indexer.diff();
    diff.add_many("foo", vec![fact! { "a" => 1 }, fact! { "a" => 1, "b" => 2 }, fact! { "a" => 1, "b" => 3 }]);
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(indexer.find("foo", None).len(), 3);

    let view = Query::new("v")
        .select("foo", Mapping::new())
        .project([("a", field("foo", "a")), ("b", field("foo", "b"))]);
    indexer.as_view(view).unwrap();
    assert_eq!(indexer.find("v", None).len(), 3);

    let mut diff = indexer.diff();
    diff.remove_facts("foo", vec![fact! { "a" => 1 }]);
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(
        contents(&mut indexer, "v"),
        vec![fact! { "a" => 1, "b" => 2 }, fact! { "a" => 1, "b" => 3 }]
    );
}

#[test]
fn test_remove_view_removes_output() {
    let mut indexer = sample();
    indexer.as_view(pairs_view()).unwrap();
    indexer.remove_view("pairs").unwrap();
    assert!(indexer.find("pairs", None).is_empty());
    assert!(!indexer.has_trigger("pairs"));

    // base changes no longer reach it
    let mut diff = indexer.diff();
    diff.add("bar", fact! { "a" => 1, "c" => 1 });
    indexer.apply_diff(&diff).unwrap();
    assert!(indexer.find("pairs", None).is_empty());
}

#[test]
fn test_execute_one_shot() {
    let mut indexer = sample();
    let mut view = View::from(pairs_view());
    let output = indexer.execute(&mut view).unwrap().unwrap_or_default();
    assert_eq!(output.len(), 2);
    assert!(!indexer.has_trigger("pairs"));
    assert!(indexer.get_table("pairs").is_none());
}

// ---------------------------------------------------------------------------
// Diff semantics
// ---------------------------------------------------------------------------

#[test]
fn test_idempotent_apply() {
    let mut indexer = sample();
    indexer.as_view(pairs_view()).unwrap();
    let mut diff = indexer.diff();
    diff.add("foo", fact! { "a" => 2, "b" => 8 });
    diff.remove_facts("foo", vec![fact! { "a" => 1, "b" => 2 }]);

    let first = indexer.apply_diff(&diff).unwrap();
    let snapshot = contents(&mut indexer, "pairs");
    let second = indexer.apply_diff(&diff).unwrap();
    assert!(!first.is_empty());
    assert!(second.is_empty());
    assert_eq!(contents(&mut indexer, "pairs"), snapshot);
}

#[test]
fn test_add_then_remove_cancels() {
    let mut indexer = sample();
    let mut diff = indexer.diff();
    diff.add("foo", fact! { "a" => 7, "b" => 7 });
    diff.remove_facts("foo", vec![fact! { "a" => 7, "b" => 7 }]);
    let changes = indexer.apply_diff(&diff).unwrap();
    assert!(changes.is_empty());
    assert_eq!(indexer.find("foo", None).len(), 3);
}

// ---------------------------------------------------------------------------
// Unions and custom triggers
// ---------------------------------------------------------------------------

#[test]
fn test_union_view_dedups() {
    let mut indexer = sample();
    let union = Union::new("as")
        .union("foo", [("a", column("a"))])
        .union("bar", [("a", column("a"))]);
    indexer.as_view(union).unwrap();
    assert_eq!(contents(&mut indexer, "as"), vec![fact! { "a" => 1 }, fact! { "a" => 2 }]);
}

#[test]
fn test_stateful_union_accumulates() {
    init_tracing();
    let mut indexer = Indexer::new();
    let seen = Union::new("seen").union("events", [("x", column("x"))]).stateful();
    indexer.as_view(seen).unwrap();

    let mut diff = indexer.diff();
    diff.add("events", fact! { "x" => 1 });
    indexer.apply_diff(&diff).unwrap();

    let mut diff = indexer.diff();
    diff.remove(&mut indexer, "events", None);
    diff.add("events", fact! { "x" => 2 });
    indexer.apply_diff(&diff).unwrap();

    assert_eq!(indexer.find("events", None).len(), 1);
    assert_eq!(contents(&mut indexer, "seen"), vec![fact! { "x" => 1 }, fact! { "x" => 2 }]);
}

#[test]
fn test_custom_trigger_materializes() {
    let mut indexer = sample();
    indexer
        .trigger("size", ["foo"], |indexer: &mut Indexer| {
            let n = indexer.find("foo", None).len();
            Ok(Some(vec![fact! { "n" => n }]))
        })
        .unwrap();
    // registration runs it against the current tables
    assert_eq!(contents(&mut indexer, "size"), vec![fact! { "n" => 3 }]);

    let mut diff = indexer.diff();
    diff.add("foo", fact! { "a" => 5, "b" => 5 });
    indexer.apply_diff(&diff).unwrap();
    assert_eq!(contents(&mut indexer, "size"), vec![fact! { "n" => 4 }]);

    indexer.remove_view("size").unwrap();
    assert!(indexer.find("size", None).is_empty());
}

#[test]
fn test_custom_function_in_view() {
    use tessera_query::{FunctionSpec, Implementation};

    let mut indexer = sample();
    indexer
        .define(
            "double",
            FunctionSpec::new(["value"]),
            Implementation::scalar(|args: &[Value]| {
                let n = args.first()?.as_f64()?;
                Some(fact! { "result" => n * 2.0 })
            }),
        )
        .unwrap();
    let view = Query::new("doubled")
        .select("bar", Mapping::new())
        .calculate("double", [("value", field("bar", "c"))])
        .project([("d", field("double", "result"))]);
    indexer.as_view(view).unwrap();
    assert_eq!(contents(&mut indexer, "doubled"), vec![fact! { "d" => 10 }]);
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[test]
fn test_snapshot_round_trip() {
    let mut indexer = sample();
    indexer.as_view(pairs_view()).unwrap();
    let blob = indexer.serialize().unwrap();

    let mut restored = Indexer::new();
    restored.load(&blob).unwrap();
    for table in ["foo", "bar"] {
        assert_eq!(contents(&mut restored, table), contents(&mut indexer, table));
    }
    // view tables are skipped by default
    assert!(restored.find("pairs", None).is_empty());
}

#[test]
fn test_snapshot_with_views() {
    let mut indexer = Indexer::with_config(IndexerConfig::new().serialize_views(true));
    let mut diff = indexer.diff();
    diff.add_many("foo", vec![fact! { "a" => 2, "b" => 3 }]);
    diff.add("bar", fact! { "a" => 2, "c" => 5 });
    indexer.apply_diff(&diff).unwrap();
    indexer.as_view(pairs_view()).unwrap();

    let snapshot = indexer.snapshot().unwrap();
    assert_eq!(snapshot["pairs"], serde_json::json!([{ "b": 3, "c": 5 }]));
    assert_eq!(snapshot["foo"], serde_json::json!([{ "a": 2, "b": 3 }]));
}

#[test]
fn test_serialize_rejects_non_finite_numbers() {
    let mut indexer = sample();
    let mut diff = indexer.diff();
    diff.add("foo", fact! { "a" => f64::NAN, "b" => 1 });
    indexer.apply_diff(&diff).unwrap();
    assert!(matches!(indexer.serialize(), Err(Error::Serialization(_))));
    assert!(matches!(indexer.snapshot(), Err(Error::Serialization(_))));
}

#[test]
fn test_load_rejects_garbage() {
    let mut indexer = Indexer::new();
    assert!(matches!(indexer.load("{\"foo\": 3}"), Err(Error::Serialization(_))));
}

// ---------------------------------------------------------------------------
// View catalog
// ---------------------------------------------------------------------------

#[test]
fn test_catalog_registers_and_unregisters_views() {
    let mut indexer = sample();
    install_view_catalog(&mut indexer).unwrap();

    let view = View::from(pairs_view());
    indexer.apply_diff(&view.changeset()).unwrap();
    assert!(indexer.view("pairs").is_some());
    assert_eq!(contents(&mut indexer, "pairs").len(), 2);

    let removal = remove_changeset(&mut indexer, "pairs");
    indexer.apply_diff(&removal).unwrap();
    assert!(indexer.view("pairs").is_none());
    assert!(indexer.find("pairs", None).is_empty());
    assert!(indexer.find(VIEW, None).is_empty());
}

#[test]
fn test_catalog_drops_broken_views() {
    let mut indexer = sample();
    install_view_catalog(&mut indexer).unwrap();

    let broken = View::from(
        Query::new("broken")
            .select("foo", Mapping::new())
            .calculate("no such function", Mapping::new())
            .project([("a", field("foo", "a"))]),
    );
    indexer.apply_diff(&broken.changeset()).unwrap();
    assert!(indexer.view("broken").is_none());
    assert!(indexer.find(VIEW, None).is_empty());
}

#[test]
fn test_catalog_survives_snapshot() {
    let mut indexer = sample();
    install_view_catalog(&mut indexer).unwrap();
    indexer.apply_diff(&View::from(pairs_view()).changeset()).unwrap();
    let blob = indexer.serialize().unwrap();

    let mut restored = Indexer::new();
    install_view_catalog(&mut restored).unwrap();
    restored.load(&blob).unwrap();
    assert!(restored.view("pairs").is_some());
    assert_eq!(contents(&mut restored, "pairs"), contents(&mut indexer, "pairs"));
}

#[test]
fn test_installing_the_catalog_registers_existing_views() {
    let mut indexer = sample();
    indexer.apply_diff(&View::from(pairs_view()).changeset()).unwrap();
    assert!(indexer.view("pairs").is_none());

    install_view_catalog(&mut indexer).unwrap();
    assert!(indexer.view("pairs").is_some());
    assert_eq!(contents(&mut indexer, "pairs").len(), 2);
}
