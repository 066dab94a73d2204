//! Benchmarks for diff propagation through views.
//!
//! Each iteration adds one fact and removes it again, so the measured work
//! is two full propagations through the registered views.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::fact;
use tessera_database::Indexer;
use tessera_query::{column, constant, field, Mapping, Query, Union};

/// Simple LCG for reproducible pseudo-random values
fn lcg(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    *seed >> 33
}

fn seeded(count: usize) -> Indexer {
    let mut indexer = Indexer::new();
    let mut seed = 12345;
    let mut diff = indexer.diff();
    for i in 0..count {
        let dept = (lcg(&mut seed) % 100) as i64;
        diff.add("people", fact! { "id" => i as i64, "dept" => dept, "age" => (lcg(&mut seed) % 80) as i64 });
    }
    for dept in 0..100i64 {
        diff.add("depts", fact! { "dept" => dept, "name" => format!("dept_{}", dept) });
    }
    indexer.apply_diff(&diff).unwrap();
    indexer
}

fn round_trip(indexer: &mut Indexer, id: i64) {
    let person = fact! { "id" => id, "dept" => 7, "age" => 30 };
    let mut add = indexer.diff();
    add.add("people", person.clone());
    indexer.apply_diff(&add).unwrap();
    let mut remove = indexer.diff();
    remove.remove_facts("people", vec![person]);
    black_box(indexer.apply_diff(&remove).unwrap());
}

fn bench_join_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_view");
    for size in [100, 1000, 10000] {
        let mut indexer = seeded(size);
        let view = Query::new("staff")
            .select("people", Mapping::new())
            .select("depts", [("dept", field("people", "dept"))])
            .project([("id", field("people", "id")), ("name", field("depts", "name"))]);
        indexer.as_view(view).unwrap();
        let id = size as i64;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| round_trip(&mut indexer, id))
        });
    }
    group.finish();
}

fn bench_view_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_chain");
    for size in [100, 1000] {
        let mut indexer = seeded(size);
        let sizes = Query::new("dept sizes")
            .select("people", Mapping::new())
            .group([("people", "dept")])
            .aggregate("count", Mapping::new())
            .project([("dept", field("people", "dept")), ("count", field("count", "count"))]);
        let busy = Query::new("busy depts")
            .select("dept sizes", Mapping::new())
            .calculate(">", [("a", field("dept sizes", "count")), ("b", constant(5))])
            .project([("dept", field("dept sizes", "dept"))]);
        let names = Union::new("dept ids")
            .union("busy depts", [("dept", column("dept"))])
            .union("depts", [("dept", column("dept"))]);
        indexer.as_view(sizes).unwrap();
        indexer.as_view(busy).unwrap();
        indexer.as_view(names).unwrap();
        let id = size as i64;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| round_trip(&mut indexer, id))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_join_view, bench_view_chain);
criterion_main!(benches);
