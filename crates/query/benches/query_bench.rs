//! Benchmarks for query execution.
//!
//! Tables are seeded outside the measured closure; lookups on the joined
//! table go through index caches that are built on the first iteration.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::fact;
use tessera_query::{field, Limit, Mapping, Query, SortKey, StoreContext};
use tessera_storage::Diff;

/// Simple LCG for reproducible pseudo-random values
fn lcg(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    *seed >> 33
}

fn seeded(count: usize) -> StoreContext {
    let mut ctx = StoreContext::new();
    let mut seed = 12345;
    let mut diff = Diff::new();
    for i in 0..count {
        let group = (lcg(&mut seed) % 100) as i64;
        diff.add("people", fact! { "id" => i as i64, "dept" => group, "age" => (lcg(&mut seed) % 80) as i64 });
    }
    for dept in 0..100i64 {
        diff.add("depts", fact! { "dept" => dept, "name" => format!("dept_{}", dept) });
    }
    ctx.store.apply(&diff);
    ctx
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");
    for size in [100, 1000, 10000] {
        let mut ctx = seeded(size);
        let mut query = Query::new("q")
            .select("people", Mapping::new())
            .select("depts", [("dept", field("people", "dept"))])
            .project([("id", field("people", "id")), ("name", field("depts", "name"))]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(query.exec(&mut ctx).unwrap()))
        });
    }
    group.finish();
}

fn bench_group_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_aggregate");
    for size in [100, 1000, 10000] {
        let mut ctx = seeded(size);
        let mut query = Query::new("q")
            .select("people", Mapping::new())
            .group([("people", "dept")])
            .aggregate("average", [("value", field("people", "age"))])
            .project([("dept", field("people", "dept")), ("avg", field("average", "average"))]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(query.exec(&mut ctx).unwrap()))
        });
    }
    group.finish();
}

fn bench_sort_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_limit");
    for size in [100, 1000] {
        let mut ctx = seeded(size);
        let mut query = Query::new("q")
            .select("people", Mapping::new())
            .sort([SortKey::desc("people", "age")])
            .limit(Limit::results(10))
            .project([("id", field("people", "id"))]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(query.exec(&mut ctx).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_join, bench_group_aggregate, bench_sort_limit);
criterion_main!(benches);
