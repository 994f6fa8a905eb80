// Planner benchmarks: end-to-end planning latency for representative query
// shapes against a fixed statistics snapshot.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use strata_planner::stats::mcv::McvList;
use strata_planner::stats::{FieldStatistics, TableStatistics};
use strata_planner::{
    CostModel, IndexDescriptor, IndexField, PlannerConfig, PlannerHints, Predicate, Query,
    QueryPlanner, SortDescriptor, StatisticsCache, StatisticsSnapshot, Value,
};

fn bench_planner() -> QueryPlanner {
    let status = FieldStatistics {
        distinct_count: 3,
        null_count: 0,
        total_count: 100_000,
        min: None,
        max: None,
        mcv: McvList::from_counts(
            &[
                (Value::String("active".into()), 60_000),
                (Value::String("inactive".into()), 30_000),
                (Value::String("banned".into()), 10_000),
            ],
            100_000,
            32,
            0.001,
        ),
        histogram: None,
    };
    let snapshot = StatisticsSnapshot::new()
        .with_table(TableStatistics::new("users", 100_000).with_field("status", status));
    QueryPlanner::new(
        PlannerConfig::default(),
        CostModel::default(),
        Arc::new(StatisticsCache::new(snapshot)),
    )
    .unwrap()
}

fn bench_indexes() -> Vec<IndexDescriptor> {
    vec![
        IndexDescriptor::btree("idx_status", vec![IndexField::ascending("status")]),
        IndexDescriptor::btree(
            "idx_status_created",
            vec![
                IndexField::ascending("status"),
                IndexField::ascending("created_at"),
            ],
        ),
        IndexDescriptor::unique_btree("idx_id", vec![IndexField::ascending("id")]),
    ]
}

fn planning_benchmarks(c: &mut Criterion) {
    let planner = bench_planner();
    let indexes = bench_indexes();

    let point = Query::filtered(Predicate::eq("status", Value::String("active".into())));
    c.bench_function("plan_point_lookup", |b| {
        b.iter(|| {
            planner
                .plan("users", &point, &indexes, &PlannerHints::none())
                .unwrap()
        })
    });

    let top_n = Query::filtered(Predicate::eq("status", Value::String("active".into())))
        .with_sort(vec![SortDescriptor::ascending("created_at")])
        .with_limit(20);
    c.bench_function("plan_top_n", |b| {
        b.iter(|| {
            planner
                .plan("users", &top_n, &indexes, &PlannerHints::none())
                .unwrap()
        })
    });

    let disjunction = Query::filtered(Predicate::or(vec![
        Predicate::eq("status", Value::String("banned".into())),
        Predicate::in_list("id", (1..=8).map(Value::Integer).collect()),
    ]));
    c.bench_function("plan_disjunction", |b| {
        b.iter(|| {
            planner
                .plan("users", &disjunction, &indexes, &PlannerHints::none())
                .unwrap()
        })
    });
}

criterion_group!(benches, planning_benchmarks);
criterion_main!(benches);
