// Planner Scenario Tests
//
// End-to-end planning scenarios over a fixed statistics snapshot: index
// selection, compound-index ordering, IN-list unions, DNF expansion and its
// explosion fallback, limit pushdown with early termination, hints, and
// resource budgets.

use std::sync::Arc;
use strata_planner::stats::mcv::McvList;
use strata_planner::stats::{FieldStatistics, IndexStatistics, TableStatistics};
use strata_planner::{
    CostModel, IndexDescriptor, IndexField, PlanOperator, PlannedQuery, PlannerConfig,
    PlannerError, PlannerHints, Predicate, Query, QueryPlanner, SortDescriptor, StatisticsCache,
    StatisticsSnapshot, Value,
};

const ROWS: u64 = 10_000;

fn status_value(s: &str) -> Value {
    Value::String(s.to_string())
}

fn users_snapshot() -> StatisticsSnapshot {
    let status = FieldStatistics {
        distinct_count: 3,
        null_count: 0,
        total_count: ROWS,
        min: Some(status_value("active")),
        max: Some(status_value("inactive")),
        mcv: McvList::from_counts(
            &[
                (status_value("active"), 6000),
                (status_value("inactive"), 3000),
                (status_value("banned"), 1000),
            ],
            ROWS,
            32,
            0.001,
        ),
        histogram: None,
    };
    let id = FieldStatistics {
        distinct_count: ROWS,
        null_count: 0,
        total_count: ROWS,
        min: Some(Value::Integer(1)),
        max: Some(Value::Integer(ROWS as i64)),
        mcv: McvList::empty(),
        histogram: None,
    };
    StatisticsSnapshot::new().with_table(
        TableStatistics::new("users", ROWS)
            .with_field("status", status)
            .with_field("id", id)
            .with_index(
                "idx_status",
                IndexStatistics {
                    entry_count: ROWS,
                    distinct_keys: 3,
                    avg_entries_per_key: ROWS as f64 / 3.0,
                },
            ),
    )
}

fn planner() -> QueryPlanner {
    planner_with_config(PlannerConfig::default())
}

fn planner_with_config(config: PlannerConfig) -> QueryPlanner {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    QueryPlanner::new(
        config,
        CostModel::default(),
        Arc::new(StatisticsCache::new(users_snapshot())),
    )
    .unwrap()
}

fn plan(planner: &QueryPlanner, query: &Query, indexes: &[IndexDescriptor]) -> PlannedQuery {
    planner
        .plan("users", query, indexes, &PlannerHints::none())
        .unwrap()
}

fn contains_sort(plan: &PlanOperator) -> bool {
    matches!(plan, PlanOperator::Sort { .. }) || plan.children().iter().any(|c| contains_sort(c))
}

// ----------------------------------------------------------------------
// S1: low-cardinality equality picks the status index
// ----------------------------------------------------------------------

#[test]
fn low_cardinality_equality_uses_index_scan() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::eq("status", status_value("active")));
    let planned = plan(&planner, &query, &indexes);

    match &planned.plan {
        PlanOperator::IndexScan { index, .. } => assert_eq!(index.name, "idx_status"),
        other => panic!("expected IndexScan, got {other:?}"),
    }
    assert!((planned.cost.record_fetches - 6000.0).abs() < 1.0);
    assert!(planned.cost.post_filter_count.abs() < 1e-6);
    assert!(!planned.cost.requires_sort);
}

// ----------------------------------------------------------------------
// S2: compound index satisfies filter and ordering together
// ----------------------------------------------------------------------

#[test]
fn compound_index_covers_filter_and_ordering() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status_created",
        vec![
            IndexField::ascending("status"),
            IndexField::ascending("created_at"),
        ],
    )];
    let query = Query::filtered(Predicate::and(vec![
        Predicate::eq("status", status_value("active")),
        Predicate::gt("created_at", Value::Timestamp(1_700_000_000)),
    ]))
    .with_sort(vec![SortDescriptor::ascending("created_at")]);
    let planned = plan(&planner, &query, &indexes);

    match &planned.plan {
        PlanOperator::IndexScan {
            index,
            satisfied,
            reverse,
        } => {
            assert_eq!(index.name, "idx_status_created");
            assert_eq!(satisfied.len(), 2);
            assert!(!reverse);
        }
        other => panic!("expected IndexScan, got {other:?}"),
    }
    assert!(!planned.cost.requires_sort);
    assert!(!contains_sort(&planned.plan));
}

// ----------------------------------------------------------------------
// S3: small IN list over a unique index becomes a union of seeks
// ----------------------------------------------------------------------

#[test]
fn in_list_on_unique_index_becomes_seek_union() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::unique_btree(
        "idx_id",
        vec![IndexField::ascending("id")],
    )];
    let values: Vec<Value> = (1..=5).map(Value::Integer).collect();
    let query = Query::filtered(Predicate::in_list("id", values));
    let planned = plan(&planner, &query, &indexes);

    match &planned.plan {
        PlanOperator::Union {
            children,
            deduplicate,
        } => {
            assert_eq!(children.len(), 5);
            assert!(!deduplicate, "unique index cannot produce duplicates");
            for child in children {
                assert!(matches!(child, PlanOperator::IndexSeek { keys, .. } if keys.len() == 1));
            }
        }
        other => panic!("expected Union of seeks, got {other:?}"),
    }
    assert!((planned.cost.record_fetches - 5.0).abs() < 1e-6);
}

// ----------------------------------------------------------------------
// S4: disjunction over two indexed fields expands through DNF
// ----------------------------------------------------------------------

#[test]
fn disjunction_expands_to_deduplicating_union() {
    let planner = planner();
    let indexes = vec![
        IndexDescriptor::btree("idx_a", vec![IndexField::ascending("a")]),
        IndexDescriptor::btree("idx_b", vec![IndexField::ascending("b")]),
    ];
    let query = Query::filtered(Predicate::or(vec![
        Predicate::eq("a", Value::Integer(1)),
        Predicate::eq("b", Value::Integer(2)),
    ]));
    let planned = plan(&planner, &query, &indexes);

    assert!(!planned.diagnostics.dnf_unavailable);
    match &planned.plan {
        PlanOperator::Union {
            children,
            deduplicate,
        } => {
            assert_eq!(children.len(), 2);
            assert!(deduplicate, "overlapping branches must deduplicate");
            assert!(children.iter().any(|c| c.references_index("idx_a")));
            assert!(children.iter().any(|c| c.references_index("idx_b")));
        }
        other => panic!("expected Union, got {other:?}"),
    }
    assert!(!planned.cost.requires_sort);
}

// ----------------------------------------------------------------------
// S5: DNF explosion falls back to the original predicate
// ----------------------------------------------------------------------

#[test]
fn dnf_explosion_recovers_with_table_scan() {
    let mut config = PlannerConfig::default();
    config.max_dnf_terms = 8;
    let planner = planner_with_config(config);
    let indexes = vec![IndexDescriptor::btree(
        "idx_a0",
        vec![IndexField::ascending("a0")],
    )];

    // Four binary disjuncts distribute into 16 conjunctive terms.
    let query = Query::filtered(Predicate::and(
        (0..4)
            .map(|i| {
                Predicate::or(vec![
                    Predicate::eq(format!("a{i}"), Value::Integer(1)),
                    Predicate::eq(format!("b{i}"), Value::Integer(1)),
                ])
            })
            .collect(),
    ));
    let planned = plan(&planner, &query, &indexes);

    assert!(planned.diagnostics.dnf_unavailable);
    match &planned.plan {
        PlanOperator::Filter { input, .. } => {
            assert!(matches!(input.as_ref(), PlanOperator::TableScan { .. }));
        }
        other => panic!("expected residual-filtered table scan, got {other:?}"),
    }
}

// ----------------------------------------------------------------------
// S6: ordered limit scans the index and terminates early
// ----------------------------------------------------------------------

#[test]
fn ordered_limit_scales_index_scan_cost() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_created",
        vec![IndexField::ascending("created_at")],
    )];
    let query = Query::new()
        .with_sort(vec![SortDescriptor::ascending("created_at")])
        .with_limit(10);
    let planned = plan(&planner, &query, &indexes);

    match &planned.plan {
        PlanOperator::Limit { input, limit, .. } => {
            assert_eq!(*limit, Some(10));
            match input.as_ref() {
                PlanOperator::IndexScan { reverse, .. } => assert!(!reverse),
                other => panic!("expected IndexScan under Limit, got {other:?}"),
            }
        }
        other => panic!("expected Limit at the root, got {other:?}"),
    }
    assert!(!contains_sort(&planned.plan));
    // Early termination: 10 of 10_000 rows.
    assert!((planned.cost.record_fetches - 10.0).abs() < 1e-6);
    assert!(!planned.cost.requires_sort);
}

// ----------------------------------------------------------------------
// Projections enable index-only evaluation
// ----------------------------------------------------------------------

#[test]
fn projection_enables_index_only_scan() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::eq("status", status_value("active")))
        .with_fields(vec!["status".to_string()]);
    let planned = plan(&planner, &query, &indexes);

    match &planned.plan {
        PlanOperator::Project { input, .. } => {
            assert!(matches!(input.as_ref(), PlanOperator::IndexOnlyScan { .. }));
        }
        other => panic!("expected projected index-only scan, got {other:?}"),
    }
    assert_eq!(planned.cost.record_fetches, 0.0);
}

// ----------------------------------------------------------------------
// Hints
// ----------------------------------------------------------------------

#[test]
fn force_table_scan_hint_overrides_cost() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::eq("status", status_value("active")));
    let hints = PlannerHints {
        force_table_scan: true,
        ..PlannerHints::none()
    };
    let planned = planner.plan("users", &query, &indexes, &hints).unwrap();
    assert!(matches!(
        planned.plan.leaf_access(),
        PlanOperator::TableScan { .. }
    ));
}

#[test]
fn unknown_preferred_index_falls_back() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::eq("status", status_value("active")));
    let hints = PlannerHints {
        preferred_index: Some("idx_missing".to_string()),
        ..PlannerHints::none()
    };
    // Invariant: hints constraining the set to empty fall back to the full
    // set rather than failing.
    let planned = planner.plan("users", &query, &indexes, &hints).unwrap();
    assert!(planned.breakdown.total_cost > 0.0);
}

// ----------------------------------------------------------------------
// Budgets and complexity
// ----------------------------------------------------------------------

#[test]
fn exhausted_timeout_without_candidates_surfaces_error() {
    let mut config = PlannerConfig::default();
    config.timeout_seconds = 1e-9;
    let planner = planner_with_config(config);
    let query = Query::filtered(Predicate::eq("status", status_value("active")));
    match planner.plan("users", &query, &[], &PlannerHints::none()) {
        Err(PlannerError::TimeoutExceeded { .. }) => {}
        other => panic!("expected timeout error, got {other:?}"),
    }
}

#[test]
fn truncated_enumeration_still_plans() {
    let mut config = PlannerConfig::default();
    config.max_plan_enumerations = 1;
    let planner = planner_with_config(config);
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::eq("status", status_value("active")));
    let planned = plan(&planner, &query, &indexes);
    assert!(planned.diagnostics.enumeration_truncated);
    // Best-so-far: only the table scan made it in.
    assert!(matches!(
        planned.plan.leaf_access(),
        PlanOperator::TableScan { .. }
    ));
}

#[test]
fn winning_plan_respects_complexity_threshold() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::and(vec![
        Predicate::eq("status", status_value("active")),
        Predicate::gt("age", Value::Integer(21)),
    ]));
    let planned = plan(&planner, &query, &indexes);
    assert!(planned.complexity <= planner.config().complexity_threshold);
}

// ----------------------------------------------------------------------
// Determinism and explain output
// ----------------------------------------------------------------------

#[test]
fn planning_is_deterministic() {
    let indexes = vec![
        IndexDescriptor::btree("idx_a", vec![IndexField::ascending("a")]),
        IndexDescriptor::btree("idx_b", vec![IndexField::ascending("b")]),
    ];
    let query = Query::filtered(Predicate::or(vec![
        Predicate::eq("a", Value::Integer(1)),
        Predicate::eq("b", Value::Integer(2)),
    ]))
    .with_sort(vec![SortDescriptor::ascending("a")])
    .with_limit(50);

    let first = plan(&planner(), &query, &indexes);
    for _ in 0..3 {
        let again = plan(&planner(), &query, &indexes);
        assert_eq!(first.plan, again.plan);
        assert_eq!(first.breakdown.total_cost, again.breakdown.total_cost);
    }
}

#[test]
fn explain_renders_tree_and_cost() {
    let planner = planner();
    let indexes = vec![IndexDescriptor::btree(
        "idx_status",
        vec![IndexField::ascending("status")],
    )];
    let query = Query::filtered(Predicate::and(vec![
        Predicate::eq("status", status_value("active")),
        Predicate::gt("age", Value::Integer(21)),
    ]));
    let planned = plan(&planner, &query, &indexes);
    let explain = planned.explain();

    assert!(explain.contains("Filter"));
    assert!(explain.contains("IndexScan(idx_status"));
    assert!(explain.contains("total_cost"));
}

// ----------------------------------------------------------------------
// Statistics refresh
// ----------------------------------------------------------------------

#[test]
fn snapshot_swap_changes_estimates() {
    let planner = planner();
    let query = Query::new();
    let before = plan(&planner, &query, &[]);
    assert_eq!(before.cost.record_fetches, ROWS as f64);

    planner
        .statistics()
        .replace(StatisticsSnapshot::new().with_table(TableStatistics::new("users", 100)));
    let after = plan(&planner, &query, &[]);
    assert_eq!(after.cost.record_fetches, 100.0);
}
