// IN-List Planning
//
// Strategy selection and plan construction for `IN (v1, ..., vn)` conditions:
// small lists on an indexed field become a union of per-value accesses,
// mid-size lists a multi-key seek (in-join), tiny unindexed lists an OR
// expansion, and everything else stays residual.

use crate::common::{IndexDescriptor, Value};
use crate::config::PlannerConfig;
use crate::plan::PlanOperator;
use crate::predicate::condition::{BoundCondition, FieldCondition};

/// How an IN-list condition gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InListStrategy {
    IndexUnion,
    InJoin,
    OrExpansion,
    Residual,
}

impl InListStrategy {
    /// Preference rank: `IndexUnion > InJoin > OrExpansion > Residual`.
    pub fn rank(self) -> u8 {
        match self {
            InListStrategy::IndexUnion => 3,
            InListStrategy::InJoin => 2,
            InListStrategy::OrExpansion => 1,
            InListStrategy::Residual => 0,
        }
    }
}

/// Threshold below which an unindexed IN rewrites to an OR of equalities.
const OR_EXPANSION_MAX: usize = 5;

/// Pick the execution strategy for an IN list of `value_count` values.
pub fn choose_strategy(
    value_count: usize,
    has_index: bool,
    config: &PlannerConfig,
) -> InListStrategy {
    if !config.enable_in_predicate_optimization || value_count == 0 {
        return InListStrategy::Residual;
    }
    if has_index && config.enable_index_union && value_count <= config.in_union_threshold {
        return InListStrategy::IndexUnion;
    }
    if has_index && value_count <= config.in_join_threshold {
        return InListStrategy::InJoin;
    }
    if !has_index && value_count <= OR_EXPANSION_MAX {
        return InListStrategy::OrExpansion;
    }
    InListStrategy::Residual
}

/// Union of one access per value: seeks on a unique index, scans otherwise.
/// A unique index cannot produce duplicate rows across distinct values, so
/// deduplication is skipped there.
pub fn union_of_values(
    index: &IndexDescriptor,
    field: &str,
    values: &[Value],
) -> PlanOperator {
    let children = values
        .iter()
        .map(|value| {
            let satisfied = vec![BoundCondition::new(
                field,
                FieldCondition::Equals(value.clone()),
            )];
            if index.unique {
                PlanOperator::IndexSeek {
                    index: index.clone(),
                    keys: vec![vec![value.clone()]],
                    satisfied,
                    reverse: false,
                }
            } else {
                PlanOperator::IndexScan {
                    index: index.clone(),
                    satisfied,
                    reverse: false,
                }
            }
        })
        .collect();
    PlanOperator::Union {
        children,
        deduplicate: !index.unique,
    }
}

/// Multi-key seek probing every value in one pass.
pub fn in_join_seek(index: &IndexDescriptor, field: &str, values: &[Value]) -> PlanOperator {
    PlanOperator::IndexSeek {
        index: index.clone(),
        keys: values.iter().map(|v| vec![v.clone()]).collect(),
        satisfied: vec![BoundCondition::new(
            field,
            FieldCondition::In(values.to_vec()),
        )],
        reverse: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::IndexField;

    fn values(n: usize) -> Vec<Value> {
        (0..n as i64).map(Value::Integer).collect()
    }

    #[test]
    fn test_strategy_thresholds() {
        let config = PlannerConfig::default(); // union <= 10, join <= 50

        assert_eq!(
            choose_strategy(5, true, &config),
            InListStrategy::IndexUnion
        );
        assert_eq!(choose_strategy(11, true, &config), InListStrategy::InJoin);
        assert_eq!(
            choose_strategy(51, true, &config),
            InListStrategy::Residual
        );
        assert_eq!(
            choose_strategy(3, false, &config),
            InListStrategy::OrExpansion
        );
        assert_eq!(
            choose_strategy(6, false, &config),
            InListStrategy::Residual
        );
    }

    #[test]
    fn test_strategy_gates() {
        let mut config = PlannerConfig::default();
        config.enable_in_predicate_optimization = false;
        assert_eq!(choose_strategy(3, true, &config), InListStrategy::Residual);

        let mut config = PlannerConfig::default();
        config.enable_index_union = false;
        // Union disabled: small lists fall through to the in-join.
        assert_eq!(choose_strategy(3, true, &config), InListStrategy::InJoin);
    }

    #[test]
    fn test_strategy_preference_order() {
        assert!(InListStrategy::IndexUnion.rank() > InListStrategy::InJoin.rank());
        assert!(InListStrategy::InJoin.rank() > InListStrategy::OrExpansion.rank());
        assert!(InListStrategy::OrExpansion.rank() > InListStrategy::Residual.rank());
    }

    #[test]
    fn test_unique_union_seeks_without_dedup() {
        let index = IndexDescriptor::unique_btree("idx_id", vec![IndexField::ascending("id")]);
        let plan = union_of_values(&index, "id", &values(5));
        match &plan {
            PlanOperator::Union {
                children,
                deduplicate,
            } => {
                assert_eq!(children.len(), 5);
                assert!(!deduplicate);
                assert!(children
                    .iter()
                    .all(|c| matches!(c, PlanOperator::IndexSeek { keys, .. } if keys.len() == 1)));
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_non_unique_union_scans_with_dedup() {
        let index = IndexDescriptor::btree("idx_tag", vec![IndexField::ascending("tag")]);
        let plan = union_of_values(&index, "tag", &values(3));
        match &plan {
            PlanOperator::Union {
                children,
                deduplicate,
            } => {
                assert_eq!(children.len(), 3);
                assert!(*deduplicate);
                assert!(children
                    .iter()
                    .all(|c| matches!(c, PlanOperator::IndexScan { .. })));
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_in_join_probes_every_key() {
        let index = IndexDescriptor::btree("idx_id", vec![IndexField::ascending("id")]);
        let plan = in_join_seek(&index, "id", &values(20));
        match &plan {
            PlanOperator::IndexSeek { keys, .. } => assert_eq!(keys.len(), 20),
            other => panic!("expected seek, got {other:?}"),
        }
    }
}
