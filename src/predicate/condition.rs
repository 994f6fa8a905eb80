// Field Conditions
//
// Typed, field-level constraints produced from the predicate tree during
// analysis, plus the normalized condition tree the enumerator matches against
// indexes. A `BoundCondition` ties a condition to a field reference (name and
// inferred semantic type); `negated` covers the conditions whose negation has
// no direct variant (patterns, text, spatial, vector).

use crate::common::{BoundingBox, FieldType, Value, ValueRange};
use crate::error::{PlannerError, Result};
use crate::predicate::{ComparisonOp, Predicate, TextSearchMode};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Conditions
// ============================================================================

/// Kind of string pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringPatternKind {
    Contains,
    HasPrefix,
    HasSuffix,
}

/// Spatial constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpatialCondition {
    Within(BoundingBox),
}

/// A single field-level constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldCondition {
    Equals(Value),
    NotEquals(Value),
    Range(ValueRange),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// `IsNull(true)` requires null, `IsNull(false)` requires non-null.
    IsNull(bool),
    TextSearch {
        terms: Vec<String>,
        mode: TextSearchMode,
    },
    Spatial(SpatialCondition),
    VectorSimilarity {
        k: usize,
        vector: Vec<f32>,
    },
    StringPattern {
        kind: StringPatternKind,
        pattern: String,
    },
}

impl FieldCondition {
    #[inline]
    pub fn is_equality(&self) -> bool {
        matches!(self, FieldCondition::Equals(_))
    }

    #[inline]
    pub fn is_membership(&self) -> bool {
        matches!(self, FieldCondition::In(_))
    }

    #[inline]
    pub fn is_range(&self) -> bool {
        matches!(self, FieldCondition::Range(_))
    }

    #[inline]
    pub fn is_null_check(&self) -> bool {
        matches!(self, FieldCondition::IsNull(_))
    }

    /// Semantic type implied by the condition's operands.
    pub fn implied_type(&self) -> FieldType {
        match self {
            FieldCondition::Equals(v) | FieldCondition::NotEquals(v) => v.field_type(),
            FieldCondition::Range(range) => range
                .lower
                .as_ref()
                .or(range.upper.as_ref())
                .map(Value::field_type)
                .unwrap_or(FieldType::Unknown),
            FieldCondition::In(values) | FieldCondition::NotIn(values) => values
                .first()
                .map(Value::field_type)
                .unwrap_or(FieldType::Unknown),
            FieldCondition::TextSearch { .. } | FieldCondition::StringPattern { .. } => {
                FieldType::String
            }
            FieldCondition::Spatial(_) | FieldCondition::VectorSimilarity { .. } => {
                FieldType::Array
            }
            FieldCondition::IsNull(_) => FieldType::Unknown,
        }
    }
}

impl fmt::Display for FieldCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCondition::Equals(v) => write!(f, "= {}", v),
            FieldCondition::NotEquals(v) => write!(f, "!= {}", v),
            FieldCondition::Range(range) => write!(f, "in {}", range),
            FieldCondition::In(values) => write!(f, "in {} values", values.len()),
            FieldCondition::NotIn(values) => write!(f, "not in {} values", values.len()),
            FieldCondition::IsNull(true) => write!(f, "is null"),
            FieldCondition::IsNull(false) => write!(f, "is not null"),
            FieldCondition::TextSearch { terms, .. } => {
                write!(f, "matches {} terms", terms.len())
            }
            FieldCondition::Spatial(_) => write!(f, "within region"),
            FieldCondition::VectorSimilarity { k, .. } => write!(f, "nearest {}", k),
            FieldCondition::StringPattern { kind, pattern } => match kind {
                StringPatternKind::Contains => write!(f, "contains \"{}\"", pattern),
                StringPatternKind::HasPrefix => write!(f, "prefix \"{}\"", pattern),
                StringPatternKind::HasSuffix => write!(f, "suffix \"{}\"", pattern),
            },
        }
    }
}

/// Field reference: name plus inferred semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub name: String,
    pub field_type: FieldType,
}

/// A condition bound to the field it constrains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundCondition {
    pub field: FieldRef,
    pub condition: FieldCondition,
    /// Set when the original predicate negated a condition that has no
    /// direct negative variant. Negated conditions are never index-satisfiable.
    pub negated: bool,
}

impl BoundCondition {
    pub fn new(field_name: impl Into<String>, condition: FieldCondition) -> Self {
        let field_type = condition.implied_type();
        Self {
            field: FieldRef {
                name: field_name.into(),
                field_type,
            },
            condition,
            negated: false,
        }
    }

    fn negated(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn field_name(&self) -> &str {
        &self.field.name
    }

    /// Rebuild the logical predicate this condition represents. Used when a
    /// residual filter must carry the unsatisfied part of a query.
    pub fn to_predicate(&self) -> Predicate {
        let inner = match &self.condition {
            FieldCondition::Equals(v) => Predicate::eq(&self.field.name, v.clone()),
            FieldCondition::NotEquals(v) => Predicate::ne(&self.field.name, v.clone()),
            FieldCondition::Range(range) => {
                let mut parts = Vec::new();
                if let Some(lower) = &range.lower {
                    parts.push(if range.lower_inclusive {
                        Predicate::ge(&self.field.name, lower.clone())
                    } else {
                        Predicate::gt(&self.field.name, lower.clone())
                    });
                }
                if let Some(upper) = &range.upper {
                    parts.push(if range.upper_inclusive {
                        Predicate::le(&self.field.name, upper.clone())
                    } else {
                        Predicate::lt(&self.field.name, upper.clone())
                    });
                }
                Predicate::and(parts)
            }
            FieldCondition::In(values) => Predicate::in_list(&self.field.name, values.clone()),
            FieldCondition::NotIn(values) => {
                Predicate::not(Predicate::in_list(&self.field.name, values.clone()))
            }
            FieldCondition::IsNull(true) => Predicate::is_null(&self.field.name),
            FieldCondition::IsNull(false) => Predicate::is_not_null(&self.field.name),
            FieldCondition::TextSearch { terms, mode } => {
                Predicate::text_search(&self.field.name, terms.clone(), *mode)
            }
            FieldCondition::Spatial(SpatialCondition::Within(region)) => {
                Predicate::within_region(&self.field.name, region.clone())
            }
            FieldCondition::VectorSimilarity { k, vector } => {
                Predicate::nearest_neighbors(&self.field.name, vector.clone(), *k)
            }
            FieldCondition::StringPattern { kind, pattern } => match kind {
                StringPatternKind::Contains => Predicate::contains(&self.field.name, pattern),
                StringPatternKind::HasPrefix => Predicate::has_prefix(&self.field.name, pattern),
                StringPatternKind::HasSuffix => Predicate::has_suffix(&self.field.name, pattern),
            },
        };
        if self.negated {
            Predicate::not(inner)
        } else {
            inner
        }
    }
}

impl fmt::Display for BoundCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "NOT {} {}", self.field.name, self.condition)
        } else {
            write!(f, "{} {}", self.field.name, self.condition)
        }
    }
}

// ============================================================================
// Normalized Condition Tree
// ============================================================================

/// The normalized condition tree the enumerator plans against.
///
/// Always simplified: no nested like-kind nodes, no `AlwaysTrue` inside
/// conjunctions, no `AlwaysFalse` inside disjunctions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionTree {
    AlwaysTrue,
    AlwaysFalse,
    Field(BoundCondition),
    Conjunction(Vec<ConditionTree>),
    Disjunction(Vec<ConditionTree>),
}

impl ConditionTree {
    /// Build a simplified condition tree from a predicate.
    ///
    /// Negations are pushed down on the fly: comparisons with an algebraic
    /// inverse flip their operator, `In` becomes `NotIn`, everything else
    /// keeps a `negated` flag on the bound condition.
    pub fn from_predicate(predicate: &Predicate) -> Result<ConditionTree> {
        Ok(Self::build(predicate, false)?.simplify())
    }

    fn build(predicate: &Predicate, negate: bool) -> Result<ConditionTree> {
        match predicate {
            Predicate::True => Ok(if negate {
                ConditionTree::AlwaysFalse
            } else {
                ConditionTree::AlwaysTrue
            }),
            Predicate::False => Ok(if negate {
                ConditionTree::AlwaysTrue
            } else {
                ConditionTree::AlwaysFalse
            }),
            Predicate::Not(inner) => Self::build(inner, !negate),
            Predicate::And(children) => {
                let converted = children
                    .iter()
                    .map(|c| Self::build(c, negate))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if negate {
                    ConditionTree::Disjunction(converted)
                } else {
                    ConditionTree::Conjunction(converted)
                })
            }
            Predicate::Or(children) => {
                let converted = children
                    .iter()
                    .map(|c| Self::build(c, negate))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if negate {
                    ConditionTree::Conjunction(converted)
                } else {
                    ConditionTree::Disjunction(converted)
                })
            }
            Predicate::Comparison(c) => Self::build_comparison(c, negate),
            Predicate::TextSearch { field, terms, mode } => {
                let bound = BoundCondition::new(
                    field,
                    FieldCondition::TextSearch {
                        terms: terms.clone(),
                        mode: *mode,
                    },
                );
                Ok(ConditionTree::Field(if negate { bound.negated() } else { bound }))
            }
            Predicate::WithinRegion { field, region } => {
                let bound = BoundCondition::new(
                    field,
                    FieldCondition::Spatial(SpatialCondition::Within(region.clone())),
                );
                Ok(ConditionTree::Field(if negate { bound.negated() } else { bound }))
            }
            Predicate::NearestNeighbors { field, vector, k } => {
                let bound = BoundCondition::new(
                    field,
                    FieldCondition::VectorSimilarity {
                        k: *k,
                        vector: vector.clone(),
                    },
                );
                Ok(ConditionTree::Field(if negate { bound.negated() } else { bound }))
            }
        }
    }

    fn build_comparison(
        c: &crate::predicate::FieldComparison,
        negate: bool,
    ) -> Result<ConditionTree> {
        let op = if negate {
            match c.op.negated() {
                Some(negated) => negated,
                None => {
                    // In flips to NotIn; patterns keep the negated flag.
                    return match c.op {
                        ComparisonOp::In => Ok(ConditionTree::Field(BoundCondition::new(
                            &c.field,
                            FieldCondition::NotIn(c.operands.clone()),
                        ))),
                        _ => {
                            Self::build_comparison(c, false).map(|tree| match tree {
                                ConditionTree::Field(bound) => {
                                    ConditionTree::Field(bound.negated())
                                }
                                other => other,
                            })
                        }
                    };
                }
            }
        } else {
            c.op
        };

        let operand = || -> Result<Value> {
            c.operands
                .first()
                .cloned()
                .ok_or_else(|| PlannerError::InvalidQuery {
                    reason: format!("comparison on `{}` is missing an operand", c.field),
                })
        };
        let pattern = || -> Result<String> {
            match c.operands.first() {
                Some(Value::String(s)) => Ok(s.clone()),
                _ => Err(PlannerError::InvalidQuery {
                    reason: format!("pattern match on `{}` requires a string operand", c.field),
                }),
            }
        };

        let condition = match op {
            ComparisonOp::Eq => FieldCondition::Equals(operand()?),
            ComparisonOp::Ne => FieldCondition::NotEquals(operand()?),
            ComparisonOp::Lt => FieldCondition::Range(ValueRange::at_most(operand()?, false)),
            ComparisonOp::Le => FieldCondition::Range(ValueRange::at_most(operand()?, true)),
            ComparisonOp::Gt => FieldCondition::Range(ValueRange::at_least(operand()?, false)),
            ComparisonOp::Ge => FieldCondition::Range(ValueRange::at_least(operand()?, true)),
            ComparisonOp::IsNull => FieldCondition::IsNull(true),
            ComparisonOp::IsNotNull => FieldCondition::IsNull(false),
            ComparisonOp::In => {
                if c.operands.is_empty() {
                    return Ok(ConditionTree::AlwaysFalse);
                }
                FieldCondition::In(c.operands.clone())
            }
            ComparisonOp::Contains => FieldCondition::StringPattern {
                kind: StringPatternKind::Contains,
                pattern: pattern()?,
            },
            ComparisonOp::HasPrefix => FieldCondition::StringPattern {
                kind: StringPatternKind::HasPrefix,
                pattern: pattern()?,
            },
            ComparisonOp::HasSuffix => FieldCondition::StringPattern {
                kind: StringPatternKind::HasSuffix,
                pattern: pattern()?,
            },
        };
        Ok(ConditionTree::Field(BoundCondition::new(&c.field, condition)))
    }

    /// Restore the tree invariants after structural edits.
    pub fn simplify(self) -> ConditionTree {
        match self {
            ConditionTree::Conjunction(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match child.simplify() {
                        ConditionTree::AlwaysTrue => {}
                        ConditionTree::AlwaysFalse => return ConditionTree::AlwaysFalse,
                        ConditionTree::Conjunction(gc) => flat.extend(gc),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => ConditionTree::AlwaysTrue,
                    1 => flat.into_iter().next().unwrap(),
                    _ => ConditionTree::Conjunction(flat),
                }
            }
            ConditionTree::Disjunction(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match child.simplify() {
                        ConditionTree::AlwaysFalse => {}
                        ConditionTree::AlwaysTrue => return ConditionTree::AlwaysTrue,
                        ConditionTree::Disjunction(gc) => flat.extend(gc),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => ConditionTree::AlwaysFalse,
                    1 => flat.into_iter().next().unwrap(),
                    _ => ConditionTree::Disjunction(flat),
                }
            }
            leaf => leaf,
        }
    }

    /// Conditions available to a single conjunctive access path: the tree
    /// itself when it is one condition, or the field children of a top-level
    /// conjunction. Conditions under a disjunction are not included.
    pub fn conjunctive_conditions(&self) -> Vec<&BoundCondition> {
        match self {
            ConditionTree::Field(c) => vec![c],
            ConditionTree::Conjunction(children) => children
                .iter()
                .filter_map(|c| match c {
                    ConditionTree::Field(f) => Some(f),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Every bound condition anywhere in the tree, in tree order.
    pub fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a BoundCondition>) {
        match self {
            ConditionTree::Field(c) => out.push(c),
            ConditionTree::Conjunction(children) | ConditionTree::Disjunction(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
            _ => {}
        }
    }

    /// The tree with the given satisfied conditions removed (replaced by
    /// `AlwaysTrue`), simplified. Produces the residual a filter must enforce.
    pub fn without(&self, satisfied: &[BoundCondition]) -> ConditionTree {
        self.clone_without(satisfied).simplify()
    }

    fn clone_without(&self, satisfied: &[BoundCondition]) -> ConditionTree {
        match self {
            ConditionTree::Field(c) if satisfied.contains(c) => ConditionTree::AlwaysTrue,
            ConditionTree::Conjunction(children) => ConditionTree::Conjunction(
                children.iter().map(|c| c.clone_without(satisfied)).collect(),
            ),
            other => other.clone(),
        }
    }

    /// Rebuild the logical predicate for this tree.
    pub fn to_predicate(&self) -> Predicate {
        match self {
            ConditionTree::AlwaysTrue => Predicate::True,
            ConditionTree::AlwaysFalse => Predicate::False,
            ConditionTree::Field(c) => c.to_predicate(),
            ConditionTree::Conjunction(children) => {
                Predicate::and(children.iter().map(ConditionTree::to_predicate).collect())
            }
            ConditionTree::Disjunction(children) => {
                Predicate::or(children.iter().map(ConditionTree::to_predicate).collect())
            }
        }
    }

    #[inline]
    pub fn is_always_true(&self) -> bool {
        matches!(self, ConditionTree::AlwaysTrue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons_bind_to_conditions() {
        let p = Predicate::and(vec![
            Predicate::eq("status", Value::String("active".into())),
            Predicate::gt("age", Value::Integer(21)),
        ]);
        let tree = ConditionTree::from_predicate(&p).unwrap();
        let conditions = tree.conjunctive_conditions();
        assert_eq!(conditions.len(), 2);
        assert!(conditions[0].condition.is_equality());
        assert!(conditions[1].condition.is_range());
        assert_eq!(conditions[0].field.field_type, FieldType::String);
        assert_eq!(conditions[1].field.field_type, FieldType::Integer);
    }

    #[test]
    fn test_negated_in_becomes_not_in() {
        let p = Predicate::not(Predicate::in_list(
            "a",
            vec![Value::Integer(1), Value::Integer(2)],
        ));
        let tree = ConditionTree::from_predicate(&p).unwrap();
        match tree {
            ConditionTree::Field(bound) => {
                assert!(!bound.negated);
                assert!(matches!(bound.condition, FieldCondition::NotIn(_)));
            }
            other => panic!("expected field node, got {other:?}"),
        }
    }

    #[test]
    fn test_negated_pattern_keeps_flag() {
        let p = Predicate::not(Predicate::contains("name", "x"));
        let tree = ConditionTree::from_predicate(&p).unwrap();
        match tree {
            ConditionTree::Field(bound) => {
                assert!(bound.negated);
                assert!(matches!(
                    bound.condition,
                    FieldCondition::StringPattern { .. }
                ));
            }
            other => panic!("expected field node, got {other:?}"),
        }
    }

    #[test]
    fn test_de_morgan_during_binding() {
        let p = Predicate::not(Predicate::and(vec![
            Predicate::eq("a", Value::Integer(1)),
            Predicate::lt("b", Value::Integer(5)),
        ]));
        let tree = ConditionTree::from_predicate(&p).unwrap();
        match tree {
            ConditionTree::Disjunction(children) => assert_eq!(children.len(), 2),
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_in_is_always_false() {
        let p = Predicate::in_list("a", vec![]);
        let tree = ConditionTree::from_predicate(&p).unwrap();
        assert_eq!(tree, ConditionTree::AlwaysFalse);
    }

    #[test]
    fn test_without_produces_residual() {
        let p = Predicate::and(vec![
            Predicate::eq("a", Value::Integer(1)),
            Predicate::gt("b", Value::Integer(2)),
        ]);
        let tree = ConditionTree::from_predicate(&p).unwrap();
        let satisfied = vec![BoundCondition::new(
            "a",
            FieldCondition::Equals(Value::Integer(1)),
        )];
        let residual = tree.without(&satisfied);
        match residual {
            ConditionTree::Field(bound) => assert_eq!(bound.field_name(), "b"),
            other => panic!("expected single residual, got {other:?}"),
        }

        let all = tree.conjunctive_conditions().into_iter().cloned().collect::<Vec<_>>();
        assert!(tree.without(&all).is_always_true());
    }

    #[test]
    fn test_round_trip_to_predicate() {
        let p = Predicate::and(vec![
            Predicate::ge("a", Value::Integer(1)),
            Predicate::in_list("b", vec![Value::Integer(2)]),
        ]);
        let tree = ConditionTree::from_predicate(&p).unwrap();
        let back = tree.to_predicate();
        let tree_again = ConditionTree::from_predicate(&back).unwrap();
        assert_eq!(tree, tree_again);
    }
}
