// Query Analysis
//
// Turns a declarative query into the structured form the enumerator consumes:
// the normalized condition tree, the flat condition list, per-field
// requirements, detected query patterns, and the referenced field set.
// Patterns are presence-based hints for diagnostics and strategy scoring,
// never dispatch keys.

use crate::common::{SortDescriptor, SortOrder};
use crate::error::{PlannerError, Result};
use crate::predicate::condition::{BoundCondition, ConditionTree, FieldCondition};
use crate::predicate::Predicate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// ============================================================================
// Query Surface
// ============================================================================

/// A declarative query over one record type.
///
/// Multiple predicates combine as a conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub sort: Vec<SortDescriptor>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Fields the caller needs back. `None` means whole records, which rules
    /// out index-only evaluation.
    pub fields: Option<Vec<String>>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
            fields: None,
        }
    }

    pub fn filtered(predicate: Predicate) -> Self {
        Self {
            predicates: vec![predicate],
            ..Self::new()
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortDescriptor>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// All predicates folded into one conjunction.
    pub fn combined_predicate(&self) -> Predicate {
        match self.predicates.len() {
            0 => Predicate::True,
            1 => self.predicates[0].clone(),
            _ => Predicate::And(self.predicates.clone()),
        }
    }
}

// ============================================================================
// Field Requirements
// ============================================================================

/// How a query touches a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessType {
    Equality,
    Inequality,
    Range,
    Membership,
    Pattern,
    Ordering,
    TextSearch,
    Spatial,
    Vector,
}

/// Aggregated per-field requirements: access types, the constraints that
/// produced them, and the requested sort direction if the field is sorted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRequirement {
    pub field: String,
    pub access_types: BTreeSet<AccessType>,
    pub conditions: Vec<FieldCondition>,
    pub sort_direction: Option<SortOrder>,
}

impl FieldRequirement {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            access_types: BTreeSet::new(),
            conditions: Vec::new(),
            sort_direction: None,
        }
    }
}

fn access_type_of(condition: &FieldCondition, negated: bool) -> AccessType {
    if negated {
        return AccessType::Inequality;
    }
    match condition {
        FieldCondition::Equals(_) => AccessType::Equality,
        FieldCondition::NotEquals(_) | FieldCondition::NotIn(_) => AccessType::Inequality,
        FieldCondition::Range(_) => AccessType::Range,
        FieldCondition::In(_) => AccessType::Membership,
        FieldCondition::IsNull(_) => AccessType::Equality,
        FieldCondition::TextSearch { .. } => AccessType::TextSearch,
        FieldCondition::Spatial(_) => AccessType::Spatial,
        FieldCondition::VectorSimilarity { .. } => AccessType::Vector,
        FieldCondition::StringPattern { .. } => AccessType::Pattern,
    }
}

// ============================================================================
// Query Patterns
// ============================================================================

/// Shape hints detected during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueryPattern {
    PointLookup,
    RangeQuery,
    MultiValueLookup,
    FullTextSearch,
    VectorSearch,
    SpatialQuery,
    TopN,
    Pagination,
}

// ============================================================================
// Analysis
// ============================================================================

/// Output of query analysis.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    /// The combined input predicate, unmodified.
    pub predicate: Predicate,
    /// Normalized condition tree.
    pub condition: ConditionTree,
    /// Flat list of every bound condition in the tree.
    pub conditions: Vec<BoundCondition>,
    /// Per-field requirements, keyed by field name.
    pub requirements: BTreeMap<String, FieldRequirement>,
    pub sort: Vec<SortDescriptor>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Projection from the query surface, when the caller asked for one.
    pub projection: Option<Vec<String>>,
    pub patterns: BTreeSet<QueryPattern>,
    /// Every field the query references through conditions, sorting, or
    /// projection.
    pub referenced_fields: BTreeSet<String>,
}

impl QueryAnalysis {
    /// Conditions a single conjunctive access path may satisfy.
    pub fn conjunctive_conditions(&self) -> Vec<&BoundCondition> {
        self.condition.conjunctive_conditions()
    }

    pub fn has_sort(&self) -> bool {
        !self.sort.is_empty()
    }
}

/// The analyzer. Stateless; validation of the query surface happens here so
/// downstream stages never see malformed input.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &Query) -> Result<QueryAnalysis> {
        Self::validate(query)?;

        let predicate = query.combined_predicate();
        let condition = ConditionTree::from_predicate(&predicate.clone().simplify())?;

        let mut condition_refs = Vec::new();
        condition.collect_conditions(&mut condition_refs);
        let conditions: Vec<BoundCondition> = condition_refs.into_iter().cloned().collect();

        let mut requirements: BTreeMap<String, FieldRequirement> = BTreeMap::new();
        for bound in &conditions {
            let requirement = requirements
                .entry(bound.field_name().to_string())
                .or_insert_with(|| FieldRequirement::new(bound.field_name()));
            requirement
                .access_types
                .insert(access_type_of(&bound.condition, bound.negated));
            requirement.conditions.push(bound.condition.clone());
        }
        for descriptor in &query.sort {
            let requirement = requirements
                .entry(descriptor.field.clone())
                .or_insert_with(|| FieldRequirement::new(&descriptor.field));
            requirement.access_types.insert(AccessType::Ordering);
            if requirement.sort_direction.is_none() {
                requirement.sort_direction = Some(descriptor.order);
            }
        }

        let mut referenced_fields = BTreeSet::new();
        predicate.collect_fields(&mut referenced_fields);
        for descriptor in &query.sort {
            referenced_fields.insert(descriptor.field.clone());
        }
        if let Some(fields) = &query.fields {
            referenced_fields.extend(fields.iter().cloned());
        }

        let patterns = Self::detect_patterns(query, &conditions);
        debug!(
            conditions = conditions.len(),
            fields = referenced_fields.len(),
            patterns = ?patterns,
            "query analyzed"
        );

        Ok(QueryAnalysis {
            predicate,
            condition,
            conditions,
            requirements,
            sort: query.sort.clone(),
            limit: query.limit,
            offset: query.offset,
            projection: query.fields.clone(),
            patterns,
            referenced_fields,
        })
    }

    fn validate(query: &Query) -> Result<()> {
        fn check_children(predicate: &Predicate) -> Result<()> {
            match predicate {
                Predicate::And(children) | Predicate::Or(children) => {
                    if children.is_empty() {
                        return Err(PlannerError::InvalidQuery {
                            reason: "boolean combinator with no children".to_string(),
                        });
                    }
                    children.iter().try_for_each(check_children)
                }
                Predicate::Not(inner) => check_children(inner),
                _ => Ok(()),
            }
        }
        query.predicates.iter().try_for_each(check_children)?;

        if query.sort.iter().any(|s| s.field.is_empty()) {
            return Err(PlannerError::InvalidQuery {
                reason: "sort descriptor with empty field name".to_string(),
            });
        }
        Ok(())
    }

    fn detect_patterns(query: &Query, conditions: &[BoundCondition]) -> BTreeSet<QueryPattern> {
        let mut patterns = BTreeSet::new();

        let equalities = conditions
            .iter()
            .filter(|c| !c.negated && c.condition.is_equality())
            .count();
        if equalities == 1 {
            patterns.insert(QueryPattern::PointLookup);
        }
        for bound in conditions {
            match &bound.condition {
                FieldCondition::Range(_) => {
                    patterns.insert(QueryPattern::RangeQuery);
                }
                FieldCondition::In(_) => {
                    patterns.insert(QueryPattern::MultiValueLookup);
                }
                FieldCondition::TextSearch { .. } => {
                    patterns.insert(QueryPattern::FullTextSearch);
                }
                FieldCondition::VectorSimilarity { .. } => {
                    patterns.insert(QueryPattern::VectorSearch);
                }
                FieldCondition::Spatial(_) => {
                    patterns.insert(QueryPattern::SpatialQuery);
                }
                _ => {}
            }
        }
        if !query.sort.is_empty() && query.limit.is_some() {
            patterns.insert(QueryPattern::TopN);
        }
        if query.offset.unwrap_or(0) > 0 {
            patterns.insert(QueryPattern::Pagination);
        }
        patterns
    }
}
