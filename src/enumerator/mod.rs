// Candidate Enumeration
//
// Produces the bounded multiset of candidate plans for one analyzed query:
// the table scan baseline, single-index accesses (scan, index-only, seek),
// IN-list strategies, DNF-driven unions, index intersections, and bitmap
// accesses. Every emission charges the planning budget; a breach stops
// enumeration and the candidates gathered so far stand.

pub mod in_list;

use crate::analyzer::QueryAnalysis;
use crate::bitmap;
use crate::common::{IndexDescriptor, IndexKind, Value};
use crate::config::{PlannerConfig, PlanningBudget};
use crate::cost::estimator::CostEstimator;
use crate::cost::PlanCost;
use crate::plan::{scan_ordering_satisfied, BitmapCombineOp, PlanOperator};
use crate::predicate::condition::{BoundCondition, ConditionTree, FieldCondition};
use crate::predicate::normalize::Normalizer;
use crate::predicate::Predicate;
use std::collections::BTreeSet;
use tracing::trace;

/// Default HNSW breadth for vector search candidates.
const DEFAULT_EF_SEARCH: usize = 64;

/// One candidate plan with its estimated cost.
#[derive(Debug, Clone)]
pub struct CandidatePlan {
    pub root: PlanOperator,
    pub cost: PlanCost,
    pub total_cost: f64,
    pub complexity: usize,
    /// Emission order; the final deterministic tie-breaker.
    pub enumeration_index: usize,
}

/// Result of one enumeration pass.
#[derive(Debug, Clone)]
pub struct EnumerationOutcome {
    pub candidates: Vec<CandidatePlan>,
    /// A budget breach cut enumeration short.
    pub truncated: bool,
    /// DNF conversion failed, so OR expansion was unavailable.
    pub dnf_unavailable: bool,
}

/// The candidate enumerator.
pub struct PlanEnumerator<'a> {
    config: &'a PlannerConfig,
    estimator: &'a CostEstimator<'a>,
}

/// Prefix match of a conjunctive query against one index.
struct IndexMatch {
    satisfied: Vec<BoundCondition>,
    reverse: bool,
    /// Seek keys when every satisfied condition is an equality or a small IN.
    seek_keys: Option<Vec<Vec<Value>>>,
}

struct EmitSession<'a, 'b> {
    estimator: &'a CostEstimator<'a>,
    analysis: &'a QueryAnalysis,
    budget: &'b mut PlanningBudget,
    candidates: Vec<CandidatePlan>,
    truncated: bool,
}

impl EmitSession<'_, '_> {
    fn emit(&mut self, root: PlanOperator) {
        if self.truncated {
            return;
        }
        if self.budget.charge_enumeration().is_some() {
            self.truncated = true;
            return;
        }
        let root = wrap_sort_limit(root, self.analysis);
        let cost = self.estimator.estimate(&root, self.analysis);
        let total_cost = self.estimator.model().total_cost(&cost);
        trace!(
            candidate = self.candidates.len(),
            total_cost,
            plan = %root,
            "candidate emitted"
        );
        self.candidates.push(CandidatePlan {
            complexity: root.complexity(),
            enumeration_index: self.candidates.len(),
            root,
            cost,
            total_cost,
        });
    }
}

/// Append the sort and limit wrappers a candidate still needs.
fn wrap_sort_limit(mut root: PlanOperator, analysis: &QueryAnalysis) -> PlanOperator {
    if analysis.has_sort() && !root.satisfies_ordering(&analysis.sort) {
        root = PlanOperator::Sort {
            input: Box::new(root),
            sort: analysis.sort.clone(),
        };
    }
    if analysis.limit.is_some() || analysis.offset.unwrap_or(0) > 0 {
        root = PlanOperator::Limit {
            input: Box::new(root),
            limit: analysis.limit,
            offset: analysis.offset,
        };
    }
    if let Some(fields) = &analysis.projection {
        root = PlanOperator::Project {
            input: Box::new(root),
            fields: fields.clone(),
        };
    }
    root
}

impl<'a> PlanEnumerator<'a> {
    pub fn new(config: &'a PlannerConfig, estimator: &'a CostEstimator<'a>) -> Self {
        Self { config, estimator }
    }

    /// Enumerate candidates for the analyzed query against the available
    /// indexes.
    pub fn enumerate(
        &self,
        record_type: &str,
        analysis: &QueryAnalysis,
        indexes: &[IndexDescriptor],
        budget: &mut PlanningBudget,
    ) -> EnumerationOutcome {
        let mut session = EmitSession {
            estimator: self.estimator,
            analysis,
            budget,
            candidates: Vec::new(),
            truncated: false,
        };
        let conjuncts: Vec<BoundCondition> = analysis
            .conjunctive_conditions()
            .into_iter()
            .cloned()
            .collect();
        let mut dnf_unavailable = false;

        // The table scan is always a candidate.
        session.emit(self.table_scan_candidate(record_type, analysis));

        // Single-index candidates.
        for index in indexes.iter().filter(|i| i.kind == IndexKind::BTree) {
            if session.truncated {
                break;
            }
            let Some(matched) = self.match_index(index, &conjuncts, analysis) else {
                continue;
            };
            let residual = analysis.condition.without(&matched.satisfied);

            let scan = PlanOperator::IndexScan {
                index: index.clone(),
                satisfied: matched.satisfied.clone(),
                reverse: matched.reverse,
            };
            session.emit(self.wrap_residual(scan, &residual));

            // Index-only evaluation needs a projection: whole-record queries
            // always fetch, however well the index covers the filter.
            if analysis.projection.is_some()
                && index.covers(analysis.referenced_fields.iter().map(String::as_str))
            {
                let only = PlanOperator::IndexOnlyScan {
                    index: index.clone(),
                    satisfied: matched.satisfied.clone(),
                    reverse: matched.reverse,
                };
                session.emit(self.wrap_residual(only, &residual));
            }

            if let Some(keys) = matched.seek_keys {
                let seek = PlanOperator::IndexSeek {
                    index: index.clone(),
                    keys,
                    satisfied: matched.satisfied.clone(),
                    reverse: matched.reverse,
                };
                session.emit(self.wrap_residual(seek, &residual));
            }
        }

        // Specialized index candidates.
        self.specialized_candidates(indexes, &conjuncts, analysis, &mut session);

        // IN-list strategies.
        self.in_list_candidates(indexes, &conjuncts, analysis, &mut session);

        // DNF expansion of disjunctive predicates into a union.
        if self.config.enable_index_union && contains_disjunction(&analysis.condition) {
            dnf_unavailable = !self.dnf_union_candidate(indexes, analysis, &mut session);
        }

        // Index intersection of disjoint conjunctive matches.
        if self.config.enable_index_intersection && conjuncts.len() >= 2 {
            self.intersection_candidate(indexes, &conjuncts, analysis, &mut session);
        }

        // Bitmap candidates over low-cardinality columns.
        self.bitmap_candidates(indexes, &conjuncts, analysis, &mut session);

        EnumerationOutcome {
            truncated: session.truncated,
            dnf_unavailable,
            candidates: session.candidates,
        }
    }

    // ------------------------------------------------------------------
    // Case Builders
    // ------------------------------------------------------------------

    fn table_scan_candidate(&self, record_type: &str, analysis: &QueryAnalysis) -> PlanOperator {
        let scan = PlanOperator::TableScan {
            record_type: record_type.to_string(),
        };
        self.wrap_residual(scan, &analysis.condition)
    }

    /// Wrap residual (unsatisfied) conditions in a filter.
    fn wrap_residual(&self, input: PlanOperator, residual: &ConditionTree) -> PlanOperator {
        if residual.is_always_true() {
            return input;
        }
        PlanOperator::Filter {
            selectivity: self.estimator.condition_tree_selectivity(residual),
            predicate: residual.to_predicate(),
            input: Box::new(input),
        }
    }

    /// Match the leading key fields of an index against the conjunctive
    /// conditions: equality-leading fields extend the prefix, the first range
    /// closes it. An index with no satisfied conditions still matches when it
    /// provides the requested ordering.
    fn match_index(
        &self,
        index: &IndexDescriptor,
        conjuncts: &[BoundCondition],
        analysis: &QueryAnalysis,
    ) -> Option<IndexMatch> {
        let mut satisfied = Vec::new();
        let mut seek_columns: Vec<Vec<Value>> = Vec::new();
        let mut seekable = true;

        'fields: for key_field in &index.key_fields {
            let found = conjuncts.iter().find(|c| {
                !c.negated
                    && c.field_name() == key_field.name
                    && matches!(
                        c.condition,
                        FieldCondition::Equals(_)
                            | FieldCondition::In(_)
                            | FieldCondition::Range(_)
                    )
            });
            match found {
                Some(bound) => match &bound.condition {
                    FieldCondition::Equals(value) => {
                        satisfied.push(bound.clone());
                        seek_columns.push(vec![value.clone()]);
                    }
                    FieldCondition::In(values) => {
                        satisfied.push(bound.clone());
                        if values.len() <= self.config.in_union_threshold {
                            seek_columns.push(values.clone());
                        } else {
                            seekable = false;
                        }
                    }
                    FieldCondition::Range(_) => {
                        satisfied.push(bound.clone());
                        seekable = false;
                        break 'fields;
                    }
                    _ => unreachable!("filtered above"),
                },
                None => break 'fields,
            }
        }

        let reverse = analysis.has_sort()
            && !scan_ordering_satisfied(index, &satisfied, false, &analysis.sort)
            && scan_ordering_satisfied(index, &satisfied, true, &analysis.sort);

        if satisfied.is_empty()
            && !scan_ordering_satisfied(index, &satisfied, reverse, &analysis.sort)
        {
            return None;
        }
        if satisfied.is_empty() && !analysis.has_sort() {
            // Nothing satisfied and nothing to order: no better than the
            // table scan baseline.
            return None;
        }

        // Point probes only pay off on unique indexes; IN-list planning owns
        // the non-unique multi-probe case.
        let seek_keys = if seekable && !satisfied.is_empty() && index.unique {
            cartesian_keys(&seek_columns, self.config.in_join_threshold)
        } else {
            None
        };

        Some(IndexMatch {
            satisfied,
            reverse,
            seek_keys,
        })
    }

    fn specialized_candidates(
        &self,
        indexes: &[IndexDescriptor],
        conjuncts: &[BoundCondition],
        analysis: &QueryAnalysis,
        session: &mut EmitSession<'_, '_>,
    ) {
        for index in indexes {
            if session.truncated {
                return;
            }
            let Some(leading) = index.leading_field() else {
                continue;
            };
            let matched = conjuncts.iter().find(|c| c.field_name() == leading && !c.negated);
            let Some(bound) = matched else { continue };

            let scan = match (index.kind, &bound.condition) {
                (IndexKind::FullText, FieldCondition::TextSearch { terms, mode }) => {
                    Some(PlanOperator::FullTextScan {
                        index: index.clone(),
                        field: bound.field_name().to_string(),
                        terms: terms.clone(),
                        mode: *mode,
                    })
                }
                (
                    IndexKind::Spatial,
                    FieldCondition::Spatial(crate::predicate::condition::SpatialCondition::Within(
                        region,
                    )),
                ) => Some(PlanOperator::SpatialScan {
                    index: index.clone(),
                    field: bound.field_name().to_string(),
                    region: region.clone(),
                }),
                (IndexKind::Vector, FieldCondition::VectorSimilarity { k, .. }) => {
                    Some(PlanOperator::VectorSearch {
                        index: index.clone(),
                        field: bound.field_name().to_string(),
                        k: *k,
                        ef_search: DEFAULT_EF_SEARCH,
                    })
                }
                _ => None,
            };
            if let Some(scan) = scan {
                let residual = analysis.condition.without(std::slice::from_ref(bound));
                session.emit(self.wrap_residual(scan, &residual));
            }
        }
    }

    fn in_list_candidates(
        &self,
        indexes: &[IndexDescriptor],
        conjuncts: &[BoundCondition],
        analysis: &QueryAnalysis,
        session: &mut EmitSession<'_, '_>,
    ) {
        for bound in conjuncts {
            if session.truncated {
                return;
            }
            let FieldCondition::In(values) = &bound.condition else {
                continue;
            };
            if bound.negated {
                continue;
            }
            let index = indexes.iter().find(|i| {
                i.kind == IndexKind::BTree && i.leading_field() == Some(bound.field_name())
            });
            let strategy = in_list::choose_strategy(values.len(), index.is_some(), self.config);
            let residual = analysis.condition.without(std::slice::from_ref(bound));

            match (strategy, index) {
                (in_list::InListStrategy::IndexUnion, Some(index)) => {
                    let union = in_list::union_of_values(index, bound.field_name(), values);
                    session.emit(self.wrap_residual(union, &residual));
                }
                (in_list::InListStrategy::InJoin, Some(index)) => {
                    let seek = in_list::in_join_seek(index, bound.field_name(), values);
                    session.emit(self.wrap_residual(seek, &residual));
                }
                // OR expansion without an index adds nothing over the table
                // scan baseline; residual lists stay with the filter.
                _ => {}
            }
        }
    }

    /// Expand a disjunctive predicate into a deduplicating union, one child
    /// per DNF term. Returns false when DNF conversion blew a limit.
    fn dnf_union_candidate(
        &self,
        indexes: &[IndexDescriptor],
        analysis: &QueryAnalysis,
        session: &mut EmitSession<'_, '_>,
    ) -> bool {
        let normalizer = Normalizer::new(self.config.max_dnf_terms, self.config.max_dnf_depth);
        let (dnf, converted) = normalizer.try_to_dnf(&analysis.predicate);
        if !converted {
            return false;
        }
        let Predicate::Or(terms) = dnf else {
            // Degenerate disjunction; single-index cases already cover it.
            return true;
        };

        let mut children = Vec::with_capacity(terms.len());
        for term in &terms {
            let Ok(term_tree) = ConditionTree::from_predicate(term) else {
                return true;
            };
            match self.best_term_access(indexes, &term_tree) {
                Some(child) => children.push(child),
                // A term with no index access would degrade the union below
                // the plain table scan; drop the whole expansion.
                None => return true,
            }
        }
        session.emit(PlanOperator::Union {
            children,
            deduplicate: true,
        });
        true
    }

    /// Best single-index access for one DNF term: the index satisfying the
    /// most of the term's conditions, residual-filtered to the full term.
    fn best_term_access(
        &self,
        indexes: &[IndexDescriptor],
        term_tree: &ConditionTree,
    ) -> Option<PlanOperator> {
        let conjuncts: Vec<BoundCondition> = term_tree
            .conjunctive_conditions()
            .into_iter()
            .cloned()
            .collect();
        if conjuncts.is_empty() {
            return None;
        }

        let mut best: Option<(usize, &IndexDescriptor, Vec<BoundCondition>)> = None;
        for index in indexes.iter().filter(|i| i.kind == IndexKind::BTree) {
            let mut satisfied = Vec::new();
            for key_field in &index.key_fields {
                let found = conjuncts.iter().find(|c| {
                    !c.negated
                        && c.field_name() == key_field.name
                        && matches!(
                            c.condition,
                            FieldCondition::Equals(_)
                                | FieldCondition::In(_)
                                | FieldCondition::Range(_)
                        )
                });
                match found {
                    Some(bound) => {
                        let stop = bound.condition.is_range();
                        satisfied.push(bound.clone());
                        if stop {
                            break;
                        }
                    }
                    None => break,
                }
            }
            if satisfied.is_empty() {
                continue;
            }
            if best.as_ref().map_or(true, |(count, _, _)| satisfied.len() > *count) {
                best = Some((satisfied.len(), index, satisfied));
            }
        }

        let (_, index, satisfied) = best?;
        let scan = PlanOperator::IndexScan {
            index: index.clone(),
            satisfied: satisfied.clone(),
            reverse: false,
        };
        Some(self.wrap_residual(scan, &term_tree.without(&satisfied)))
    }

    /// Intersect index scans whose satisfied condition sets are disjoint.
    fn intersection_candidate(
        &self,
        indexes: &[IndexDescriptor],
        conjuncts: &[BoundCondition],
        analysis: &QueryAnalysis,
        session: &mut EmitSession<'_, '_>,
    ) {
        let mut used_fields: BTreeSet<String> = BTreeSet::new();
        let mut children = Vec::new();
        let mut all_satisfied = Vec::new();

        for index in indexes.iter().filter(|i| i.kind == IndexKind::BTree) {
            let Some(matched) = self.match_index(index, conjuncts, analysis) else {
                continue;
            };
            if matched.satisfied.is_empty() {
                continue;
            }
            let fields: BTreeSet<String> = matched
                .satisfied
                .iter()
                .map(|c| c.field_name().to_string())
                .collect();
            if fields.iter().any(|f| used_fields.contains(f)) {
                continue;
            }
            used_fields.extend(fields);
            children.push(PlanOperator::IndexScan {
                index: index.clone(),
                satisfied: matched.satisfied.clone(),
                reverse: false,
            });
            all_satisfied.extend(matched.satisfied);
        }

        if children.len() < 2 {
            return;
        }
        let residual = analysis.condition.without(&all_satisfied);
        let intersection = PlanOperator::Intersection { children };
        session.emit(self.wrap_residual(intersection, &residual));
    }

    /// Bitmap access for low-cardinality columns under supported conditions.
    fn bitmap_candidates(
        &self,
        indexes: &[IndexDescriptor],
        conjuncts: &[BoundCondition],
        analysis: &QueryAnalysis,
        session: &mut EmitSession<'_, '_>,
    ) {
        let mut scans = Vec::new();
        let mut satisfied = Vec::new();

        for bound in conjuncts {
            if bound.negated {
                continue;
            }
            let index = indexes.iter().find(|i| {
                i.kind == IndexKind::Bitmap && i.leading_field() == Some(bound.field_name())
            });
            let Some(index) = index else { continue };
            let distinct = self.estimator.distinct_values(bound.field_name());
            if !bitmap::bitmap_usable(
                &bound.condition,
                distinct,
                self.config.bitmap_max_cardinality,
            ) {
                continue;
            }
            scans.push(PlanOperator::BitmapScan {
                index: index.clone(),
                condition: bound.clone(),
            });
            satisfied.push(bound.clone());
        }

        if scans.is_empty() {
            return;
        }
        let access = if scans.len() == 1 {
            scans.into_iter().next().unwrap()
        } else {
            PlanOperator::BitmapCombine {
                op: BitmapCombineOp::And,
                children: scans,
            }
        };
        let residual = analysis.condition.without(&satisfied);
        session.emit(self.wrap_residual(access, &residual));
    }
}

/// Whether any disjunction appears in the tree.
fn contains_disjunction(tree: &ConditionTree) -> bool {
    match tree {
        ConditionTree::Disjunction(_) => true,
        ConditionTree::Conjunction(children) => children.iter().any(contains_disjunction),
        _ => false,
    }
}

/// Cartesian product of per-column seek values, bounded by `max` keys.
fn cartesian_keys(columns: &[Vec<Value>], max: usize) -> Option<Vec<Vec<Value>>> {
    if columns.is_empty() {
        return None;
    }
    let mut keys: Vec<Vec<Value>> = vec![Vec::new()];
    for column in columns {
        let mut next = Vec::with_capacity(keys.len() * column.len());
        for base in &keys {
            for value in column {
                if next.len() >= max {
                    return None;
                }
                let mut key = base.clone();
                key.push(value.clone());
                next.push(key);
            }
        }
        keys = next;
    }
    Some(keys)
}
