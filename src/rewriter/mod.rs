// Rule-Based Rewriting
//
// Pure tree-to-tree transformations applied to candidate plans after
// enumeration: redundant-sort elimination, limit pushdown, and filter
// combining. Rules are idempotent; the driver runs them to a fixed point
// bounded by the rule-application budget, falling back to the best tree so
// far on a breach.

use crate::config::PlanningBudget;
use crate::plan::PlanOperator;
use crate::predicate::Predicate;
use tracing::debug;

/// One rewrite rule: returns the replacement tree, or `None` when the rule
/// does not apply anywhere in the subtree.
pub trait RewriteRule {
    fn name(&self) -> &'static str;
    fn apply(&self, plan: &PlanOperator) -> Option<PlanOperator>;
}

// ============================================================================
// EliminateRedundantSort
// ============================================================================

/// Removes a `Sort` whose input already provides the requested ordering,
/// looking through filters, projections, and leaf scans. A single-key seek
/// satisfies any ordering; a vector search is similarity-ordered already.
pub struct EliminateRedundantSort;

impl RewriteRule for EliminateRedundantSort {
    fn name(&self) -> &'static str {
        "eliminate_redundant_sort"
    }

    fn apply(&self, plan: &PlanOperator) -> Option<PlanOperator> {
        if let PlanOperator::Sort { input, sort } = plan {
            if input.satisfies_ordering(sort) {
                // Drop the sort, then keep rewriting underneath it.
                return Some(self.apply(input).unwrap_or_else(|| (**input).clone()));
            }
        }
        rewrite_children(plan, |child| self.apply(child))
    }
}

// ============================================================================
// PushDownLimit
// ============================================================================

/// Moves a `Limit` as close to the leaves as semantics allow. A limit cannot
/// cross a `Filter` (the filter changes the row count) and cannot cross a
/// `Sort` over unsorted input (top-N needs the whole set), but passes through
/// projections and copies into the children of a non-deduplicating union.
pub struct PushDownLimit;

impl PushDownLimit {
    fn push(
        limit: Option<usize>,
        offset: Option<usize>,
        input: &PlanOperator,
    ) -> Option<PlanOperator> {
        match input {
            PlanOperator::Project { input: inner, fields } => {
                let pushed = Self::push(limit, offset, inner).unwrap_or_else(|| {
                    PlanOperator::Limit {
                        input: inner.clone(),
                        limit,
                        offset,
                    }
                });
                Some(PlanOperator::Project {
                    input: Box::new(pushed),
                    fields: fields.clone(),
                })
            }
            PlanOperator::Union {
                children,
                deduplicate: false,
            } => {
                // Each child only ever needs the first limit+offset rows.
                let per_child = limit.map(|l| l + offset.unwrap_or(0));
                let already_limited = children
                    .iter()
                    .all(|c| matches!(c, PlanOperator::Limit { .. }));
                if per_child.is_none() || already_limited {
                    return None;
                }
                let limited_children = children
                    .iter()
                    .map(|c| PlanOperator::Limit {
                        input: Box::new(c.clone()),
                        limit: per_child,
                        offset: None,
                    })
                    .collect();
                Some(PlanOperator::Limit {
                    input: Box::new(PlanOperator::Union {
                        children: limited_children,
                        deduplicate: false,
                    }),
                    limit,
                    offset,
                })
            }
            _ => None,
        }
    }
}

impl RewriteRule for PushDownLimit {
    fn name(&self) -> &'static str {
        "push_down_limit"
    }

    fn apply(&self, plan: &PlanOperator) -> Option<PlanOperator> {
        if let PlanOperator::Limit {
            input,
            limit,
            offset,
        } = plan
        {
            if let Some(pushed) = Self::push(*limit, *offset, input) {
                return Some(pushed);
            }
        }
        rewrite_children(plan, |child| self.apply(child))
    }
}

// ============================================================================
// SimplifyFilter
// ============================================================================

/// Combines adjacent filters into one conjunction with multiplied
/// selectivity, recursing through the rest of the tree.
pub struct SimplifyFilter;

impl RewriteRule for SimplifyFilter {
    fn name(&self) -> &'static str {
        "simplify_filter"
    }

    fn apply(&self, plan: &PlanOperator) -> Option<PlanOperator> {
        if let PlanOperator::Filter {
            input,
            predicate,
            selectivity,
        } = plan
        {
            if let PlanOperator::Filter {
                input: inner_input,
                predicate: inner_predicate,
                selectivity: inner_selectivity,
            } = input.as_ref()
            {
                let combined = PlanOperator::Filter {
                    input: inner_input.clone(),
                    predicate: Predicate::and(vec![
                        predicate.clone(),
                        inner_predicate.clone(),
                    ])
                    .simplify(),
                    selectivity: (selectivity * inner_selectivity).clamp(0.0, 1.0),
                };
                // Re-apply in place: three stacked filters collapse fully.
                return Some(self.apply(&combined).unwrap_or(combined));
            }
        }
        rewrite_children(plan, |child| self.apply(child))
    }
}

/// Rebuild a node if any child rewrites. Shared recursion scaffold for rules
/// whose interesting case is at the current node.
fn rewrite_children(
    plan: &PlanOperator,
    mut rewrite: impl FnMut(&PlanOperator) -> Option<PlanOperator>,
) -> Option<PlanOperator> {
    match plan {
        PlanOperator::Filter {
            input,
            predicate,
            selectivity,
        } => rewrite(input).map(|new_input| PlanOperator::Filter {
            input: Box::new(new_input),
            predicate: predicate.clone(),
            selectivity: *selectivity,
        }),
        PlanOperator::Sort { input, sort } => rewrite(input).map(|new_input| {
            PlanOperator::Sort {
                input: Box::new(new_input),
                sort: sort.clone(),
            }
        }),
        PlanOperator::Limit {
            input,
            limit,
            offset,
        } => rewrite(input).map(|new_input| PlanOperator::Limit {
            input: Box::new(new_input),
            limit: *limit,
            offset: *offset,
        }),
        PlanOperator::Project { input, fields } => rewrite(input).map(|new_input| {
            PlanOperator::Project {
                input: Box::new(new_input),
                fields: fields.clone(),
            }
        }),
        PlanOperator::Union {
            children,
            deduplicate,
        } => rewrite_child_list(children, rewrite).map(|new_children| PlanOperator::Union {
            children: new_children,
            deduplicate: *deduplicate,
        }),
        PlanOperator::Intersection { children } => rewrite_child_list(children, rewrite)
            .map(|new_children| PlanOperator::Intersection {
                children: new_children,
            }),
        PlanOperator::BitmapCombine { op, children } => rewrite_child_list(children, rewrite)
            .map(|new_children| PlanOperator::BitmapCombine {
                op: *op,
                children: new_children,
            }),
        _ => None,
    }
}

fn rewrite_child_list(
    children: &[PlanOperator],
    mut rewrite: impl FnMut(&PlanOperator) -> Option<PlanOperator>,
) -> Option<Vec<PlanOperator>> {
    let mut changed = false;
    let rewritten: Vec<PlanOperator> = children
        .iter()
        .map(|child| match rewrite(child) {
            Some(new_child) => {
                changed = true;
                new_child
            }
            None => child.clone(),
        })
        .collect();
    changed.then_some(rewritten)
}

// ============================================================================
// Driver
// ============================================================================

/// The rule-based rewriter: standard rules in a fixed order, run to a fixed
/// point under the rule-application budget.
pub struct Rewriter {
    rules: Vec<Box<dyn RewriteRule>>,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::standard()
    }
}

impl Rewriter {
    /// The standard rule set, in application order.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Box::new(SimplifyFilter),
                Box::new(EliminateRedundantSort),
                Box::new(PushDownLimit),
            ],
        }
    }

    /// Rewrite a plan to a fixed point. Returns the rewritten plan and how
    /// many rule applications it took. A budget breach stops rewriting and
    /// keeps the best tree reached so far.
    pub fn rewrite(&self, mut plan: PlanOperator, budget: &mut PlanningBudget) -> (PlanOperator, usize) {
        let mut applications = 0;
        loop {
            let mut changed = false;
            for rule in &self.rules {
                if budget.charge_rule_application().is_some() {
                    return (plan, applications);
                }
                if let Some(rewritten) = rule.apply(&plan) {
                    debug!(rule = rule.name(), "rewrite rule applied");
                    plan = rewritten;
                    applications += 1;
                    changed = true;
                }
            }
            if !changed {
                return (plan, applications);
            }
        }
    }
}
