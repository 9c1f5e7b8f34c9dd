//! Hierarchical effort rollup.
//!
//! The estimation rule is recursive: a node whose children are all
//! estimate-complete (every leaf below them carries an estimate) rolls up
//! the children's sum; otherwise the node's own estimate, or zero, stands in
//! for the whole subtree. Partial data at both levels is flagged as a
//! conflict because the parent's coarse value silently overrides the child
//! rollup.

use std::collections::HashMap;

use rdburn_core::{Assignee, DoneSet, Issue, IssueId};

use crate::error::EngineError;

/// Resolved figures for one root issue.
#[derive(Debug, Clone)]
pub struct ResolvedRoot {
    /// Root issue id
    pub id: IssueId,

    /// Effective estimate after applying the rollup rule
    pub effective_hours: f64,

    /// Effective estimate restricted to not-done contributors
    pub remaining_hours: f64,

    /// True iff every contributing node is in a done state
    pub done: bool,

    /// Attribution of this root's hours across assignees
    pub shares: Vec<AssigneeShare>,
}

/// One contributor's slice of a root issue's hours.
///
/// Hours computed via child sum are attributed to each contributing child's
/// own assignee; hours taken from a parent's own value follow the parent's
/// assignee.
#[derive(Debug, Clone)]
pub struct AssigneeShare {
    /// Attributed assignee; `None` is the unassigned bucket
    pub assignee: Option<Assignee>,

    /// Attributed scope
    pub scope_hours: f64,

    /// Attributed remaining effort
    pub remaining_hours: f64,
}

/// A rollup conflict: estimates exist at both parent and child level while
/// the child rollup is still incomplete. Non-fatal; the parent value wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupWarning {
    /// The parent issue whose own value overrides its children
    pub issue_id: IssueId,

    /// The overriding parent estimate
    pub parent_hours: f64,
}

impl std::fmt::Display for RollupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "issue #{}: estimates on both parent ({}h) and children; parent value overrides the partial child rollup",
            self.issue_id, self.parent_hours
        )
    }
}

/// Output of one resolve pass over a range's issue set.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// One entry per root issue, ordered by id
    pub roots: Vec<ResolvedRoot>,

    /// Rollup conflicts encountered anywhere in the hierarchy
    pub warnings: Vec<RollupWarning>,
}

impl Resolution {
    /// Total effective estimate over all roots.
    pub fn scope_hours(&self) -> f64 {
        self.roots.iter().map(|r| r.effective_hours).sum()
    }

    /// Effective estimate restricted to not-done work.
    pub fn remaining_hours(&self) -> f64 {
        self.roots.iter().map(|r| r.remaining_hours).sum()
    }

    /// `scope - remaining`.
    pub fn completed_hours(&self) -> f64 {
        self.scope_hours() - self.remaining_hours()
    }
}

/// Per-node figures carried up the traversal.
struct NodeFacts {
    /// Every leaf at or below this node carries an estimate
    complete: bool,
    effective: f64,
    remaining: f64,
    done: bool,
    shares: Vec<AssigneeShare>,
}

/// Resolve effective estimates for every root issue in `issues`.
///
/// `issues` is the full in-range set for one point in time, children
/// included. An issue whose parent sits outside the set counts as a root.
/// Fails fast with [`EngineError::ParentCycle`] on a cyclic parent chain.
pub fn resolve(
    issues: &HashMap<IssueId, Issue>,
    done_set: &DoneSet,
) -> Result<Resolution, EngineError> {
    // arena: children lists built once per resolve call
    let mut children: HashMap<IssueId, Vec<IssueId>> = HashMap::new();
    let mut root_ids: Vec<IssueId> = Vec::new();
    for issue in issues.values() {
        match issue.parent_id.filter(|parent| issues.contains_key(parent)) {
            Some(parent) => children.entry(parent).or_default().push(issue.id),
            None => root_ids.push(issue.id),
        }
    }
    root_ids.sort();
    for kids in children.values_mut() {
        kids.sort();
    }

    let mut facts: HashMap<IssueId, NodeFacts> = HashMap::with_capacity(issues.len());
    let mut warnings = Vec::new();

    // explicit post-order traversal; no unbounded recursion
    for &root in &root_ids {
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                let node = &issues[&id];
                let kids = children.get(&id).map(Vec::as_slice).unwrap_or(&[]);
                let node_facts = resolve_node(node, kids, issues, &facts, done_set, &mut warnings);
                facts.insert(id, node_facts);
            } else {
                stack.push((id, true));
                if let Some(kids) = children.get(&id) {
                    stack.extend(kids.iter().map(|&kid| (kid, false)));
                }
            }
        }
    }

    // a node left unvisited hangs off a parent loop: its whole chain is
    // unreachable from any root
    if facts.len() != issues.len() {
        if let Some(&culprit) = issues.keys().filter(|id| !facts.contains_key(id)).min() {
            return Err(EngineError::ParentCycle(culprit));
        }
    }

    let roots = root_ids
        .into_iter()
        .filter_map(|id| {
            facts.remove(&id).map(|f| ResolvedRoot {
                id,
                effective_hours: f.effective,
                remaining_hours: f.remaining,
                done: f.done,
                shares: f.shares,
            })
        })
        .collect();

    Ok(Resolution { roots, warnings })
}

fn resolve_node(
    node: &Issue,
    kids: &[IssueId],
    issues: &HashMap<IssueId, Issue>,
    facts: &HashMap<IssueId, NodeFacts>,
    done_set: &DoneSet,
    warnings: &mut Vec<RollupWarning>,
) -> NodeFacts {
    if kids.is_empty() {
        return own_facts(node, done_set, node.estimated_hours.is_some());
    }

    let all_complete = kids.iter().all(|kid| facts[kid].complete);
    if all_complete {
        let effective = kids.iter().map(|kid| facts[kid].effective).sum();
        let remaining = kids.iter().map(|kid| facts[kid].remaining).sum();
        let done = kids.iter().all(|kid| facts[kid].done);
        let shares = kids
            .iter()
            .flat_map(|kid| facts[kid].shares.iter().cloned())
            .collect();
        return NodeFacts { complete: true, effective, remaining, done, shares };
    }

    // partial child data: the node's own value stands in for the subtree
    if let Some(parent_hours) = node.estimated_hours {
        let any_child_estimated = kids
            .iter()
            .any(|kid| issues[kid].estimated_hours.is_some());
        if any_child_estimated {
            warnings.push(RollupWarning { issue_id: node.id, parent_hours });
        }
    }
    own_facts(node, done_set, false)
}

fn own_facts(node: &Issue, done_set: &DoneSet, complete: bool) -> NodeFacts {
    let effective = node.estimated_hours.unwrap_or(0.0);
    let done = node.is_done(done_set);
    let remaining = if done { 0.0 } else { effective };
    NodeFacts {
        complete,
        effective,
        remaining,
        done,
        shares: vec![AssigneeShare {
            assignee: node.assignee.clone(),
            scope_hours: effective,
            remaining_hours: remaining,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rdburn_core::{ProjectId, UserId};

    fn done_set() -> DoneSet {
        DoneSet::new(["Closed"])
    }

    fn issue(id: i64, parent: Option<i64>, estimate: Option<f64>, status: &str) -> Issue {
        Issue {
            id: IssueId(id),
            project_id: ProjectId(1),
            version_id: None,
            parent_id: parent.map(IssueId),
            subject: format!("issue {id}"),
            status: status.to_string(),
            estimated_hours: estimate,
            assignee: None,
            due_date: None,
            first_seen_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn assigned(mut base: Issue, user: i64, name: &str) -> Issue {
        base.assignee = Some(Assignee { id: UserId(user), name: name.to_string() });
        base
    }

    fn index(issues: Vec<Issue>) -> HashMap<IssueId, Issue> {
        issues.into_iter().map(|i| (i.id, i)).collect()
    }

    #[test]
    fn fully_estimated_children_sum_to_the_root() {
        let issues = index(vec![
            issue(1, None, Some(100.0), "New"), // parent value must be ignored
            issue(2, Some(1), Some(8.0), "New"),
            issue(3, Some(1), Some(4.0), "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots.len(), 1);
        assert_eq!(resolution.roots[0].effective_hours, 12.0);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn nested_subtrees_roll_up_leaf_estimates() {
        let issues = index(vec![
            issue(1, None, None, "New"),
            issue(2, Some(1), None, "New"),
            issue(3, Some(2), Some(3.0), "New"),
            issue(4, Some(2), Some(5.0), "New"),
            issue(5, Some(1), Some(2.0), "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots[0].effective_hours, 10.0);
    }

    #[test]
    fn missing_leaf_estimate_falls_back_to_the_parent_value() {
        let issues = index(vec![
            issue(1, None, Some(40.0), "New"),
            issue(2, Some(1), None, "New"),
            issue(3, Some(1), None, "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots[0].effective_hours, 40.0);
        // no child estimate anywhere, so no conflict either
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn unestimated_parent_with_partial_children_resolves_to_zero() {
        let issues = index(vec![
            issue(1, None, None, "New"),
            issue(2, Some(1), Some(8.0), "New"),
            issue(3, Some(1), None, "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots[0].effective_hours, 0.0);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn partial_data_at_both_levels_is_a_conflict() {
        let issues = index(vec![
            issue(1, None, Some(40.0), "New"),
            issue(2, Some(1), Some(8.0), "New"),
            issue(3, Some(1), None, "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots[0].effective_hours, 40.0);
        assert_eq!(
            resolution.warnings,
            vec![RollupWarning { issue_id: IssueId(1), parent_hours: 40.0 }]
        );
    }

    #[test]
    fn conflicts_surface_at_every_affected_level() {
        // mid-level node 2 has partial children and its own estimate
        let issues = index(vec![
            issue(1, None, None, "New"),
            issue(2, Some(1), Some(20.0), "New"),
            issue(3, Some(2), Some(6.0), "New"),
            issue(4, Some(2), None, "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots[0].effective_hours, 20.0);
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].issue_id, IssueId(2));
    }

    #[test]
    fn remaining_counts_only_not_done_children() {
        let issues = index(vec![
            issue(1, None, None, "New"),
            issue(2, Some(1), Some(8.0), "Closed"),
            issue(3, Some(1), Some(4.0), "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        let root = &resolution.roots[0];
        assert_eq!(root.effective_hours, 12.0);
        assert_eq!(root.remaining_hours, 4.0);
        assert!(!root.done);
    }

    #[test]
    fn root_is_done_only_when_every_contributor_is() {
        let issues = index(vec![
            issue(1, None, None, "New"), // parent status irrelevant in child-sum mode
            issue(2, Some(1), Some(8.0), "Closed"),
            issue(3, Some(1), Some(4.0), "Closed"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert!(resolution.roots[0].done);
        assert_eq!(resolution.roots[0].remaining_hours, 0.0);
    }

    #[test]
    fn parent_value_mode_follows_the_parent_status() {
        let issues = index(vec![
            issue(1, None, Some(16.0), "Closed"),
            issue(2, Some(1), None, "New"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        let root = &resolution.roots[0];
        assert_eq!(root.effective_hours, 16.0);
        assert_eq!(root.remaining_hours, 0.0);
        assert!(root.done);
    }

    #[test]
    fn child_sum_attributes_to_child_assignees() {
        let issues = index(vec![
            assigned(issue(1, None, None, "New"), 1, "lead"),
            assigned(issue(2, Some(1), Some(8.0), "New"), 2, "alice"),
            assigned(issue(3, Some(1), Some(4.0), "Closed"), 3, "bob"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        let shares = &resolution.roots[0].shares;
        assert_eq!(shares.len(), 2);
        let alice = shares.iter().find(|s| s.assignee.as_ref().unwrap().name == "alice").unwrap();
        assert_eq!(alice.scope_hours, 8.0);
        assert_eq!(alice.remaining_hours, 8.0);
        let bob = shares.iter().find(|s| s.assignee.as_ref().unwrap().name == "bob").unwrap();
        assert_eq!(bob.scope_hours, 4.0);
        assert_eq!(bob.remaining_hours, 0.0);
    }

    #[test]
    fn parent_value_attributes_to_the_parent_assignee() {
        let issues = index(vec![
            assigned(issue(1, None, Some(40.0), "New"), 1, "lead"),
            assigned(issue(2, Some(1), None, "New"), 2, "alice"),
        ]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        let shares = &resolution.roots[0].shares;
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].assignee.as_ref().unwrap().name, "lead");
        assert_eq!(shares[0].scope_hours, 40.0);
    }

    #[test]
    fn parent_outside_the_range_makes_the_child_a_root() {
        let issues = index(vec![issue(2, Some(99), Some(8.0), "New")]);
        let resolution = resolve(&issues, &done_set()).unwrap();
        assert_eq!(resolution.roots.len(), 1);
        assert_eq!(resolution.roots[0].id, IssueId(2));
    }

    #[test]
    fn cyclic_parent_chain_is_a_structural_error() {
        let issues = index(vec![
            issue(1, Some(2), Some(1.0), "New"),
            issue(2, Some(1), Some(1.0), "New"),
        ]);
        let err = resolve(&issues, &done_set()).unwrap_err();
        assert!(matches!(err, EngineError::ParentCycle(IssueId(1))));
    }

    #[test]
    fn empty_range_resolves_to_nothing() {
        let resolution = resolve(&HashMap::new(), &done_set()).unwrap();
        assert!(resolution.roots.is_empty());
        assert_eq!(resolution.scope_hours(), 0.0);
    }
}
