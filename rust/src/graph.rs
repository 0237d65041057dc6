//! Activity-on-node dependency graph construction and validation.
//!
//! Activities live in a flat arena sorted by id; edges are index-based
//! adjacency lists. Validation collects every problem it finds instead of
//! stopping at the first one.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use thiserror::Error;

use pyo3::prelude::*;

use crate::models::{ActivityId, DependentActivity, Resource, ResourceId};

/// Argument contract violations, rejected before any computation starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("Duplicate activity id: {0}")]
    DuplicateActivityId(ActivityId),
    #[error("Duplicate resource id: {0}")]
    DuplicateResourceId(ResourceId),
    #[error("Activity {id} has negative duration {duration}")]
    NegativeDuration { id: ActivityId, duration: i64 },
    #[error("Resource {id} has invalid unit cost {cost}")]
    InvalidUnitCost { id: ResourceId, cost: f64 },
    #[error("Invalid default unit cost: {0}")]
    InvalidDefaultUnitCost(f64),
    #[error("Duplicate severity slack limit: {0}")]
    DuplicateSlackLimit(i64),
}

/// Input problems found while validating the dependency graph.
///
/// Missing and circular dependencies are fatal for the request; the
/// explicit-target inconsistency is reported but does not halt compilation.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphCompilationErrors {
    /// Every resource is an explicit target but some activities name none.
    #[pyo3(get)]
    pub explicit_target_inconsistency: bool,
    /// Activities excluded from auto-assignment by the inconsistency.
    #[pyo3(get)]
    pub untargeted_activities: Vec<ActivityId>,
    /// Each entry is one cycle, in dependency order.
    #[pyo3(get)]
    pub circular_dependencies: Vec<Vec<ActivityId>>,
    /// Referenced ids with no matching activity (sorted, unique).
    #[pyo3(get)]
    pub missing_dependencies: Vec<ActivityId>,
}

#[pymethods]
impl GraphCompilationErrors {
    /// True if compilation must halt.
    pub fn is_fatal(&self) -> bool {
        !self.circular_dependencies.is_empty() || !self.missing_dependencies.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.explicit_target_inconsistency && !self.is_fatal()
    }

    fn __repr__(&self) -> String {
        format!(
            "GraphCompilationErrors(explicit_target_inconsistency={}, cycles={:?}, missing={:?})",
            self.explicit_target_inconsistency,
            self.circular_dependencies,
            self.missing_dependencies
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Unvalidated graph: the activity arena and its id lookup table.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    activities: Vec<DependentActivity>,
    index: FxHashMap<ActivityId, usize>,
}

impl DependencyGraph {
    /// Build the arena from a caller snapshot.
    ///
    /// Computed fields on the incoming activities are cleared; they are
    /// recomputed from scratch by every compile.
    pub fn new(mut activities: Vec<DependentActivity>) -> Result<Self, ArgumentError> {
        activities.sort_by_key(|a| a.activity.id);

        let mut index = FxHashMap::with_capacity_and_hasher(activities.len(), Default::default());
        for (idx, dependent) in activities.iter_mut().enumerate() {
            let activity = &mut dependent.activity;
            if activity.duration < 0 {
                return Err(ArgumentError::NegativeDuration {
                    id: activity.id,
                    duration: activity.duration,
                });
            }
            if index.insert(activity.id, idx).is_some() {
                return Err(ArgumentError::DuplicateActivityId(activity.id));
            }
            activity.reset_computed();
        }

        Ok(Self { activities, index })
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Validate references, cycles and resource targeting.
    ///
    /// Returns the validated graph, or the full error report if any fatal
    /// problem was found.
    pub fn validate(
        self,
        resources: &[Resource],
    ) -> Result<ValidatedGraph, GraphCompilationErrors> {
        let n = self.activities.len();
        let mut errors = GraphCompilationErrors::default();

        let mut missing: BTreeSet<ActivityId> = BTreeSet::new();
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (idx, dependent) in self.activities.iter().enumerate() {
            for dep_id in dependent.all_dependencies() {
                match self.index.get(&dep_id) {
                    Some(&dep_idx) => {
                        predecessors[idx].push(dep_idx);
                        successors[dep_idx].push(idx);
                    }
                    None => {
                        missing.insert(dep_id);
                    }
                }
            }
        }
        for preds in &mut predecessors {
            preds.sort_unstable();
        }
        errors.missing_dependencies = missing.into_iter().collect();
        errors.circular_dependencies = find_cycles(&self.activities, &successors);

        let all_explicit = !resources.is_empty() && resources.iter().all(|r| r.is_explicit_target);
        if all_explicit {
            errors.untargeted_activities = self
                .activities
                .iter()
                .filter(|a| !a.activity.has_explicit_targets())
                .map(|a| a.activity.id)
                .collect();
            errors.explicit_target_inconsistency = !errors.untargeted_activities.is_empty();
        }

        if errors.is_fatal() {
            return Err(errors);
        }

        let topological_order = topological_order(&predecessors, &successors);

        Ok(ValidatedGraph {
            activities: self.activities,
            index: self.index,
            predecessors,
            successors,
            topological_order,
            warnings: errors,
        })
    }
}

/// Three-colour depth-first search over successor edges.
///
/// Every back edge yields one cycle: the slice of the current DFS path from
/// the re-entered node to the node that closed the loop.
fn find_cycles(
    activities: &[DependentActivity],
    successors: &[Vec<usize>],
) -> Vec<Vec<ActivityId>> {
    let n = activities.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut cycles = Vec::new();

    for root in 0..n {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        // (node, position of next successor to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&next) = successors[node].get(frame.1) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[next] {
                Mark::Unvisited => {
                    marks[next] = Mark::InProgress;
                    stack.push((next, 0));
                }
                Mark::InProgress => {
                    let start = stack
                        .iter()
                        .position(|&(idx, _)| idx == next)
                        .unwrap_or(0);
                    cycles.push(
                        stack[start..]
                            .iter()
                            .map(|&(idx, _)| activities[idx].activity.id)
                            .collect(),
                    );
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}

/// Kahn's algorithm with a min-heap so ties always resolve to the lowest id.
fn topological_order(predecessors: &[Vec<usize>], successors: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(predecessors.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        for &succ in &successors[idx] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.push(Reverse(succ));
            }
        }
    }
    order
}

/// A dependency graph known to be acyclic with every reference resolved.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    activities: Vec<DependentActivity>,
    index: FxHashMap<ActivityId, usize>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
    topological_order: Vec<usize>,
    warnings: GraphCompilationErrors,
}

impl ValidatedGraph {
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Activities sorted by id.
    pub fn activities(&self) -> &[DependentActivity] {
        &self.activities
    }

    pub(crate) fn activities_mut(&mut self) -> &mut [DependentActivity] {
        &mut self.activities
    }

    pub fn index_of(&self, id: ActivityId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn predecessors(&self, idx: usize) -> &[usize] {
        &self.predecessors[idx]
    }

    pub fn successors(&self, idx: usize) -> &[usize] {
        &self.successors[idx]
    }

    /// Arena indices with every activity after all of its predecessors.
    pub fn topological_order(&self) -> &[usize] {
        &self.topological_order
    }

    /// Non-fatal findings (the explicit-target inconsistency).
    pub fn warnings(&self) -> &GraphCompilationErrors {
        &self.warnings
    }

    /// Number of resolved precedence edges.
    pub fn edge_count(&self) -> usize {
        self.predecessors.iter().map(Vec::len).sum()
    }

    /// Whether this activity is barred from resource auto-assignment.
    pub fn is_excluded_from_auto_assignment(&self, id: ActivityId) -> bool {
        self.warnings.explicit_target_inconsistency
            && self.warnings.untargeted_activities.binary_search(&id).is_ok()
    }

    /// Predecessor lists with redundant (transitively implied) edges removed.
    ///
    /// Reachability is unchanged: `p` is dropped from `a`'s list only if it is
    /// already an ancestor of another predecessor of `a`.
    pub fn reduced_predecessors(&self) -> Vec<Vec<usize>> {
        let n = self.activities.len();
        let mut ancestors: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); n];
        for &idx in &self.topological_order {
            let mut set = FxHashSet::default();
            for &pred in &self.predecessors[idx] {
                set.insert(pred);
                set.extend(ancestors[pred].iter().copied());
            }
            ancestors[idx] = set;
        }

        (0..n)
            .map(|idx| {
                let preds = &self.predecessors[idx];
                preds
                    .iter()
                    .copied()
                    .filter(|&p| !preds.iter().any(|&q| q != p && ancestors[q].contains(&p)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, AllocationMode};

    fn make_activity(id: ActivityId, duration: i64, deps: &[ActivityId]) -> DependentActivity {
        DependentActivity {
            activity: Activity {
                id,
                name: format!("a{}", id),
                duration,
                ..Default::default()
            },
            dependencies: deps.iter().copied().collect(),
            resource_dependencies: BTreeSet::new(),
        }
    }

    fn make_resource(id: ResourceId, explicit: bool) -> Resource {
        Resource {
            id,
            name: format!("r{}", id),
            is_explicit_target: explicit,
            allocation: AllocationMode::Direct,
            ..Default::default()
        }
    }

    fn validate(
        activities: Vec<DependentActivity>,
    ) -> Result<ValidatedGraph, GraphCompilationErrors> {
        DependencyGraph::new(activities).unwrap().validate(&[])
    }

    #[test]
    fn test_valid_diamond() {
        let graph = validate(vec![
            make_activity(1, 3, &[]),
            make_activity(2, 2, &[1]),
            make_activity(3, 4, &[1]),
            make_activity(4, 1, &[2, 3]),
        ])
        .unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.topological_order(), &[0, 1, 2, 3]);
        assert_eq!(graph.successors(0), &[1, 2]);
        assert!(graph.warnings().is_empty());
    }

    #[test]
    fn test_three_cycle_reported_once_in_order() {
        // 1 -> 2 -> 3 -> 1
        let errors = validate(vec![
            make_activity(1, 1, &[3]),
            make_activity(2, 1, &[1]),
            make_activity(3, 1, &[2]),
        ])
        .unwrap_err();

        assert_eq!(errors.circular_dependencies, vec![vec![1, 2, 3]]);
        assert!(errors.missing_dependencies.is_empty());
        assert!(errors.is_fatal());
    }

    #[test]
    fn test_independent_cycles_all_reported() {
        let errors = validate(vec![
            make_activity(1, 1, &[2]),
            make_activity(2, 1, &[1]),
            make_activity(3, 1, &[]),
            make_activity(4, 1, &[5, 3]),
            make_activity(5, 1, &[4]),
        ])
        .unwrap_err();

        assert_eq!(errors.circular_dependencies.len(), 2);
        assert!(errors.circular_dependencies.contains(&vec![1, 2]));
        assert!(errors.circular_dependencies.contains(&vec![4, 5]));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let errors = validate(vec![make_activity(7, 1, &[7])]).unwrap_err();
        assert_eq!(errors.circular_dependencies, vec![vec![7]]);
    }

    #[test]
    fn test_missing_dependency_collected() {
        let errors = validate(vec![
            make_activity(1, 1, &[]),
            make_activity(2, 1, &[99, 1]),
            make_activity(3, 1, &[99]),
        ])
        .unwrap_err();

        assert_eq!(errors.missing_dependencies, vec![99]);
        assert!(errors.circular_dependencies.is_empty());
    }

    #[test]
    fn test_missing_resource_dependency_collected() {
        let mut activity = make_activity(2, 1, &[1]);
        activity.resource_dependencies.insert(42);
        let errors = validate(vec![make_activity(1, 1, &[]), activity]).unwrap_err();
        assert_eq!(errors.missing_dependencies, vec![42]);
    }

    #[test]
    fn test_resource_dependencies_become_edges() {
        let mut activity = make_activity(2, 1, &[]);
        activity.resource_dependencies.insert(1);
        let graph = validate(vec![make_activity(1, 1, &[]), activity]).unwrap();
        assert_eq!(graph.predecessors(1), &[0]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = DependencyGraph::new(vec![make_activity(1, 1, &[]), make_activity(1, 2, &[])]);
        assert_eq!(result.unwrap_err(), ArgumentError::DuplicateActivityId(1));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = DependencyGraph::new(vec![make_activity(3, -1, &[])]);
        assert_eq!(
            result.unwrap_err(),
            ArgumentError::NegativeDuration { id: 3, duration: -1 }
        );
    }

    #[test]
    fn test_explicit_target_inconsistency_is_not_fatal() {
        let mut targeted = make_activity(1, 1, &[]);
        targeted.activity.target_resources.insert(10);
        let graph = DependencyGraph::new(vec![targeted, make_activity(2, 1, &[1])])
            .unwrap()
            .validate(&[make_resource(10, true)])
            .unwrap();

        assert!(graph.warnings().explicit_target_inconsistency);
        assert_eq!(graph.warnings().untargeted_activities, vec![2]);
        assert!(graph.is_excluded_from_auto_assignment(2));
        assert!(!graph.is_excluded_from_auto_assignment(1));
    }

    #[test]
    fn test_mixed_resources_no_inconsistency() {
        let graph = DependencyGraph::new(vec![make_activity(1, 1, &[])])
            .unwrap()
            .validate(&[make_resource(10, true), make_resource(11, false)])
            .unwrap();
        assert!(!graph.warnings().explicit_target_inconsistency);
    }

    #[test]
    fn test_transitive_reduction_drops_implied_edge() {
        // 3 depends on 1 and 2, 2 depends on 1: edge 1->3 is implied
        let graph = validate(vec![
            make_activity(1, 1, &[]),
            make_activity(2, 1, &[1]),
            make_activity(3, 1, &[1, 2]),
        ])
        .unwrap();

        let reduced = graph.reduced_predecessors();
        assert_eq!(reduced[2], vec![1]);
        assert_eq!(reduced[1], vec![0]);
        assert!(reduced[0].is_empty());
    }

    #[test]
    fn test_topological_order_is_id_stable() {
        let graph = validate(vec![
            make_activity(5, 1, &[]),
            make_activity(2, 1, &[5]),
            make_activity(9, 1, &[]),
        ])
        .unwrap();
        let ids: Vec<ActivityId> = graph
            .topological_order()
            .iter()
            .map(|&idx| graph.activities()[idx].activity.id)
            .collect();
        // 2 becomes ready after 5 and sorts before 9
        assert_eq!(ids, vec![5, 2, 9]);
    }
}
