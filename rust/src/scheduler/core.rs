//! Resource allocation over the compiled activity graph.
//!
//! Serial schedule generation: activities become eligible once every
//! predecessor is placed, and eligible activities are placed in
//! (earliest start, id) order. A placement never starts before the
//! activity's graph-theoretic earliest start, before any predecessor's
//! actual finish, or (Direct resources) before the resource's previously
//! committed activity has finished.

use pyo3::prelude::*;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use crate::critical_path::CompiledActivities;
use crate::models::{
    ActivityId, AllocationMode, LogicalOperator, Resource, ResourceId, ResourceSchedule,
    ScheduledActivity,
};
use crate::{log_decision, log_stage};

use super::timeline::Timeline;

/// Why an activity could not be placed as requested.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// ALL-combinator resources are not free together before the latest start.
    SimultaneousRequirement,
    /// A named target resource does not exist.
    UnknownResource,
    /// No named target resource exists at all.
    NoEligibleResource,
}

/// A scheduling conflict reported alongside the best-effort schedule.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulingConflict {
    #[pyo3(get)]
    pub activity_id: ActivityId,
    #[pyo3(get)]
    pub kind: ConflictKind,
    /// Resources involved in the conflict.
    #[pyo3(get)]
    pub resources: Vec<ResourceId>,
}

#[pymethods]
impl SchedulingConflict {
    fn __repr__(&self) -> String {
        format!(
            "SchedulingConflict(activity_id={}, kind={:?}, resources={:?})",
            self.activity_id, self.kind, self.resources
        )
    }
}

/// Where and when one activity was placed.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityAllocation {
    #[pyo3(get)]
    pub activity_id: ActivityId,
    #[pyo3(get)]
    pub start_time: i64,
    #[pyo3(get)]
    pub finish_time: i64,
    /// Scheduled start minus graph-theoretic earliest start.
    #[pyo3(get)]
    pub delay: i64,
    /// Resources hosting the activity, sorted by id.
    #[pyo3(get)]
    pub resources: Vec<ResourceId>,
    /// Activities ahead of this one on a shared Direct resource that are not
    /// already logical predecessors.
    #[pyo3(get)]
    pub resource_dependencies: Vec<ActivityId>,
    #[pyo3(get)]
    pub is_conflicted: bool,
}

#[pymethods]
impl ActivityAllocation {
    fn __repr__(&self) -> String {
        format!(
            "ActivityAllocation(activity_id={}, start={}, finish={}, resources={:?})",
            self.activity_id, self.start_time, self.finish_time, self.resources
        )
    }
}

/// Output of the resource scheduler.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceAllocation {
    /// One schedule per resource, ordered by display order then id.
    #[pyo3(get)]
    pub schedules: Vec<ResourceSchedule>,
    /// One entry per activity, ordered by id.
    #[pyo3(get)]
    pub activities: Vec<ActivityAllocation>,
    /// Conflicts in the order they were detected.
    #[pyo3(get)]
    pub conflicts: Vec<SchedulingConflict>,
    /// Latest scheduled finish across all activities.
    #[pyo3(get)]
    pub finish_time: i64,
}

/// Mutable per-resource bookkeeping during allocation.
struct ResourceState {
    resource: Resource,
    timeline: Timeline,
    entries: Vec<ScheduledActivity>,
    /// Latest finish of anything committed so far.
    committed_until: i64,
    last_activity: Option<ActivityId>,
}

impl ResourceState {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            timeline: Timeline::new(),
            entries: Vec::new(),
            committed_until: 0,
            last_activity: None,
        }
    }

    fn is_direct(&self) -> bool {
        self.resource.allocation == AllocationMode::Direct
    }

    /// Earliest start on this resource for an activity ready at `ready`.
    fn available_from(&self, ready: i64) -> i64 {
        match self.resource.allocation {
            AllocationMode::Direct => ready.max(self.committed_until),
            AllocationMode::Indirect => ready,
        }
    }

    /// Ordering key for choosing among candidates: finish time, display order, id.
    fn choice_key(&self) -> (i64, i32, ResourceId) {
        (self.committed_until, self.resource.display_order, self.resource.id)
    }
}

/// A decided placement before it is committed.
struct Placement {
    start: i64,
    resources: Vec<usize>,
    conflicted: bool,
}

/// Assigns compiled activities to resources over time.
pub struct ResourceScheduler<'a> {
    compiled: &'a CompiledActivities,
    default_unit_cost: f64,
    verbosity: u8,
}

impl<'a> ResourceScheduler<'a> {
    pub fn new(compiled: &'a CompiledActivities, default_unit_cost: f64, verbosity: u8) -> Self {
        Self {
            compiled,
            default_unit_cost,
            verbosity,
        }
    }

    /// Allocate every activity. Deterministic for identical input.
    pub fn allocate(&self, resources: &[Resource]) -> ResourceAllocation {
        let graph = self.compiled.graph();
        let timings = self.compiled.timings();
        let n = graph.len();

        let mut ordered: Vec<Resource> = resources.to_vec();
        ordered.sort_by_key(|r| (r.display_order, r.id));
        let mut states: Vec<ResourceState> = ordered.into_iter().map(ResourceState::new).collect();
        let lookup: FxHashMap<ResourceId, usize> = states
            .iter()
            .enumerate()
            .map(|(idx, state)| (state.resource.id, idx))
            .collect();

        let mut remaining_preds: Vec<usize> =
            (0..n).map(|idx| graph.predecessors(idx).len()).collect();
        let mut ready: BinaryHeap<Reverse<(i64, ActivityId, usize)>> = (0..n)
            .filter(|&idx| remaining_preds[idx] == 0)
            .map(|idx| {
                Reverse((
                    timings[idx].earliest_start,
                    graph.activities()[idx].activity.id,
                    idx,
                ))
            })
            .collect();

        let mut actual_finish = vec![0i64; n];
        let mut allocations: Vec<Option<ActivityAllocation>> = vec![None; n];
        let mut conflicts: Vec<SchedulingConflict> = Vec::new();

        while let Some(Reverse((earliest_start, activity_id, idx))) = ready.pop() {
            let activity = &graph.activities()[idx].activity;
            let conflicts_before = conflicts.len();
            let ready_time = graph
                .predecessors(idx)
                .iter()
                .map(|&p| actual_finish[p])
                .max()
                .unwrap_or(0)
                .max(earliest_start);

            let placement = if activity.has_explicit_targets() {
                let mut resolved = Vec::with_capacity(activity.target_resources.len());
                for resource_id in &activity.target_resources {
                    match lookup.get(resource_id) {
                        Some(&state_idx) => resolved.push(state_idx),
                        None => conflicts.push(SchedulingConflict {
                            activity_id,
                            kind: ConflictKind::UnknownResource,
                            resources: vec![*resource_id],
                        }),
                    }
                }

                if resolved.is_empty() {
                    conflicts.push(SchedulingConflict {
                        activity_id,
                        kind: ConflictKind::NoEligibleResource,
                        resources: activity.target_resources.iter().copied().collect(),
                    });
                    Placement {
                        start: ready_time,
                        resources: Vec::new(),
                        conflicted: true,
                    }
                } else {
                    match activity.target_resource_operator {
                        LogicalOperator::All => {
                            self.place_all(idx, ready_time, resolved, &states, &mut conflicts)
                        }
                        LogicalOperator::Any => Self::place_any(ready_time, &resolved, &states),
                    }
                }
            } else if graph.is_excluded_from_auto_assignment(activity_id) {
                log_decision!(
                    self.verbosity,
                    "activity {} has no target and every resource is explicit; left unassigned",
                    activity_id
                );
                Placement {
                    start: ready_time,
                    resources: Vec::new(),
                    conflicted: false,
                }
            } else {
                Self::place_auto(ready_time, &states)
            };

            let duration = activity.duration;
            let start = placement.start;
            let finish = start + duration;
            let logical_preds = &graph.activities()[idx].dependencies;
            let mut resource_dependencies: BTreeSet<ActivityId> = BTreeSet::new();

            for &state_idx in &placement.resources {
                let state = &mut states[state_idx];
                if state.is_direct() {
                    if let Some(previous) = state.last_activity {
                        if !logical_preds.contains(&previous) {
                            resource_dependencies.insert(previous);
                        }
                    }
                    state.last_activity = Some(activity_id);
                }
                state.timeline.occupy(start, finish);
                state.committed_until = state.committed_until.max(finish);
                state.entries.push(ScheduledActivity {
                    id: activity_id,
                    name: activity.name.clone(),
                    duration,
                    start_time: start,
                    finish_time: finish,
                });
            }

            let mut hosted: Vec<ResourceId> = placement
                .resources
                .iter()
                .map(|&state_idx| states[state_idx].resource.id)
                .collect();
            hosted.sort_unstable();

            if start > earliest_start {
                log_decision!(
                    self.verbosity,
                    "activity {} delayed from {} to {} on {:?}",
                    activity_id,
                    earliest_start,
                    start,
                    hosted
                );
            } else {
                log_decision!(
                    self.verbosity,
                    "activity {} placed at {} on {:?}",
                    activity_id,
                    start,
                    hosted
                );
            }

            actual_finish[idx] = finish;
            allocations[idx] = Some(ActivityAllocation {
                activity_id,
                start_time: start,
                finish_time: finish,
                delay: start - timings[idx].earliest_start,
                resources: hosted,
                resource_dependencies: resource_dependencies.into_iter().collect(),
                is_conflicted: placement.conflicted || conflicts.len() > conflicts_before,
            });

            for &succ in graph.successors(idx) {
                remaining_preds[succ] -= 1;
                if remaining_preds[succ] == 0 {
                    ready.push(Reverse((
                        timings[succ].earliest_start,
                        graph.activities()[succ].activity.id,
                        succ,
                    )));
                }
            }
        }

        let activities: Vec<ActivityAllocation> = allocations.into_iter().flatten().collect();
        let finish_time = activities.iter().map(|a| a.finish_time).max().unwrap_or(0);

        let schedules: Vec<ResourceSchedule> = states
            .into_iter()
            .map(|state| {
                let mut entries = state.entries;
                entries.sort_by_key(|e| (e.start_time, e.id));
                let effective_unit_cost =
                    state.resource.unit_cost.unwrap_or(self.default_unit_cost);
                ResourceSchedule {
                    finish_time: entries.iter().map(|e| e.finish_time).max().unwrap_or(0),
                    busy_periods: state.timeline.busy_periods().to_vec(),
                    resource: state.resource,
                    scheduled_activities: entries,
                    effective_unit_cost,
                }
            })
            .collect();

        log_stage!(
            self.verbosity,
            "resource scheduling: {} resources, {} activities, {} conflicts, finish {}",
            schedules.len(),
            activities.len(),
            conflicts.len(),
            finish_time
        );

        ResourceAllocation {
            schedules,
            activities,
            conflicts,
            finish_time,
        }
    }

    /// ALL: occupy every named resource over the same span.
    ///
    /// Waiting for busy resources is an ordinary delay. The requirement only
    /// becomes a conflict when it spans two or more Direct resources and
    /// their common start lies past the activity's latest start. A conflicted
    /// activity keeps its graph-theoretic earliest start and is hosted only by
    /// the Indirect resources among its targets.
    fn place_all(
        &self,
        idx: usize,
        ready_time: i64,
        resolved: Vec<usize>,
        states: &[ResourceState],
        conflicts: &mut Vec<SchedulingConflict>,
    ) -> Placement {
        let activity_id = self.compiled.activities()[idx].activity.id;
        let timing = &self.compiled.timings()[idx];
        let common_start = resolved
            .iter()
            .map(|&state_idx| states[state_idx].available_from(ready_time))
            .max()
            .unwrap_or(ready_time);
        let direct_targets = resolved
            .iter()
            .filter(|&&state_idx| states[state_idx].is_direct())
            .count();

        if direct_targets >= 2
            && common_start > ready_time
            && common_start > timing.latest_start
        {
            let blocking: Vec<ResourceId> = resolved
                .iter()
                .filter(|&&state_idx| states[state_idx].available_from(ready_time) > ready_time)
                .map(|&state_idx| states[state_idx].resource.id)
                .collect();
            log_decision!(
                self.verbosity,
                "activity {} needs {:?} together at {} but latest start is {}; conflicted",
                activity_id,
                blocking,
                common_start,
                timing.latest_start
            );
            conflicts.push(SchedulingConflict {
                activity_id,
                kind: ConflictKind::SimultaneousRequirement,
                resources: blocking,
            });
            return Placement {
                start: timing.earliest_start,
                resources: resolved
                    .into_iter()
                    .filter(|&state_idx| !states[state_idx].is_direct())
                    .collect(),
                conflicted: true,
            };
        }

        Placement {
            start: common_start,
            resources: resolved,
            conflicted: false,
        }
    }

    /// ANY: the named resource with the lowest finish time (then display order, id).
    fn place_any(ready_time: i64, resolved: &[usize], states: &[ResourceState]) -> Placement {
        match resolved.iter().copied().min_by_key(|&state_idx| states[state_idx].choice_key()) {
            Some(state_idx) => Placement {
                start: states[state_idx].available_from(ready_time),
                resources: vec![state_idx],
                conflicted: false,
            },
            None => Placement {
                start: ready_time,
                resources: Vec::new(),
                conflicted: false,
            },
        }
    }

    /// No explicit target: one non-explicit Direct resource (lowest finish
    /// time), plus every non-explicit Indirect pool.
    fn place_auto(ready_time: i64, states: &[ResourceState]) -> Placement {
        let direct = states
            .iter()
            .enumerate()
            .filter(|(_, state)| !state.resource.is_explicit_target && state.is_direct())
            .min_by_key(|(_, state)| state.choice_key())
            .map(|(state_idx, _)| state_idx);

        let start = direct
            .map(|state_idx| states[state_idx].available_from(ready_time))
            .unwrap_or(ready_time);

        let mut resources: Vec<usize> = direct.into_iter().collect();
        resources.extend(
            states
                .iter()
                .enumerate()
                .filter(|(_, state)| !state.resource.is_explicit_target && !state.is_direct())
                .map(|(state_idx, _)| state_idx),
        );

        Placement {
            start,
            resources,
            conflicted: false,
        }
    }
}
