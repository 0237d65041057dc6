//! Critical path calculation using forward and backward passes.

use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::Calendar;
use crate::graph::ValidatedGraph;
use crate::models::{ActivityId, DependentActivity};
use crate::{log_stage, log_trace};

/// Internal invariant violations. These indicate a defect upstream and abort
/// the request; they are never clamped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalPathError {
    #[error("Activity {activity_id} has negative free slack {free_slack}")]
    NegativeFreeSlack { activity_id: ActivityId, free_slack: i64 },
    #[error("Topological order covers {ordered} of {total} activities; graph is not acyclic")]
    IncompleteOrder { ordered: usize, total: usize },
}

/// Per-activity timing from the forward and backward passes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivityTiming {
    pub earliest_start: i64,
    pub earliest_finish: i64,
    pub latest_start: i64,
    pub latest_finish: i64,
    /// Delay possible without moving any successor's earliest start.
    pub free_slack: i64,
    /// Delay possible without moving the project finish.
    pub total_slack: i64,
}

impl ActivityTiming {
    pub fn is_critical(&self) -> bool {
        self.free_slack == 0
    }
}

/// A validated graph with every activity's timing filled in.
#[derive(Debug, Clone)]
pub struct CompiledActivities {
    graph: ValidatedGraph,
    timings: Vec<ActivityTiming>,
    project_duration: i64,
}

impl CompiledActivities {
    pub fn graph(&self) -> &ValidatedGraph {
        &self.graph
    }

    /// Activities sorted by id, computed fields populated.
    pub fn activities(&self) -> &[DependentActivity] {
        self.graph.activities()
    }

    /// Timings indexed like `activities()`.
    pub fn timings(&self) -> &[ActivityTiming] {
        &self.timings
    }

    pub fn timing_of(&self, id: ActivityId) -> Option<&ActivityTiming> {
        self.graph.index_of(id).map(|idx| &self.timings[idx])
    }

    pub fn project_duration(&self) -> i64 {
        self.project_duration
    }

    /// Ids of activities with zero free slack, in topological order.
    pub fn critical_path(&self) -> Vec<ActivityId> {
        self.graph
            .topological_order()
            .iter()
            .filter(|&&idx| self.timings[idx].is_critical())
            .map(|&idx| self.graph.activities()[idx].activity.id)
            .collect()
    }

    pub fn into_activities(self) -> Vec<DependentActivity> {
        self.graph.activities().to_vec()
    }
}

/// Forward/backward pass over a validated graph.
pub struct CriticalPathCalculator<'a> {
    calendar: &'a dyn Calendar,
    project_start: Option<NaiveDate>,
    verbosity: u8,
}

impl<'a> CriticalPathCalculator<'a> {
    pub fn new(
        calendar: &'a dyn Calendar,
        project_start: Option<NaiveDate>,
        verbosity: u8,
    ) -> Self {
        Self {
            calendar,
            project_start,
            verbosity,
        }
    }

    /// Earliest time an activity may start regardless of its predecessors.
    fn start_constraint(&self, dependent: &DependentActivity) -> i64 {
        let activity = &dependent.activity;
        let from_time = activity.minimum_earliest_start_time.unwrap_or(0);
        let from_date = match (activity.minimum_earliest_start_date, self.project_start) {
            (Some(date), Some(start)) => self.calendar.units_between(start, date),
            (Some(_), None) => {
                log_trace!(
                    self.verbosity,
                    "activity {} has a minimum start date but no project start; ignored",
                    activity.id
                );
                0
            }
            _ => 0,
        };
        from_time.max(from_date).max(0)
    }

    /// Compute earliest/latest times and slack for every activity.
    pub fn compute(
        &self,
        mut graph: ValidatedGraph,
    ) -> Result<CompiledActivities, CriticalPathError> {
        let n = graph.len();
        let order = graph.topological_order().to_vec();
        if order.len() != n {
            return Err(CriticalPathError::IncompleteOrder {
                ordered: order.len(),
                total: n,
            });
        }

        let mut timings = vec![ActivityTiming::default(); n];

        // Forward pass
        for &idx in &order {
            let dependent = &graph.activities()[idx];
            let ready = graph
                .predecessors(idx)
                .iter()
                .map(|&p| timings[p].earliest_finish)
                .max()
                .unwrap_or(0);
            let start = ready.max(self.start_constraint(dependent));
            timings[idx].earliest_start = start;
            timings[idx].earliest_finish = start + dependent.activity.duration;
        }

        let project_duration = timings.iter().map(|t| t.earliest_finish).max().unwrap_or(0);

        // Backward pass
        for &idx in order.iter().rev() {
            let duration = graph.activities()[idx].activity.duration;
            let latest_finish = graph
                .successors(idx)
                .iter()
                .map(|&s| timings[s].latest_start)
                .min()
                .unwrap_or(project_duration);
            timings[idx].latest_finish = latest_finish;
            timings[idx].latest_start = latest_finish - duration;
        }

        for idx in 0..n {
            let timing = &timings[idx];
            let free_slack = match graph
                .successors(idx)
                .iter()
                .map(|&s| timings[s].earliest_start)
                .min()
            {
                Some(next_start) => next_start - timing.earliest_finish,
                None => timing.latest_finish - timing.earliest_finish,
            };
            if free_slack < 0 {
                return Err(CriticalPathError::NegativeFreeSlack {
                    activity_id: graph.activities()[idx].activity.id,
                    free_slack,
                });
            }
            let total_slack = timing.latest_finish - timing.earliest_finish;
            timings[idx].free_slack = free_slack;
            timings[idx].total_slack = total_slack;
        }

        for (dependent, timing) in graph.activities_mut().iter_mut().zip(&timings) {
            let activity = &mut dependent.activity;
            activity.earliest_start_time = Some(timing.earliest_start);
            activity.latest_finish_time = Some(timing.latest_finish);
            activity.free_slack = Some(timing.free_slack);
            if let Some(start) = self.project_start {
                activity.earliest_start_date =
                    Some(self.calendar.add_units(start, timing.earliest_start));
                activity.latest_finish_date =
                    Some(self.calendar.add_units(start, timing.latest_finish));
            }
            log_trace!(
                self.verbosity,
                "activity {}: es={} ef={} ls={} lf={} free_slack={}",
                activity.id,
                timing.earliest_start,
                timing.earliest_finish,
                timing.latest_start,
                timing.latest_finish,
                timing.free_slack
            );
        }

        log_stage!(
            self.verbosity,
            "critical path: {} activities, project duration {}",
            n,
            project_duration
        );

        Ok(CompiledActivities {
            graph,
            timings,
            project_duration,
        })
    }
}
