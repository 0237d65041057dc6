//! Core data types for activity planning.
//!
//! These are the records a host application hands to the engine as whole
//! snapshots. Identity fields are never touched by the engine; the computed
//! fields start unset and are filled in by the compile pipeline.

use chrono::NaiveDate;
use pyo3::prelude::*;
use std::collections::BTreeSet;

/// Activity identifier.
pub type ActivityId = u32;
/// Resource identifier.
pub type ResourceId = u32;

/// How an activity combines its explicit resource targets.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    /// Occupy every named resource simultaneously.
    #[default]
    All,
    /// Occupy exactly one of the named resources.
    Any,
}

/// How a resource is shared between concurrently running activities.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AllocationMode {
    /// One activity at a time, exclusively.
    #[default]
    Direct,
    /// Shared pool; activities may overlap.
    Indirect,
}

/// A unit of work with a duration and optional resource targets.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Activity {
    #[pyo3(get, set)]
    pub id: ActivityId,
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub duration: i64,
    #[pyo3(get, set)]
    pub target_resources: BTreeSet<ResourceId>,
    #[pyo3(get, set)]
    pub target_resource_operator: LogicalOperator,
    #[pyo3(get, set)]
    pub can_be_removed: bool,
    /// Activity may not start before this many units after project start.
    #[pyo3(get, set)]
    pub minimum_earliest_start_time: Option<i64>,
    /// Same constraint expressed as a date; converted through the calendar.
    #[pyo3(get, set)]
    pub minimum_earliest_start_date: Option<NaiveDate>,

    // Computed
    #[pyo3(get)]
    pub earliest_start_time: Option<i64>,
    #[pyo3(get)]
    pub latest_finish_time: Option<i64>,
    #[pyo3(get)]
    pub free_slack: Option<i64>,
    #[pyo3(get)]
    pub earliest_start_date: Option<NaiveDate>,
    #[pyo3(get)]
    pub latest_finish_date: Option<NaiveDate>,
}

#[pymethods]
impl Activity {
    #[new]
    #[pyo3(signature = (
        id,
        name,
        duration,
        target_resources=BTreeSet::new(),
        target_resource_operator=LogicalOperator::All,
        can_be_removed=false,
        minimum_earliest_start_time=None,
        minimum_earliest_start_date=None
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ActivityId,
        name: String,
        duration: i64,
        target_resources: BTreeSet<ResourceId>,
        target_resource_operator: LogicalOperator,
        can_be_removed: bool,
        minimum_earliest_start_time: Option<i64>,
        minimum_earliest_start_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            name,
            duration,
            target_resources,
            target_resource_operator,
            can_be_removed,
            minimum_earliest_start_time,
            minimum_earliest_start_date,
            ..Default::default()
        }
    }

    /// Earliest finish (earliest start + duration), once compiled.
    #[getter]
    pub fn earliest_finish_time(&self) -> Option<i64> {
        self.earliest_start_time.map(|start| start + self.duration)
    }

    /// Latest start (latest finish - duration), once compiled.
    #[getter]
    pub fn latest_start_time(&self) -> Option<i64> {
        self.latest_finish_time.map(|finish| finish - self.duration)
    }

    /// Total slack (latest finish - earliest finish), once compiled.
    #[getter]
    pub fn total_slack(&self) -> Option<i64> {
        match (self.latest_finish_time, self.earliest_finish_time()) {
            (Some(lf), Some(ef)) => Some(lf - ef),
            _ => None,
        }
    }

    /// On the critical path: free slack is zero.
    #[getter]
    pub fn is_critical(&self) -> bool {
        self.free_slack == Some(0)
    }

    fn __repr__(&self) -> String {
        format!(
            "Activity(id={}, name={:?}, duration={}, es={:?}, lf={:?}, free_slack={:?})",
            self.id,
            self.name,
            self.duration,
            self.earliest_start_time,
            self.latest_finish_time,
            self.free_slack
        )
    }
}

impl Activity {
    /// Clear every computed field.
    pub fn reset_computed(&mut self) {
        self.earliest_start_time = None;
        self.latest_finish_time = None;
        self.free_slack = None;
        self.earliest_start_date = None;
        self.latest_finish_date = None;
    }

    pub fn has_explicit_targets(&self) -> bool {
        !self.target_resources.is_empty()
    }
}

/// An activity plus the ids of the activities it depends on.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependentActivity {
    #[pyo3(get, set)]
    pub activity: Activity,
    /// Logical predecessors.
    #[pyo3(get, set)]
    pub dependencies: BTreeSet<ActivityId>,
    /// Ordering constraints implied by shared resource usage.
    #[pyo3(get, set)]
    pub resource_dependencies: BTreeSet<ActivityId>,
}

#[pymethods]
impl DependentActivity {
    #[new]
    #[pyo3(signature = (
        activity,
        dependencies=BTreeSet::new(),
        resource_dependencies=BTreeSet::new()
    ))]
    pub fn new(
        activity: Activity,
        dependencies: BTreeSet<ActivityId>,
        resource_dependencies: BTreeSet<ActivityId>,
    ) -> Self {
        Self {
            activity,
            dependencies,
            resource_dependencies,
        }
    }

    #[getter]
    pub fn id(&self) -> ActivityId {
        self.activity.id
    }

    fn __repr__(&self) -> String {
        format!(
            "DependentActivity(id={}, deps={:?}, resource_deps={:?})",
            self.activity.id, self.dependencies, self.resource_dependencies
        )
    }
}

impl DependentActivity {
    /// Every predecessor id: logical and resource-ordering dependencies.
    pub fn all_dependencies(&self) -> impl Iterator<Item = ActivityId> + '_ {
        self.dependencies
            .union(&self.resource_dependencies)
            .copied()
    }
}

/// Something that performs activities and may cost money.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    #[pyo3(get, set)]
    pub id: ResourceId,
    #[pyo3(get, set)]
    pub name: String,
    /// Must be named on an activity; never receives auto-assigned work.
    #[pyo3(get, set)]
    pub is_explicit_target: bool,
    #[pyo3(get, set)]
    pub allocation: AllocationMode,
    /// Cost per time unit; `None` falls back to the configured default.
    #[pyo3(get, set)]
    pub unit_cost: Option<f64>,
    #[pyo3(get, set)]
    pub display_order: i32,
    #[pyo3(get, set)]
    pub color: String,
}

#[pymethods]
impl Resource {
    #[new]
    #[pyo3(signature = (
        id,
        name,
        is_explicit_target=false,
        allocation=AllocationMode::Direct,
        unit_cost=None,
        display_order=0,
        color=String::new()
    ))]
    pub fn new(
        id: ResourceId,
        name: String,
        is_explicit_target: bool,
        allocation: AllocationMode,
        unit_cost: Option<f64>,
        display_order: i32,
        color: String,
    ) -> Self {
        Self {
            id,
            name,
            is_explicit_target,
            allocation,
            unit_cost,
            display_order,
            color,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Resource(id={}, name={:?}, allocation={:?}, explicit={})",
            self.id, self.name, self.allocation, self.is_explicit_target
        )
    }
}

/// One rung of the severity ladder.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivitySeverity {
    #[pyo3(get, set)]
    pub slack_limit: i64,
    #[pyo3(get, set)]
    pub criticality_weight: f64,
    #[pyo3(get, set)]
    pub severity_weight: f64,
    #[pyo3(get, set)]
    pub color: String,
}

#[pymethods]
impl ActivitySeverity {
    #[new]
    #[pyo3(signature = (slack_limit, criticality_weight, severity_weight, color=String::new()))]
    pub fn new(
        slack_limit: i64,
        criticality_weight: f64,
        severity_weight: f64,
        color: String,
    ) -> Self {
        Self {
            slack_limit,
            criticality_weight,
            severity_weight,
            color,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "ActivitySeverity(slack_limit={}, criticality={}, severity={})",
            self.slack_limit, self.criticality_weight, self.severity_weight
        )
    }
}

/// Ladder used when the caller supplies none: red / orange / yellow tiers.
pub fn default_severity_ladder() -> Vec<ActivitySeverity> {
    vec![
        ActivitySeverity::new(0, 4.0, 8.0, "#FF0000".to_string()),
        ActivitySeverity::new(9, 2.0, 5.0, "#FFA500".to_string()),
        ActivitySeverity::new(25, 1.0, 3.0, "#FFFF00".to_string()),
    ]
}

/// An activity placed on a resource.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledActivity {
    #[pyo3(get)]
    pub id: ActivityId,
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub duration: i64,
    #[pyo3(get)]
    pub start_time: i64,
    #[pyo3(get)]
    pub finish_time: i64,
}

#[pymethods]
impl ScheduledActivity {
    fn __repr__(&self) -> String {
        format!(
            "ScheduledActivity(id={}, start={}, finish={})",
            self.id, self.start_time, self.finish_time
        )
    }
}

/// A resource with the activities it hosts, ordered by start time.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSchedule {
    #[pyo3(get)]
    pub resource: Resource,
    #[pyo3(get)]
    pub scheduled_activities: Vec<ScheduledActivity>,
    /// Merged occupied spans, sorted and non-overlapping.
    #[pyo3(get)]
    pub busy_periods: Vec<(i64, i64)>,
    #[pyo3(get)]
    pub finish_time: i64,
    /// Resource unit cost, or the configured default when the resource has none.
    #[pyo3(get)]
    pub effective_unit_cost: f64,
}

#[pymethods]
impl ResourceSchedule {
    /// Total duration of hosted activities.
    #[getter]
    pub fn scheduled_duration(&self) -> i64 {
        self.scheduled_activities.iter().map(|a| a.duration).sum()
    }

    fn __repr__(&self) -> String {
        format!(
            "ResourceSchedule(resource={}, activities={}, finish={})",
            self.resource.id,
            self.scheduled_activities.len(),
            self.finish_time
        )
    }
}
