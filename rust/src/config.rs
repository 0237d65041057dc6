//! Configuration types for the compile pipeline.

use chrono::NaiveDate;
use pyo3::prelude::*;

use crate::calendar::CalendarRule;

/// Configuration for a single compile request.
#[pyclass]
#[derive(Clone, Debug)]
pub struct CompileConfig {
    /// Verbosity level: 0=silent, 1=stages, 2=decisions, 3=trace
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Unit cost applied to resources without their own cost
    #[pyo3(get, set)]
    pub default_unit_cost: f64,
    /// Anchor date for absolute-date reporting (None = no dates)
    #[pyo3(get, set)]
    pub project_start: Option<NaiveDate>,
    /// How time units map onto dates
    #[pyo3(get, set)]
    pub calendar: CalendarRule,
    /// Whether to build the activity-on-arrow diagram
    #[pyo3(get, set)]
    pub build_arrow_graph: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            default_unit_cost: 0.0,
            project_start: None,
            calendar: CalendarRule::CalendarDays,
            build_arrow_graph: true,
        }
    }
}

#[pymethods]
impl CompileConfig {
    #[new]
    #[pyo3(signature = (
        verbosity=None,
        default_unit_cost=None,
        project_start=None,
        calendar=None,
        build_arrow_graph=None
    ))]
    fn new(
        verbosity: Option<u8>,
        default_unit_cost: Option<f64>,
        project_start: Option<NaiveDate>,
        calendar: Option<CalendarRule>,
        build_arrow_graph: Option<bool>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            default_unit_cost: default_unit_cost.unwrap_or(defaults.default_unit_cost),
            project_start,
            calendar: calendar.unwrap_or(defaults.calendar),
            build_arrow_graph: build_arrow_graph.unwrap_or(defaults.build_arrow_graph),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "CompileConfig(verbosity={}, default_unit_cost={}, project_start={:?}, calendar={:?})",
            self.verbosity, self.default_unit_cost, self.project_start, self.calendar
        )
    }
}
