//! Rust implementation of the plangraph compile pipeline.
//!
//! Validates activity dependency graphs, computes the critical path,
//! allocates activities to resources, scores schedule risk and builds
//! activity-on-arrow diagrams for export. `ProjectCompiler` keeps one
//! cancellable compile in flight per project.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

pub mod arrow;
pub mod calendar;
mod config;
pub mod critical_path;
pub mod graph;
pub mod logging;
pub mod metrics;
mod models;
pub mod pipeline;
pub mod scheduler;

pub use arrow::{
    ActivityEdge, ArrowDiagramBuilder, ArrowGraph, DashStyle, DiagramExporter, DummyEdge,
    EdgeDisplay, EdgeId, EventId, EventNode, EventNodeType, WeightStyle,
};
pub use calendar::{Calendar, CalendarRule};
pub use config::CompileConfig;
pub use critical_path::{
    ActivityTiming, CompiledActivities, CriticalPathCalculator, CriticalPathError,
};
pub use graph::{ArgumentError, DependencyGraph, GraphCompilationErrors, ValidatedGraph};
pub use metrics::{ActivityRisk, Costs, Metrics, MetricsEngine};
pub use models::{
    default_severity_ladder, Activity, ActivityId, ActivitySeverity, AllocationMode,
    DependentActivity, LogicalOperator, Resource, ResourceId, ResourceSchedule, ScheduledActivity,
};
pub use pipeline::{
    compile, CancellationToken, CompileOutcome, CompileSlot, CompileTicket, CompiledProject,
    PipelineError,
};
pub use scheduler::{
    ActivityAllocation, ConflictKind, ResourceAllocation, ResourceScheduler, SchedulingConflict,
};

fn to_py_err(err: PipelineError) -> PyErr {
    match err {
        PipelineError::Cancelled => PyRuntimeError::new_err(err.to_string()),
        PipelineError::InvalidArgument(_) | PipelineError::Internal(_) => {
            PyValueError::new_err(err.to_string())
        }
    }
}

/// Result of `compile_project`, flattened for Python consumers.
#[pyclass]
#[derive(Clone, Debug)]
pub struct CompilationReport {
    #[pyo3(get)]
    pub errors: GraphCompilationErrors,
    /// True when validation halted compilation; every output below is empty.
    #[pyo3(get)]
    pub is_stale: bool,
    /// Activities sorted by id with computed fields populated.
    #[pyo3(get)]
    pub activities: Vec<Activity>,
    #[pyo3(get)]
    pub project_duration: Option<i64>,
    #[pyo3(get)]
    pub allocation: Option<ResourceAllocation>,
    #[pyo3(get)]
    pub metrics: Option<Metrics>,
    #[pyo3(get)]
    pub costs: Option<Costs>,
    pub arrow_graph: Option<ArrowGraph>,
}

#[pymethods]
impl CompilationReport {
    #[getter]
    fn has_arrow_graph(&self) -> bool {
        self.arrow_graph.is_some()
    }

    fn __repr__(&self) -> String {
        format!(
            "CompilationReport(stale={}, activities={}, duration={:?})",
            self.is_stale,
            self.activities.len(),
            self.project_duration
        )
    }
}

impl From<CompileOutcome> for CompilationReport {
    fn from(outcome: CompileOutcome) -> Self {
        match outcome.project {
            Some(project) => Self {
                errors: outcome.errors,
                is_stale: false,
                project_duration: Some(project.activities.project_duration()),
                activities: project
                    .activities
                    .into_activities()
                    .into_iter()
                    .map(|dependent| dependent.activity)
                    .collect(),
                allocation: Some(project.allocation),
                metrics: Some(project.metrics),
                costs: Some(project.costs),
                arrow_graph: project.arrow_graph,
            },
            None => Self {
                errors: outcome.errors,
                is_stale: true,
                activities: Vec::new(),
                project_duration: None,
                allocation: None,
                metrics: None,
                costs: None,
                arrow_graph: None,
            },
        }
    }
}

/// Compile a project snapshot.
///
/// # Arguments
/// * `activities` - Activities with their dependencies
/// * `resources` - Resources available for allocation
/// * `severity_ladder` - Risk tiers (default three-tier ladder if omitted or empty)
/// * `config` - Compile configuration (defaults if omitted)
///
/// # Returns
/// * CompilationReport; check `is_stale` before reading the outputs
///
/// # Raises
/// * ValueError on invalid arguments or an internal invariant violation
#[pyfunction]
#[pyo3(signature = (activities, resources, severity_ladder=None, config=None))]
fn compile_project(
    py: Python<'_>,
    activities: Vec<DependentActivity>,
    resources: Vec<Resource>,
    severity_ladder: Option<Vec<ActivitySeverity>>,
    config: Option<CompileConfig>,
) -> PyResult<CompilationReport> {
    let config = config.unwrap_or_default();
    let ladder = severity_ladder.unwrap_or_default();
    let token = CancellationToken::new();

    let outcome = py
        .allow_threads(|| compile(activities, &resources, &ladder, &config, &token))
        .map_err(to_py_err)?;
    Ok(outcome.into())
}

/// Long-lived compiler for one logical project.
///
/// Each `compile` call supersedes the one in flight, and `cancel` can be
/// called from another Python thread while a compile is running.
#[pyclass(frozen)]
#[derive(Debug, Default)]
pub struct ProjectCompiler {
    slot: CompileSlot,
}

#[pymethods]
impl ProjectCompiler {
    #[new]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a project snapshot in this compiler's slot.
    ///
    /// # Returns
    /// * CompilationReport, or None if a newer compile superseded this one
    ///
    /// # Raises
    /// * RuntimeError if the compile was cancelled
    /// * ValueError on invalid arguments or an internal invariant violation
    #[pyo3(signature = (activities, resources, severity_ladder=None, config=None))]
    fn compile(
        &self,
        py: Python<'_>,
        activities: Vec<DependentActivity>,
        resources: Vec<Resource>,
        severity_ladder: Option<Vec<ActivitySeverity>>,
        config: Option<CompileConfig>,
    ) -> PyResult<Option<CompilationReport>> {
        let config = config.unwrap_or_default();
        let ladder = severity_ladder.unwrap_or_default();

        let outcome = py
            .allow_threads(|| self.slot.compile(activities, &resources, &ladder, &config))
            .map_err(to_py_err)?;
        Ok(outcome.map(CompilationReport::from))
    }

    /// Cancel the compile in flight, if any.
    pub fn cancel(&self) {
        self.slot.cancel_current();
    }

    fn __repr__(&self) -> String {
        format!("ProjectCompiler(generation={})", self.slot.generation())
    }
}

/// Serialize the report's arrow diagram as graph markup.
///
/// # Arguments
/// * `report` - A non-stale report compiled with `build_arrow_graph=True`
/// * `edge_display` - Optional display attributes keyed by edge id
///
/// # Raises
/// * ValueError if the report carries no arrow diagram
#[pyfunction]
#[pyo3(signature = (report, edge_display=None))]
fn export_arrow_diagram<'py>(
    py: Python<'py>,
    report: PyRef<'_, CompilationReport>,
    edge_display: Option<HashMap<EdgeId, EdgeDisplay>>,
) -> PyResult<Bound<'py, PyBytes>> {
    let Some(arrow) = report.arrow_graph.as_ref() else {
        return Err(PyValueError::new_err("report has no arrow diagram"));
    };
    let display: FxHashMap<EdgeId, EdgeDisplay> =
        edge_display.unwrap_or_default().into_iter().collect();
    let bytes = DiagramExporter::serialize(
        &arrow.nodes,
        &arrow.activity_edges,
        &arrow.dummy_edges,
        &display,
    );
    Ok(PyBytes::new_bound(py, &bytes))
}

/// Python module definition
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<LogicalOperator>()?;
    m.add_class::<AllocationMode>()?;
    m.add_class::<Activity>()?;
    m.add_class::<DependentActivity>()?;
    m.add_class::<Resource>()?;
    m.add_class::<ActivitySeverity>()?;

    // Config types
    m.add_class::<CompileConfig>()?;
    m.add_class::<CalendarRule>()?;

    // Results
    m.add_class::<GraphCompilationErrors>()?;
    m.add_class::<ScheduledActivity>()?;
    m.add_class::<ResourceSchedule>()?;
    m.add_class::<ConflictKind>()?;
    m.add_class::<SchedulingConflict>()?;
    m.add_class::<ActivityAllocation>()?;
    m.add_class::<ResourceAllocation>()?;
    m.add_class::<ActivityRisk>()?;
    m.add_class::<Metrics>()?;
    m.add_class::<Costs>()?;
    m.add_class::<CompilationReport>()?;
    m.add_class::<ProjectCompiler>()?;

    // Diagram export
    m.add_class::<EventNodeType>()?;
    m.add_class::<DashStyle>()?;
    m.add_class::<WeightStyle>()?;
    m.add_class::<EdgeDisplay>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(compile_project, m)?)?;
    m.add_function(wrap_pyfunction!(export_arrow_diagram, m)?)?;

    Ok(())
}
