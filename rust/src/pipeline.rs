//! The compile pipeline: validation, critical path, allocation, metrics and
//! the optional arrow diagram, with cooperative cancellation between stages.

use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::arrow::{ArrowDiagramBuilder, ArrowGraph};
use crate::config::CompileConfig;
use crate::critical_path::{CompiledActivities, CriticalPathCalculator, CriticalPathError};
use crate::graph::{ArgumentError, DependencyGraph, GraphCompilationErrors};
use crate::log_stage;
use crate::metrics::{Costs, Metrics, MetricsEngine};
use crate::models::{default_severity_ladder, ActivitySeverity, DependentActivity, Resource};
use crate::scheduler::{ResourceAllocation, ResourceScheduler};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),
    #[error("Internal error: {0}")]
    Internal(#[from] CriticalPathError),
    #[error("Compilation cancelled")]
    Cancelled,
}

/// Shared cancellation flag, checked between pipeline stages.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle for one compile request issued by a [`CompileSlot`].
#[derive(Clone, Debug)]
pub struct CompileTicket {
    generation: u64,
    token: CancellationToken,
}

impl CompileTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// One live compilation per logical project.
///
/// Starting a request cancels the one in flight, and only the newest
/// request's result is ever published.
#[derive(Debug, Default)]
pub struct CompileSlot {
    generation: AtomicU64,
    current: Mutex<CancellationToken>,
}

impl CompileSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the in-flight request (if any) and issue a ticket for a new one.
    pub fn begin(&self) -> CompileTicket {
        let token = CancellationToken::new();
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.cancel();
        *current = token.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        CompileTicket { generation, token }
    }

    /// Cancel the in-flight request without starting a new one.
    pub fn cancel_current(&self) {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
    }

    /// Number of requests started in this slot.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: &CompileTicket) -> bool {
        self.generation() == ticket.generation && !ticket.token.is_cancelled()
    }

    /// Hand back `result` only if `ticket` is still the newest request.
    pub fn publish<T>(&self, ticket: &CompileTicket, result: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(result)
        } else {
            None
        }
    }

    /// Run a full compile in this slot. `Ok(None)` means a newer request
    /// superseded this one after it finished.
    pub fn compile(
        &self,
        activities: Vec<DependentActivity>,
        resources: &[Resource],
        severity_ladder: &[ActivitySeverity],
        config: &CompileConfig,
    ) -> Result<Option<CompileOutcome>, PipelineError> {
        let ticket = self.begin();
        let outcome = compile(activities, resources, severity_ladder, config, ticket.token())?;
        Ok(self.publish(&ticket, outcome))
    }
}

/// Everything computed for a graph that passed validation.
#[derive(Debug, Clone)]
pub struct CompiledProject {
    pub activities: CompiledActivities,
    pub allocation: ResourceAllocation,
    pub metrics: Metrics,
    pub costs: Costs,
    pub arrow_graph: Option<ArrowGraph>,
}

#[derive(Debug, Clone)]
pub struct CompileOutcome {
    /// Always populated; may hold non-fatal warnings alongside a project.
    pub errors: GraphCompilationErrors,
    /// `None` when validation halted the pipeline.
    pub project: Option<CompiledProject>,
}

impl CompileOutcome {
    /// True if previously computed outputs must be treated as outdated.
    pub fn is_stale(&self) -> bool {
        self.project.is_none()
    }
}

/// Reject malformed arguments before any computation.
fn check_arguments(
    resources: &[Resource],
    severity_ladder: &[ActivitySeverity],
    config: &CompileConfig,
) -> Result<(), ArgumentError> {
    if !is_valid_cost(config.default_unit_cost) {
        return Err(ArgumentError::InvalidDefaultUnitCost(config.default_unit_cost));
    }

    let mut seen = FxHashSet::default();
    for resource in resources {
        if !seen.insert(resource.id) {
            return Err(ArgumentError::DuplicateResourceId(resource.id));
        }
        if let Some(cost) = resource.unit_cost {
            if !is_valid_cost(cost) {
                return Err(ArgumentError::InvalidUnitCost { id: resource.id, cost });
            }
        }
    }

    let mut limits = FxHashSet::default();
    for severity in severity_ladder {
        if !limits.insert(severity.slack_limit) {
            return Err(ArgumentError::DuplicateSlackLimit(severity.slack_limit));
        }
    }
    Ok(())
}

fn is_valid_cost(cost: f64) -> bool {
    cost.is_finite() && cost >= 0.0
}

/// Compile one project snapshot.
///
/// Input problems come back as data in [`CompileOutcome::errors`]; fatal ones
/// leave `project` empty. An empty `severity_ladder` selects
/// [`default_severity_ladder`].
pub fn compile(
    activities: Vec<DependentActivity>,
    resources: &[Resource],
    severity_ladder: &[ActivitySeverity],
    config: &CompileConfig,
    token: &CancellationToken,
) -> Result<CompileOutcome, PipelineError> {
    let verbosity = config.verbosity;
    log_stage!(
        verbosity,
        "compile: {} activities, {} resources",
        activities.len(),
        resources.len()
    );

    check_arguments(resources, severity_ladder, config)?;
    let graph = DependencyGraph::new(activities)?;
    token.check()?;

    let validated = match graph.validate(resources) {
        Ok(validated) => validated,
        Err(errors) => {
            log_stage!(
                verbosity,
                "compile halted: {} cycles, missing {:?}",
                errors.circular_dependencies.len(),
                errors.missing_dependencies
            );
            return Ok(CompileOutcome { errors, project: None });
        }
    };
    let errors = validated.warnings().clone();
    if errors.explicit_target_inconsistency {
        log_stage!(
            verbosity,
            "every resource is an explicit target; untargeted activities {:?}",
            errors.untargeted_activities
        );
    }
    token.check()?;

    let compiled = CriticalPathCalculator::new(&config.calendar, config.project_start, verbosity)
        .compute(validated)?;
    token.check()?;

    let allocation =
        ResourceScheduler::new(&compiled, config.default_unit_cost, verbosity).allocate(resources);
    token.check()?;

    let ladder = if severity_ladder.is_empty() {
        default_severity_ladder()
    } else {
        severity_ladder.to_vec()
    };
    let metrics = MetricsEngine::score(&compiled, &ladder);
    let costs = MetricsEngine::cost(&allocation.schedules);
    log_stage!(
        verbosity,
        "metrics: criticality {}, severity {}, complexity {}, cost {}",
        metrics.criticality_score,
        metrics.severity_score,
        metrics.cyclomatic_complexity,
        costs.total_cost
    );
    token.check()?;

    let arrow_graph = if config.build_arrow_graph {
        let arrow = ArrowDiagramBuilder::new(verbosity).to_arrow_graph(&compiled);
        log_stage!(
            verbosity,
            "arrow diagram: {} events, {} activity edges, {} dummy edges",
            arrow.nodes.len(),
            arrow.activity_edges.len(),
            arrow.dummy_edges.len()
        );
        token.check()?;
        Some(arrow)
    } else {
        None
    };

    Ok(CompileOutcome {
        errors,
        project: Some(CompiledProject {
            activities: compiled,
            allocation,
            metrics,
            costs,
            arrow_graph,
        }),
    })
}
