//! Activity-on-arrow (AOA) diagrams.
//!
//! Activities become edges between event nodes; zero-duration dummy edges
//! keep the diagram's precedence relation identical to the source graph.

mod builder;
mod export;

use pyo3::prelude::*;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use crate::critical_path::CompiledActivities;
use crate::models::ActivityId;

pub use builder::ArrowDiagramBuilder;
pub use export::{DashStyle, DiagramExporter, EdgeDisplay, WeightStyle};

/// Event node identifier, assigned in topological order starting at 1.
pub type EventId = u32;
/// Edge identifier: the activity id for activity edges, fresh ids for dummies.
pub type EdgeId = u32;

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventNodeType {
    Start,
    Normal,
    End,
    /// Endpoint of an activity with no predecessors and no successors.
    Isolated,
    /// Splits parallel activities that would otherwise share both endpoints.
    Dummy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventNode {
    pub id: EventId,
    pub node_type: EventNodeType,
    pub earliest_finish_time: i64,
    pub latest_finish_time: i64,
    /// Sorted edge ids.
    pub incoming_edges: Vec<EdgeId>,
    /// Sorted edge ids.
    pub outgoing_edges: Vec<EdgeId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityEdge {
    pub id: EdgeId,
    pub activity_id: ActivityId,
    pub name: String,
    pub duration: i64,
    pub source: EventId,
    pub target: EventId,
    pub is_critical: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DummyEdge {
    pub id: EdgeId,
    pub source: EventId,
    pub target: EventId,
}

/// A built diagram. Never updated in place; rebuild after any source edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrowGraph {
    /// Ordered by id.
    pub nodes: Vec<EventNode>,
    /// Ordered by id.
    pub activity_edges: Vec<ActivityEdge>,
    /// Ordered by id.
    pub dummy_edges: Vec<DummyEdge>,
    source_fingerprint: u64,
}

impl ArrowGraph {
    pub(crate) fn new(
        nodes: Vec<EventNode>,
        activity_edges: Vec<ActivityEdge>,
        dummy_edges: Vec<DummyEdge>,
        source_fingerprint: u64,
    ) -> Self {
        Self {
            nodes,
            activity_edges,
            dummy_edges,
            source_fingerprint,
        }
    }

    /// Whether `compiled` differs from the activities this diagram was built from.
    pub fn is_stale_for(&self, compiled: &CompiledActivities) -> bool {
        self.source_fingerprint != fingerprint(compiled)
    }
}

/// Hash of every caller-supplied field that affects the diagram.
pub(crate) fn fingerprint(compiled: &CompiledActivities) -> u64 {
    let mut hasher = FxHasher::default();
    for dependent in compiled.activities() {
        let activity = &dependent.activity;
        activity.id.hash(&mut hasher);
        activity.name.hash(&mut hasher);
        activity.duration.hash(&mut hasher);
        activity.minimum_earliest_start_time.hash(&mut hasher);
        activity.minimum_earliest_start_date.hash(&mut hasher);
        dependent.dependencies.hash(&mut hasher);
        dependent.resource_dependencies.hash(&mut hasher);
    }
    hasher.finish()
}
