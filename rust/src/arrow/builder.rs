//! Activity-on-node to activity-on-arrow transform.
//!
//! Works on the transitively reduced precedence graph. Activities with
//! identical successor sets share a finish event. An activity's start event
//! is an existing finish event only when that event's activities are exactly
//! its predecessors; otherwise it gets its own event fed by dummy edges.
//! Parallel activities that would share both endpoints are split apart with
//! an extra dummy node.

use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::critical_path::CompiledActivities;
use crate::log_trace;

use super::{
    fingerprint, ActivityEdge, ArrowGraph, DummyEdge, EdgeId, EventId, EventNode, EventNodeType,
};

pub struct ArrowDiagramBuilder {
    verbosity: u8,
}

/// Edge between provisional events (creation indices).
#[derive(Clone, Copy)]
enum ProtoEdge {
    Activity { idx: usize, source: usize, target: usize },
    Dummy { source: usize, target: usize },
}

impl ProtoEdge {
    fn endpoints(&self) -> (usize, usize) {
        match *self {
            ProtoEdge::Activity { source, target, .. } => (source, target),
            ProtoEdge::Dummy { source, target } => (source, target),
        }
    }
}

impl ArrowDiagramBuilder {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    pub fn to_arrow_graph(&self, compiled: &CompiledActivities) -> ArrowGraph {
        let graph = compiled.graph();
        let timings = compiled.timings();
        let n = graph.len();
        let order = graph.topological_order();

        let reduced_preds = graph.reduced_predecessors();
        let mut reduced_succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, preds) in reduced_preds.iter().enumerate() {
            for &pred in preds {
                reduced_succs[pred].push(idx);
            }
        }

        let mut kinds: Vec<EventNodeType> = Vec::new();
        let mut new_event = |kind: EventNodeType| {
            kinds.push(kind);
            kinds.len() - 1
        };

        let isolated = |idx: usize| reduced_preds[idx].is_empty() && reduced_succs[idx].is_empty();
        let any_connected = (0..n).any(|idx| !isolated(idx));
        let (start_event, end_event) = if any_connected {
            (Some(new_event(EventNodeType::Start)), Some(new_event(EventNodeType::End)))
        } else {
            (None, None)
        };

        let mut activity_start: Vec<usize> = vec![0; n];
        let mut activity_finish: Vec<usize> = vec![0; n];
        let mut edges: Vec<ProtoEdge> = Vec::new();

        // Finish events, grouped by successor set
        let mut finish_by_succs: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        let mut members: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for &idx in order {
            if isolated(idx) {
                activity_start[idx] = new_event(EventNodeType::Isolated);
                activity_finish[idx] = new_event(EventNodeType::Isolated);
                continue;
            }
            let succs = &reduced_succs[idx];
            let event = match (succs.is_empty(), end_event) {
                (true, Some(end)) => end,
                _ => *finish_by_succs
                    .entry(succs.clone())
                    .or_insert_with(|| new_event(EventNodeType::Normal)),
            };
            activity_finish[idx] = event;
            members.entry(event).or_default().push(idx);
        }

        // Invert: a finish event's member set -> event
        let finish_by_members: FxHashMap<Vec<usize>, usize> = members
            .iter()
            .map(|(&event, idxs)| {
                let mut key = idxs.clone();
                key.sort_unstable();
                (key, event)
            })
            .collect();

        // Start events, grouped by predecessor set
        let mut start_by_preds: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        for &idx in order {
            if isolated(idx) {
                continue;
            }
            let preds = &reduced_preds[idx];
            let event = match (preds.is_empty(), start_event) {
                (true, Some(start)) => start,
                _ => match start_by_preds.get(preds) {
                    Some(&event) => event,
                    None => {
                        let event = match finish_by_members.get(preds) {
                            Some(&shared) => shared,
                            None => {
                                let event = new_event(EventNodeType::Normal);
                                let mut sources: Vec<usize> =
                                    preds.iter().map(|&p| activity_finish[p]).collect();
                                sources.sort_unstable();
                                sources.dedup();
                                for source in sources {
                                    log_trace!(
                                        self.verbosity,
                                        "dummy edge {} -> {} for activity {}",
                                        source,
                                        event,
                                        graph.activities()[idx].activity.id
                                    );
                                    edges.push(ProtoEdge::Dummy { source, target: event });
                                }
                                event
                            }
                        };
                        start_by_preds.insert(preds.clone(), event);
                        event
                    }
                },
            };
            activity_start[idx] = event;
        }

        // Split parallel activities sharing both endpoints
        let mut by_endpoints: FxHashMap<(usize, usize), Vec<usize>> = FxHashMap::default();
        for &idx in order {
            by_endpoints
                .entry((activity_start[idx], activity_finish[idx]))
                .or_default()
                .push(idx);
        }
        let mut parallel_groups: Vec<Vec<usize>> =
            by_endpoints.into_values().filter(|group| group.len() > 1).collect();
        for group in &mut parallel_groups {
            group.sort_unstable();
        }
        parallel_groups.sort_unstable();
        for group in parallel_groups {
            for &idx in group.iter().skip(1) {
                let split = new_event(EventNodeType::Dummy);
                edges.push(ProtoEdge::Dummy {
                    source: split,
                    target: activity_finish[idx],
                });
                activity_finish[idx] = split;
            }
        }

        for &idx in order {
            edges.push(ProtoEdge::Activity {
                idx,
                source: activity_start[idx],
                target: activity_finish[idx],
            });
        }

        let event_count = kinds.len();
        let numbering = number_events(event_count, &edges);

        // Materialise edges with final ids
        let mut activity_edges: Vec<ActivityEdge> = Vec::with_capacity(n);
        let mut dummy_pairs: Vec<(EventId, EventId)> = Vec::new();
        for edge in &edges {
            match *edge {
                ProtoEdge::Activity { idx, source, target } => {
                    let activity = &graph.activities()[idx].activity;
                    activity_edges.push(ActivityEdge {
                        id: activity.id,
                        activity_id: activity.id,
                        name: activity.name.clone(),
                        duration: activity.duration,
                        source: numbering[source],
                        target: numbering[target],
                        is_critical: timings[idx].is_critical(),
                    });
                }
                ProtoEdge::Dummy { source, target } => {
                    dummy_pairs.push((numbering[source], numbering[target]));
                }
            }
        }
        activity_edges.sort_by_key(|e| e.id);
        dummy_pairs.sort_unstable();
        dummy_pairs.dedup();

        let first_dummy_id: EdgeId = activity_edges.last().map(|e| e.id + 1).unwrap_or(1);
        let dummy_edges: Vec<DummyEdge> = dummy_pairs
            .into_iter()
            .enumerate()
            .map(|(k, (source, target))| DummyEdge {
                id: first_dummy_id + k as EdgeId,
                source,
                target,
            })
            .collect();

        let mut nodes: Vec<EventNode> = vec![
            EventNode {
                id: 0,
                node_type: EventNodeType::Normal,
                earliest_finish_time: 0,
                latest_finish_time: 0,
                incoming_edges: Vec::new(),
                outgoing_edges: Vec::new(),
            };
            event_count
        ];
        for (proto, &kind) in kinds.iter().enumerate() {
            let slot = &mut nodes[numbering[proto] as usize - 1];
            slot.id = numbering[proto];
            slot.node_type = kind;
        }
        for edge in &activity_edges {
            nodes[edge.source as usize - 1].outgoing_edges.push(edge.id);
            nodes[edge.target as usize - 1].incoming_edges.push(edge.id);
        }
        for edge in &dummy_edges {
            nodes[edge.source as usize - 1].outgoing_edges.push(edge.id);
            nodes[edge.target as usize - 1].incoming_edges.push(edge.id);
        }
        for node in &mut nodes {
            node.incoming_edges.sort_unstable();
            node.outgoing_edges.sort_unstable();
        }

        assign_event_times(&mut nodes, &activity_edges, &dummy_edges, compiled);

        ArrowGraph::new(nodes, activity_edges, dummy_edges, fingerprint(compiled))
    }
}

/// Topological numbering of provisional events (1-based), ties by creation order.
fn number_events(event_count: usize, edges: &[ProtoEdge]) -> Vec<EventId> {
    let mut in_degree = vec![0usize; event_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); event_count];
    for edge in edges {
        let (source, target) = edge.endpoints();
        outgoing[source].push(target);
        in_degree[target] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..event_count)
        .filter(|&e| in_degree[e] == 0)
        .map(Reverse)
        .collect();
    let mut numbering = vec![0 as EventId; event_count];
    let mut next: EventId = 1;
    while let Some(Reverse(event)) = ready.pop() {
        numbering[event] = next;
        next += 1;
        for &target in &outgoing[event] {
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.push(Reverse(target));
            }
        }
    }
    numbering
}

/// Earliest/latest event times from the activity timings.
///
/// Nodes are ordered by id, which is a topological order.
fn assign_event_times(
    nodes: &mut [EventNode],
    activity_edges: &[ActivityEdge],
    dummy_edges: &[DummyEdge],
    compiled: &CompiledActivities,
) {
    let timing = |activity_id| compiled.timing_of(activity_id).cloned().unwrap_or_default();
    let is_dummy = |edge_id: EdgeId| dummy_edges.binary_search_by_key(&edge_id, |e| e.id);
    let activity = |edge_id: EdgeId| {
        activity_edges
            .binary_search_by_key(&edge_id, |e| e.id)
            .ok()
            .map(|pos| &activity_edges[pos])
    };

    for pos in 0..nodes.len() {
        let mut earliest: Option<i64> = None;
        for &edge_id in &nodes[pos].incoming_edges {
            let value = match is_dummy(edge_id) {
                Ok(d) => nodes[dummy_edges[d].source as usize - 1].earliest_finish_time,
                Err(_) => activity(edge_id)
                    .map(|e| timing(e.activity_id).earliest_finish)
                    .unwrap_or(0),
            };
            earliest = Some(earliest.map_or(value, |current| current.max(value)));
        }
        let earliest = earliest.unwrap_or_else(|| {
            nodes[pos]
                .outgoing_edges
                .iter()
                .filter_map(|&edge_id| activity(edge_id))
                .map(|e| timing(e.activity_id).earliest_start)
                .min()
                .unwrap_or(0)
        });
        nodes[pos].earliest_finish_time = earliest;
    }

    for pos in (0..nodes.len()).rev() {
        let mut latest: Option<i64> = None;
        for &edge_id in &nodes[pos].outgoing_edges {
            let value = match is_dummy(edge_id) {
                Ok(d) => nodes[dummy_edges[d].target as usize - 1].latest_finish_time,
                Err(_) => activity(edge_id)
                    .map(|e| timing(e.activity_id).latest_start)
                    .unwrap_or(compiled.project_duration()),
            };
            latest = Some(latest.map_or(value, |current| current.min(value)));
        }
        let latest = latest.unwrap_or_else(|| {
            nodes[pos]
                .incoming_edges
                .iter()
                .filter_map(|&edge_id| activity(edge_id))
                .map(|e| timing(e.activity_id).latest_finish)
                .max()
                .unwrap_or(compiled.project_duration())
        });
        nodes[pos].latest_finish_time = latest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarRule;
    use crate::critical_path::CriticalPathCalculator;
    use crate::graph::DependencyGraph;
    use crate::models::{Activity, ActivityId, DependentActivity};
    use rustc_hash::FxHashSet;
    use std::collections::BTreeSet;

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

    fn compile(activities: Vec<DependentActivity>) -> CompiledActivities {
        let graph = DependencyGraph::new(activities).unwrap().validate(&[]).unwrap();
        CriticalPathCalculator::new(&CalendarRule::CalendarDays, None, 0)
            .compute(graph)
            .unwrap()
    }

    fn build(compiled: &CompiledActivities) -> ArrowGraph {
        ArrowDiagramBuilder::new(0).to_arrow_graph(compiled)
    }

    /// Activity pairs (a, b) where b is reachable after a in the diagram.
    fn diagram_precedence(arrow: &ArrowGraph) -> FxHashSet<(ActivityId, ActivityId)> {
        let mut outgoing: FxHashMap<EventId, Vec<EventId>> = FxHashMap::default();
        for e in &arrow.activity_edges {
            outgoing.entry(e.source).or_default().push(e.target);
        }
        for e in &arrow.dummy_edges {
            outgoing.entry(e.source).or_default().push(e.target);
        }
        let reachable = |from: EventId| {
            let mut seen: FxHashSet<EventId> = FxHashSet::default();
            let mut stack = vec![from];
            while let Some(event) = stack.pop() {
                if seen.insert(event) {
                    stack.extend(outgoing.get(&event).into_iter().flatten().copied());
                }
            }
            seen
        };

        let mut pairs = FxHashSet::default();
        for a in &arrow.activity_edges {
            let after = reachable(a.target);
            for b in &arrow.activity_edges {
                if a.id != b.id && after.contains(&b.source) {
                    pairs.insert((a.activity_id, b.activity_id));
                }
            }
        }
        pairs
    }

    /// Transitive closure of the source precedence graph.
    fn source_precedence(compiled: &CompiledActivities) -> FxHashSet<(ActivityId, ActivityId)> {
        let graph = compiled.graph();
        let mut pairs = FxHashSet::default();
        for start in 0..graph.len() {
            let mut stack: Vec<usize> = graph.successors(start).to_vec();
            let mut seen: FxHashSet<usize> = FxHashSet::default();
            while let Some(idx) = stack.pop() {
                if seen.insert(idx) {
                    pairs.insert((
                        graph.activities()[start].activity.id,
                        graph.activities()[idx].activity.id,
                    ));
                    stack.extend(graph.successors(idx).iter().copied());
                }
            }
        }
        pairs
    }

    fn assert_exact_precedence(activities: Vec<DependentActivity>) -> ArrowGraph {
        let compiled = compile(activities);
        let arrow = build(&compiled);
        assert_eq!(diagram_precedence(&arrow), source_precedence(&compiled));
        arrow
    }

    #[test]
    fn test_chain_needs_no_dummies() {
        let arrow = assert_exact_precedence(vec![
            make_activity(1, 2, &[]),
            make_activity(2, 3, &[1]),
            make_activity(3, 1, &[2]),
        ]);
        assert_eq!(arrow.nodes.len(), 4);
        assert!(arrow.dummy_edges.is_empty());
        assert_eq!(arrow.nodes[0].node_type, EventNodeType::Start);
        assert_eq!(arrow.nodes[3].node_type, EventNodeType::End);
        let sources: Vec<EventId> = arrow.activity_edges.iter().map(|e| e.source).collect();
        assert_eq!(sources, vec![1, 2, 3]);
    }

    #[test]
    fn test_diamond_splits_parallel_edges() {
        let arrow = assert_exact_precedence(vec![
            make_activity(1, 3, &[]),
            make_activity(2, 2, &[1]),
            make_activity(3, 4, &[1]),
            make_activity(4, 1, &[2, 3]),
        ]);
        // 2 and 3 share both endpoints, so one is split with a dummy
        assert_eq!(arrow.dummy_edges.len(), 1);
        assert_eq!(arrow.nodes.len(), 5);
        assert!(arrow.nodes.iter().any(|n| n.node_type == EventNodeType::Dummy));
        assert_eq!(arrow.dummy_edges[0].id, 5);
    }

    #[test]
    fn test_partial_overlap_inserts_dummy() {
        // Classic case: 3 needs 1, 4 needs 1 and 2
        let arrow = assert_exact_precedence(vec![
            make_activity(1, 1, &[]),
            make_activity(2, 1, &[]),
            make_activity(3, 1, &[1]),
            make_activity(4, 1, &[1, 2]),
        ]);
        assert_eq!(arrow.dummy_edges.len(), 2);
    }

    #[test]
    fn test_complex_graph_precedence_exact() {
        assert_exact_precedence(vec![
            make_activity(1, 2, &[]),
            make_activity(2, 3, &[]),
            make_activity(3, 1, &[1]),
            make_activity(4, 4, &[1, 2]),
            make_activity(5, 2, &[2]),
            make_activity(6, 1, &[3, 4]),
            make_activity(7, 2, &[4, 5]),
            make_activity(8, 3, &[1, 6, 7]),
            make_activity(9, 1, &[]),
        ]);
    }

    #[test]
    fn test_isolated_activities_get_own_events() {
        let arrow =
            assert_exact_precedence(vec![make_activity(1, 2, &[]), make_activity(2, 5, &[])]);
        assert_eq!(arrow.nodes.len(), 4);
        assert!(arrow.nodes.iter().all(|n| n.node_type == EventNodeType::Isolated));
        assert!(arrow.dummy_edges.is_empty());
    }

    #[test]
    fn test_event_times() {
        let compiled = compile(vec![
            make_activity(1, 3, &[]),
            make_activity(2, 2, &[1]),
            make_activity(3, 4, &[1]),
            make_activity(4, 1, &[2, 3]),
        ]);
        let arrow = build(&compiled);

        let start = &arrow.nodes[0];
        assert_eq!(start.earliest_finish_time, 0);
        assert_eq!(start.latest_finish_time, 0);
        let end = arrow.nodes.last().unwrap();
        assert_eq!(end.node_type, EventNodeType::End);
        assert_eq!(end.earliest_finish_time, 8);
        assert_eq!(end.latest_finish_time, 8);
        for node in &arrow.nodes {
            assert!(node.earliest_finish_time <= node.latest_finish_time);
        }
    }

    #[test]
    fn test_edges_point_forward_in_numbering() {
        let arrow = assert_exact_precedence(vec![
            make_activity(1, 1, &[]),
            make_activity(2, 1, &[]),
            make_activity(3, 1, &[1]),
            make_activity(4, 1, &[1, 2]),
            make_activity(5, 1, &[3, 4]),
        ]);
        for e in &arrow.activity_edges {
            assert!(e.source < e.target);
        }
        for e in &arrow.dummy_edges {
            assert!(e.source < e.target);
        }
    }

    #[test]
    fn test_rebuild_is_identical() {
        let compiled = compile(vec![
            make_activity(1, 1, &[]),
            make_activity(2, 1, &[]),
            make_activity(3, 1, &[1]),
            make_activity(4, 1, &[1, 2]),
        ]);
        assert_eq!(build(&compiled), build(&compiled));
    }

    #[test]
    fn test_staleness_tracks_source_edits() {
        let compiled = compile(vec![make_activity(1, 1, &[]), make_activity(2, 1, &[1])]);
        let arrow = build(&compiled);
        assert!(!arrow.is_stale_for(&compiled));

        let edited = compile(vec![make_activity(1, 2, &[]), make_activity(2, 1, &[1])]);
        assert!(arrow.is_stale_for(&edited));
    }

    #[test]
    fn test_empty_graph() {
        let arrow = build(&compile(vec![]));
        assert!(arrow.nodes.is_empty());
        assert!(arrow.activity_edges.is_empty());
    }
}
