//! Schedule risk scoring, graph complexity and cost roll-up.

use pyo3::prelude::*;
use std::cmp::Ordering;

use crate::critical_path::CompiledActivities;
use crate::graph::ValidatedGraph;
use crate::models::{ActivityId, ActivitySeverity, AllocationMode, ResourceId, ResourceSchedule};

/// Risk assessment for a single activity.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityRisk {
    #[pyo3(get)]
    pub activity_id: ActivityId,
    #[pyo3(get)]
    pub free_slack: i64,
    /// Index into the ascending ladder; `None` if slack exceeds every limit.
    #[pyo3(get)]
    pub tier: Option<usize>,
    /// Tier criticality weight if the activity is critical, else 0.
    #[pyo3(get)]
    pub criticality: f64,
    /// Tier severity weight if the activity is not critical, else 0.
    #[pyo3(get)]
    pub severity: f64,
    #[pyo3(get)]
    pub color: Option<String>,
}

/// Graph-wide scores.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metrics {
    /// Sum of criticality weights over the critical path.
    #[pyo3(get)]
    pub criticality_score: f64,
    /// Sum of severity weights over non-critical, scored activities.
    #[pyo3(get)]
    pub severity_score: f64,
    /// Critical activity ids in topological order.
    #[pyo3(get)]
    pub critical_path: Vec<ActivityId>,
    /// Most severe first: tier, then free slack, then id.
    #[pyo3(get)]
    pub risks: Vec<ActivityRisk>,
    #[pyo3(get)]
    pub cyclomatic_complexity: i64,
    #[pyo3(get)]
    pub project_duration: i64,
}

/// Cost totals derived from resource schedules.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Costs {
    #[pyo3(get)]
    pub direct_cost: f64,
    #[pyo3(get)]
    pub indirect_cost: f64,
    #[pyo3(get)]
    pub total_cost: f64,
    /// (resource id, cost) in schedule order.
    #[pyo3(get)]
    pub per_resource: Vec<(ResourceId, f64)>,
}

pub struct MetricsEngine;

impl MetricsEngine {
    /// Score every activity against the severity ladder.
    ///
    /// The ladder is sorted by ascending slack limit; an activity falls into
    /// the first tier whose limit is at least its free slack.
    pub fn score(compiled: &CompiledActivities, severity_ladder: &[ActivitySeverity]) -> Metrics {
        let mut ladder: Vec<&ActivitySeverity> = severity_ladder.iter().collect();
        ladder.sort_by_key(|s| s.slack_limit);

        let mut metrics = Metrics {
            critical_path: compiled.critical_path(),
            cyclomatic_complexity: Self::cyclomatic_complexity(compiled.graph()),
            project_duration: compiled.project_duration(),
            ..Default::default()
        };

        for (dependent, timing) in compiled.activities().iter().zip(compiled.timings()) {
            let free_slack = timing.free_slack;
            let tier = ladder.iter().position(|s| s.slack_limit >= free_slack);
            let rung = tier.map(|t| ladder[t]);

            let (criticality, severity) = match rung {
                Some(rung) if timing.is_critical() => (rung.criticality_weight, 0.0),
                Some(rung) => (0.0, rung.severity_weight),
                None => (0.0, 0.0),
            };
            metrics.criticality_score += criticality;
            metrics.severity_score += severity;

            metrics.risks.push(ActivityRisk {
                activity_id: dependent.activity.id,
                free_slack,
                tier,
                criticality,
                severity,
                color: rung.map(|r| r.color.clone()),
            });
        }

        metrics.risks.sort_by(|a, b| {
            let tier_order = match (a.tier, b.tier) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            tier_order
                .then(a.free_slack.cmp(&b.free_slack))
                .then(a.activity_id.cmp(&b.activity_id))
        });

        metrics
    }

    /// `edges - nodes + 2 * components` over the precedence graph.
    pub fn cyclomatic_complexity(graph: &ValidatedGraph) -> i64 {
        let n = graph.len();
        if n == 0 {
            return 0;
        }

        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        let mut components = n;
        for idx in 0..n {
            for &pred in graph.predecessors(idx) {
                let a = find(&mut parent, idx);
                let b = find(&mut parent, pred);
                if a != b {
                    parent[a] = b;
                    components -= 1;
                }
            }
        }

        graph.edge_count() as i64 - n as i64 + 2 * components as i64
    }

    /// Duration times unit cost, summed over every resource schedule.
    pub fn cost(schedules: &[ResourceSchedule]) -> Costs {
        let mut costs = Costs::default();
        for schedule in schedules {
            let cost = schedule.scheduled_duration() as f64 * schedule.effective_unit_cost;
            match schedule.resource.allocation {
                AllocationMode::Direct => costs.direct_cost += cost,
                AllocationMode::Indirect => costs.indirect_cost += cost,
            }
            costs.per_resource.push((schedule.resource.id, cost));
        }
        costs.total_cost = costs.direct_cost + costs.indirect_cost;
        costs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarRule;
    use crate::critical_path::CriticalPathCalculator;
    use crate::graph::DependencyGraph;
    use crate::models::{
        default_severity_ladder, Activity, DependentActivity, Resource, ScheduledActivity,
    };
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

    fn diamond() -> CompiledActivities {
        compile(vec![
            make_activity(1, 3, &[]),
            make_activity(2, 2, &[1]),
            make_activity(3, 4, &[1]),
            make_activity(4, 1, &[2, 3]),
        ])
    }

    fn schedule(allocation: AllocationMode, unit_cost: f64, durations: &[i64]) -> ResourceSchedule {
        let mut start = 0;
        let scheduled_activities = durations
            .iter()
            .enumerate()
            .map(|(i, &duration)| {
                let entry = ScheduledActivity {
                    id: i as ActivityId,
                    name: String::new(),
                    duration,
                    start_time: start,
                    finish_time: start + duration,
                };
                start += duration;
                entry
            })
            .collect();
        ResourceSchedule {
            resource: Resource {
                id: 1,
                allocation,
                unit_cost: Some(unit_cost),
                ..Default::default()
            },
            scheduled_activities,
            busy_periods: vec![(0, start)],
            finish_time: start,
            effective_unit_cost: unit_cost,
        }
    }

    #[test]
    fn test_scores_with_default_ladder() {
        let metrics = MetricsEngine::score(&diamond(), &default_severity_ladder());

        // A, C, D critical at weight 4 each; B has slack 2 -> tier 1 (limit 9)
        assert!((metrics.criticality_score - 12.0).abs() < 1e-9);
        assert!((metrics.severity_score - 5.0).abs() < 1e-9);
        assert_eq!(metrics.critical_path, vec![1, 3, 4]);
        assert_eq!(metrics.project_duration, 8);

        let ranked: Vec<ActivityId> = metrics.risks.iter().map(|r| r.activity_id).collect();
        assert_eq!(ranked, vec![1, 3, 4, 2]);
        assert_eq!(metrics.risks[3].tier, Some(1));
    }

    #[test]
    fn test_slack_beyond_ladder_is_unscored() {
        let compiled = compile(vec![make_activity(1, 50, &[]), make_activity(2, 1, &[])]);
        let metrics = MetricsEngine::score(&compiled, &default_severity_ladder());

        let short = metrics.risks.iter().find(|r| r.activity_id == 2).unwrap();
        assert_eq!(short.free_slack, 49);
        assert_eq!(short.tier, None);
        assert_eq!(short.color, None);
        assert_eq!(metrics.risks.last().unwrap().activity_id, 2);
        assert!((metrics.severity_score).abs() < 1e-9);
    }

    #[test]
    fn test_ladder_order_does_not_matter() {
        let mut ladder = default_severity_ladder();
        ladder.reverse();
        let sorted = MetricsEngine::score(&diamond(), &default_severity_ladder());
        let reversed = MetricsEngine::score(&diamond(), &ladder);
        assert_eq!(sorted, reversed);
    }

    #[test]
    fn test_slack_below_every_limit_is_most_severe() {
        let ladder = vec![
            ActivitySeverity::new(5, 3.0, 13.0, String::new()),
            ActivitySeverity::new(10, 1.0, 8.0, String::new()),
        ];
        let metrics = MetricsEngine::score(&diamond(), &ladder);
        assert!(metrics.risks.iter().all(|r| r.tier == Some(0)));
        assert!((metrics.criticality_score - 9.0).abs() < 1e-9);
        assert!((metrics.severity_score - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_cyclomatic_complexity_connected() {
        // 4 edges, 4 nodes, 1 component
        assert_eq!(MetricsEngine::cyclomatic_complexity(diamond().graph()), 2);
    }

    #[test]
    fn test_cyclomatic_complexity_disconnected() {
        let compiled = compile(vec![
            make_activity(1, 1, &[]),
            make_activity(2, 1, &[1]),
            make_activity(3, 1, &[]),
        ]);
        // 1 edge - 3 nodes + 2 * 2 components
        assert_eq!(MetricsEngine::cyclomatic_complexity(compiled.graph()), 2);
    }

    #[test]
    fn test_cost_single_resource() {
        let costs = MetricsEngine::cost(&[schedule(AllocationMode::Direct, 10.0, &[2, 4])]);
        assert!((costs.total_cost - 60.0).abs() < 1e-9);
        assert!((costs.direct_cost - 60.0).abs() < 1e-9);
        assert_eq!(costs.per_resource, vec![(1, 60.0)]);
    }

    #[test]
    fn test_cost_splits_direct_and_indirect() {
        let costs = MetricsEngine::cost(&[
            schedule(AllocationMode::Direct, 2.0, &[3]),
            schedule(AllocationMode::Indirect, 1.5, &[4, 4]),
        ]);
        assert!((costs.direct_cost - 6.0).abs() < 1e-9);
        assert!((costs.indirect_cost - 12.0).abs() < 1e-9);
        assert!((costs.total_cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_empty() {
        let costs = MetricsEngine::cost(&[]);
        assert_eq!(costs, Costs::default());
    }
}
