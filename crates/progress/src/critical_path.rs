//! Critical path analysis.
//!
//! A single forward pass over the topological order computes, for every
//! task, the earliest day it can be worked and the length of the longest
//! dependency chain ending at it. Status is ignored: the result describes the
//! template structure, not today's progress.

use closeman_core::{CloseError, TaskCategory, TaskId};
use closeman_schedule::{DependencyGraph, GraphNode, TemplateCatalog};
use serde::Serialize;
use tracing::debug;

/// One task on the critical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    /// 1-based position on the path
    pub sequence: usize,
    /// Task id
    pub task_id: TaskId,
    /// Task name
    pub task_name: String,
    /// Template day
    pub scheduled_day: u32,
    /// Earliest day the task can be worked
    pub earliest_day: u32,
    /// Category tag
    pub category: TaskCategory,
}

/// A task whose dependencies push it past its template day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleConflict {
    /// Task name
    pub task_name: String,
    /// Template day
    pub scheduled_day: u32,
    /// Day the dependencies allow
    pub earliest_day: u32,
}

/// Result of critical path analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CriticalPathReport {
    /// Task names along the path, first to last
    pub critical_path: Vec<String>,
    /// `critical_path.len()`
    pub path_length: usize,
    /// Fewest business days the close can take
    pub minimum_close_days: u32,
    /// Per-task detail for the path
    pub critical_path_tasks: Vec<PathStep>,
    /// Suggestions derived from the path's categories
    pub acceleration_opportunities: Vec<String>,
    /// Tasks scheduled earlier than their dependencies allow
    pub schedule_conflicts: Vec<ScheduleConflict>,
}

/// Longest-chain analysis over a dependency graph.
pub struct CriticalPathAnalyzer<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> CriticalPathAnalyzer<'a> {
    /// Create an analyzer for `graph`.
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Run the analysis.
    pub fn analyze(&self) -> CriticalPathReport {
        let graph = self.graph;
        if graph.is_empty() {
            return CriticalPathReport::default();
        }

        let mut earliest = vec![0u32; graph.len()];
        let mut depth = vec![0usize; graph.len()];
        for idx in graph.topological_indices() {
            let preds = graph.predecessor_indices(idx);
            earliest[idx] = preds
                .iter()
                .map(|&p| earliest[p])
                .fold(graph.node(idx).day.max(1), u32::max);
            depth[idx] = 1 + preds.iter().map(|&p| depth[p]).max().unwrap_or(0);
        }

        // Highest first on the numeric keys, then the usual day/name order.
        let mut current = (0..graph.len())
            .min_by(|&a, &b| {
                (earliest[b], depth[b])
                    .cmp(&(earliest[a], depth[a]))
                    .then_with(|| graph.order_key(a).cmp(&graph.order_key(b)))
            })
            .unwrap_or(0);
        let mut path = vec![current];
        while let Some(&prev) = graph.predecessor_indices(current).iter().min_by(|&&a, &&b| {
            (depth[b], earliest[b])
                .cmp(&(depth[a], earliest[a]))
                .then_with(|| graph.order_key(a).cmp(&graph.order_key(b)))
        }) {
            path.push(prev);
            current = prev;
        }
        path.reverse();

        let critical_path_tasks: Vec<PathStep> = path
            .iter()
            .enumerate()
            .map(|(i, &idx)| {
                let node = graph.node(idx);
                PathStep {
                    sequence: i + 1,
                    task_id: node.id,
                    task_name: node.name.clone(),
                    scheduled_day: node.day,
                    earliest_day: earliest[idx],
                    category: node.category,
                }
            })
            .collect();

        let mut acceleration_opportunities: Vec<String> = Vec::new();
        for step in &critical_path_tasks {
            let hint = acceleration_hint(step.category);
            if !acceleration_opportunities.iter().any(|h| h == hint) {
                acceleration_opportunities.push(hint.to_string());
            }
        }
        let reconciliations = critical_path_tasks
            .iter()
            .filter(|s| s.category == TaskCategory::Reconciliation)
            .count();
        if reconciliations > 1 {
            acceleration_opportunities
                .push("Parallel process independent reconciliations".to_string());
        }

        let mut schedule_conflicts: Vec<ScheduleConflict> = graph
            .topological_indices()
            .into_iter()
            .filter(|&i| earliest[i] > graph.node(i).day)
            .map(|i| ScheduleConflict {
                task_name: graph.node(i).name.clone(),
                scheduled_day: graph.node(i).day,
                earliest_day: earliest[i],
            })
            .collect();
        schedule_conflicts.sort_by(|a, b| {
            (a.scheduled_day, a.task_name.as_str()).cmp(&(b.scheduled_day, b.task_name.as_str()))
        });

        let minimum_close_days = earliest.iter().copied().max().unwrap_or(0);
        debug!(
            path_length = path.len(),
            minimum_close_days,
            conflicts = schedule_conflicts.len(),
            "Critical path computed"
        );

        CriticalPathReport {
            critical_path: critical_path_tasks.iter().map(|s| s.task_name.clone()).collect(),
            path_length: critical_path_tasks.len(),
            minimum_close_days,
            critical_path_tasks,
            acceleration_opportunities,
            schedule_conflicts,
        }
    }
}

/// Analyze a template directly, without instantiating a period.
pub fn analyze_template(catalog: &TemplateCatalog) -> Result<CriticalPathReport, CloseError> {
    let specs = catalog.resolve(&Default::default())?;
    let ids: Vec<TaskId> = specs.iter().map(|_| TaskId::new()).collect();
    let id_of = |name: &str| {
        specs
            .iter()
            .position(|s| s.name == name)
            .map(|i| ids[i])
    };

    let nodes = specs
        .iter()
        .zip(&ids)
        .map(|(spec, &id)| GraphNode {
            id,
            name: spec.name.clone(),
            category: spec.category,
            day: spec.day,
            dependencies: spec
                .dependency_names
                .iter()
                .filter_map(|d| id_of(d.as_str()))
                .collect(),
        })
        .collect();

    let graph = DependencyGraph::build(nodes)?;
    Ok(CriticalPathAnalyzer::new(&graph).analyze())
}

fn acceleration_hint(category: TaskCategory) -> &'static str {
    use TaskCategory::*;
    match category {
        Depreciation | Amortization => "Automate depreciation and amortization entries",
        Reconciliation => "Pre-reconcile accounts during the month",
        Reporting | Close => "Implement continuous close practices",
        Cash => "Automate bank feeds and cash matching",
        Payroll => "Import payroll journals directly from the payroll system",
        Accruals => "Standardize recurring accrual templates",
        Intercompany => "Settle intercompany balances before period end",
        Revenue => "Automate revenue recognition schedules",
        Fx => "Automate FX rate loading and revaluation",
        Tax => "Prepare tax provision estimates before period end",
        Equity => "Roll forward equity balances during the month",
        Analysis => "Agree flux thresholds and commentary templates in advance",
        Review => "Book management review slots before the close starts",
        Adjustments => "Set a materiality threshold for late adjustments",
        Process => "Document and streamline the close process",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;

    #[test]
    fn test_standard_template_path() {
        let report = analyze_template(&TemplateCatalog::standard()).unwrap();

        assert_eq!(report.minimum_close_days, 5);
        assert_eq!(report.path_length, 12);
        assert_eq!(
            report.critical_path,
            vec![
                "Run AP accruals",
                "Complete AP subledger reconciliation",
                "Complete all balance sheet reconciliations",
                "Post reconciliation adjustments",
                "Run preliminary trial balance",
                "Post tax provision entries",
                "Generate draft financial statements",
                "Perform detailed flux analysis",
                "Management review of financials",
                "Post final adjustments",
                "Finalize financial statements",
                "Lock period in system",
            ]
        );
        assert!(report.schedule_conflicts.is_empty());
        assert_eq!(report.critical_path_tasks[0].sequence, 1);
        assert_eq!(report.critical_path_tasks[11].earliest_day, 5);
    }

    #[test]
    fn test_acceleration_hints_follow_path_order() {
        let report = analyze_template(&TemplateCatalog::standard()).unwrap();
        let hints = &report.acceleration_opportunities;

        assert_eq!(hints[0], "Standardize recurring accrual templates");
        assert_eq!(hints[1], "Pre-reconcile accounts during the month");
        assert_eq!(
            hints.iter().filter(|h| *h == "Implement continuous close practices").count(),
            1
        );
        assert_eq!(
            hints.last().map(String::as_str),
            Some("Parallel process independent reconciliations")
        );
    }

    #[test]
    fn test_dependencies_raise_earliest_day() {
        let late = task("Post payroll entries", TaskCategory::Payroll, 3, &[]);
        let early = task("Reconcile payroll", TaskCategory::Reconciliation, 1, &[&late]);
        let tasks = vec![late, early];
        let graph = DependencyGraph::from_tasks(&tasks).unwrap();

        let report = CriticalPathAnalyzer::new(&graph).analyze();
        assert_eq!(report.minimum_close_days, 3);
        assert_eq!(report.critical_path, vec!["Post payroll entries", "Reconcile payroll"]);
        assert_eq!(
            report.schedule_conflicts,
            vec![ScheduleConflict {
                task_name: "Reconcile payroll".into(),
                scheduled_day: 1,
                earliest_day: 3,
            }]
        );
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::build(Vec::new()).unwrap();
        let report = CriticalPathAnalyzer::new(&graph).analyze();
        assert_eq!(report, CriticalPathReport::default());
    }
}
