//! Blocker detection and ranking.
//!
//! Works on a dependency graph plus a status snapshot of the same tasks:
//! - blocked tasks and the direct dependencies holding them up
//! - critical blockers, ranked by how many blocked tasks sit downstream
//! - tasks that have not started because a dependency is still open

use std::collections::HashMap;

use closeman_core::{Task, TaskCategory, TaskId, TaskStatus};
use closeman_schedule::DependencyGraph;
use serde::Serialize;
use tracing::debug;

/// Above this many blocked tasks the report suggests adding capacity.
const PARALLEL_ADVISORY_THRESHOLD: usize = 3;

/// A direct dependency that is not yet completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingTask {
    /// Dependency id
    pub id: TaskId,
    /// Dependency name
    pub name: String,
    /// Its current status
    pub status: TaskStatus,
}

/// A task in BLOCKED status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    /// Task id
    pub id: TaskId,
    /// Task name
    pub name: String,
    /// Category tag
    pub category: TaskCategory,
    /// Template day
    pub scheduled_day: u32,
    /// Always BLOCKED
    pub status: TaskStatus,
    /// Notes recorded with the last update
    pub notes: Option<String>,
    /// Direct dependencies that are not completed
    pub blocking_tasks: Vec<BlockingTask>,
    /// `blocking_tasks.len()`
    pub blocker_count: usize,
}

/// An incomplete task upstream of at least one blocked task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalBlocker {
    /// Task id
    pub task_id: TaskId,
    /// Task name
    pub task_name: String,
    /// Current status
    pub status: TaskStatus,
    /// Template day
    pub scheduled_day: u32,
    /// Number of blocked tasks that depend on it, directly or transitively
    pub blocking_count: usize,
}

/// A NOT_STARTED task whose dependencies are still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingTask {
    /// Task id
    pub id: TaskId,
    /// Task name
    pub name: String,
    /// Template day
    pub scheduled_day: u32,
    /// Names of the incomplete dependencies
    pub waiting_on: Vec<String>,
}

/// Result of blocker analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockerReport {
    /// Blocked tasks, by scheduled day then name
    pub blocked_tasks: Vec<BlockedTask>,
    /// `blocked_tasks.len()`
    pub blocked_count: usize,
    /// Ranked critical blockers
    pub critical_blockers: Vec<CriticalBlocker>,
    /// One line per critical blocker, in rank order
    pub recommendations: Vec<String>,
    /// Tasks waiting on incomplete dependencies
    pub waiting_tasks: Vec<WaitingTask>,
    /// General observations about the blocked set
    pub advisories: Vec<String>,
}

/// Read-only analyzer over a period's graph.
pub struct BlockerAnalyzer<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> BlockerAnalyzer<'a> {
    /// Create an analyzer for `graph`.
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Analyze the status snapshot in `tasks`.
    ///
    /// Tasks missing from the snapshot are treated as NOT_STARTED.
    pub fn analyze(&self, tasks: &[Task]) -> BlockerReport {
        let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
        let status_of = |idx: usize| {
            by_id
                .get(&self.graph.node(idx).id)
                .map(|t| t.status)
                .unwrap_or(TaskStatus::NotStarted)
        };

        let mut blocked = Vec::new();
        let mut waiting = Vec::new();
        for idx in 0..self.graph.len() {
            let open_deps: Vec<usize> = self
                .graph
                .predecessor_indices(idx)
                .iter()
                .copied()
                .filter(|&p| status_of(p) != TaskStatus::Completed)
                .collect();

            match status_of(idx) {
                TaskStatus::Blocked => blocked.push((idx, open_deps)),
                TaskStatus::NotStarted if !open_deps.is_empty() => waiting.push((idx, open_deps)),
                _ => {}
            }
        }
        blocked.sort_by(|a, b| self.graph.order_key(a.0).cmp(&self.graph.order_key(b.0)));
        waiting.sort_by(|a, b| self.graph.order_key(a.0).cmp(&self.graph.order_key(b.0)));

        // Each blocked task credits every incomplete ancestor once.
        let mut counts = vec![0usize; self.graph.len()];
        for (idx, _) in &blocked {
            for ancestor in self.graph.ancestors(*idx) {
                if status_of(ancestor) != TaskStatus::Completed {
                    counts[ancestor] += 1;
                }
            }
        }

        let mut ranked: Vec<usize> = (0..self.graph.len()).filter(|&i| counts[i] > 0).collect();
        ranked.sort_by(|&a, &b| {
            counts[b]
                .cmp(&counts[a])
                .then_with(|| self.graph.order_key(a).cmp(&self.graph.order_key(b)))
        });

        let critical_blockers: Vec<CriticalBlocker> = ranked
            .into_iter()
            .map(|idx| {
                let node = self.graph.node(idx);
                CriticalBlocker {
                    task_id: node.id,
                    task_name: node.name.clone(),
                    status: status_of(idx),
                    scheduled_day: node.day,
                    blocking_count: counts[idx],
                }
            })
            .collect();

        let recommendations = critical_blockers
            .iter()
            .map(|b| {
                format!(
                    "Priority: Complete '{}' - it is blocking {} other tasks",
                    b.task_name, b.blocking_count
                )
            })
            .collect();

        let blocked_tasks: Vec<BlockedTask> = blocked
            .into_iter()
            .map(|(idx, open_deps)| {
                let node = self.graph.node(idx);
                let blocking_tasks: Vec<BlockingTask> = open_deps
                    .into_iter()
                    .map(|p| BlockingTask {
                        id: self.graph.node(p).id,
                        name: self.graph.node(p).name.clone(),
                        status: status_of(p),
                    })
                    .collect();
                BlockedTask {
                    id: node.id,
                    name: node.name.clone(),
                    category: node.category,
                    scheduled_day: node.day,
                    status: TaskStatus::Blocked,
                    notes: by_id.get(&node.id).and_then(|t| t.notes.clone()),
                    blocker_count: blocking_tasks.len(),
                    blocking_tasks,
                }
            })
            .collect();

        let waiting_tasks = waiting
            .into_iter()
            .map(|(idx, open_deps)| {
                let node = self.graph.node(idx);
                WaitingTask {
                    id: node.id,
                    name: node.name.clone(),
                    scheduled_day: node.day,
                    waiting_on: open_deps
                        .into_iter()
                        .map(|p| self.graph.node(p).name.clone())
                        .collect(),
                }
            })
            .collect();

        let advisories = advisories(&blocked_tasks, &critical_blockers);

        debug!(
            blocked = blocked_tasks.len(),
            critical = critical_blockers.len(),
            "Blocker analysis complete"
        );

        BlockerReport {
            blocked_count: blocked_tasks.len(),
            blocked_tasks,
            critical_blockers,
            recommendations,
            waiting_tasks,
            advisories,
        }
    }
}

fn advisories(blocked: &[BlockedTask], critical: &[CriticalBlocker]) -> Vec<String> {
    let mut out = Vec::new();

    if blocked.len() > PARALLEL_ADVISORY_THRESHOLD {
        out.push(
            "Consider parallel processing or additional resources to accelerate blocked tasks"
                .to_string(),
        );
    }
    if blocked
        .iter()
        .any(|t| t.category == TaskCategory::Reconciliation)
    {
        out.push(
            "Multiple reconciliation tasks blocked - consider expediting data availability"
                .to_string(),
        );
    }
    if out.is_empty() && critical.is_empty() {
        out.push("No significant blockers identified".to_string());
    }
    out
}
