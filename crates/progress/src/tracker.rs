//! Close progress and health.

use chrono::NaiveDate;
use closeman_core::{CloseError, Task, TaskCategory, TaskId, TaskStatus, Time};
use serde::{Deserialize, Serialize};

/// Thresholds that turn blocked/late counts into a health rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// Blocked or late count at which the close needs attention
    pub attention_threshold: usize,
    /// Blocked or late count at which the close is at risk
    pub at_risk_threshold: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            attention_threshold: 1,
            at_risk_threshold: 3,
        }
    }
}

impl HealthPolicy {
    /// Reject thresholds that cannot be ordered sensibly.
    pub fn validate(&self) -> Result<(), CloseError> {
        if self.attention_threshold == 0 {
            return Err(CloseError::validation(
                "health.attention_threshold must be at least 1",
            ));
        }
        if self.at_risk_threshold < self.attention_threshold {
            return Err(CloseError::validation(format!(
                "health.at_risk_threshold ({}) must not be below attention_threshold ({})",
                self.at_risk_threshold, self.attention_threshold
            )));
        }
        Ok(())
    }

    /// Rate a close with `blocked` blocked and `late` late tasks.
    pub fn assess(&self, blocked: usize, late: usize) -> Health {
        let worst = blocked.max(late);
        let (status, message) = if worst >= self.at_risk_threshold {
            (
                HealthStatus::AtRisk,
                "Close is at risk due to blocked or late tasks",
            )
        } else if worst >= self.attention_threshold {
            (
                HealthStatus::NeedsAttention,
                "Close needs attention - some tasks behind schedule",
            )
        } else {
            (HealthStatus::OnTrack, "Close is on track")
        };

        Health {
            status,
            message: message.to_string(),
            risk_factors: RiskFactors {
                blocked_tasks: blocked,
                late_tasks: late,
            },
        }
    }
}

/// Overall health rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Nothing blocked or late
    OnTrack,
    /// Some tasks blocked or late
    NeedsAttention,
    /// Enough blocked or late tasks to threaten the target date
    AtRisk,
}

/// Inputs behind the rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskFactors {
    /// Tasks in BLOCKED status
    pub blocked_tasks: usize,
    /// Incomplete tasks past their due date
    pub late_tasks: usize,
}

/// Health assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    /// Rating
    pub status: HealthStatus,
    /// Human-readable summary
    pub message: String,
    /// Counts behind the rating
    pub risk_factors: RiskFactors,
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    /// Total tasks in the period
    pub total_tasks: usize,
    /// COMPLETED
    pub completed: usize,
    /// IN_PROGRESS
    pub in_progress: usize,
    /// NOT_STARTED
    pub not_started: usize,
    /// BLOCKED
    pub blocked: usize,
    /// round(100 * completed / total), 0 for an empty period
    pub completion_percentage: u32,
}

/// Status line for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    /// Task id
    pub id: TaskId,
    /// Task name
    pub name: String,
    /// Category tag
    pub category: TaskCategory,
    /// Template day
    pub scheduled_day: u32,
    /// Current status
    pub status: TaskStatus,
    /// Due date
    pub due_date: NaiveDate,
    /// Completion timestamp
    pub completed_at: Option<Time>,
    /// Owner
    pub assigned_to: Option<String>,
    /// Past due and not completed
    pub is_late: bool,
}

/// Progress snapshot for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    /// Date lateness was evaluated against
    pub as_of: NaiveDate,
    /// Aggregate counts
    pub progress: ProgressCounts,
    /// Late tasks, by scheduled day then name
    pub late_tasks: Vec<TaskProgress>,
    /// `late_tasks.len()`
    pub late_task_count: usize,
    /// Every task, by scheduled day then name
    pub tasks: Vec<TaskProgress>,
    /// Health rating
    pub health: Health,
}

/// Aggregates a status snapshot into a progress report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressAggregator {
    policy: HealthPolicy,
}

impl ProgressAggregator {
    /// Create an aggregator using `policy` for the health rating.
    pub fn new(policy: HealthPolicy) -> Self {
        Self { policy }
    }

    /// Summarize `tasks` as of `as_of`.
    pub fn aggregate(&self, tasks: &[Task], as_of: NaiveDate) -> ProgressReport {
        let mut counts = ProgressCounts {
            total_tasks: tasks.len(),
            ..Default::default()
        };

        let mut rows: Vec<TaskProgress> = tasks
            .iter()
            .map(|task| {
                match task.status {
                    TaskStatus::Completed => counts.completed += 1,
                    TaskStatus::InProgress => counts.in_progress += 1,
                    TaskStatus::NotStarted => counts.not_started += 1,
                    TaskStatus::Blocked => counts.blocked += 1,
                }
                TaskProgress {
                    id: task.id,
                    name: task.name.clone(),
                    category: task.category,
                    scheduled_day: task.scheduled_day,
                    status: task.status,
                    due_date: task.due_date,
                    completed_at: task.completed_at,
                    assigned_to: task.assigned_to.clone(),
                    is_late: task.is_late(as_of),
                }
            })
            .collect();
        rows.sort_by(|a, b| (a.scheduled_day, &a.name).cmp(&(b.scheduled_day, &b.name)));

        if counts.total_tasks > 0 {
            counts.completion_percentage =
                ((100.0 * counts.completed as f64) / counts.total_tasks as f64).round() as u32;
        }

        let late_tasks: Vec<TaskProgress> = rows.iter().filter(|t| t.is_late).cloned().collect();
        let health = self.policy.assess(counts.blocked, late_tasks.len());

        ProgressReport {
            as_of,
            progress: counts,
            late_task_count: late_tasks.len(),
            late_tasks,
            tasks: rows,
            health,
        }
    }
}
