//! Task model - one month-end close activity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CloseError;
use crate::id::TaskId;
use crate::Time;

/// A close task instantiated for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Label of the owning period
    pub period: String,

    /// Task title, unique within a period
    pub name: String,

    /// Category tag
    pub category: TaskCategory,

    /// Template-assigned offset (T+1 = 1)
    pub scheduled_day: u32,

    /// Calendar day the task is due on; differs from `scheduled_day` only
    /// when the close was compressed
    pub calendar_day: u32,

    /// Set when the task was clipped onto the final close day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_note: Option<String>,

    /// Concrete due date
    pub due_date: NaiveDate,

    /// Owner
    pub assigned_to: Option<String>,

    /// Current status
    pub status: TaskStatus,

    /// Tasks that must be COMPLETED first
    pub dependencies: Vec<TaskId>,

    /// Template names of `dependencies`
    #[serde(default)]
    pub dependency_names: Vec<String>,

    /// Free-form notes
    pub notes: Option<String>,

    /// Who completed the task
    pub completed_by: Option<String>,

    /// When the task was completed
    pub completed_at: Option<Time>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Whether the task is past due as of `as_of`.
    pub fn is_late(&self, as_of: NaiveDate) -> bool {
        self.due_date < as_of && self.status != TaskStatus::Completed
    }

    /// Produce the record that results from applying `update` at `now`.
    ///
    /// COMPLETED is terminal: leaving it is a `ValidationError`. Entering it
    /// stamps `completed_at`, which is kept on a repeated completion. When
    /// nothing changes the returned record equals `self`, `updated_at`
    /// included.
    pub fn apply_update(&self, update: &StatusUpdate, now: Time) -> Result<Task, CloseError> {
        if self.status == TaskStatus::Completed && update.new_status != TaskStatus::Completed {
            return Err(CloseError::validation(format!(
                "Task '{}' is COMPLETED and cannot move to {}",
                self.name, update.new_status
            )));
        }

        let mut next = self.clone();
        next.status = update.new_status;

        if let Some(notes) = &update.notes {
            next.notes = Some(notes.clone());
        }

        if update.new_status == TaskStatus::Completed {
            if self.status != TaskStatus::Completed {
                next.completed_at = Some(now);
            }
            if update.completed_by.is_some() {
                next.completed_by = update.completed_by.clone();
            }
        }

        if next != *self {
            next.updated_at = now;
        }
        Ok(next)
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not yet picked up
    NotStarted,
    /// Being worked on
    InProgress,
    /// Done
    Completed,
    /// Waiting on an incomplete dependency
    Blocked,
}

impl TaskStatus {
    /// All statuses, in reporting order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Blocked,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Blocked => "BLOCKED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = CloseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<_> = TaskStatus::ALL.iter().map(|s| s.as_str()).collect();
                CloseError::validation(format!(
                    "Invalid status: {}. Valid: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Close task category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TaskCategory {
    Cash,
    Payroll,
    Accruals,
    Depreciation,
    Amortization,
    Intercompany,
    Reconciliation,
    Revenue,
    Fx,
    Tax,
    Equity,
    Reporting,
    Analysis,
    Review,
    Adjustments,
    Close,
    Process,
}

impl TaskCategory {
    /// Every category.
    pub const ALL: [TaskCategory; 17] = [
        TaskCategory::Cash,
        TaskCategory::Payroll,
        TaskCategory::Accruals,
        TaskCategory::Depreciation,
        TaskCategory::Amortization,
        TaskCategory::Intercompany,
        TaskCategory::Reconciliation,
        TaskCategory::Revenue,
        TaskCategory::Fx,
        TaskCategory::Tax,
        TaskCategory::Equity,
        TaskCategory::Reporting,
        TaskCategory::Analysis,
        TaskCategory::Review,
        TaskCategory::Adjustments,
        TaskCategory::Close,
        TaskCategory::Process,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Cash => "CASH",
            TaskCategory::Payroll => "PAYROLL",
            TaskCategory::Accruals => "ACCRUALS",
            TaskCategory::Depreciation => "DEPRECIATION",
            TaskCategory::Amortization => "AMORTIZATION",
            TaskCategory::Intercompany => "INTERCOMPANY",
            TaskCategory::Reconciliation => "RECONCILIATION",
            TaskCategory::Revenue => "REVENUE",
            TaskCategory::Fx => "FX",
            TaskCategory::Tax => "TAX",
            TaskCategory::Equity => "EQUITY",
            TaskCategory::Reporting => "REPORTING",
            TaskCategory::Analysis => "ANALYSIS",
            TaskCategory::Review => "REVIEW",
            TaskCategory::Adjustments => "ADJUSTMENTS",
            TaskCategory::Close => "CLOSE",
            TaskCategory::Process => "PROCESS",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = CloseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        TaskCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| CloseError::validation(format!("Invalid category: {}", s)))
    }
}

/// A requested status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Target status
    pub new_status: TaskStatus,
    /// Replaces the stored notes when present
    pub notes: Option<String>,
    /// Recorded when entering COMPLETED
    pub completed_by: Option<String>,
    /// Status the caller believes is stored; the update fails with a
    /// conflict when it does not match
    pub expected_status: Option<TaskStatus>,
}

impl StatusUpdate {
    /// Create an update to `new_status` with no metadata.
    pub fn new(new_status: TaskStatus) -> Self {
        Self {
            new_status,
            notes: None,
            completed_by: None,
            expected_status: None,
        }
    }

    /// Attach notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Record who completed the task.
    pub fn with_completed_by(mut self, who: impl Into<String>) -> Self {
        self.completed_by = Some(who.into());
        self
    }

    /// Require the stored status to be `status`.
    pub fn expecting(mut self, status: TaskStatus) -> Self {
        self.expected_status = Some(status);
        self
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, CloseError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        CloseError::validation(format!(
            "Invalid date for {}: '{}' (expected YYYY-MM-DD)",
            field, value
        ))
    })
}
