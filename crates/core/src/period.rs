//! Period model - the root aggregate of one month-end close.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CloseError;
use crate::id::TaskId;
use crate::task::Task;
use crate::Time;

/// A close period and its instantiated tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Period label (e.g. "2025-01")
    pub period: String,

    /// Last day of the period
    pub period_end_date: NaiveDate,

    /// Requested close length in business days
    pub close_days: u32,

    /// Instantiated tasks, in template order
    pub tasks: Vec<Task>,

    /// When the period was initialized
    pub created_at: Time,
}

impl Period {
    /// Look up a task by id.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Look up a task by id for mutation.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}

/// Validate a period label.
///
/// Labels double as storage keys, so only ASCII letters, digits, `-` and `_`
/// are accepted.
pub fn validate_period_label(label: &str) -> Result<(), CloseError> {
    if label.is_empty() {
        return Err(CloseError::validation("Period label must not be empty"));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CloseError::validation(format!(
            "Invalid period label: '{}'",
            label
        )));
    }
    Ok(())
}
