//! Request parsing.

use std::collections::HashMap;

use closeman_core::{CloseError, TaskCategory};
use serde::Deserialize;
use serde_json::Value;

/// Every operation name the engine accepts.
pub const OPERATIONS: [&str; 6] = [
    "initialize_close_tasks",
    "update_task_status",
    "get_close_progress",
    "identify_blockers",
    "generate_close_calendar",
    "get_critical_path",
];

/// A single engine request, discriminated by its `operation` field.
///
/// Dates and enum values stay as strings here; the manager parses them so
/// that bad values surface as `ValidationError` with a field name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Request {
    /// Instantiate the close template for a period and persist it
    InitializeCloseTasks {
        period: String,
        period_end_date: String,
        #[serde(default)]
        close_days: Option<u32>,
        /// Category name -> assignee
        #[serde(default)]
        assignees: HashMap<String, String>,
    },

    /// Lay the template out on business days without touching the store
    GenerateCloseCalendar {
        period: String,
        period_end_date: String,
        #[serde(default)]
        close_days: Option<u32>,
    },

    /// Transition one task
    UpdateTaskStatus {
        task_id: String,
        new_status: String,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        completed_by: Option<String>,
        #[serde(default)]
        expected_status: Option<String>,
    },

    /// Counts, late tasks and health
    GetCloseProgress {
        period: String,
        /// Evaluation date, defaults to today
        #[serde(default)]
        as_of: Option<String>,
    },

    /// Blocked tasks and ranked blockers
    IdentifyBlockers { period: String },

    /// Longest dependency chain
    GetCriticalPath { period: String },
}

impl Request {
    /// Parse a raw JSON request, unwrapping an `{"input": {...}}` wrapper if
    /// present.
    pub fn from_value(value: Value) -> Result<Self, CloseError> {
        let body = match value {
            Value::Object(mut map) if !map.contains_key("operation") => {
                match map.remove("input") {
                    Some(inner) => inner,
                    None => Value::Object(map),
                }
            }
            other => other,
        };

        let operation = body
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| CloseError::validation("Missing required field: operation"))?
            .to_string();
        if !OPERATIONS.contains(&operation.as_str()) {
            return Err(CloseError::validation(format!(
                "Unknown operation: {}. Valid operations: {}",
                operation,
                OPERATIONS.join(", ")
            )));
        }

        serde_json::from_value(body)
            .map_err(|e| CloseError::validation(format!("Invalid {} request: {}", operation, e)))
    }

    /// Parse a request from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CloseError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CloseError::validation(format!("Malformed JSON request: {}", e)))?;
        Self::from_value(value)
    }

    /// The operation name, as echoed in the success envelope.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::InitializeCloseTasks { .. } => "initialize_close_tasks",
            Request::GenerateCloseCalendar { .. } => "generate_close_calendar",
            Request::UpdateTaskStatus { .. } => "update_task_status",
            Request::GetCloseProgress { .. } => "get_close_progress",
            Request::IdentifyBlockers { .. } => "identify_blockers",
            Request::GetCriticalPath { .. } => "get_critical_path",
        }
    }
}

/// Turn a `{category: assignee}` map into typed keys.
pub fn parse_assignees(
    raw: &HashMap<String, String>,
) -> Result<HashMap<TaskCategory, String>, CloseError> {
    raw.iter()
        .map(|(category, who)| Ok::<_, CloseError>((category.parse::<TaskCategory>()?, who.clone())))
        .collect()
}
