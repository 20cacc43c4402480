//! Closeman core data models.
//!
//! This crate defines the task, period and error types shared by the
//! month-end close engine.

#![warn(missing_docs)]

mod error;
mod id;
mod period;
mod task;

pub use error::{CloseError, Result};
pub use id::TaskId;
pub use period::{validate_period_label, Period};
pub use task::{parse_date, StatusUpdate, Task, TaskCategory, TaskStatus};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
