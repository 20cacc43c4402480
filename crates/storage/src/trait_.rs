//! Storage trait abstraction.

use async_trait::async_trait;
use closeman_core::{CloseError, Period, Task, TaskId, TaskStatus};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("{0}")]
    NotFound(String),

    /// Period already initialized
    #[error("Period '{0}' is already initialized")]
    AlreadyExists(String),

    /// Compare-and-swap lost: the stored status differs from the expected one
    #[error("Task {task_id} has status {actual}, expected {expected}")]
    Conflict {
        /// Task being updated
        task_id: TaskId,
        /// Status the caller expected
        expected: TaskStatus,
        /// Status actually stored
        actual: TaskStatus,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<StorageError> for CloseError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => CloseError::NotFound(what),
            StorageError::AlreadyExists(_) | StorageError::Conflict { .. } => {
                CloseError::Conflict(err.to_string())
            }
            StorageError::Io(_) | StorageError::Json(_) | StorageError::Other(_) => {
                CloseError::Storage(err.to_string())
            }
        }
    }
}

/// External task store shared by every engine invocation.
///
/// The store is the only shared mutable state: implementations must make
/// `update_task` an atomic per-row compare-and-swap.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // === Period operations ===

    /// Persist a freshly initialized period. Fails with `AlreadyExists` if
    /// the label is taken.
    async fn create_period(&self, period: &Period) -> Result<()>;

    /// Load a period with all of its tasks.
    async fn load_period(&self, period: &str) -> Result<Option<Period>>;

    /// Labels of every stored period, sorted.
    async fn list_periods(&self) -> Result<Vec<String>>;

    // === Task operations ===

    /// Load a task by ID.
    async fn load_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Replace a stored task row.
    ///
    /// When `expected` is given the write only happens if the stored status
    /// still equals it; otherwise `Conflict` is returned and nothing changes.
    async fn update_task(&self, task: &Task, expected: Option<TaskStatus>) -> Result<()>;
}

/// Apply the compare-and-swap check shared by all backends.
pub(crate) fn check_expected(stored: &Task, expected: Option<TaskStatus>) -> Result<()> {
    match expected {
        Some(expected) if stored.status != expected => Err(StorageError::Conflict {
            task_id: stored.id,
            expected,
            actual: stored.status,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_close_errors() {
        let not_found: CloseError = StorageError::NotFound("Period '2025-01'".into()).into();
        assert_eq!(not_found.kind(), "NotFoundError");

        let exists: CloseError = StorageError::AlreadyExists("2025-01".into()).into();
        assert_eq!(exists.kind(), "ConflictError");

        let conflict: CloseError = StorageError::Conflict {
            task_id: TaskId::new(),
            expected: TaskStatus::InProgress,
            actual: TaskStatus::Completed,
        }
        .into();
        assert_eq!(conflict.kind(), "ConflictError");
        assert!(conflict.to_string().contains("expected IN_PROGRESS"));

        let other: CloseError = StorageError::Other("disk".into()).into();
        assert_eq!(other.kind(), "StorageError");
    }
}
