//! In-memory storage implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use closeman_core::{Period, Task, TaskId, TaskStatus};
use tokio::sync::RwLock;
use tracing::debug;

use super::trait_::check_expected;
use super::{Result, StorageError, TaskStore};

/// Ephemeral store keeping periods in a map.
///
/// Used by tests and by the CLI's `--memory` mode.
#[derive(Default)]
pub struct MemoryStorage {
    periods: RwLock<HashMap<String, Period>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStorage {
    async fn create_period(&self, period: &Period) -> Result<()> {
        let mut periods = self.periods.write().await;
        if periods.contains_key(&period.period) {
            return Err(StorageError::AlreadyExists(period.period.clone()));
        }
        periods.insert(period.period.clone(), period.clone());
        debug!(period = %period.period, tasks = period.tasks.len(), "Stored period");
        Ok(())
    }

    async fn load_period(&self, period: &str) -> Result<Option<Period>> {
        Ok(self.periods.read().await.get(period).cloned())
    }

    async fn list_periods(&self) -> Result<Vec<String>> {
        let mut labels: Vec<_> = self.periods.read().await.keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self
            .periods
            .read()
            .await
            .values()
            .find_map(|p| p.task(id).cloned()))
    }

    async fn update_task(&self, task: &Task, expected: Option<TaskStatus>) -> Result<()> {
        let mut periods = self.periods.write().await;
        let stored = periods
            .get_mut(&task.period)
            .and_then(|p| p.task_mut(task.id))
            .ok_or_else(|| StorageError::NotFound(format!("Task {}", task.id)))?;

        check_expected(stored, expected)?;
        *stored = task.clone();
        Ok(())
    }
}
