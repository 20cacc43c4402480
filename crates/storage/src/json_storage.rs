//! JSON file storage implementation.
//!
//! Stores one pretty-printed JSON document per period under
//! `<root>/periods/`. Writers take an exclusive advisory lock on
//! `<label>.lock` for the whole read-check-write, so separate processes
//! sharing a directory serialize on the same period. Every write goes through
//! a uniquely named temp file and a rename, so a reader never sees a
//! half-written period.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use closeman_core::{Period, Task, TaskId, TaskStatus};
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, warn};

use super::trait_::check_expected;
use super::{Result, StorageError, TaskStore};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the `periods/` directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("periods")).await?;

        Ok(Self { root })
    }

    fn period_path(&self, label: &str) -> PathBuf {
        self.root.join("periods").join(format!("{}.json", label))
    }

    fn lock_path(&self, label: &str) -> PathBuf {
        self.root.join("periods").join(format!("{}.lock", label))
    }

    /// Run `f` on the period file while holding its exclusive lock.
    async fn with_period_lock<T, F>(&self, label: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = self.period_path(label);
        let lock_path = self.lock_path(label);

        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            let mut lock = RwLock::new(file);
            let _held = lock.write()?;
            f(&path)
        })
        .await
        .map_err(|e| StorageError::Other(format!("Storage worker failed: {}", e)))?
    }

    async fn all_periods(&self) -> Result<Vec<Period>> {
        list_dir(&self.root.join("periods")).await
    }
}

#[async_trait]
impl TaskStore for JsonStorage {
    async fn create_period(&self, period: &Period) -> Result<()> {
        let owned = period.clone();
        self.with_period_lock(&period.period, move |path| {
            if path.exists() {
                return Err(StorageError::AlreadyExists(owned.period));
            }
            write_period(path, &owned)
        })
        .await?;

        debug!(period = %period.period, tasks = period.tasks.len(), "Wrote period file");
        Ok(())
    }

    async fn load_period(&self, period: &str) -> Result<Option<Period>> {
        read_json(&self.period_path(period)).await
    }

    async fn list_periods(&self) -> Result<Vec<String>> {
        let mut labels: Vec<_> = self
            .all_periods()
            .await?
            .into_iter()
            .map(|p| p.period)
            .collect();
        labels.sort();
        Ok(labels)
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self
            .all_periods()
            .await?
            .into_iter()
            .find_map(|p| p.task(id).cloned()))
    }

    async fn update_task(&self, task: &Task, expected: Option<TaskStatus>) -> Result<()> {
        let task = task.clone();
        let label = task.period.clone();
        self.with_period_lock(&label, move |path| {
            let mut period = read_period(path)?
                .ok_or_else(|| StorageError::NotFound(format!("Period '{}'", task.period)))?;
            let stored = period
                .task_mut(task.id)
                .ok_or_else(|| StorageError::NotFound(format!("Task {}", task.id)))?;

            check_expected(stored, expected)?;
            *stored = task;
            write_period(path, &period)
        })
        .await
    }
}

/// Blocking read used inside the period lock.
fn read_period(path: &Path) -> Result<Option<Period>> {
    match File::open(path) {
        Ok(file) => Ok(Some(serde_json::from_reader(std::io::BufReader::new(file))?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `period` to a fresh temp file next to `path`, then rename it over.
fn write_period(path: &Path, period: &Period) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Other(format!("No parent for {}", path.display())))?;
    let json = serde_json::to_string_pretty(period)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!(path = %entry.path().display(), "Skipping unreadable file: {}", e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::sample_period;

    #[tokio::test]
    async fn test_period_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let period = sample_period("2025-01");
        {
            let storage = JsonStorage::new(dir.path()).await.unwrap();
            storage.create_period(&period).await.unwrap();
        }

        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let loaded = storage.load_period("2025-01").await.unwrap().unwrap();
        assert_eq!(loaded, period);
        assert_eq!(storage.list_periods().await.unwrap(), vec!["2025-01".to_string()]);
    }

    #[tokio::test]
    async fn test_create_existing_period_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let period = sample_period("2025-01");
        storage.create_period(&period).await.unwrap();

        let err = storage.create_period(&period).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_task_writes_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let period = sample_period("2025-01");
        storage.create_period(&period).await.unwrap();

        let mut task = period.tasks[1].clone();
        task.status = TaskStatus::Blocked;
        task.notes = Some("waiting on statements".into());
        storage
            .update_task(&task, Some(TaskStatus::NotStarted))
            .await
            .unwrap();

        let loaded = storage.load_period("2025-01").await.unwrap().unwrap();
        assert_eq!(loaded.tasks[0], period.tasks[0]);
        assert_eq!(loaded.tasks[1], task);
        assert_eq!(storage.load_task(task.id).await.unwrap().unwrap(), task);
    }

    #[tokio::test]
    async fn test_conflicting_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let period = sample_period("2025-01");
        storage.create_period(&period).await.unwrap();

        let mut task = period.tasks[0].clone();
        task.status = TaskStatus::Completed;
        let err = storage
            .update_task(&task, Some(TaskStatus::InProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let loaded = storage.load_period("2025-01").await.unwrap().unwrap();
        assert_eq!(loaded, period);
    }

    #[tokio::test]
    async fn test_missing_period_and_task() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.load_period("2024-12").await.unwrap().is_none());
        assert!(storage.load_task(TaskId::new()).await.unwrap().is_none());

        let period = sample_period("2024-12");
        let err = storage.update_task(&period.tasks[0], None).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_handles_sharing_a_directory_keep_both_updates() {
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let second = Arc::new(JsonStorage::new(dir.path()).await.unwrap());

        for round in 0..25 {
            let label = format!("round-{}", round);
            let period = sample_period(&label);
            first.create_period(&period).await.unwrap();

            let mut cash = period.tasks[0].clone();
            cash.status = TaskStatus::InProgress;
            let mut bank = period.tasks[1].clone();
            bank.status = TaskStatus::Blocked;

            let a = {
                let store = Arc::clone(&first);
                tokio::spawn(async move { store.update_task(&cash, Some(TaskStatus::NotStarted)).await })
            };
            let b = {
                let store = Arc::clone(&second);
                tokio::spawn(async move { store.update_task(&bank, Some(TaskStatus::NotStarted)).await })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let loaded = second.load_period(&label).await.unwrap().unwrap();
            assert_eq!(loaded.tasks[0].status, TaskStatus::InProgress, "{}", label);
            assert_eq!(loaded.tasks[1].status, TaskStatus::Blocked, "{}", label);
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("periods"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                !matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("json") | Some("lock")
                )
            })
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let second = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let period = sample_period("2025-01");

        let a = {
            let (store, period) = (Arc::clone(&first), period.clone());
            tokio::spawn(async move { store.create_period(&period).await })
        };
        let b = {
            let (store, period) = (Arc::clone(&second), period.clone());
            tokio::spawn(async move { store.create_period(&period).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StorageError::AlreadyExists(_)))));
        assert_eq!(first.load_period("2025-01").await.unwrap().unwrap(), period);
    }
}
