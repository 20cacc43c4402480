//! Close manager - dispatches requests over an injected task store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use closeman_core::{
    parse_date, validate_period_label, CloseError, Period, StatusUpdate, Task, TaskCategory,
    TaskId, TaskStatus,
};
use closeman_progress::{
    BlockerAnalyzer, BlockerReport, CriticalPathAnalyzer, CriticalPathReport, ProgressAggregator,
    ProgressReport,
};
use closeman_schedule::{CloseCalendar, DependencyGraph, PeriodPlanner};
use closeman_storage::TaskStore;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::envelope::Envelope;
use crate::request::{parse_assignees, Request};

/// Tasks due on one close day.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledDay {
    /// "T+n"
    pub day: String,
    /// 1-based index
    pub day_index: u32,
    /// Business date
    pub date: NaiveDate,
    /// Weekday name
    pub day_of_week: String,
    /// Tasks due that day
    pub tasks: Vec<Task>,
}

/// Task count for one close day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    /// "T+n"
    pub day: String,
    /// Tasks due that day
    pub task_count: usize,
}

/// Counts returned with a freshly initialized period.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeSummary {
    /// Total tasks created
    pub total_tasks: usize,
    /// Count per category name
    pub tasks_by_category: BTreeMap<&'static str, usize>,
    /// Count per close day, in day order
    pub tasks_by_day: Vec<DayCount>,
    /// Tasks clipped onto the final day
    pub compressed_tasks: usize,
}

/// Result of `initialize_close_tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    /// Period label
    pub period: String,
    /// Last day of the period
    pub period_end_date: NaiveDate,
    /// Close length
    pub close_days: u32,
    /// Tasks grouped by close day
    pub schedule: Vec<ScheduledDay>,
    /// Every task, in template order
    pub all_tasks: Vec<Task>,
    /// Counts
    pub summary: InitializeSummary,
}

/// Result of `generate_close_calendar`.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarResult {
    /// The calendar
    #[serde(flatten)]
    pub calendar: CloseCalendar,
    /// Fixed-width text rendering
    pub text_format: String,
}

/// Result of `update_task_status`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    /// The stored record after the update
    #[serde(flatten)]
    pub task: Task,
    /// Status before the update
    pub previous_status: TaskStatus,
    /// False when the update was a no-op
    pub changed: bool,
}

/// An analysis result tagged with its period.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodReport<T> {
    /// Period label
    pub period: String,
    /// The analysis
    #[serde(flatten)]
    pub report: T,
}

/// Runs close operations against a task store.
///
/// Each call is independent: the period is read from the store, analyzed in
/// memory and, for the two mutating operations, written back.
pub struct CloseManager<S: TaskStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    planner: PeriodPlanner,
}

impl<S: TaskStore + ?Sized> CloseManager<S> {
    /// Create a manager over `store` using the standard close template.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            planner: PeriodPlanner::default(),
        }
    }

    /// Replace the planner (and so the template it instantiates).
    pub fn with_planner(mut self, planner: PeriodPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle a raw JSON request and wrap the outcome in an envelope.
    pub async fn handle(&self, raw: Value) -> Envelope {
        let request = match Request::from_value(raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(kind = e.kind(), "Rejected request: {}", e);
                return Envelope::error(&e);
            }
        };

        let operation = request.operation();
        match self.execute(request).await {
            Ok(data) => Envelope::success(operation, data),
            Err(e) => {
                warn!(operation, kind = e.kind(), "Operation failed: {}", e);
                Envelope::error(&e)
            }
        }
    }

    /// Handle one JSON request line.
    pub async fn handle_json(&self, json: &str) -> Envelope {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => self.handle(value).await,
            Err(e) => Envelope::error(&CloseError::validation(format!(
                "Malformed JSON request: {}",
                e
            ))),
        }
    }

    /// Run a parsed request and return its `data` payload.
    pub async fn execute(&self, request: Request) -> Result<Value, CloseError> {
        match request {
            Request::InitializeCloseTasks {
                period,
                period_end_date,
                close_days,
                assignees,
            } => {
                let end = parse_date("period_end_date", &period_end_date)?;
                let assignees = parse_assignees(&assignees)?;
                to_data(
                    self.initialize_close_tasks(&period, end, close_days, &assignees)
                        .await?,
                )
            }
            Request::GenerateCloseCalendar {
                period,
                period_end_date,
                close_days,
            } => {
                let end = parse_date("period_end_date", &period_end_date)?;
                to_data(self.generate_close_calendar(&period, end, close_days)?)
            }
            Request::UpdateTaskStatus {
                task_id,
                new_status,
                notes,
                completed_by,
                expected_status,
            } => {
                let id: TaskId = task_id
                    .parse()
                    .map_err(|_| CloseError::validation(format!("Invalid task_id: {}", task_id)))?;
                let mut update = StatusUpdate::new(new_status.parse()?);
                update.notes = notes;
                update.completed_by = completed_by;
                if let Some(expected) = expected_status {
                    update = update.expecting(expected.parse()?);
                }
                to_data(self.update_task_status(id, &update).await?)
            }
            Request::GetCloseProgress { period, as_of } => {
                let as_of = match as_of {
                    Some(raw) => parse_date("as_of", &raw)?,
                    None => Utc::now().date_naive(),
                };
                to_data(self.get_close_progress(&period, as_of).await?)
            }
            Request::IdentifyBlockers { period } => to_data(self.identify_blockers(&period).await?),
            Request::GetCriticalPath { period } => to_data(self.get_critical_path(&period).await?),
        }
    }

    /// Instantiate the template for `period` and persist it.
    ///
    /// Fails with `ConflictError` if the period was already initialized.
    pub async fn initialize_close_tasks(
        &self,
        period: &str,
        period_end: NaiveDate,
        close_days: Option<u32>,
        assignees: &HashMap<TaskCategory, String>,
    ) -> Result<InitializeResult, CloseError> {
        validate_period_label(period)?;
        let close_days = self.resolve_close_days(close_days)?;
        info!(period, %period_end, close_days, "Initializing close tasks");

        let plan = self
            .planner
            .plan(period, period_end, close_days, assignees, Utc::now())?;
        self.store.create_period(&plan.period).await?;

        let schedule: Vec<ScheduledDay> = plan
            .calendar
            .iter()
            .map(|day| ScheduledDay {
                day: format!("T+{}", day.day_index),
                day_index: day.day_index,
                date: day.date,
                day_of_week: day.weekday.clone(),
                tasks: plan.tasks_on(day.day_index).cloned().collect(),
            })
            .collect();

        let mut tasks_by_category = BTreeMap::new();
        for task in &plan.period.tasks {
            *tasks_by_category.entry(task.category.as_str()).or_insert(0) += 1;
        }

        let summary = InitializeSummary {
            total_tasks: plan.period.tasks.len(),
            tasks_by_category,
            tasks_by_day: schedule
                .iter()
                .map(|d| DayCount {
                    day: d.day.clone(),
                    task_count: d.tasks.len(),
                })
                .collect(),
            compressed_tasks: plan
                .period
                .tasks
                .iter()
                .filter(|t| t.compression_note.is_some())
                .count(),
        };

        Ok(InitializeResult {
            period: plan.period.period.clone(),
            period_end_date: period_end,
            close_days,
            schedule,
            all_tasks: plan.period.tasks,
            summary,
        })
    }

    /// Lay the template out on business days. Does not touch the store.
    pub fn generate_close_calendar(
        &self,
        period: &str,
        period_end: NaiveDate,
        close_days: Option<u32>,
    ) -> Result<CalendarResult, CloseError> {
        validate_period_label(period)?;
        let close_days = self.resolve_close_days(close_days)?;
        info!(period, %period_end, close_days, "Generating close calendar");

        let calendar = CloseCalendar::build(period, period_end, close_days, self.planner.catalog())?;
        Ok(CalendarResult {
            text_format: calendar.render_text(),
            calendar,
        })
    }

    /// Transition one task.
    ///
    /// The write is a compare-and-swap against the status that was read, so
    /// a concurrent update surfaces as `ConflictError` instead of being lost.
    pub async fn update_task_status(
        &self,
        task_id: TaskId,
        update: &StatusUpdate,
    ) -> Result<UpdateResult, CloseError> {
        info!(%task_id, status = %update.new_status, "Updating task status");

        let stored = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| CloseError::NotFound(format!("Task {}", task_id)))?;

        if let Some(expected) = update.expected_status {
            if stored.status != expected {
                return Err(CloseError::Conflict(format!(
                    "Task {} has status {}, expected {}",
                    task_id, stored.status, expected
                )));
            }
        }

        let next = stored.apply_update(update, Utc::now())?;
        if next == stored {
            debug!(%task_id, "Update is a no-op");
            return Ok(UpdateResult {
                previous_status: stored.status,
                task: stored,
                changed: false,
            });
        }

        self.store.update_task(&next, Some(stored.status)).await?;
        Ok(UpdateResult {
            task: next,
            previous_status: stored.status,
            changed: true,
        })
    }

    /// Progress counts, late tasks and health as of `as_of`.
    pub async fn get_close_progress(
        &self,
        period: &str,
        as_of: NaiveDate,
    ) -> Result<PeriodReport<ProgressReport>, CloseError> {
        info!(period, %as_of, "Getting close progress");
        let stored = self.load_period(period).await?;
        let report = ProgressAggregator::new(self.config.health).aggregate(&stored.tasks, as_of);
        Ok(PeriodReport {
            period: stored.period,
            report,
        })
    }

    /// Blocked tasks and ranked critical blockers.
    pub async fn identify_blockers(
        &self,
        period: &str,
    ) -> Result<PeriodReport<BlockerReport>, CloseError> {
        info!(period, "Identifying blockers");
        let stored = self.load_period(period).await?;
        let graph = build_graph(&stored)?;
        let report = BlockerAnalyzer::new(&graph).analyze(&stored.tasks);
        Ok(PeriodReport {
            period: stored.period,
            report,
        })
    }

    /// Longest dependency chain of the period's tasks.
    pub async fn get_critical_path(
        &self,
        period: &str,
    ) -> Result<PeriodReport<CriticalPathReport>, CloseError> {
        info!(period, "Analyzing critical path");
        let stored = self.load_period(period).await?;
        let graph = build_graph(&stored)?;
        let report = CriticalPathAnalyzer::new(&graph).analyze();
        Ok(PeriodReport {
            period: stored.period,
            report,
        })
    }

    /// Labels of every initialized period.
    pub async fn list_periods(&self) -> Result<Vec<String>, CloseError> {
        Ok(self.store.list_periods().await?)
    }

    fn resolve_close_days(&self, requested: Option<u32>) -> Result<u32, CloseError> {
        self.config
            .check_close_days(requested.unwrap_or(self.config.default_close_days))
    }

    async fn load_period(&self, period: &str) -> Result<Period, CloseError> {
        validate_period_label(period)?;
        match self.store.load_period(period).await? {
            Some(stored) if !stored.tasks.is_empty() => Ok(stored),
            _ => Err(CloseError::NotFound(format!(
                "No close tasks for period '{}'",
                period
            ))),
        }
    }
}

fn build_graph(period: &Period) -> Result<DependencyGraph, CloseError> {
    let graph = DependencyGraph::from_tasks(&period.tasks)?;
    if !graph.dangling_edges().is_empty() {
        warn!(
            period = %period.period,
            dangling = graph.dangling_edges().len(),
            "Stored tasks reference missing dependencies"
        );
    }
    Ok(graph)
}

fn to_data<T: Serialize>(result: T) -> Result<Value, CloseError> {
    serde_json::to_value(result)
        .map_err(|e| CloseError::Storage(format!("Cannot serialize result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use closeman_progress::{analyze_template, HealthStatus};
    use closeman_schedule::TemplateCatalog;
    use closeman_storage::{JsonStorage, MemoryStorage};
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn manager() -> CloseManager<MemoryStorage> {
        CloseManager::new(Arc::new(MemoryStorage::new()), EngineConfig::default())
    }

    async fn initialized(manager: &CloseManager<MemoryStorage>) -> HashMap<String, TaskId> {
        let result = manager
            .initialize_close_tasks("2025-01", date(2025, 1, 31), None, &HashMap::new())
            .await
            .unwrap();
        result
            .all_tasks
            .into_iter()
            .map(|t| (t.name, t.id))
            .collect()
    }

    async fn set(manager: &CloseManager<MemoryStorage>, id: TaskId, status: TaskStatus) {
        manager
            .update_task_status(id, &StatusUpdate::new(status))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initialize_close_tasks() {
        let manager = manager();
        let mut assignees = HashMap::new();
        assignees.insert(TaskCategory::Reconciliation, "recon-team".to_string());

        let result = manager
            .initialize_close_tasks("2025-01", date(2025, 1, 31), Some(5), &assignees)
            .await
            .unwrap();

        assert_eq!(result.all_tasks.len(), 25);
        assert_eq!(result.schedule.len(), 5);
        assert_eq!(result.schedule[0].date, date(2025, 2, 3));
        assert_eq!(result.schedule[0].day_of_week, "Monday");
        let per_day: Vec<_> = result.summary.tasks_by_day.iter().map(|d| d.task_count).collect();
        assert_eq!(per_day, vec![6, 6, 5, 5, 3]);
        assert_eq!(result.summary.tasks_by_category["RECONCILIATION"], 4);
        assert_eq!(result.summary.tasks_by_category["REPORTING"], 3);
        assert_eq!(result.summary.compressed_tasks, 0);
        assert!(result
            .all_tasks
            .iter()
            .filter(|t| t.category == TaskCategory::Reconciliation)
            .all(|t| t.assigned_to.as_deref() == Some("recon-team")));

        assert_eq!(manager.list_periods().await.unwrap(), vec!["2025-01".to_string()]);
    }

    #[tokio::test]
    async fn test_reinitialize_is_conflict() {
        let manager = manager();
        initialized(&manager).await;

        let err = manager
            .initialize_close_tasks("2025-01", date(2025, 1, 31), None, &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConflictError");
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_input() {
        let manager = manager();
        for (label, days) in [("2025/01", Some(5)), ("2025-01", Some(0)), ("2025-01", Some(31))] {
            let err = manager
                .initialize_close_tasks(label, date(2025, 1, 31), days, &HashMap::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "ValidationError");
        }
        assert!(manager.list_periods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compressed_initialize() {
        let manager = manager();
        let result = manager
            .initialize_close_tasks("2025-01", date(2025, 1, 31), Some(3), &HashMap::new())
            .await
            .unwrap();
        assert_eq!(result.schedule.len(), 3);
        assert_eq!(result.summary.compressed_tasks, 8);
        assert_eq!(result.schedule[2].tasks.len(), 13);
    }

    #[tokio::test]
    async fn test_calendar_is_pure() {
        let manager = manager();
        let result = manager
            .generate_close_calendar("2025-01", date(2025, 1, 31), None)
            .unwrap();

        assert_eq!(result.calendar.close_start_date, date(2025, 2, 3));
        assert_eq!(result.calendar.target_close_date, date(2025, 2, 7));
        assert!(result.text_format.starts_with("CLOSE CALENDAR: 2025-01\n"));
        assert!(manager.list_periods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let manager = manager();
        let ids = initialized(&manager).await;
        let cash = ids["Record cash receipts and disbursements"];

        let update = StatusUpdate::new(TaskStatus::Completed).with_completed_by("controller");
        let first = manager.update_task_status(cash, &update).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.previous_status, TaskStatus::NotStarted);
        assert!(first.task.completed_at.is_some());
        assert_eq!(first.task.completed_by.as_deref(), Some("controller"));

        let second = manager.update_task_status(cash, &update).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.task, first.task);

        let err = manager
            .update_task_status(cash, &StatusUpdate::new(TaskStatus::InProgress))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        let stored = manager.store.load_task(cash).await.unwrap().unwrap();
        assert_eq!(stored, first.task);
    }

    #[tokio::test]
    async fn test_expected_status_mismatch_leaves_task_untouched() {
        let manager = manager();
        let ids = initialized(&manager).await;
        let bank = ids["Complete bank reconciliation"];

        let update = StatusUpdate::new(TaskStatus::Completed).expecting(TaskStatus::InProgress);
        let err = manager.update_task_status(bank, &update).await.unwrap_err();
        assert_eq!(err.kind(), "ConflictError");

        let progress = manager
            .get_close_progress("2025-01", date(2025, 2, 1))
            .await
            .unwrap();
        assert_eq!(progress.report.progress.completed, 0);
    }

    #[tokio::test]
    async fn test_update_unknown_task() {
        let manager = manager();
        initialized(&manager).await;
        let err = manager
            .update_task_status(TaskId::new(), &StatusUpdate::new(TaskStatus::Completed))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }

    #[tokio::test]
    async fn test_progress_as_of() {
        let manager = manager();
        let ids = initialized(&manager).await;
        set(&manager, ids["Post payroll entries"], TaskStatus::Completed).await;

        let early = manager
            .get_close_progress("2025-01", date(2025, 2, 1))
            .await
            .unwrap();
        assert_eq!(early.report.progress.completion_percentage, 4);
        assert_eq!(early.report.health.status, HealthStatus::OnTrack);

        // T+1 and T+2 are due 2025-02-03 and 2025-02-04.
        let late = manager
            .get_close_progress("2025-01", date(2025, 2, 5))
            .await
            .unwrap();
        assert_eq!(late.report.late_task_count, 11);
        assert_eq!(late.report.health.status, HealthStatus::AtRisk);
    }

    #[tokio::test]
    async fn test_bank_reconciliation_blocks_close() {
        let manager = manager();
        let ids = initialized(&manager).await;

        for name in [
            "Record cash receipts and disbursements",
            "Run AP accruals",
            "Post revenue recognition entries",
            "Complete AR subledger reconciliation",
            "Complete AP subledger reconciliation",
        ] {
            set(&manager, ids[name], TaskStatus::Completed).await;
        }
        set(&manager, ids["Complete bank reconciliation"], TaskStatus::InProgress).await;
        for name in [
            "Complete all balance sheet reconciliations",
            "Post reconciliation adjustments",
            "Run preliminary trial balance",
        ] {
            set(&manager, ids[name], TaskStatus::Blocked).await;
        }

        let blockers = manager.identify_blockers("2025-01").await.unwrap().report;
        assert_eq!(blockers.blocked_count, 3);
        let ranked: Vec<_> = blockers
            .critical_blockers
            .iter()
            .map(|b| (b.task_name.as_str(), b.blocking_count))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("Complete bank reconciliation", 3),
                ("Complete all balance sheet reconciliations", 2),
                ("Post reconciliation adjustments", 1),
            ]
        );
        assert_eq!(
            blockers.recommendations[0],
            "Priority: Complete 'Complete bank reconciliation' - it is blocking 3 other tasks"
        );
    }

    #[tokio::test]
    async fn test_critical_path_matches_template() {
        let manager = manager();
        initialized(&manager).await;

        let stored = manager.get_critical_path("2025-01").await.unwrap().report;
        let template = analyze_template(&TemplateCatalog::standard()).unwrap();
        assert_eq!(stored.minimum_close_days, 5);
        assert_eq!(stored.path_length, 12);
        assert_eq!(stored.critical_path, template.critical_path);
        assert_eq!(stored.minimum_close_days, template.minimum_close_days);
    }

    #[tokio::test]
    async fn test_analyses_on_unknown_period() {
        let manager = manager();
        assert_eq!(
            manager.identify_blockers("2024-12").await.unwrap_err().kind(),
            "NotFoundError"
        );
        assert_eq!(
            manager.get_critical_path("2024-12").await.unwrap_err().kind(),
            "NotFoundError"
        );
        assert_eq!(
            manager
                .get_close_progress("2024-12", date(2025, 1, 1))
                .await
                .unwrap_err()
                .kind(),
            "NotFoundError"
        );
    }

    #[tokio::test]
    async fn test_handle_envelopes() {
        let manager = manager();
        let envelope = manager
            .handle(json!({"input": {
                "operation": "initialize_close_tasks",
                "period": "2025-01",
                "period_end_date": "2025-01-31",
                "assignees": {"TAX": "tax-team"}
            }}))
            .await;
        assert!(!envelope.is_error());
        let data = envelope.data().unwrap();
        assert_eq!(data["summary"]["total_tasks"], 25);
        assert_eq!(data["schedule"][0]["date"], "2025-02-03");

        let task_id = data["all_tasks"][0]["id"].as_str().unwrap().to_string();
        let envelope = manager
            .handle(json!({
                "operation": "update_task_status",
                "task_id": task_id,
                "new_status": "completed",
                "completed_by": "controller"
            }))
            .await;
        let data = envelope.data().unwrap();
        assert_eq!(data["status"], "COMPLETED");
        assert_eq!(data["changed"], true);

        let envelope = manager
            .handle(json!({"operation": "update_task_status", "task_id": task_id, "new_status": "DONE"}))
            .await;
        assert_eq!(
            serde_json::to_value(&envelope).unwrap()["type"],
            "ValidationError"
        );

        let envelope = manager
            .handle_json(r#"{"operation": "get_close_progress", "period": "2025-01", "as_of": "31/01/2025"}"#)
            .await;
        assert!(envelope.is_error());

        let envelope = manager
            .handle(json!({"operation": "identify_blockers", "period": "2024-12"}))
            .await;
        assert_eq!(
            serde_json::to_value(&envelope).unwrap()["type"],
            "NotFoundError"
        );
    }

    #[tokio::test]
    async fn test_json_store_round_trip_through_manager() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let first = CloseManager::new(store, EngineConfig::default());
        let result = first
            .initialize_close_tasks("2025-01", date(2025, 1, 31), None, &HashMap::new())
            .await
            .unwrap();
        let lock = result
            .all_tasks
            .iter()
            .find(|t| t.name == "Lock period in system")
            .unwrap()
            .id;
        first
            .update_task_status(lock, &StatusUpdate::new(TaskStatus::Blocked))
            .await
            .unwrap();

        let store = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let second = CloseManager::new(store, EngineConfig::default());
        let progress = second
            .get_close_progress("2025-01", date(2025, 2, 1))
            .await
            .unwrap();
        assert_eq!(progress.report.progress.blocked, 1);
        assert_eq!(progress.report.health.status, HealthStatus::NeedsAttention);
    }
}
