//! Instantiates the close template for one period.

use std::collections::HashMap;

use chrono::NaiveDate;
use closeman_core::{CloseError, Period, Task, TaskCategory, TaskId, TaskStatus, Time};
use tracing::{debug, info};

use crate::calendar::{CalendarDay, CalendarScheduler};
use crate::catalog::TemplateCatalog;
use crate::graph::DependencyGraph;

/// Result of planning a period.
#[derive(Debug, Clone)]
pub struct PeriodPlan {
    /// The instantiated period, ready to persist
    pub period: Period,
    /// Business days of the close
    pub calendar: Vec<CalendarDay>,
}

impl PeriodPlan {
    /// Tasks due on calendar day `day_index`, in template order.
    pub fn tasks_on(&self, day_index: u32) -> impl Iterator<Item = &Task> {
        self.period
            .tasks
            .iter()
            .filter(move |t| t.calendar_day == day_index)
    }
}

/// Builds `Period`s from a template catalog.
#[derive(Debug, Clone, Default)]
pub struct PeriodPlanner {
    catalog: TemplateCatalog,
}

impl PeriodPlanner {
    /// Create a planner over `catalog`.
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    /// The catalog this planner instantiates.
    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Instantiate every template task for `label`.
    ///
    /// Ids are generated here, dependency names are resolved to ids, due
    /// dates come from the business-day calendar, and the resulting graph is
    /// checked for cycles and day ordering before anything is returned.
    pub fn plan(
        &self,
        label: &str,
        period_end: NaiveDate,
        close_days: u32,
        assignees: &HashMap<TaskCategory, String>,
        now: Time,
    ) -> Result<PeriodPlan, CloseError> {
        if close_days == 0 {
            return Err(CloseError::validation("close_days must be at least 1"));
        }

        let specs = self.catalog.resolve(assignees)?;
        let calendar = CalendarScheduler::generate(period_end, close_days);

        let ids: HashMap<&str, TaskId> = specs
            .iter()
            .map(|spec| (spec.name.as_str(), TaskId::new()))
            .collect();

        let mut tasks = Vec::with_capacity(specs.len());
        for spec in &specs {
            let placement = CalendarScheduler::place(spec.day, close_days);
            let due = &calendar[placement.day_index as usize - 1];
            let dependencies = spec
                .dependency_names
                .iter()
                .map(|name| {
                    ids.get(name.as_str()).copied().ok_or_else(|| {
                        CloseError::Template(format!(
                            "'{}' depends on unknown task '{}'",
                            spec.name, name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            tasks.push(Task {
                id: ids[spec.name.as_str()],
                period: label.to_string(),
                name: spec.name.clone(),
                category: spec.category,
                scheduled_day: spec.day,
                calendar_day: placement.day_index,
                compression_note: placement.compression_note,
                due_date: due.date,
                assigned_to: spec.assigned_to.clone(),
                status: TaskStatus::NotStarted,
                dependencies,
                dependency_names: spec.dependency_names.clone(),
                notes: None,
                completed_by: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        let graph = DependencyGraph::from_tasks(&tasks)?;
        graph.verify_day_order()?;
        debug!(order = ?graph.topological_order(), "Verified template ordering");

        let compressed = tasks.iter().filter(|t| t.compression_note.is_some()).count();
        info!(
            period = label,
            tasks = tasks.len(),
            close_days,
            compressed,
            "Planned close tasks"
        );

        Ok(PeriodPlan {
            period: Period {
                period: label.to_string(),
                period_end_date: period_end,
                close_days,
                tasks,
                created_at: now,
            },
            calendar,
        })
    }
}
