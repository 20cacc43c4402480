//! Scheduling layer - close template, dependency graph, and business-day
//! calendar.

#![warn(missing_docs)]

pub mod calendar;
pub mod catalog;
pub mod graph;
pub mod planner;

pub use calendar::{
    milestones_for_day, weekday_name, CalendarDay, CalendarEntry, CalendarScheduler,
    CalendarTask, CloseCalendar, Placement,
};
pub use catalog::{TaskSpec, TemplateCatalog, TemplateEntry, STANDARD_CLOSE_TASKS};
pub use graph::{DependencyGraph, GraphNode};
pub use planner::{PeriodPlan, PeriodPlanner};
