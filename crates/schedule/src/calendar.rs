//! Business-day calendar for the close.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use closeman_core::{CloseError, TaskCategory};
use serde::Serialize;

use crate::catalog::TemplateCatalog;

/// One business day of the close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    /// 1-based close day (T+n)
    pub day_index: u32,
    /// Concrete date
    pub date: NaiveDate,
    /// Full weekday name
    pub weekday: String,
}

/// Where a template day lands on a calendar of a given length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Calendar day index
    pub day_index: u32,
    /// Present when the day had to be clipped
    pub compression_note: Option<String>,
}

/// Maps template day offsets to business dates.
pub struct CalendarScheduler;

impl CalendarScheduler {
    /// Whether `date` is Monday through Friday.
    pub fn is_business_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// First business day strictly after `date`.
    pub fn next_business_day(date: NaiveDate) -> NaiveDate {
        let mut next = date + Duration::days(1);
        while !Self::is_business_day(next) {
            next += Duration::days(1);
        }
        next
    }

    /// `close_days` consecutive business days following `period_end`,
    /// numbered from 1.
    pub fn generate(period_end: NaiveDate, close_days: u32) -> Vec<CalendarDay> {
        let mut days = Vec::with_capacity(close_days as usize);
        let mut current = period_end;
        for day_index in 1..=close_days {
            current = Self::next_business_day(current);
            days.push(CalendarDay {
                day_index,
                date: current,
                weekday: weekday_name(current.weekday()).to_string(),
            });
        }
        days
    }

    /// Place a template day on a calendar of `close_days` days; days past
    /// the end are clipped onto the final day.
    pub fn place(template_day: u32, close_days: u32) -> Placement {
        if template_day > close_days {
            Placement {
                day_index: close_days,
                compression_note: Some(format!(
                    "Compressed from T+{} onto T+{}",
                    template_day, close_days
                )),
            }
        } else {
            Placement {
                day_index: template_day,
                compression_note: None,
            }
        }
    }
}

/// Full English weekday name.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

const MILESTONES: [&[&str]; 5] = [
    &["All subledgers processed", "Payroll entries posted"],
    &["Bank reconciliation complete", "Revenue recognized"],
    &["All balance sheet accounts reconciled", "Preliminary TB ready"],
    &["Tax provision booked", "Draft financials ready for review"],
    &["Hard close complete", "Period locked in system"],
];

/// Key milestones of a template day.
pub fn milestones_for_day(day: u32) -> &'static [&'static str] {
    day.checked_sub(1)
        .and_then(|i| MILESTONES.get(i as usize))
        .copied()
        .unwrap_or(&[])
}

/// A task as listed on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarTask {
    /// Task name
    pub name: String,
    /// Category tag
    pub category: TaskCategory,
    /// Names of its dependencies
    pub dependencies: Vec<String>,
    /// Present when moved onto the final day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_note: Option<String>,
}

/// One day of the rendered calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    /// "T+n"
    pub day: String,
    /// 1-based index
    pub day_index: u32,
    /// Concrete date
    pub date: NaiveDate,
    /// Full weekday name
    pub day_of_week: String,
    /// Number of tasks due
    pub task_count: usize,
    /// Tasks due this day
    pub tasks: Vec<CalendarTask>,
    /// Milestones reached by the end of the day
    pub milestones: Vec<String>,
}

/// Close calendar for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseCalendar {
    /// Period label
    pub period: String,
    /// Last day of the period
    pub period_end_date: NaiveDate,
    /// First close day
    pub close_start_date: NaiveDate,
    /// Last close day
    pub target_close_date: NaiveDate,
    /// Requested close length
    pub close_days: u32,
    /// Tasks clipped onto the final day
    pub compressed_tasks: usize,
    /// Day-by-day schedule
    pub days: Vec<CalendarEntry>,
}

impl CloseCalendar {
    /// Lay the template out over `close_days` business days.
    pub fn build(
        period: &str,
        period_end: NaiveDate,
        close_days: u32,
        catalog: &TemplateCatalog,
    ) -> Result<Self, CloseError> {
        if close_days == 0 {
            return Err(CloseError::validation("close_days must be at least 1"));
        }

        let business_days = CalendarScheduler::generate(period_end, close_days);
        let mut days: Vec<CalendarEntry> = business_days
            .iter()
            .map(|d| CalendarEntry {
                day: format!("T+{}", d.day_index),
                day_index: d.day_index,
                date: d.date,
                day_of_week: d.weekday.clone(),
                task_count: 0,
                tasks: Vec::new(),
                milestones: Vec::new(),
            })
            .collect();

        let mut compressed_tasks = 0;
        for entry in catalog.entries() {
            let placement = CalendarScheduler::place(entry.day, close_days);
            if placement.compression_note.is_some() {
                compressed_tasks += 1;
            }
            let day = &mut days[placement.day_index as usize - 1];
            day.tasks.push(CalendarTask {
                name: entry.name.to_string(),
                category: entry.category,
                dependencies: entry.dependencies.iter().map(|d| d.to_string()).collect(),
                compression_note: placement.compression_note,
            });
        }

        let last_template_day = catalog.max_day().max(MILESTONES.len() as u32);
        for day in &mut days {
            day.task_count = day.tasks.len();
            let through = if day.day_index == close_days {
                last_template_day.max(close_days)
            } else {
                day.day_index
            };
            day.milestones = (day.day_index..=through)
                .flat_map(milestones_for_day)
                .map(|m| m.to_string())
                .collect();
        }

        Ok(Self {
            period: period.to_string(),
            period_end_date: period_end,
            close_start_date: business_days[0].date,
            target_close_date: business_days[business_days.len() - 1].date,
            close_days,
            compressed_tasks,
            days,
        })
    }

    /// Fixed-width text rendering.
    pub fn render_text(&self) -> String {
        let mut lines = vec![
            format!("CLOSE CALENDAR: {}", self.period),
            format!("Period End: {}", self.period_end_date),
            format!("Target Close: {}", self.target_close_date),
            "=".repeat(70),
            String::new(),
        ];

        for day in &self.days {
            lines.push(format!("{} - {} ({})", day.day, day.date, day.day_of_week));
            lines.push("-".repeat(40));

            for task in &day.tasks {
                match &task.compression_note {
                    Some(note) => lines.push(format!("  [ ] {} ({})", task.name, note)),
                    None => lines.push(format!("  [ ] {}", task.name)),
                }
                if !task.dependencies.is_empty() {
                    let shown: Vec<_> = task.dependencies.iter().take(2).map(String::as_str).collect();
                    lines.push(format!("      Depends on: {}", shown.join(", ")));
                }
            }

            if !day.milestones.is_empty() {
                lines.push(format!("  Milestones: {}", day.milestones.join(", ")));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
