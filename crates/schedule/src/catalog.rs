//! The standard month-end close task template.

use std::collections::{HashMap, HashSet};

use closeman_core::{CloseError, TaskCategory};

/// One row of the close template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateEntry {
    /// Stable template name
    pub name: &'static str,
    /// Category tag
    pub category: TaskCategory,
    /// Scheduled day offset (T+1 = 1)
    pub day: u32,
    /// Names of entries that must complete first
    pub dependencies: &'static [&'static str],
}

const fn entry(
    name: &'static str,
    category: TaskCategory,
    day: u32,
    dependencies: &'static [&'static str],
) -> TemplateEntry {
    TemplateEntry {
        name,
        category,
        day,
        dependencies,
    }
}

use TaskCategory::*;

/// The canonical 25-task, five-day close.
pub const STANDARD_CLOSE_TASKS: &[TemplateEntry] = &[
    // T+1
    entry("Record cash receipts and disbursements", Cash, 1, &[]),
    entry("Post payroll entries", Payroll, 1, &[]),
    entry("Run AP accruals", Accruals, 1, &[]),
    entry("Run fixed asset depreciation", Depreciation, 1, &[]),
    entry("Post prepaid amortization", Amortization, 1, &[]),
    entry("Post intercompany transactions", Intercompany, 1, &[]),
    // T+2
    entry(
        "Complete bank reconciliation",
        Reconciliation,
        2,
        &["Record cash receipts and disbursements"],
    ),
    entry("Post revenue recognition entries", Revenue, 2, &[]),
    entry(
        "Complete AR subledger reconciliation",
        Reconciliation,
        2,
        &["Post revenue recognition entries"],
    ),
    entry(
        "Complete AP subledger reconciliation",
        Reconciliation,
        2,
        &["Run AP accruals"],
    ),
    entry("Post FX revaluation entries", Fx, 2, &[]),
    entry("Post remaining accrual entries", Accruals, 2, &[]),
    // T+3
    entry(
        "Complete all balance sheet reconciliations",
        Reconciliation,
        3,
        &[
            "Complete bank reconciliation",
            "Complete AR subledger reconciliation",
            "Complete AP subledger reconciliation",
        ],
    ),
    entry(
        "Complete intercompany reconciliation",
        Intercompany,
        3,
        &["Post intercompany transactions"],
    ),
    entry(
        "Post reconciliation adjustments",
        Adjustments,
        3,
        &["Complete all balance sheet reconciliations"],
    ),
    entry(
        "Run preliminary trial balance",
        Reporting,
        3,
        &["Post reconciliation adjustments"],
    ),
    entry(
        "Perform preliminary flux analysis",
        Analysis,
        3,
        &["Run preliminary trial balance"],
    ),
    // T+4
    entry(
        "Post tax provision entries",
        Tax,
        4,
        &["Run preliminary trial balance"],
    ),
    entry("Complete equity roll-forward", Equity, 4, &[]),
    entry(
        "Generate draft financial statements",
        Reporting,
        4,
        &["Post tax provision entries", "Complete equity roll-forward"],
    ),
    entry(
        "Perform detailed flux analysis",
        Analysis,
        4,
        &["Generate draft financial statements"],
    ),
    entry(
        "Management review of financials",
        Review,
        4,
        &["Perform detailed flux analysis"],
    ),
    // T+5
    entry(
        "Post final adjustments",
        Adjustments,
        5,
        &["Management review of financials"],
    ),
    entry(
        "Finalize financial statements",
        Reporting,
        5,
        &["Post final adjustments"],
    ),
    entry(
        "Lock period in system",
        Close,
        5,
        &["Finalize financial statements"],
    ),
];

/// A template entry ready for instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Task name
    pub name: String,
    /// Category tag
    pub category: TaskCategory,
    /// Scheduled day offset
    pub day: u32,
    /// Names of the tasks this one depends on
    pub dependency_names: Vec<String>,
    /// Owner picked from the category mapping
    pub assigned_to: Option<String>,
}

/// Read-only view over a template table.
#[derive(Debug, Clone, Copy)]
pub struct TemplateCatalog {
    entries: &'static [TemplateEntry],
}

impl TemplateCatalog {
    /// The standard close template.
    pub fn standard() -> Self {
        Self::from_entries(STANDARD_CLOSE_TASKS)
    }

    /// Wrap an arbitrary table.
    pub fn from_entries(entries: &'static [TemplateEntry]) -> Self {
        Self { entries }
    }

    /// Raw entries, in table order.
    pub fn entries(&self) -> &'static [TemplateEntry] {
        self.entries
    }

    /// Largest scheduled day in the table.
    pub fn max_day(&self) -> u32 {
        self.entries.iter().map(|e| e.day).max().unwrap_or(0)
    }

    /// Entries scheduled on `day`, in table order.
    pub fn entries_for_day(&self, day: u32) -> impl Iterator<Item = &'static TemplateEntry> {
        self.entries.iter().filter(move |e| e.day == day)
    }

    /// Validate the table and turn it into task specs, assigning owners by
    /// category.
    pub fn resolve(
        &self,
        assignees: &HashMap<TaskCategory, String>,
    ) -> Result<Vec<TaskSpec>, CloseError> {
        let mut names = HashSet::new();
        for entry in self.entries {
            if !names.insert(entry.name) {
                return Err(CloseError::Template(format!(
                    "duplicate template task '{}'",
                    entry.name
                )));
            }
            if entry.day == 0 {
                return Err(CloseError::Template(format!(
                    "template task '{}' has day 0; days start at T+1",
                    entry.name
                )));
            }
        }

        for entry in self.entries {
            if let Some(missing) = entry.dependencies.iter().find(|d| !names.contains(*d)) {
                return Err(CloseError::Template(format!(
                    "template task '{}' depends on unknown task '{}'",
                    entry.name, missing
                )));
            }
        }

        Ok(self
            .entries
            .iter()
            .map(|entry| TaskSpec {
                name: entry.name.to_string(),
                category: entry.category,
                day: entry.day,
                dependency_names: entry.dependencies.iter().map(|d| d.to_string()).collect(),
                assigned_to: assignees.get(&entry.category).cloned(),
            })
            .collect())
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_shape() {
        let catalog = TemplateCatalog::standard();
        assert_eq!(catalog.entries().len(), 25);
        assert_eq!(catalog.max_day(), 5);
        assert_eq!(catalog.entries_for_day(1).count(), 6);
        assert_eq!(catalog.entries_for_day(5).count(), 3);
    }

    #[test]
    fn test_resolve_assigns_by_category() {
        let mut assignees = HashMap::new();
        assignees.insert(TaskCategory::Reconciliation, "recon-team".to_string());

        let specs = TemplateCatalog::standard().resolve(&assignees).unwrap();
        assert_eq!(specs.len(), 25);
        for spec in &specs {
            if spec.category == TaskCategory::Reconciliation {
                assert_eq!(spec.assigned_to.as_deref(), Some("recon-team"));
            } else {
                assert!(spec.assigned_to.is_none());
            }
        }

        let bs = specs
            .iter()
            .find(|s| s.name == "Complete all balance sheet reconciliations")
            .unwrap();
        assert_eq!(bs.dependency_names.len(), 3);
    }

    #[test]
    fn test_standard_days_never_decrease_along_dependencies() {
        let catalog = TemplateCatalog::standard();
        let day_of: HashMap<_, _> = catalog.entries().iter().map(|e| (e.name, e.day)).collect();
        for entry in catalog.entries() {
            for dep in entry.dependencies {
                assert!(entry.day >= day_of[dep], "{} before {}", entry.name, dep);
            }
        }
    }

    static DANGLING: &[TemplateEntry] = &[
        entry("Post payroll entries", TaskCategory::Payroll, 1, &[]),
        entry("Reconcile payroll", TaskCategory::Reconciliation, 2, &["Run payroll"]),
    ];

    static DUPLICATE: &[TemplateEntry] = &[
        entry("Post payroll entries", TaskCategory::Payroll, 1, &[]),
        entry("Post payroll entries", TaskCategory::Payroll, 2, &[]),
    ];

    static DAY_ZERO: &[TemplateEntry] = &[entry("Post payroll entries", TaskCategory::Payroll, 0, &[])];

    #[test]
    fn test_resolve_rejects_broken_tables() {
        for table in [DANGLING, DUPLICATE, DAY_ZERO] {
            let err = TemplateCatalog::from_entries(table)
                .resolve(&HashMap::new())
                .unwrap_err();
            assert_eq!(err.kind(), "TemplateError");
        }
    }
}
