//! Progress tracking - blocker ranking, critical path, and close health.
//!
//! Every analyzer here is a read-only consumer of a dependency graph and a
//! status snapshot; none of them write back to the store.

#![warn(missing_docs)]

pub mod blocker;
pub mod critical_path;
pub mod tracker;

pub use blocker::{
    BlockedTask, BlockerAnalyzer, BlockerReport, BlockingTask, CriticalBlocker, WaitingTask,
};
pub use critical_path::{
    analyze_template, CriticalPathAnalyzer, CriticalPathReport, PathStep, ScheduleConflict,
};
pub use tracker::{
    Health, HealthPolicy, HealthStatus, ProgressAggregator, ProgressCounts, ProgressReport,
    RiskFactors, TaskProgress,
};
