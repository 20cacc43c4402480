//! Closeman service layer.
//!
//! Parses `{operation, ...}` requests, runs them against an injected
//! [`closeman_storage::TaskStore`] and wraps the outcome in the response
//! envelope the host expects.

#![warn(missing_docs)]

pub mod config;
pub mod envelope;
pub mod manager;
pub mod request;

pub use config::EngineConfig;
pub use envelope::{Envelope, SuccessOutput};
pub use manager::{
    CalendarResult, CloseManager, DayCount, InitializeResult, InitializeSummary, PeriodReport,
    ScheduledDay, UpdateResult,
};
pub use request::{parse_assignees, Request, OPERATIONS};
