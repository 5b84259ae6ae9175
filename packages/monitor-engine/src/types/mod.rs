//! Engine data types.

pub mod job;
pub mod log;
pub mod status;

pub use job::{Candidate, JobId, JobRecord};
pub use log::{LogEntry, LogLevel};
pub use status::{MonitorStatus, SchedulerState};
