// Error types for schedule evaluation, crontab parsing, and privilege
// assembly. Every error here is per-entry or per-execution; none of them
// is fatal to the daemon itself.

use thiserror::Error;

/// Cron expression parsing and evaluation errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Value {value} out of range for {field} field ({min}-{max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("Unsatisfiable cron expression '{expression}': no matching time within {years} years")]
    Unsatisfiable { expression: String, years: u32 },

    #[error("@reboot schedule has already fired")]
    AlreadyFired,
}

/// Crontab stream errors. Individual malformed lines are skipped with a
/// warning and never surface here; only I/O on the source itself does.
#[derive(Error, Debug)]
pub enum CrontabError {
    #[error("Failed to read crontab: {0}")]
    Io(#[from] std::io::Error),
}

/// Privilege and environment assembly errors
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User lookup failed for '{user}': {source}")]
    LookupFailed {
        user: String,
        source: std::io::Error,
    },

    #[error("Group list lookup failed for '{0}'")]
    GroupListFailed(String),
}
