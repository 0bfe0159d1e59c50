//! Error types for scheduling-engine operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Unknown zone: '{0}'")]
    UnknownZone(String),

    #[error("Ambiguous local time: {local} occurs twice in {zone} (offsets {earlier_offset_seconds}s and {later_offset_seconds}s)")]
    AmbiguousLocalTime {
        zone: String,
        local: String,
        earlier_offset_seconds: i32,
        later_offset_seconds: i32,
    },

    #[error("Non-existent local time: {local} is skipped by a DST transition in {zone}")]
    NonExistentLocalTime { zone: String, local: String },

    #[error("No candidate times in search window: {0}")]
    NoCandidatesInWindow(String),

    #[error("Invalid working hours config: {0}")]
    InvalidConfig(String),

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
