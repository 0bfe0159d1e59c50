//! # scheduling-engine
//!
//! Timezone-aware scheduling core.
//!
//! Converts times between IANA zones without guessing across DST gaps and
//! overlaps, enforces working-hours and break constraints on events, ranks
//! candidate meeting times for participants spread across zones, and models
//! recurring series with per-occurrence exceptions. Every operation is a pure,
//! synchronous computation over values the caller has already resolved.
//!
//! ## Modules
//!
//! - [`zone`] - Zone resolution (IANA names and common abbreviations) and catalog listing
//! - [`convert`] - Instant and wall-clock conversion between zones
//! - [`dst`] - DST transitions, local-time classification, and upcoming-transition warnings
//! - [`config`] - Working-hours configuration values
//! - [`validate`] - Working-hours and break validation of single events
//! - [`recurring`] - Recurring series, occurrence expansion, and exceptions
//! - [`score`] - Five-factor meeting score and holiday calendar
//! - [`finder`] - Candidate grid, scoring and ranking of meeting slots
//! - [`error`] - Error types

pub mod config;
pub mod convert;
pub mod dst;
pub mod error;
pub mod finder;
pub mod recurring;
pub mod score;
pub mod validate;
pub mod zone;

pub use config::{BreakBlock, BreakType, DaySchedule, LocalTime, WorkingHoursConfig};
pub use convert::{convert, format_utc_offset, now, ConvertedTime, TimeInput};
pub use dst::{
    check_warning, classify, resolve_local, suggest_alternatives, transitions_for_year,
    upcoming_warning, Disambiguation, DstTransition, DstWarning, LocalTimeClassification,
    TransitionDirection, WarningSeverity, DEFAULT_WARNING_DAYS,
};
pub use error::{Result, ScheduleError};
pub use finder::{
    find_slots, find_slots_with_cancel, CandidateSlot, MeetingRequest, ParticipantZone,
    ScoredSlot,
};
pub use recurring::{Exception, ExceptionChange, Occurrence, RecurringSeries};
pub use score::{HolidayCalendar, ScoreBreakdown};
pub use validate::{
    validate, validate_at, validate_occurrence, BreakViolation, Severity, ValidationOutcome,
    WorkingHoursViolation,
};
pub use zone::{ZoneGroup, ZoneHandle, ZoneRegistry};
