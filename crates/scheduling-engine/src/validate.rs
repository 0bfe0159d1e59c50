//! Working-hours and break validation for a single event.
//!
//! Breaks are hard constraints and are checked first; working hours are soft. The
//! validator never fails: an inverted break never matches, inverted working hours
//! impose no band, and a day with no enabled schedule has no policy at all.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Weekday};
use serde::Serialize;

use crate::config::{BreakType, DaySchedule, LocalTime, WorkingHoursConfig, MINUTES_PER_DAY};
use crate::recurring::RecurringSeries;

/// Ordered so that `HardReject > SoftWarning > Allowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Allowed,
    SoftWarning,
    HardReject,
}

/// The break an event collided with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakViolation {
    pub name: String,
    pub start: LocalTime,
    pub end: LocalTime,
    pub kind: BreakType,
}

impl fmt::Display for BreakViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event cannot be scheduled during {} ({} - {})",
            self.name, self.start, self.end
        )
    }
}

/// How far an event spills outside the working-hours band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingHoursViolation {
    pub schedule_start: LocalTime,
    pub schedule_end: LocalTime,
    pub minutes_before_start: u32,
    pub minutes_after_end: u32,
}

fn describe_minutes(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m} minute(s)"),
        (h, 0) => format!("{h} hour(s)"),
        (h, m) => format!("{h} hour(s) {m} minute(s)"),
    }
}

impl fmt::Display for WorkingHoursViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event scheduled outside working hours ({} - {})",
            self.schedule_start, self.schedule_end
        )?;
        let mut parts = Vec::new();
        if self.minutes_before_start > 0 {
            parts.push(format!("{} before start", describe_minutes(self.minutes_before_start)));
        }
        if self.minutes_after_end > 0 {
            parts.push(format!("{} after end", describe_minutes(self.minutes_after_end)));
        }
        if !parts.is_empty() {
            write!(f, " - {}", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Result of checking one event against a [`WorkingHoursConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "severity", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Allowed,
    SoftWarning(WorkingHoursViolation),
    HardReject(BreakViolation),
}

impl ValidationOutcome {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationOutcome::Allowed => Severity::Allowed,
            ValidationOutcome::SoftWarning(_) => Severity::SoftWarning,
            ValidationOutcome::HardReject(_) => Severity::HardReject,
        }
    }

    /// Human-readable reason, `None` when allowed.
    pub fn reason(&self) -> Option<String> {
        match self {
            ValidationOutcome::Allowed => None,
            ValidationOutcome::SoftWarning(violation) => Some(violation.to_string()),
            ValidationOutcome::HardReject(violation) => Some(violation.to_string()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, ValidationOutcome::Allowed)
    }
}

fn check_schedule(schedule: &DaySchedule, start_min: u32, end_min: u32) -> ValidationOutcome {
    if let Some(block) = schedule
        .breaks
        .iter()
        .find(|block| block.overlaps_minutes(start_min, end_min))
    {
        return ValidationOutcome::HardReject(BreakViolation {
            name: block.name.clone(),
            start: block.start,
            end: block.end,
            kind: block.kind,
        });
    }

    let (work_start, work_end) = (schedule.start.minutes_of_day(), schedule.end.minutes_of_day());
    // Inverted hours are a config error for the load-time check, not a violation.
    if work_start >= work_end {
        return ValidationOutcome::Allowed;
    }
    let before = work_start.saturating_sub(start_min);
    let after = end_min.saturating_sub(work_end);
    if before == 0 && after == 0 {
        ValidationOutcome::Allowed
    } else {
        ValidationOutcome::SoftWarning(WorkingHoursViolation {
            schedule_start: schedule.start,
            schedule_end: schedule.end,
            minutes_before_start: before,
            minutes_after_end: after,
        })
    }
}

fn validate_minutes(
    start_min: u32,
    end_min: u32,
    weekday: Weekday,
    config: &WorkingHoursConfig,
) -> ValidationOutcome {
    match config.schedule_for(weekday) {
        Some(schedule) => check_schedule(schedule, start_min, end_min),
        None => ValidationOutcome::Allowed,
    }
}

/// Validate an event given as local start/end times on `weekday`.
///
/// An `end` earlier than `start` means the event runs to midnight. A zero-length
/// event occupies its start minute.
///
/// # Examples
///
/// ```
/// use chrono::Weekday;
/// use scheduling_engine::config::{
///     BreakBlock, BreakType, DaySchedule, LocalTime, WorkingHoursConfig,
/// };
/// use scheduling_engine::validate::{validate, Severity};
///
/// let t = |h, m| LocalTime::new(h, m).unwrap();
/// let config = WorkingHoursConfig::new(
///     DaySchedule::new(t(9, 0), t(17, 0))
///         .with_break(BreakBlock::new("Lunch", t(12, 0), t(13, 0), BreakType::Lunch)),
/// );
///
/// let lunch = validate(t(12, 30), t(13, 0), Weekday::Mon, &config);
/// assert_eq!(lunch.severity(), Severity::HardReject);
/// let after_lunch = validate(t(13, 0), t(13, 30), Weekday::Mon, &config);
/// assert_eq!(after_lunch.severity(), Severity::Allowed);
/// ```
pub fn validate(
    start: LocalTime,
    end: LocalTime,
    weekday: Weekday,
    config: &WorkingHoursConfig,
) -> ValidationOutcome {
    let start_min = start.minutes_of_day();
    let end_min = match end.minutes_of_day() {
        e if e > start_min => e,
        e if e == start_min => start_min + 1,
        _ => MINUTES_PER_DAY,
    };
    validate_minutes(start_min, end_min, weekday, config)
}

/// Validate an event given as zoned datetimes; local times and weekday are taken
/// from `start`'s zone. An event ending on a later local date runs to midnight.
pub fn validate_at<Z: TimeZone>(
    start: &DateTime<Z>,
    end: &DateTime<Z>,
    config: &WorkingHoursConfig,
) -> ValidationOutcome {
    let local_start = start.naive_local();
    let local_end = end.with_timezone(&start.timezone()).naive_local();

    let start_min = local_start.hour() * 60 + local_start.minute();
    let end_min = if local_end.date() > local_start.date() {
        MINUTES_PER_DAY
    } else {
        (local_end.hour() * 60 + local_end.minute()).max(start_min + 1)
    };
    validate_minutes(start_min, end_min, local_start.weekday(), config)
}

/// Validate the effective times of one occurrence of `series`, in the series' zone.
///
/// Returns `None` when the occurrence was deleted or the rule has no occurrence on
/// `date`.
pub fn validate_occurrence(
    series: &RecurringSeries,
    date: NaiveDate,
    config: &WorkingHoursConfig,
) -> Option<ValidationOutcome> {
    let occurrence = series.occurrence(date)?;
    let tz = series.zone().tz();
    Some(validate_at(
        &occurrence.start.with_timezone(&tz),
        &occurrence.end.with_timezone(&tz),
        config,
    ))
}
