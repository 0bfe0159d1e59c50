//! Conversion of instants and wall-clock times between zones.
//!
//! Instants convert infallibly. Wall-clock inputs are first classified by
//! [`crate::dst`]; a time inside a DST gap or overlap is an error unless the caller
//! chose a [`Disambiguation`]. Nothing is silently normalized.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc, Weekday,
};
use chrono_tz::OffsetComponents;
use serde::Serialize;

use crate::dst::{self, Disambiguation};
use crate::error::Result;
use crate::zone::ZoneHandle;

/// What is being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInput {
    /// An absolute point in time.
    Instant(DateTime<Utc>),
    /// A wall-clock time in the source zone.
    WallClock(NaiveDateTime),
}

impl From<DateTime<Utc>> for TimeInput {
    fn from(value: DateTime<Utc>) -> Self {
        TimeInput::Instant(value)
    }
}

impl From<NaiveDateTime> for TimeInput {
    fn from(value: NaiveDateTime) -> Self {
        TimeInput::WallClock(value)
    }
}

/// An instant expressed in a particular zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedTime {
    /// The absolute instant, independent of any zone.
    pub instant: DateTime<Utc>,
    /// Wall-clock date and time in `zone`.
    pub local: NaiveDateTime,
    pub zone: &'static str,
    pub abbreviation: String,
    /// Seconds east of UTC (e.g. `-18000` for EST).
    pub utc_offset_seconds: i32,
    pub is_dst: bool,
}

impl ConvertedTime {
    /// Express `instant` in `zone`.
    pub fn at(instant: DateTime<Utc>, zone: &ZoneHandle) -> Self {
        let zoned = instant.with_timezone(&zone.tz());
        let offset = zoned.offset();
        ConvertedTime {
            instant,
            local: zoned.naive_local(),
            zone: zone.name(),
            abbreviation: zoned.format("%Z").to_string(),
            utc_offset_seconds: offset.fix().local_minus_utc(),
            is_dst: offset.dst_offset() != Duration::zero(),
        }
    }

    /// Rebuild the instant from the local fields alone.
    pub fn reconstruct_instant(&self) -> DateTime<Utc> {
        (self.local - Duration::seconds(self.utc_offset_seconds as i64)).and_utc()
    }

    /// The offset as `"+HH:MM"` / `"-HH:MM"`.
    pub fn utc_offset(&self) -> String {
        format_utc_offset(self.utc_offset_seconds)
    }

    pub fn date(&self) -> NaiveDate {
        self.local.date()
    }

    pub fn weekday(&self) -> Weekday {
        self.local.weekday()
    }

    /// RFC 3339 with the local offset, e.g. `2025-03-08T22:00:00-05:00`.
    pub fn to_rfc3339(&self) -> String {
        match FixedOffset::east_opt(self.utc_offset_seconds) {
            Some(offset) => self.instant.with_timezone(&offset).to_rfc3339(),
            None => self.instant.to_rfc3339(),
        }
    }
}

/// Convert `input` from zone `from` into zone `to`.
///
/// `from` only matters for wall-clock inputs.
///
/// # Errors
///
/// Returns [`crate::ScheduleError::NonExistentLocalTime`] or
/// [`crate::ScheduleError::AmbiguousLocalTime`] for a wall-clock input inside a DST
/// gap or overlap when `choice` is [`Disambiguation::Reject`].
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use scheduling_engine::convert::convert;
/// use scheduling_engine::dst::Disambiguation;
/// use scheduling_engine::zone::ZoneRegistry;
///
/// let registry = ZoneRegistry::new();
/// let utc = registry.resolve("UTC").unwrap();
/// let ny = registry.resolve("America/New_York").unwrap();
///
/// let instant = Utc.with_ymd_and_hms(2025, 3, 9, 3, 0, 0).unwrap();
/// let result = convert(instant, &utc, &ny, Disambiguation::Reject).unwrap();
/// assert_eq!(result.local.to_string(), "2025-03-08 22:00:00");
/// assert_eq!(result.abbreviation, "EST");
/// assert_eq!(result.utc_offset_seconds, -18000);
/// ```
pub fn convert(
    input: impl Into<TimeInput>,
    from: &ZoneHandle,
    to: &ZoneHandle,
    choice: Disambiguation,
) -> Result<ConvertedTime> {
    let instant = match input.into() {
        TimeInput::Instant(instant) => instant,
        TimeInput::WallClock(local) => dst::resolve_local(from, local, choice)?,
    };
    Ok(ConvertedTime::at(instant, to))
}

/// The current instant in `zone`.
pub fn now(zone: &ZoneHandle) -> ConvertedTime {
    ConvertedTime::at(Utc::now(), zone)
}

/// Format an offset in seconds as `"+HH:MM"` / `"-HH:MM"`.
pub fn format_utc_offset(offset_seconds: i32) -> String {
    let sign = if offset_seconds >= 0 { "+" } else { "-" };
    let abs_secs = offset_seconds.unsigned_abs();
    let hours = abs_secs / 3600;
    let minutes = (abs_secs % 3600) / 60;
    format!("{sign}{hours:02}:{minutes:02}")
}
