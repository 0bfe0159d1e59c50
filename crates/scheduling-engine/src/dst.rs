//! DST transition analysis.
//!
//! Transitions are found by scanning a year hour by hour in UTC and bisecting each
//! offset change down to the second. Nothing is cached: rules differ between years
//! and every call recomputes from the zone database.
//!
//! A transition at instant `T` from offset `ob` to `oa` shapes wall-clock time on
//! that date:
//!
//! - forward (`oa > ob`): local times in `[T+ob, T+oa)` never occur (a gap);
//! - backward (`oa < ob`): local times in `[T+oa, T+ob)` occur twice (an overlap).
//!
//! [`classify`] places a wall-clock time against those windows.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ScheduleError};
use crate::zone::ZoneHandle;

/// Default look-ahead for [`upcoming_warning`] and [`check_warning`].
pub const DEFAULT_WARNING_DAYS: i64 = 7;

const SCAN_STEP_SECONDS: i64 = 3600;

// ── Types ───────────────────────────────────────────────────────────────────

/// Which way the clocks move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionDirection {
    /// Spring forward: an interval of wall-clock time is skipped.
    Forward,
    /// Fall back: an interval of wall-clock time repeats.
    Backward,
}

/// One UTC offset change in a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DstTransition {
    /// First instant at which the new offset applies.
    pub at: DateTime<Utc>,
    pub direction: TransitionDirection,
    /// Zone abbreviation in force after the transition (e.g. `"EDT"`).
    pub abbreviation: String,
    pub offset_before_seconds: i32,
    pub offset_after_seconds: i32,
}

impl DstTransition {
    /// Signed size of the clock change in seconds.
    pub fn shift_seconds(&self) -> i32 {
        self.offset_after_seconds - self.offset_before_seconds
    }

    /// The half-open wall-clock interval this transition skips (forward) or
    /// repeats (backward).
    pub fn local_window(&self) -> (NaiveDateTime, NaiveDateTime) {
        let utc = self.at.naive_utc();
        let before = utc + Duration::seconds(self.offset_before_seconds as i64);
        let after = utc + Duration::seconds(self.offset_after_seconds as i64);
        (before.min(after), before.max(after))
    }

    /// Wall-clock time of the transition under the new offset.
    pub fn local_after(&self) -> NaiveDateTime {
        self.at.naive_utc() + Duration::seconds(self.offset_after_seconds as i64)
    }
}

/// How a wall-clock time relates to the zone's transitions on that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalTimeClassification {
    Unambiguous {
        offset_seconds: i32,
    },
    /// Inside a spring-forward gap; this wall-clock time never happens.
    NonExistent {
        gap_start: NaiveDateTime,
        gap_end: NaiveDateTime,
        offset_before_seconds: i32,
        offset_after_seconds: i32,
    },
    /// Inside a fall-back overlap; this wall-clock time happens twice.
    Ambiguous {
        earlier_offset_seconds: i32,
        later_offset_seconds: i32,
    },
}

impl LocalTimeClassification {
    pub fn is_unambiguous(&self) -> bool {
        matches!(self, LocalTimeClassification::Unambiguous { .. })
    }
}

/// Caller's choice when a wall-clock time is in a gap or overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disambiguation {
    /// Fail with [`ScheduleError::AmbiguousLocalTime`] / [`ScheduleError::NonExistentLocalTime`].
    #[default]
    Reject,
    /// The earlier of the two candidate instants. For an overlap, the first
    /// occurrence; for a gap, the wall clock read with the post-transition offset.
    Earlier,
    /// The later of the two candidate instants. For an overlap, the second
    /// occurrence; for a gap, the wall clock read with the pre-transition offset.
    Later,
}

/// Severity of a [`DstWarning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

/// A user-facing DST notice for a requested local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DstWarning {
    pub transition: DstTransition,
    pub severity: WarningSeverity,
    pub message: String,
    /// Whole days from the requested time until the transition (0 on the day).
    pub days_until: i64,
    pub in_gap: bool,
    pub in_overlap: bool,
}

// ── Transitions ─────────────────────────────────────────────────────────────

fn offset_at(tz: Tz, timestamp: i64) -> i32 {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(instant) => tz
            .offset_from_utc_datetime(&instant.naive_utc())
            .fix()
            .local_minus_utc(),
        None => 0,
    }
}

/// First second in `(lo, hi]` whose offset differs from `offset_lo`.
fn bisect_change(tz: Tz, mut lo: i64, mut hi: i64, offset_lo: i32) -> i64 {
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if offset_at(tz, mid) == offset_lo {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

fn transition_at(tz: Tz, timestamp: i64, before: i32, after: i32) -> Option<DstTransition> {
    let at = Utc.timestamp_opt(timestamp, 0).single()?;
    Some(DstTransition {
        at,
        direction: if after > before {
            TransitionDirection::Forward
        } else {
            TransitionDirection::Backward
        },
        abbreviation: at.with_timezone(&tz).format("%Z").to_string(),
        offset_before_seconds: before,
        offset_after_seconds: after,
    })
}

/// Every offset change in `(start, end]`, in order.
fn scan_transitions(tz: Tz, start: i64, end: i64) -> Vec<DstTransition> {
    let mut transitions = Vec::new();
    let mut prev = start;
    let mut prev_offset = offset_at(tz, prev);

    while prev < end {
        let next = (prev + SCAN_STEP_SECONDS).min(end);
        let offset = offset_at(tz, next);
        if offset != prev_offset {
            let at = bisect_change(tz, prev, next, prev_offset);
            let after = offset_at(tz, at);
            transitions.extend(transition_at(tz, at, prev_offset, after));
            // A second change inside the same step is picked up on the next pass.
            prev = at;
            prev_offset = after;
            continue;
        }
        prev = next;
    }
    transitions
}

fn year_transitions(tz: Tz, year: i32) -> Vec<DstTransition> {
    let bounds = (
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single(),
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single(),
    );
    let (Some(start), Some(end)) = bounds else {
        return Vec::new();
    };
    // Pad by a day so transitions near New Year in far-off zones are seen.
    let pad = 86_400;
    scan_transitions(tz, start.timestamp() - pad, end.timestamp() + pad)
        .into_iter()
        .filter(|t| t.local_after().year() == year)
        .collect()
}

/// All offset transitions of `zone` whose post-transition local date is in `year`,
/// in chronological order.
///
/// Zones without DST return an empty vector.
///
/// # Examples
///
/// ```
/// use scheduling_engine::dst::{transitions_for_year, TransitionDirection};
/// use scheduling_engine::zone::ZoneRegistry;
///
/// let ny = ZoneRegistry::new().resolve("America/New_York").unwrap();
/// let transitions = transitions_for_year(&ny, 2025);
/// assert_eq!(transitions.len(), 2);
/// assert_eq!(transitions[0].direction, TransitionDirection::Forward);
/// assert_eq!(transitions[0].at.to_rfc3339(), "2025-03-09T07:00:00+00:00");
/// ```
pub fn transitions_for_year(zone: &ZoneHandle, year: i32) -> Vec<DstTransition> {
    let transitions = year_transitions(zone.tz(), year);
    debug!(zone = zone.name(), year, count = transitions.len(), "computed transitions");
    transitions
}

// ── Classification ──────────────────────────────────────────────────────────

/// Transitions that could shape wall-clock times on `local`'s date.
fn transitions_near(tz: Tz, local: NaiveDateTime) -> Vec<DstTransition> {
    let year = local.year();
    let mut transitions = Vec::new();
    if local.ordinal() <= 2 {
        transitions.extend(year_transitions(tz, year - 1));
    }
    transitions.extend(year_transitions(tz, year));
    if local.ordinal0() + 2 >= days_in_year(year) {
        transitions.extend(year_transitions(tz, year + 1));
    }
    transitions
}

fn days_in_year(year: i32) -> u32 {
    if chrono::NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

/// Classify `local` against an explicit set of transitions.
pub(crate) fn classify_against(
    tz: Tz,
    transitions: &[DstTransition],
    local: NaiveDateTime,
) -> LocalTimeClassification {
    for transition in transitions {
        let (window_start, window_end) = transition.local_window();
        if local < window_start || local >= window_end {
            continue;
        }
        return match transition.direction {
            TransitionDirection::Forward => LocalTimeClassification::NonExistent {
                gap_start: window_start,
                gap_end: window_end,
                offset_before_seconds: transition.offset_before_seconds,
                offset_after_seconds: transition.offset_after_seconds,
            },
            TransitionDirection::Backward => LocalTimeClassification::Ambiguous {
                earlier_offset_seconds: transition.offset_before_seconds,
                later_offset_seconds: transition.offset_after_seconds,
            },
        };
    }

    let offset_seconds = tz
        .offset_from_local_datetime(&local)
        .earliest()
        .map(|o| o.fix().local_minus_utc())
        .unwrap_or_else(|| offset_at(tz, local.and_utc().timestamp()));
    LocalTimeClassification::Unambiguous { offset_seconds }
}

/// Classify a wall-clock time in `zone` on its specific date.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use scheduling_engine::dst::{classify, LocalTimeClassification};
/// use scheduling_engine::zone::ZoneRegistry;
///
/// let ny = ZoneRegistry::new().resolve("America/New_York").unwrap();
/// let local = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap().and_hms_opt(1, 30, 0).unwrap();
/// assert_eq!(
///     classify(&ny, local),
///     LocalTimeClassification::Ambiguous {
///         earlier_offset_seconds: -4 * 3600,
///         later_offset_seconds: -5 * 3600,
///     }
/// );
/// ```
pub fn classify(zone: &ZoneHandle, local: NaiveDateTime) -> LocalTimeClassification {
    let tz = zone.tz();
    classify_against(tz, &transitions_near(tz, local), local)
}

/// Turn a wall-clock time in `zone` into an instant, honouring `choice` for gaps
/// and overlaps.
///
/// # Errors
///
/// With [`Disambiguation::Reject`], returns [`ScheduleError::NonExistentLocalTime`]
/// for a gap time and [`ScheduleError::AmbiguousLocalTime`] for an overlap time.
pub fn resolve_local(
    zone: &ZoneHandle,
    local: NaiveDateTime,
    choice: Disambiguation,
) -> Result<DateTime<Utc>> {
    let offset = match classify(zone, local) {
        LocalTimeClassification::Unambiguous { offset_seconds } => offset_seconds,
        LocalTimeClassification::NonExistent {
            offset_before_seconds,
            offset_after_seconds,
            ..
        } => match choice {
            Disambiguation::Reject => {
                return Err(ScheduleError::NonExistentLocalTime {
                    zone: zone.name().to_string(),
                    local: local.to_string(),
                })
            }
            // A larger offset maps the same wall clock to an earlier instant.
            Disambiguation::Earlier => offset_after_seconds.max(offset_before_seconds),
            Disambiguation::Later => offset_after_seconds.min(offset_before_seconds),
        },
        LocalTimeClassification::Ambiguous {
            earlier_offset_seconds,
            later_offset_seconds,
        } => match choice {
            Disambiguation::Reject => {
                return Err(ScheduleError::AmbiguousLocalTime {
                    zone: zone.name().to_string(),
                    local: local.to_string(),
                    earlier_offset_seconds,
                    later_offset_seconds,
                })
            }
            Disambiguation::Earlier => earlier_offset_seconds,
            Disambiguation::Later => later_offset_seconds,
        },
    };
    Ok((local - Duration::seconds(offset as i64)).and_utc())
}

// ── Warnings ────────────────────────────────────────────────────────────────

/// The next transition strictly after `reference`, if it is within `window_days`.
pub fn upcoming_warning(
    zone: &ZoneHandle,
    reference: DateTime<Utc>,
    window_days: i64,
) -> Option<DstTransition> {
    let tz = zone.tz();
    let year = reference.with_timezone(&tz).year();
    // A window past the representable range has no horizon.
    let horizon = Duration::try_days(window_days.max(0))
        .and_then(|window| reference.checked_add_signed(window));

    year_transitions(tz, year)
        .into_iter()
        .chain(year_transitions(tz, year + 1))
        .find(|t| t.at > reference)
        .filter(|t| horizon.map_or(true, |horizon| t.at <= horizon))
}

fn describe_shift(seconds: i32) -> String {
    let minutes = seconds.unsigned_abs() / 60;
    match (minutes / 60, minutes % 60) {
        (1, 0) => "1 hour".to_string(),
        (h, 0) => format!("{h} hours"),
        (0, m) => format!("{m} minutes"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// Combine classification and proximity into a single warning for `local`.
///
/// Gap times produce an [`WarningSeverity::Error`], overlap times a
/// [`WarningSeverity::Warning`]. Otherwise an upcoming spring-forward within
/// `window_days` is a warning and an upcoming fall-back is informational.
pub fn check_warning(
    zone: &ZoneHandle,
    local: NaiveDateTime,
    window_days: i64,
) -> Option<DstWarning> {
    let tz = zone.tz();
    let transitions = transitions_near(tz, local);

    let in_window = |t: &&DstTransition| {
        let (start, end) = t.local_window();
        local >= start && local < end
    };
    if let Some(transition) = transitions.iter().find(in_window) {
        let (severity, message, in_gap) = match transition.direction {
            TransitionDirection::Forward => (
                WarningSeverity::Error,
                "This time will not exist due to Daylight Saving Time (clocks spring forward)"
                    .to_string(),
                true,
            ),
            TransitionDirection::Backward => (
                WarningSeverity::Warning,
                "This time occurs twice due to Daylight Saving Time (clocks fall back)"
                    .to_string(),
                false,
            ),
        };
        return Some(DstWarning {
            transition: transition.clone(),
            severity,
            message,
            days_until: 0,
            in_gap,
            in_overlap: !in_gap,
        });
    }

    let instant = resolve_local(zone, local, Disambiguation::Earlier).ok()?;
    let transition = upcoming_warning(zone, instant, window_days)?;
    let days_until = (transition.local_after().date() - local.date()).num_days();
    let shift = describe_shift(transition.shift_seconds());
    let (severity, message) = match transition.direction {
        TransitionDirection::Forward => (
            WarningSeverity::Warning,
            format!(
                "Daylight Saving Time begins in {days_until} days (clocks spring forward {shift})"
            ),
        ),
        TransitionDirection::Backward => (
            WarningSeverity::Info,
            format!("Daylight Saving Time ends in {days_until} days (clocks fall back {shift})"),
        ),
    };
    Some(DstWarning {
        transition,
        severity,
        message,
        days_until,
        in_gap: false,
        in_overlap: false,
    })
}

/// Concrete instants to offer instead of a gap or overlap time.
///
/// For a gap: the same wall-clock time shifted back by the gap length (before the
/// change) and forward by it (after the change). For an overlap: both occurrences,
/// earlier first. Empty for an unambiguous time.
pub fn suggest_alternatives(zone: &ZoneHandle, local: NaiveDateTime) -> Vec<DateTime<Utc>> {
    match classify(zone, local) {
        LocalTimeClassification::Unambiguous { .. } => Vec::new(),
        LocalTimeClassification::NonExistent {
            offset_before_seconds,
            offset_after_seconds,
            ..
        } => {
            let shift = Duration::seconds((offset_after_seconds - offset_before_seconds) as i64);
            [local - shift, local + shift]
                .into_iter()
                .filter_map(|candidate| {
                    resolve_local(zone, candidate, Disambiguation::Earlier).ok()
                })
                .collect()
        }
        LocalTimeClassification::Ambiguous {
            earlier_offset_seconds,
            later_offset_seconds,
        } => [earlier_offset_seconds, later_offset_seconds]
            .into_iter()
            .map(|offset| (local - Duration::seconds(offset as i64)).and_utc())
            .collect(),
    }
}
