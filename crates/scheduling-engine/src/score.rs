//! The five-factor meeting score.
//!
//! Every factor is an integer with a fixed ceiling, so a total is always in
//! `0..=100` and always equals the sum of its parts. Factors that average over
//! participants use floor division.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::MINUTES_PER_DAY;
use crate::convert::ConvertedTime;
use crate::zone::ZoneHandle;

pub const COVERAGE_MAX: u32 = 40;
pub const TIME_QUALITY_MAX: u32 = 25;
pub const CULTURAL_FIT_MAX: u32 = 15;
pub const WEEKDAY_MAX: u32 = 10;
pub const HOLIDAY_MAX: u32 = 10;

/// Canonical working band used for coverage, in minutes of day.
const CORE_START: u32 = 9 * 60;
const CORE_END: u32 = 17 * 60;
const LUNCH_START: u32 = 12 * 60;
const LUNCH_END: u32 = 13 * 60;

const FRIDAY_AFTERNOON_PENALTY: u32 = 6;
const LUNCH_PENALTY: u32 = 5;
const MONDAY_EARLY_PENALTY: u32 = 4;

/// Zones where Friday is part of the weekend or a short prayer day.
pub const MIDDLE_EAST_ZONES: &[&str] = &[
    "Asia/Aden",
    "Asia/Amman",
    "Asia/Baghdad",
    "Asia/Bahrain",
    "Asia/Damascus",
    "Asia/Dubai",
    "Asia/Gaza",
    "Asia/Hebron",
    "Asia/Jerusalem",
    "Asia/Kuwait",
    "Asia/Muscat",
    "Asia/Qatar",
    "Asia/Riyadh",
    "Asia/Tehran",
    "Africa/Cairo",
    "Africa/Khartoum",
    "Africa/Tripoli",
];

// ── Holidays ────────────────────────────────────────────────────────────────

/// A month/day observed every year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnualDate {
    pub month: u32,
    pub day: u32,
}

/// Known holidays: fixed annual dates for every zone, plus dates for specific zones.
///
/// The default calendar is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    #[serde(default)]
    pub annual: BTreeSet<AnnualDate>,
    /// Keyed by canonical zone name.
    #[serde(default)]
    pub zones: BTreeMap<String, BTreeSet<NaiveDate>>,
}

impl HolidayCalendar {
    pub fn with_annual(mut self, month: u32, day: u32) -> Self {
        self.annual.insert(AnnualDate { month, day });
        self
    }

    pub fn with_date(mut self, zone: &str, date: NaiveDate) -> Self {
        self.zones.entry(zone.to_string()).or_default().insert(date);
        self
    }

    pub fn is_holiday(&self, zone: &str, date: NaiveDate) -> bool {
        self.annual.contains(&AnnualDate {
            month: date.month(),
            day: date.day(),
        }) || self.zones.get(zone).is_some_and(|dates| dates.contains(&date))
    }
}

// ── Participant view ────────────────────────────────────────────────────────

/// A meeting as one participant sees it on their own wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalMeeting {
    pub zone: &'static str,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl LocalMeeting {
    pub fn at(start: DateTime<Utc>, duration: Duration, zone: &ZoneHandle) -> Self {
        LocalMeeting {
            zone: zone.name(),
            start: ConvertedTime::at(start, zone).local,
            end: ConvertedTime::at(start + duration, zone).local,
        }
    }

    fn start_minute(&self) -> u32 {
        self.start.hour() * 60 + self.start.minute()
    }

    /// End as minutes past the start date's midnight, capped at midnight.
    fn end_minute_same_day(&self) -> u32 {
        if self.end.date() > self.start.date() {
            MINUTES_PER_DAY
        } else {
            self.end.hour() * 60 + self.end.minute()
        }
    }

    fn overlaps_minutes(&self, from: u32, to: u32) -> bool {
        self.start_minute() < to && self.end_minute_same_day() > from
    }

    fn within_core_hours(&self) -> bool {
        let ends_same_day = self.end.date() == self.start.date();
        ends_same_day && self.start_minute() >= CORE_START && self.end_minute_same_day() <= CORE_END
    }
}

// ── Factors ─────────────────────────────────────────────────────────────────

/// Per-participant value of a local start time, 0–100.
pub fn time_band(start: NaiveDateTime) -> u32 {
    match start.hour() * 60 + start.minute() {
        540..660 => 100,
        660..840 => 80,
        840..1020 => 60,
        480..540 | 1020..1080 => 30,
        _ => 0,
    }
}

pub fn working_hours_coverage(meetings: &[LocalMeeting]) -> u32 {
    if meetings.is_empty() {
        return 0;
    }
    let covered = meetings.iter().filter(|m| m.within_core_hours()).count() as u32;
    COVERAGE_MAX * covered / meetings.len() as u32
}

pub fn time_quality(meetings: &[LocalMeeting]) -> u32 {
    if meetings.is_empty() {
        return 0;
    }
    let sum: u32 = meetings.iter().map(|m| time_band(m.start)).sum();
    TIME_QUALITY_MAX * sum / (100 * meetings.len() as u32)
}

pub fn cultural_fit(meetings: &[LocalMeeting]) -> u32 {
    let friday_afternoon = meetings.iter().any(|m| {
        MIDDLE_EAST_ZONES.contains(&m.zone)
            && m.start.weekday() == Weekday::Fri
            && m.overlaps_minutes(LUNCH_START, MINUTES_PER_DAY)
    });
    let lunch = meetings
        .iter()
        .any(|m| m.overlaps_minutes(LUNCH_START, LUNCH_END));
    let monday_early = meetings
        .iter()
        .any(|m| m.start.weekday() == Weekday::Mon && m.start_minute() < CORE_START);

    let mut deductions = 0;
    if friday_afternoon {
        deductions += FRIDAY_AFTERNOON_PENALTY;
    }
    if lunch {
        deductions += LUNCH_PENALTY;
    }
    if monday_early {
        deductions += MONDAY_EARLY_PENALTY;
    }
    CULTURAL_FIT_MAX.saturating_sub(deductions)
}

pub fn weekday_preference(weekday: Weekday) -> u32 {
    match weekday {
        Weekday::Tue | Weekday::Wed => 10,
        Weekday::Mon | Weekday::Thu => 8,
        Weekday::Fri => 5,
        Weekday::Sat | Weekday::Sun => 0,
    }
}

pub fn holiday_avoidance(meetings: &[LocalMeeting], calendar: &HolidayCalendar) -> u32 {
    if meetings.is_empty() {
        return HOLIDAY_MAX;
    }
    let n = meetings.len() as u32;
    let affected = meetings
        .iter()
        .filter(|m| calendar.is_holiday(m.zone, m.start.date()))
        .count() as u32;
    HOLIDAY_MAX * (n - affected) / n
}

// ── Breakdown ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub working_hours_coverage: u32,
    pub time_quality: u32,
    pub cultural_fit: u32,
    pub weekday_preference: u32,
    pub holiday_avoidance: u32,
}

impl ScoreBreakdown {
    /// Score one candidate from every participant's local view. `organizer_weekday`
    /// drives the weekday factor.
    pub fn compute(
        meetings: &[LocalMeeting],
        organizer_weekday: Weekday,
        calendar: &HolidayCalendar,
    ) -> Self {
        ScoreBreakdown {
            working_hours_coverage: working_hours_coverage(meetings),
            time_quality: time_quality(meetings),
            cultural_fit: cultural_fit(meetings),
            weekday_preference: weekday_preference(organizer_weekday),
            holiday_avoidance: holiday_avoidance(meetings, calendar),
        }
    }

    pub fn total(&self) -> u32 {
        self.working_hours_coverage
            + self.time_quality
            + self.cultural_fit
            + self.weekday_preference
            + self.holiday_avoidance
    }
}
