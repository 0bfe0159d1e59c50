//! Find and rank meeting times across participant zones.
//!
//! Candidates are laid out on a grid in the organizer's wall-clock window, each one
//! is converted into every participant's zone, and the five-factor
//! [`ScoreBreakdown`] decides the order. Occurrences of the request's existing
//! recurring series are busy time; they are merged once and used to drop candidates
//! from the grid.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;
use tracing::debug;

use crate::config::LocalTime;
use crate::dst::{self, DstTransition, LocalTimeClassification};
use crate::error::{Result, ScheduleError};
use crate::recurring::RecurringSeries;
use crate::score::{HolidayCalendar, LocalMeeting, ScoreBreakdown};
use crate::zone::ZoneHandle;

pub const DEFAULT_GRANULARITY_MINUTES: u32 = 30;
pub const DEFAULT_MIN_SCORE: u32 = 50;
pub const DEFAULT_MAX_RESULTS: usize = 10;
/// Longest meeting and coarsest grid step accepted, in minutes.
pub const MAX_DAY_MINUTES: i64 = 24 * 60;

/// A participant and the zone they work in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantZone {
    pub id: String,
    pub zone: ZoneHandle,
}

impl ParticipantZone {
    pub fn new(id: impl Into<String>, zone: ZoneHandle) -> Self {
        ParticipantZone {
            id: id.into(),
            zone,
        }
    }
}

/// A proposed meeting start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandidateSlot {
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl CandidateSlot {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(self.duration_minutes)
    }
}

/// A candidate with its score and how each participant sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredSlot {
    pub slot: CandidateSlot,
    pub score: ScoreBreakdown,
    /// In the same order as [`MeetingRequest::participants`].
    pub local_times: Vec<LocalMeeting>,
}

impl ScoredSlot {
    pub fn total(&self) -> u32 {
        self.score.total()
    }
}

/// Everything the finder needs for one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingRequest {
    pub organizer: ZoneHandle,
    pub participants: Vec<ParticipantZone>,
    pub duration_minutes: i64,
    /// Inclusive, in the organizer's zone.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// The organizer's wall-clock window; a meeting must end by `window_end`.
    pub window_start: LocalTime,
    pub window_end: LocalTime,
    pub exclude_weekends: bool,
    pub granularity_minutes: u32,
    pub min_score: u32,
    pub max_results: usize,
    pub holidays: HolidayCalendar,
    /// Series whose occurrences are busy time.
    pub existing: Vec<RecurringSeries>,
}

impl MeetingRequest {
    /// A request with the default 09:00–17:00 window, weekends excluded, a 30 minute
    /// grid, a floor of 50 and at most 10 results.
    pub fn new(
        organizer: ZoneHandle,
        participants: Vec<ParticipantZone>,
        duration: Duration,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        MeetingRequest {
            organizer,
            participants,
            duration_minutes: duration.num_minutes(),
            start_date,
            end_date,
            window_start: LocalTime::WORKDAY_START,
            window_end: LocalTime::WORKDAY_END,
            exclude_weekends: true,
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
            min_score: DEFAULT_MIN_SCORE,
            max_results: DEFAULT_MAX_RESULTS,
            holidays: HolidayCalendar::default(),
            existing: Vec::new(),
        }
    }

    pub fn with_window(mut self, start: LocalTime, end: LocalTime) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    pub fn with_exclude_weekends(mut self, exclude: bool) -> Self {
        self.exclude_weekends = exclude;
        self
    }

    pub fn with_granularity(mut self, minutes: u32) -> Self {
        self.granularity_minutes = minutes;
        self
    }

    pub fn with_min_score(mut self, min_score: u32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_holidays(mut self, holidays: HolidayCalendar) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn with_existing(mut self, series: RecurringSeries) -> Self {
        self.existing.push(series);
        self
    }

    fn check(&self) -> Result<()> {
        if self.participants.is_empty() {
            return Err(ScheduleError::InvalidRequest(
                "at least one participant is required".to_string(),
            ));
        }
        if self.duration_minutes <= 0 {
            return Err(ScheduleError::InvalidRequest(format!(
                "duration must be positive, got {} minutes",
                self.duration_minutes
            )));
        }
        if self.duration_minutes > MAX_DAY_MINUTES {
            return Err(ScheduleError::InvalidRequest(format!(
                "duration must be at most {MAX_DAY_MINUTES} minutes, got {}",
                self.duration_minutes
            )));
        }
        if self.granularity_minutes == 0 {
            return Err(ScheduleError::InvalidRequest(
                "granularity must be positive".to_string(),
            ));
        }
        if i64::from(self.granularity_minutes) > MAX_DAY_MINUTES {
            return Err(ScheduleError::InvalidRequest(format!(
                "granularity must be at most {MAX_DAY_MINUTES} minutes, got {}",
                self.granularity_minutes
            )));
        }
        if self.max_results == 0 {
            return Err(ScheduleError::InvalidRequest(
                "max_results must be positive".to_string(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(ScheduleError::InvalidRequest(format!(
                "date range is inverted: {} after {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

// ── Busy time ───────────────────────────────────────────────────────────────

/// Occurrences of `series` overlapping `[from, to)`, merged into sorted disjoint
/// intervals.
fn busy_periods(
    series: &[RecurringSeries],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = series
        .iter()
        .flat_map(|s| s.conflicts(from, to))
        .map(|o| (o.start, o.end))
        .collect();
    intervals.sort();

    let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
    for (start, end) in intervals {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}

fn is_busy(
    busy: &[(DateTime<Utc>, DateTime<Utc>)],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    // First period that ends after `start`; it is the only one that can overlap first.
    let idx = busy.partition_point(|(_, busy_end)| *busy_end <= start);
    busy.get(idx).is_some_and(|(busy_start, _)| *busy_start < end)
}

// ── Grid ────────────────────────────────────────────────────────────────────

struct Grid<'a> {
    request: &'a MeetingRequest,
    transitions: Vec<DstTransition>,
    busy: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl<'a> Grid<'a> {
    fn new(request: &'a MeetingRequest) -> Self {
        let zone = &request.organizer;
        let transitions = (request.start_date.year() - 1..=request.end_date.year() + 1)
            .flat_map(|year| dst::transitions_for_year(zone, year))
            .collect();

        let span_start = request.start_date.and_time(LocalTime::MIDNIGHT.to_naive()).and_utc()
            - Duration::days(2);
        let span_end = request.end_date.and_time(LocalTime::MIDNIGHT.to_naive()).and_utc()
            + Duration::days(3);
        let busy = busy_periods(&request.existing, span_start, span_end);

        Grid {
            request,
            transitions,
            busy,
        }
    }

    /// The instant for `minute` on `date` in the organizer zone, or `None` if that
    /// wall-clock time is skipped by DST. Repeated times use the first occurrence.
    fn instant(&self, date: NaiveDate, minute: u32) -> Option<DateTime<Utc>> {
        let local = date.and_time(LocalTime::from_minutes(minute)?.to_naive());
        let tz = self.request.organizer.tz();
        let offset = match dst::classify_against(tz, &self.transitions, local) {
            LocalTimeClassification::Unambiguous { offset_seconds } => offset_seconds,
            LocalTimeClassification::Ambiguous {
                earlier_offset_seconds,
                ..
            } => earlier_offset_seconds,
            LocalTimeClassification::NonExistent { .. } => return None,
        };
        Some((local - Duration::seconds(offset as i64)).and_utc())
    }

    fn candidates(&self, cancel: &AtomicBool) -> Result<Vec<CandidateSlot>> {
        let request = self.request;
        let duration = request.duration_minutes;
        let window_start = request.window_start.minutes_of_day();
        let window_end = request.window_end.minutes_of_day() as i64;

        let mut slots = Vec::new();
        for date in request.start_date.iter_days().take_while(|d| *d <= request.end_date) {
            if request.exclude_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let mut minute = window_start;
            while minute as i64 + duration <= window_end {
                if cancel.load(Ordering::Relaxed) {
                    return Err(ScheduleError::Cancelled);
                }
                if let Some(start) = self.instant(date, minute) {
                    let slot = CandidateSlot {
                        start,
                        duration_minutes: duration,
                    };
                    if !is_busy(&self.busy, slot.start, slot.end()) {
                        slots.push(slot);
                    }
                }
                minute += request.granularity_minutes;
            }
        }
        Ok(slots)
    }
}

// ── Search ──────────────────────────────────────────────────────────────────

fn score_slot(request: &MeetingRequest, slot: CandidateSlot) -> ScoredSlot {
    let duration = Duration::minutes(slot.duration_minutes);
    let local_times: Vec<LocalMeeting> = request
        .participants
        .iter()
        .map(|p| LocalMeeting::at(slot.start, duration, &p.zone))
        .collect();
    let organizer_weekday = slot
        .start
        .with_timezone(&request.organizer.tz())
        .weekday();
    let score = ScoreBreakdown::compute(&local_times, organizer_weekday, &request.holidays);
    ScoredSlot {
        slot,
        score,
        local_times,
    }
}

/// Find and rank meeting slots for `request`.
///
/// # Errors
///
/// [`ScheduleError::InvalidRequest`] for a malformed request, and
/// [`ScheduleError::NoCandidatesInWindow`] if no grid point survives the window,
/// weekend, DST and busy-time filters. Low scores alone never produce an error.
pub fn find_slots(request: &MeetingRequest) -> Result<Vec<ScoredSlot>> {
    find_slots_with_cancel(request, &AtomicBool::new(false))
}

/// [`find_slots`] with a cancellation flag checked once per grid point.
pub fn find_slots_with_cancel(
    request: &MeetingRequest,
    cancel: &AtomicBool,
) -> Result<Vec<ScoredSlot>> {
    request.check()?;

    let grid = Grid::new(request);
    let candidates = grid.candidates(cancel)?;
    if candidates.is_empty() {
        return Err(ScheduleError::NoCandidatesInWindow(format!(
            "{} to {} between {} and {} in {}",
            request.start_date,
            request.end_date,
            request.window_start,
            request.window_end,
            request.organizer
        )));
    }

    let mut scored: Vec<ScoredSlot> = candidates
        .into_iter()
        .map(|slot| score_slot(request, slot))
        .collect();
    scored.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then_with(|| a.slot.start.cmp(&b.slot.start))
    });

    let candidate_count = scored.len();
    let usable = scored.iter().filter(|s| s.total() >= request.min_score).count();
    // Sorted descending, so the usable slots are a prefix.
    if usable > 0 {
        scored.truncate(usable);
    }
    scored.truncate(request.max_results);

    debug!(
        organizer = request.organizer.name(),
        participants = request.participants.len(),
        candidates = candidate_count,
        usable,
        returned = scored.len(),
        best = scored.first().map(|s| s.total()),
        "ranked meeting slots"
    );
    Ok(scored)
}
