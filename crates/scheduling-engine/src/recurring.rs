//! Recurring series with per-occurrence exceptions.
//!
//! A [`RecurringSeries`] is a master RRULE anchored at a wall-clock start in a zone,
//! plus at most one [`Exception`] per occurrence date. Exceptions never touch the
//! rule: a deletion is an exclusion (EXDATE) that every expansion skips, and a
//! modification overrides the rule-derived times for that date only.
//!
//! Expansion is delegated to the `rrule` crate so that occurrences keep their local
//! wall-clock time across DST transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rrule::RRuleSet;
use serde::Serialize;
use tracing::debug;

use crate::dst::{self, Disambiguation};
use crate::error::{Result, ScheduleError};
use crate::zone::ZoneHandle;

/// Upper bound on rule instances expanded for a single query.
const MAX_EXPANSION: u16 = u16::MAX;

/// A per-occurrence override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exception {
    Modified {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        title: Option<String>,
    },
    Deleted,
}

/// A change to apply to one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionChange {
    /// Override times and/or title. Missing times fall back to the rule-derived
    /// start and the series duration.
    Modify {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        title: Option<String>,
    },
    /// Exclude the occurrence.
    Delete,
}

/// One materialized occurrence of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    /// Local date of the rule-derived start; identifies the occurrence.
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    pub is_exception: bool,
}

impl Occurrence {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// Occurrences are identified by their local date, so a rule must not repeat within
/// a day.
fn check_once_per_day(rrule: &str) -> Result<()> {
    for part in rrule.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let repeats = match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => matches!(
                value.trim().to_ascii_uppercase().as_str(),
                "HOURLY" | "MINUTELY" | "SECONDLY"
            ),
            "BYHOUR" | "BYMINUTE" | "BYSECOND" => value.contains(','),
            _ => false,
        };
        if repeats {
            return Err(ScheduleError::InvalidRule(format!(
                "'{rrule}' repeats within a day ({part}); at most one occurrence per date"
            )));
        }
    }
    Ok(())
}

/// A recurrence master and its exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurringSeries {
    pub id: String,
    pub title: String,
    rrule: String,
    zone: ZoneHandle,
    start_local: NaiveDateTime,
    duration_minutes: i64,
    exceptions: BTreeMap<NaiveDate, Exception>,
}

impl RecurringSeries {
    /// Create a series from an RRULE body (with or without the `RRULE:` prefix).
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidRule`] if the rule does not parse or validate, can
    /// produce more than one occurrence per local day, or the duration is not
    /// positive; DST errors if `start_local` is not a unique local time.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, NaiveDate, TimeZone, Utc};
    /// use scheduling_engine::recurring::RecurringSeries;
    /// use scheduling_engine::zone::ZoneRegistry;
    ///
    /// let ny = ZoneRegistry::new().resolve("America/New_York").unwrap();
    /// let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap().and_hms_opt(9, 0, 0).unwrap();
    /// let series = RecurringSeries::new(
    ///     "standup", "Standup", "FREQ=WEEKLY;BYDAY=MO", &ny, start, Duration::minutes(15),
    /// ).unwrap();
    ///
    /// let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    /// let to = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    /// assert_eq!(series.instances(from, to).count(), 4);
    /// ```
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        rrule: &str,
        zone: &ZoneHandle,
        start_local: NaiveDateTime,
        duration: Duration,
    ) -> Result<Self> {
        let rrule = rrule.trim();
        let rrule = rrule.strip_prefix("RRULE:").unwrap_or(rrule).to_string();
        if rrule.is_empty() || rrule.contains('\n') {
            return Err(ScheduleError::InvalidRule(format!(
                "expected a single RRULE body, got '{rrule}'"
            )));
        }
        if duration <= Duration::zero() {
            return Err(ScheduleError::InvalidRule(format!(
                "duration must be positive, got {} minutes",
                duration.num_minutes()
            )));
        }
        dst::resolve_local(zone, start_local, Disambiguation::Reject)?;

        let series = RecurringSeries {
            id: id.into(),
            title: title.into(),
            rrule,
            zone: zone.clone(),
            start_local,
            duration_minutes: duration.num_minutes(),
            exceptions: BTreeMap::new(),
        };
        series.rule_set()?;
        check_once_per_day(&series.rrule)?;
        Ok(series)
    }

    pub fn rrule(&self) -> &str {
        &self.rrule
    }

    pub fn zone(&self) -> &ZoneHandle {
        &self.zone
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    pub fn exceptions(&self) -> &BTreeMap<NaiveDate, Exception> {
        &self.exceptions
    }

    /// Dates removed from the series.
    pub fn excluded_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.exceptions
            .iter()
            .filter(|(_, exception)| matches!(exception, Exception::Deleted))
            .map(|(date, _)| *date)
    }

    fn rule_set(&self) -> Result<RRuleSet> {
        let text = format!(
            "DTSTART;TZID={}:{}\nRRULE:{}",
            self.zone.name(),
            self.start_local.format("%Y%m%dT%H%M%S"),
            self.rrule
        );
        text.parse::<RRuleSet>()
            .map_err(|e| ScheduleError::InvalidRule(format!("'{}': {}", self.rrule, e)))
    }

    /// Rule-derived starts in `[from, to)`, ignoring exceptions.
    fn rule_starts(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let Ok(set) = self.rule_set() else {
            return Vec::new();
        };
        let after = (from - Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
        let before = to.with_timezone(&rrule::Tz::UTC);
        set.after(after)
            .before(before)
            .all(MAX_EXPANSION)
            .dates
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .filter(|dt| *dt >= from && *dt < to)
            .collect()
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.zone.tz()).date_naive()
    }

    /// Rule-derived start of the occurrence on `date`, if the rule produces one.
    fn rule_start_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
        // Widen by a day each side to cover any zone offset.
        self.rule_starts(midnight - Duration::days(1), midnight + Duration::days(2))
            .into_iter()
            .find(|start| self.local_date(*start) == date)
    }

    fn materialize(&self, date: NaiveDate, rule_start: DateTime<Utc>) -> Option<Occurrence> {
        match self.exceptions.get(&date) {
            Some(Exception::Deleted) => None,
            Some(Exception::Modified { start, end, title }) => Some(Occurrence {
                date,
                start: *start,
                end: *end,
                title: title.clone().unwrap_or_else(|| self.title.clone()),
                is_exception: true,
            }),
            None => Some(Occurrence {
                date,
                start: rule_start,
                end: rule_start + self.duration(),
                title: self.title.clone(),
                is_exception: false,
            }),
        }
    }

    /// Occurrences whose effective start lies in `[range_start, range_end)`, in
    /// start order.
    ///
    /// Deleted dates are skipped; modified dates appear at their override time (and
    /// only if that time is in range). Each call re-expands the rule.
    pub fn instances(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> impl Iterator<Item = Occurrence> {
        let mut occurrences: Vec<Occurrence> = self
            .rule_starts(range_start, range_end)
            .into_iter()
            .filter_map(|start| {
                let date = self.local_date(start);
                match self.exceptions.get(&date) {
                    None => self.materialize(date, start),
                    Some(_) => None,
                }
            })
            .collect();

        occurrences.extend(self.exceptions.iter().filter_map(|(date, exception)| {
            match exception {
                Exception::Modified { start, .. }
                    if *start >= range_start && *start < range_end =>
                {
                    self.materialize(*date, *start)
                }
                _ => None,
            }
        }));

        occurrences.sort_by_key(|o| (o.start, o.date));
        occurrences.into_iter()
    }

    /// The effective occurrence on `date`, or `None` if deleted or not a rule date.
    pub fn occurrence(&self, date: NaiveDate) -> Option<Occurrence> {
        let rule_start = self.rule_start_on(date)?;
        self.materialize(date, rule_start)
    }

    /// Occurrences whose effective interval intersects `[start, end)`.
    pub fn conflicts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Occurrence> {
        let mut found: Vec<Occurrence> = self
            .rule_starts(start - self.duration(), end)
            .into_iter()
            .filter(|rule_start| !self.exceptions.contains_key(&self.local_date(*rule_start)))
            .filter_map(|rule_start| self.materialize(self.local_date(rule_start), rule_start))
            .filter(|o| o.overlaps(start, end))
            .collect();

        found.extend(
            self.exceptions
                .iter()
                .filter_map(|(date, exception)| match exception {
                    Exception::Modified { start, .. } => self.materialize(*date, *start),
                    Exception::Deleted => None,
                })
                .filter(|o| o.overlaps(start, end)),
        );

        found.sort_by_key(|o| (o.start, o.date));
        found
    }

    /// Record `change` for the occurrence on `date`, replacing any earlier exception
    /// for that date. The rule itself is never altered.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidDatetime`] if the rule has no occurrence on `date`, or
    /// if the resulting end is not after the start.
    pub fn apply_exception(&self, date: NaiveDate, change: ExceptionChange) -> Result<Self> {
        let rule_start = self.rule_start_on(date).ok_or_else(|| {
            ScheduleError::InvalidDatetime(format!(
                "series '{}' has no occurrence on {date}",
                self.id
            ))
        })?;

        let exception = match change {
            ExceptionChange::Delete => Exception::Deleted,
            ExceptionChange::Modify { start, end, title } => {
                let start = start.unwrap_or(rule_start);
                let end = end.unwrap_or(start + self.duration());
                if end <= start {
                    return Err(ScheduleError::InvalidDatetime(format!(
                        "exception end {end} is not after start {start}"
                    )));
                }
                Exception::Modified { start, end, title }
            }
        };

        debug!(series = %self.id, %date, ?exception, "applied exception");
        let mut updated = self.clone();
        updated.exceptions.insert(date, exception);
        Ok(updated)
    }

    /// Shorthand for [`ExceptionChange::Delete`].
    pub fn delete_occurrence(&self, date: NaiveDate) -> Result<Self> {
        self.apply_exception(date, ExceptionChange::Delete)
    }

    /// Shorthand for a time-only [`ExceptionChange::Modify`].
    pub fn reschedule_occurrence(
        &self,
        date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        self.apply_exception(
            date,
            ExceptionChange::Modify {
                start: Some(start),
                end: Some(end),
                title: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneRegistry;

    fn ny() -> ZoneHandle {
        ZoneRegistry::new().resolve("America/New_York").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    /// Mondays at 09:00 New York, 30 minutes, from 2025-01-06.
    fn weekly() -> RecurringSeries {
        RecurringSeries::new(
            "sync",
            "Weekly sync",
            "FREQ=WEEKLY;BYDAY=MO",
            &ny(),
            date(2025, 1, 6).and_hms_opt(9, 0, 0).unwrap(),
            Duration::minutes(30),
        )
        .unwrap()
    }

    #[test]
    fn test_instances_in_range() {
        let series = weekly();
        let found: Vec<_> = series
            .instances(utc("2025-01-01T00:00:00Z"), utc("2025-02-01T00:00:00Z"))
            .collect();
        let dates: Vec<_> = found.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2025, 1, 6), date(2025, 1, 13), date(2025, 1, 20), date(2025, 1, 27)]
        );
        assert_eq!(found[0].start, utc("2025-01-06T14:00:00Z"));
        assert_eq!(found[0].end, utc("2025-01-06T14:30:00Z"));
        assert!(found.iter().all(|o| !o.is_exception));
    }

    #[test]
    fn test_instances_keep_wall_clock_across_dst() {
        let series = weekly();
        let found: Vec<_> = series
            .instances(utc("2025-03-03T00:00:00Z"), utc("2025-03-11T00:00:00Z"))
            .collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].start, utc("2025-03-03T14:00:00Z"));
        // After spring forward, 09:00 EDT is 13:00 UTC.
        assert_eq!(found[1].start, utc("2025-03-10T13:00:00Z"));
    }

    #[test]
    fn test_instances_restartable() {
        let series = weekly();
        let from = utc("2025-01-01T00:00:00Z");
        let to = utc("2025-03-01T00:00:00Z");
        let first: Vec<_> = series.instances(from, to).collect();
        let second: Vec<_> = series.instances(from, to).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_delete_excludes_from_every_regeneration() {
        let series = weekly().delete_occurrence(date(2025, 1, 13)).unwrap();
        assert_eq!(series.rrule(), "FREQ=WEEKLY;BYDAY=MO");
        assert_eq!(series.excluded_dates().collect::<Vec<_>>(), vec![date(2025, 1, 13)]);

        for (from, to) in [
            ("2025-01-01T00:00:00Z", "2025-02-01T00:00:00Z"),
            ("2025-01-13T00:00:00Z", "2025-01-14T00:00:00Z"),
            ("2024-12-01T00:00:00Z", "2025-06-01T00:00:00Z"),
        ] {
            assert!(series
                .instances(utc(from), utc(to))
                .all(|o| o.date != date(2025, 1, 13)));
        }
        assert!(series.occurrence(date(2025, 1, 13)).is_none());
        assert!(series.occurrence(date(2025, 1, 20)).is_some());
    }

    #[test]
    fn test_modify_overrides_single_date() {
        let series = weekly()
            .reschedule_occurrence(
                date(2025, 1, 13),
                utc("2025-01-13T19:00:00Z"),
                utc("2025-01-13T20:00:00Z"),
            )
            .unwrap();
        let found: Vec<_> = series
            .instances(utc("2025-01-01T00:00:00Z"), utc("2025-02-01T00:00:00Z"))
            .collect();
        assert_eq!(found.len(), 4);
        let moved = found.iter().find(|o| o.date == date(2025, 1, 13)).unwrap();
        assert!(moved.is_exception);
        assert_eq!(moved.start, utc("2025-01-13T19:00:00Z"));
        let untouched = found.iter().find(|o| o.date == date(2025, 1, 20)).unwrap();
        assert_eq!(untouched.start, utc("2025-01-20T14:00:00Z"));
    }

    #[test]
    fn test_modified_occurrence_moved_out_of_range() {
        let series = weekly()
            .reschedule_occurrence(
                date(2025, 1, 27),
                utc("2025-02-03T20:00:00Z"),
                utc("2025-02-03T21:00:00Z"),
            )
            .unwrap();
        let january: Vec<_> = series
            .instances(utc("2025-01-01T00:00:00Z"), utc("2025-02-01T00:00:00Z"))
            .collect();
        assert_eq!(january.len(), 3);
        let february: Vec<_> = series
            .instances(utc("2025-02-01T00:00:00Z"), utc("2025-02-08T00:00:00Z"))
            .collect();
        assert_eq!(february.len(), 2);
        assert_eq!(february[0].date, date(2025, 2, 3));
        assert_eq!(february[1].date, date(2025, 1, 27));
    }

    #[test]
    fn test_modify_title_only_keeps_rule_times() {
        let series = weekly()
            .apply_exception(
                date(2025, 1, 20),
                ExceptionChange::Modify {
                    start: None,
                    end: None,
                    title: Some("Sync (demo day)".to_string()),
                },
            )
            .unwrap();
        let occurrence = series.occurrence(date(2025, 1, 20)).unwrap();
        assert_eq!(occurrence.title, "Sync (demo day)");
        assert_eq!(occurrence.start, utc("2025-01-20T14:00:00Z"));
        assert_eq!(occurrence.end, utc("2025-01-20T14:30:00Z"));
        assert!(occurrence.is_exception);
    }

    #[test]
    fn test_reapply_replaces_prior_exception() {
        let day = date(2025, 1, 13);
        let series = weekly()
            .delete_occurrence(day)
            .unwrap()
            .reschedule_occurrence(day, utc("2025-01-13T16:00:00Z"), utc("2025-01-13T16:30:00Z"))
            .unwrap();
        assert_eq!(series.exceptions().len(), 1);
        assert!(matches!(series.exceptions()[&day], Exception::Modified { .. }));
        assert_eq!(series.excluded_dates().count(), 0);
    }

    #[test]
    fn test_apply_exception_idempotent() {
        let change = ExceptionChange::Modify {
            start: Some(utc("2025-01-13T15:00:00Z")),
            end: None,
            title: None,
        };
        let once = weekly().apply_exception(date(2025, 1, 13), change.clone()).unwrap();
        let twice = once.apply_exception(date(2025, 1, 13), change).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_apply_exception_rejects_non_occurrence() {
        let err = weekly().delete_occurrence(date(2025, 1, 14)).unwrap_err();
        assert!(err.to_string().contains("no occurrence on 2025-01-14"), "got: {err}");
    }

    #[test]
    fn test_apply_exception_rejects_inverted_times() {
        let err = weekly()
            .reschedule_occurrence(
                date(2025, 1, 13),
                utc("2025-01-13T16:00:00Z"),
                utc("2025-01-13T15:00:00Z"),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDatetime(_)));
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let start = date(2025, 1, 6).and_hms_opt(9, 0, 0).unwrap();
        let err =
            RecurringSeries::new("x", "x", "FREQ=SOMETIMES", &ny(), start, Duration::minutes(30))
                .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRule(_)));

        let err = RecurringSeries::new("x", "x", "FREQ=DAILY", &ny(), start, Duration::zero())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRule(_)));
    }

    #[test]
    fn test_several_occurrences_per_day_rejected() {
        let start = date(2025, 1, 6).and_hms_opt(9, 0, 0).unwrap();
        let rules = ["FREQ=DAILY;BYHOUR=9,15", "FREQ=HOURLY", "FREQ=WEEKLY;BYDAY=MO;BYMINUTE=0,30"];
        for rule in rules {
            let err = RecurringSeries::new("x", "x", rule, &ny(), start, Duration::minutes(30))
                .unwrap_err();
            match err {
                ScheduleError::InvalidRule(message) => {
                    assert!(message.contains("repeats within a day"), "got: {message}")
                }
                other => panic!("expected InvalidRule for {rule}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_single_byhour_accepted() {
        let start = date(2025, 1, 6).and_hms_opt(9, 0, 0).unwrap();
        let rule = "FREQ=DAILY;BYHOUR=9";
        let series =
            RecurringSeries::new("x", "x", rule, &ny(), start, Duration::minutes(30)).unwrap();
        let found: Vec<_> = series
            .instances(utc("2025-01-06T00:00:00Z"), utc("2025-01-09T00:00:00Z"))
            .collect();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].start, utc("2025-01-06T14:00:00Z"));
    }

    #[test]
    fn test_start_in_dst_gap_rejected() {
        let start = date(2025, 3, 9).and_hms_opt(2, 30, 0).unwrap();
        let err = RecurringSeries::new("x", "x", "FREQ=DAILY", &ny(), start, Duration::minutes(30))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::NonExistentLocalTime { .. }));
    }

    #[test]
    fn test_rrule_prefix_accepted() {
        let start = date(2025, 1, 6).and_hms_opt(9, 0, 0).unwrap();
        let series = RecurringSeries::new(
            "x",
            "x",
            "RRULE:FREQ=DAILY;COUNT=3",
            &ny(),
            start,
            Duration::minutes(30),
        )
        .unwrap();
        assert_eq!(series.rrule(), "FREQ=DAILY;COUNT=3");
        let all: Vec<_> = series
            .instances(utc("2025-01-01T00:00:00Z"), utc("2026-01-01T00:00:00Z"))
            .collect();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_conflicts() {
        let series = weekly()
            .reschedule_occurrence(
                date(2025, 1, 20),
                utc("2025-01-21T15:00:00Z"),
                utc("2025-01-21T16:00:00Z"),
            )
            .unwrap();

        let hits = series.conflicts(utc("2025-01-13T14:15:00Z"), utc("2025-01-13T15:00:00Z"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date, date(2025, 1, 13));

        // Adjacent is not a conflict.
        assert!(series
            .conflicts(utc("2025-01-13T14:30:00Z"), utc("2025-01-13T15:00:00Z"))
            .is_empty());

        // The moved occurrence conflicts at its new time, not its old one.
        assert!(series
            .conflicts(utc("2025-01-20T14:00:00Z"), utc("2025-01-20T14:30:00Z"))
            .is_empty());
        let moved = series.conflicts(utc("2025-01-21T15:30:00Z"), utc("2025-01-21T15:45:00Z"));
        assert_eq!(moved.len(), 1);
        assert!(moved[0].is_exception);
    }
}
