//! Working-hours configuration values.
//!
//! These types are the already-parsed form of the `working_hours` configuration
//! document. Wall-clock strings (`"HH:MM"`) are turned into [`LocalTime`] once, at
//! deserialization, so evaluation never re-parses text.
//!
//! [`WorkingHoursConfig::validate`] is the load-time configuration check. The
//! validator in [`crate::validate`] never calls it: evaluation degrades gracefully
//! on malformed schedules instead of failing.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// Minutes in a civil day. Used as the exclusive end of an event that runs to midnight.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

// ── LocalTime ───────────────────────────────────────────────────────────────

/// A wall-clock time of day with minute resolution.
///
/// Serialized as `"HH:MM"`. Parsing also accepts a single-digit hour (`"9:00"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalTime {
    hour: u8,
    minute: u8,
}

impl LocalTime {
    pub const MIDNIGHT: LocalTime = LocalTime { hour: 0, minute: 0 };
    /// 09:00, the default start of working hours and of the meeting window.
    pub const WORKDAY_START: LocalTime = LocalTime { hour: 9, minute: 0 };
    /// 17:00, the default end of working hours and of the meeting window.
    pub const WORKDAY_END: LocalTime = LocalTime { hour: 17, minute: 0 };

    /// Build a time of day; `None` if `hour > 23` or `minute > 59`.
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            None
        } else {
            Some(LocalTime { hour, minute })
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since local midnight (0..1440).
    pub fn minutes_of_day(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }

    /// Build from minutes since midnight. `None` outside `0..1440`.
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        if minutes >= MINUTES_PER_DAY {
            return None;
        }
        Self::new((minutes / 60) as u8, (minutes % 60) as u8)
    }

    /// Truncate a `NaiveTime` to minute resolution.
    pub fn from_naive(time: NaiveTime) -> Self {
        LocalTime {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for LocalTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidConfig(format!("expected HH:MM, got '{s}'"));

        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        LocalTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for LocalTime {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LocalTime> for String {
    fn from(value: LocalTime) -> Self {
        value.to_string()
    }
}

// ── Breaks ──────────────────────────────────────────────────────────────────

/// The kind of a configured break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakType {
    Lunch,
    Coffee,
    #[default]
    Custom,
}

/// A local time interval during which events must not be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakBlock {
    pub name: String,
    pub start: LocalTime,
    pub end: LocalTime,
    #[serde(rename = "type", default)]
    pub kind: BreakType,
}

impl BreakBlock {
    pub fn new(name: impl Into<String>, start: LocalTime, end: LocalTime, kind: BreakType) -> Self {
        BreakBlock {
            name: name.into(),
            start,
            end,
            kind,
        }
    }

    /// Whether `[start_min, end_min)` intersects `[self.start, self.end)`.
    ///
    /// A break whose start is not before its end matches nothing.
    pub fn overlaps_minutes(&self, start_min: u32, end_min: u32) -> bool {
        let (bs, be) = (self.start.minutes_of_day(), self.end.minutes_of_day());
        bs < be && start_min < be && end_min > bs
    }
}

// ── DaySchedule ─────────────────────────────────────────────────────────────

/// Working hours and breaks for one day.
///
/// Missing fields take the defaults: enabled, 09:00–17:00, no breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaySchedule {
    pub enabled: bool,
    pub start: LocalTime,
    pub end: LocalTime,
    pub breaks: Vec<BreakBlock>,
}

impl Default for DaySchedule {
    fn default() -> Self {
        DaySchedule {
            enabled: true,
            start: LocalTime::WORKDAY_START,
            end: LocalTime::WORKDAY_END,
            breaks: Vec::new(),
        }
    }
}

impl DaySchedule {
    pub fn new(start: LocalTime, end: LocalTime) -> Self {
        DaySchedule {
            enabled: true,
            start,
            end,
            breaks: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        DaySchedule {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_break(mut self, block: BreakBlock) -> Self {
        self.breaks.push(block);
        self
    }

    /// Shape problems in this schedule, prefixed with `label`.
    fn issues(&self, label: &str) -> Vec<String> {
        let mut issues = Vec::new();

        if self.start >= self.end {
            issues.push(format!(
                "{label}: working hours start {} is not before end {}",
                self.start, self.end
            ));
        }

        for block in &self.breaks {
            if block.start >= block.end {
                issues.push(format!(
                    "{label}: break '{}' start {} is not before end {}",
                    block.name, block.start, block.end
                ));
            }
        }

        for (i, a) in self.breaks.iter().enumerate() {
            for b in &self.breaks[i + 1..] {
                if a.start < a.end
                    && b.start < b.end
                    && b.overlaps_minutes(a.start.minutes_of_day(), a.end.minutes_of_day())
                {
                    issues.push(format!(
                        "{label}: breaks '{}' ({}-{}) and '{}' ({}-{}) overlap",
                        a.name, a.start, a.end, b.name, b.start, b.end
                    ));
                }
            }
        }

        issues
    }
}

// ── WorkingHoursConfig ──────────────────────────────────────────────────────

/// The `working_hours` configuration: a default schedule plus optional overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkingHoursConfig {
    #[serde(default)]
    pub default: DaySchedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuesday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wednesday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thursday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunday: Option<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekend: Option<DaySchedule>,
}

impl WorkingHoursConfig {
    pub fn new(default: DaySchedule) -> Self {
        WorkingHoursConfig {
            default,
            ..Default::default()
        }
    }

    /// Set the explicit override for one weekday.
    pub fn with_day(mut self, weekday: Weekday, schedule: DaySchedule) -> Self {
        *self.day_slot(weekday) = Some(schedule);
        self
    }

    pub fn with_weekend(mut self, schedule: DaySchedule) -> Self {
        self.weekend = Some(schedule);
        self
    }

    /// The explicit per-weekday override, if configured.
    pub fn day_override(&self, weekday: Weekday) -> Option<&DaySchedule> {
        match weekday {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }

    fn day_slot(&mut self, weekday: Weekday) -> &mut Option<DaySchedule> {
        match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }

    /// The schedule in force on `weekday`, or `None` when no policy applies.
    ///
    /// Only enabled schedules are considered, in this order: the weekday's own
    /// override, the `weekend` bucket (Saturday/Sunday only), then `default`.
    pub fn schedule_for(&self, weekday: Weekday) -> Option<&DaySchedule> {
        let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun)
            .then_some(self.weekend.as_ref())
            .flatten();

        self.day_override(weekday)
            .into_iter()
            .chain(weekend)
            .chain(std::iter::once(&self.default))
            .find(|schedule| schedule.enabled)
    }

    /// Load-time shape check over every configured schedule.
    ///
    /// Reports all problems at once: breaks whose start is not before their end,
    /// overlapping breaks within one schedule, and inverted working hours.
    /// Disabled schedules are checked too.
    pub fn validate(&self) -> Result<()> {
        let labelled = [
            ("default", Some(&self.default)),
            ("monday", self.monday.as_ref()),
            ("tuesday", self.tuesday.as_ref()),
            ("wednesday", self.wednesday.as_ref()),
            ("thursday", self.thursday.as_ref()),
            ("friday", self.friday.as_ref()),
            ("saturday", self.saturday.as_ref()),
            ("sunday", self.sunday.as_ref()),
            ("weekend", self.weekend.as_ref()),
        ];

        let issues: Vec<String> = labelled
            .iter()
            .filter_map(|(label, schedule)| schedule.map(|s| s.issues(label)))
            .flatten()
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ScheduleError::InvalidConfig(issues.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> LocalTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_local_time_parse_and_display() {
        assert_eq!(t("09:05").to_string(), "09:05");
        assert_eq!(t("9:30"), LocalTime::new(9, 30).unwrap());
        assert_eq!(t(" 23:59 ").minutes_of_day(), 23 * 60 + 59);
    }

    #[test]
    fn test_local_time_rejects_malformed() {
        for bad in ["24:00", "12:60", "1200", "12:5", "ab:cd", "", "-1:00", "123:00"] {
            let err = bad.parse::<LocalTime>().unwrap_err();
            assert!(err.to_string().contains("expected HH:MM"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_local_time_from_minutes() {
        assert_eq!(LocalTime::from_minutes(0), Some(LocalTime::MIDNIGHT));
        assert_eq!(LocalTime::from_minutes(13 * 60 + 15), Some(t("13:15")));
        assert_eq!(LocalTime::from_minutes(MINUTES_PER_DAY), None);
    }

    #[test]
    fn test_workday_constants() {
        assert_eq!(LocalTime::WORKDAY_START, t("09:00"));
        assert_eq!(LocalTime::WORKDAY_END, t("17:00"));
        let schedule = DaySchedule::default();
        assert_eq!(schedule.start, LocalTime::WORKDAY_START);
        assert_eq!(schedule.end, LocalTime::WORKDAY_END);
    }

    #[test]
    fn test_break_overlap_is_half_open() {
        let lunch = BreakBlock::new("Lunch", t("12:00"), t("13:00"), BreakType::Lunch);
        assert!(lunch.overlaps_minutes(12 * 60, 12 * 60 + 1));
        assert!(lunch.overlaps_minutes(11 * 60, 14 * 60));
        assert!(!lunch.overlaps_minutes(13 * 60, 14 * 60));
        assert!(!lunch.overlaps_minutes(11 * 60, 12 * 60));
    }

    #[test]
    fn test_inverted_break_matches_nothing() {
        let broken = BreakBlock::new("Broken", t("13:00"), t("12:00"), BreakType::Custom);
        assert!(!broken.overlaps_minutes(0, MINUTES_PER_DAY));
    }

    #[test]
    fn test_schedule_resolution_order() {
        let config = WorkingHoursConfig::default()
            .with_day(Weekday::Fri, DaySchedule::new(t("08:00"), t("12:00")))
            .with_day(Weekday::Mon, DaySchedule::disabled())
            .with_weekend(DaySchedule::new(t("10:00"), t("14:00")));

        assert_eq!(config.schedule_for(Weekday::Fri).unwrap().start, t("08:00"));
        assert_eq!(config.schedule_for(Weekday::Sat).unwrap().start, t("10:00"));
        // Disabled override falls through to default.
        assert_eq!(config.schedule_for(Weekday::Mon).unwrap().start, t("09:00"));
        assert_eq!(config.schedule_for(Weekday::Wed).unwrap().end, t("17:00"));
    }

    #[test]
    fn test_schedule_resolution_nothing_enabled() {
        let config = WorkingHoursConfig::new(DaySchedule::disabled())
            .with_weekend(DaySchedule::disabled());
        assert!(config.schedule_for(Weekday::Tue).is_none());
        assert!(config.schedule_for(Weekday::Sun).is_none());
    }

    #[test]
    fn test_deserialize_working_hours_document() {
        let json = r#"{
            "default": {
                "enabled": true,
                "start": "09:00",
                "end": "17:30",
                "breaks": [
                    {"name": "Lunch", "start": "12:00", "end": "13:00", "type": "lunch"},
                    {"name": "Coffee", "start": "15:00", "end": "15:15", "type": "coffee"}
                ]
            },
            "friday": {"start": "09:00", "end": "15:00"},
            "weekend": {"enabled": false}
        }"#;
        let config: WorkingHoursConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.default.end, t("17:30"));
        assert_eq!(config.default.breaks.len(), 2);
        assert_eq!(config.default.breaks[1].kind, BreakType::Coffee);
        let friday = config.friday.as_ref().unwrap();
        assert!(friday.enabled);
        assert!(friday.breaks.is_empty());
        assert!(!config.weekend.as_ref().unwrap().enabled);
        assert!(config.monday.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_bad_time_string() {
        let json = r#"{"default": {"start": "9am", "end": "17:00"}}"#;
        let err = serde_json::from_str::<WorkingHoursConfig>(json).unwrap_err();
        assert!(err.to_string().contains("expected HH:MM"), "got: {err}");
    }

    #[test]
    fn test_break_type_defaults_to_custom() {
        let block: BreakBlock =
            serde_json::from_str(r#"{"name": "Standup", "start": "10:00", "end": "10:15"}"#)
                .unwrap();
        assert_eq!(block.kind, BreakType::Custom);
    }

    #[test]
    fn test_serialize_round_trips_time_strings() {
        let schedule = DaySchedule::default().with_break(BreakBlock::new(
            "Lunch",
            t("12:00"),
            t("12:45"),
            BreakType::Lunch,
        ));
        let value = serde_json::to_value(&schedule).unwrap();
        assert_eq!(value["start"], "09:00");
        assert_eq!(value["breaks"][0]["end"], "12:45");
        assert_eq!(value["breaks"][0]["type"], "lunch");
    }

    #[test]
    fn test_validate_reports_every_issue() {
        let bad_day = DaySchedule::new(t("18:00"), t("09:00"))
            .with_break(BreakBlock::new("A", t("12:00"), t("13:00"), BreakType::Lunch))
            .with_break(BreakBlock::new("B", t("12:30"), t("12:45"), BreakType::Coffee))
            .with_break(BreakBlock::new("C", t("16:00"), t("15:00"), BreakType::Custom));
        let config = WorkingHoursConfig::default().with_day(Weekday::Thu, bad_day);

        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("thursday: working hours start 18:00"), "{msg}");
        assert!(msg.contains("breaks 'A' (12:00-13:00) and 'B' (12:30-12:45) overlap"), "{msg}");
        assert!(msg.contains("break 'C' start 16:00 is not before end 15:00"), "{msg}");
    }

    #[test]
    fn test_validate_allows_adjacent_breaks() {
        let day = DaySchedule::default()
            .with_break(BreakBlock::new("Lunch", t("12:00"), t("13:00"), BreakType::Lunch))
            .with_break(BreakBlock::new("Walk", t("13:00"), t("13:30"), BreakType::Custom));
        assert!(WorkingHoursConfig::new(day).validate().is_ok());
    }
}
