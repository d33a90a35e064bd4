//! Class schedule aggregate and its value types.
//!
//! A [`ClassSchedule`] is the static description a class is created with plus
//! the mutable registries that edits accumulate (off-days, makeup sessions,
//! relocations). Nothing derived from it (occurrences, ordinals, the end
//! date) is stored here; see [`crate::generator`] and [`crate::end_date`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_DURATION_MINUTES;
use crate::error::{EngineError, Result};

// ── WeekdayPattern ──────────────────────────────────────────────────────────

/// The set of weekdays a class regularly meets on.
///
/// Stored as a bitmask indexed by days-from-Monday, so iteration is always
/// in canonical Mon→Sun order regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeekdayPattern(u8);

impl WeekdayPattern {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Weekdays in the pattern, Monday first.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        let mut day = Weekday::Mon;
        (0..7).filter_map(move |_| {
            let current = day;
            day = day.succ();
            self.contains(current).then_some(current)
        })
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }
}

impl FromIterator<Weekday> for WeekdayPattern {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut pattern = WeekdayPattern::empty();
        for day in iter {
            pattern.insert(day);
        }
        pattern
    }
}

// ── Class-level enums ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Online,
    #[default]
    Offline,
}

/// When generation stops: exactly one of a session-count target or a hard end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLimit {
    TotalSessions(u32),
    HardEndDate(NaiveDate),
}

impl fmt::Display for SessionLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionLimit::TotalSessions(n) => write!(f, "{n} sessions"),
            SessionLimit::HardEndDate(d) => write!(f, "until {d}"),
        }
    }
}

// ── Registries ──────────────────────────────────────────────────────────────

/// A one-off makeup session outside the weekly pattern.
///
/// Without a time override it inherits the class's `time_of_day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraSession {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl ExtraSession {
    pub fn on(date: NaiveDate) -> Self {
        Self { date, time: None }
    }

    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date,
            time: Some(time),
        }
    }
}

/// The trace a Move commit leaves on the schedule.
///
/// Pattern dates in `[from, to)` stop producing sessions and `to` itself
/// becomes a counted session, so everything after it is regenerated from
/// the new anchor. When `to < from` the window is empty and the tail shifts
/// earlier instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Date the session occupied before its first move.
    pub from: NaiveDate,
    /// Date the session occupies now.
    pub to: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl Relocation {
    pub fn suppresses(&self, date: NaiveDate) -> bool {
        self.from <= date && date < self.to
    }
}

// ── ClassSchedule ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSchedule {
    pub id: String,
    pub teacher_id: String,
    /// Physical room label. Ignored for online classes.
    pub room_ref: Option<String>,
    pub mode: DeliveryMode,
    pub weekday_pattern: WeekdayPattern,
    pub time_of_day: Option<NaiveTime>,
    pub duration_minutes: u32,
    pub start_date: Option<NaiveDate>,
    pub limit: SessionLimit,
    /// Cancelled regular dates. Only grows through cancellation or explicit
    /// holiday entry; removals trigger a full recompute like any other edit.
    pub off_days: BTreeSet<NaiveDate>,
    pub extra_sessions: Vec<ExtraSession>,
    pub relocations: Vec<Relocation>,
}

impl ClassSchedule {
    /// An unconfigured online class: no pattern, time, or start date yet.
    pub fn new(id: impl Into<String>, teacher_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            teacher_id: teacher_id.into(),
            room_ref: None,
            mode: DeliveryMode::Online,
            weekday_pattern: WeekdayPattern::empty(),
            time_of_day: None,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            start_date: None,
            limit: SessionLimit::TotalSessions(0),
            off_days: BTreeSet::new(),
            extra_sessions: Vec::new(),
            relocations: Vec::new(),
        }
    }

    /// Place the class in a physical room (switches it to offline).
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room_ref = Some(room.into());
        self.mode = DeliveryMode::Offline;
        self
    }

    pub fn with_pattern(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekday_pattern = days.into_iter().collect();
        self
    }

    pub fn at(mut self, time: NaiveTime) -> Self {
        self.time_of_day = Some(time);
        self
    }

    pub fn starting(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn with_total_sessions(mut self, n: u32) -> Self {
        self.limit = SessionLimit::TotalSessions(n);
        self
    }

    pub fn with_hard_end_date(mut self, date: NaiveDate) -> Self {
        self.limit = SessionLimit::HardEndDate(date);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_off_days(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.off_days.extend(days);
        self
    }

    pub fn with_extra_session(mut self, extra: ExtraSession) -> Self {
        self.extra_sessions.push(extra);
        self
    }

    /// The room this class actually occupies: `None` for online classes.
    pub fn effective_room(&self) -> Option<&str> {
        match self.mode {
            DeliveryMode::Online => None,
            DeliveryMode::Offline => self
                .room_ref
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty()),
        }
    }

    /// Whether `date`'s weekday is part of the regular pattern.
    pub fn meets_on(&self, date: NaiveDate) -> bool {
        self.weekday_pattern.contains(date.weekday())
    }

    /// Start date and time of day, or `InvalidSchedule` naming what is missing.
    pub fn anchor(&self) -> Result<(NaiveDate, NaiveTime)> {
        let start = self.start_date.ok_or_else(|| {
            EngineError::InvalidSchedule(format!("class '{}' has no start date", self.id))
        })?;
        let time = self.time_of_day.ok_or_else(|| {
            EngineError::InvalidSchedule(format!("class '{}' has no time of day", self.id))
        })?;
        Ok((start, time))
    }

    /// Everything an end-date computation needs: pattern, start, time, and a
    /// positive target.
    pub fn ensure_configured(&self) -> Result<()> {
        if self.weekday_pattern.is_empty() {
            return Err(EngineError::InvalidSchedule(format!(
                "class '{}' has an empty weekday pattern",
                self.id
            )));
        }
        self.anchor()?;
        if self.duration_minutes == 0 {
            return Err(EngineError::InvalidSchedule(format!(
                "class '{}' has a zero session duration",
                self.id
            )));
        }
        if self.limit == SessionLimit::TotalSessions(0) {
            return Err(EngineError::InvalidSchedule(format!(
                "class '{}' has no session target",
                self.id
            )));
        }
        Ok(())
    }
}

// ── CandidateSlot ───────────────────────────────────────────────────────────

/// A proposed occupied slot to test against other classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub teacher_id: String,
    /// `None` for online slots, which can only conflict on teacher.
    pub room_ref: Option<String>,
}

impl CandidateSlot {
    /// The slot `schedule` would occupy if one of its sessions ran at `date`/`time`.
    pub fn for_class(schedule: &ClassSchedule, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date,
            time,
            duration_minutes: schedule.duration_minutes,
            teacher_id: schedule.teacher_id.clone(),
            room_ref: schedule.effective_room().map(str::to_string),
        }
    }

    /// Half-open `[start, end)` window of the slot.
    pub fn window(&self) -> (NaiveDateTime, NaiveDateTime) {
        session_window(self.date, self.time, self.duration_minutes)
    }
}

/// Half-open `[start, end)` window for a session of `minutes` starting at `date`/`time`.
pub fn session_window(
    date: NaiveDate,
    time: NaiveTime,
    minutes: u32,
) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(time);
    (start, start + TimeDelta::minutes(i64::from(minutes)))
}
