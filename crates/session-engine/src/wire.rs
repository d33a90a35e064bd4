//! Persisted and serialized representation of class schedules.
//!
//! - The weekly pattern and time travel together as one display label,
//!   `"Mon / Wed / Fri • 18:00"`, tokens always in canonical Mon→Sun order.
//! - Off-days are a sorted, deduplicated list of `YYYY-MM-DD` strings.
//! - Extra sessions are `{ "date": <ISO datetime> }` records; a bare ISO
//!   date is accepted and means "at the class's usual time".
//! - `endDate` is written on output and ignored on input: it is always
//!   engine-derived.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{
    ClassSchedule, DeliveryMode, ExtraSession, Relocation, SessionLimit, WeekdayPattern,
};
use crate::repository::VersionedSchedule;

/// Separator between the day list and the time in a schedule label.
pub const LABEL_TIME_SEPARATOR: char = '•';

// ── HH:MM serde helpers ─────────────────────────────────────────────────────

/// Serialize `NaiveTime` as `"HH:MM"`; accept `"HH:MM"` or `"HH:MM:SS"`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }

    /// The same format for optional fields.
    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_some(&t.format("%H:%M").to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| super::super::parse_hhmm(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Parse `"HH:MM"` or `"HH:MM:SS"`.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| EngineError::InvalidFormat(format!("expected HH:MM, got '{s}'")))
}

// ── Schedule label ──────────────────────────────────────────────────────────

const WEEKDAY_TOKENS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "Mon"),
    (Weekday::Tue, "Tue"),
    (Weekday::Wed, "Wed"),
    (Weekday::Thu, "Thu"),
    (Weekday::Fri, "Fri"),
    (Weekday::Sat, "Sat"),
    (Weekday::Sun, "Sun"),
];

pub fn weekday_token(day: Weekday) -> &'static str {
    WEEKDAY_TOKENS
        .iter()
        .find(|(d, _)| *d == day)
        .map(|(_, token)| *token)
        .unwrap_or("?")
}

/// Parse a weekday token (case-insensitive; short or full English names).
pub fn parse_weekday_token(s: &str) -> Option<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Render `"Mon / Wed / Fri • 18:00"`. Days come out Mon→Sun whatever order
/// they were added in.
pub fn format_schedule_label(pattern: &WeekdayPattern, time: NaiveTime) -> String {
    let days: Vec<&str> = pattern.iter().map(weekday_token).collect();
    let label = format!(
        "{} {} {}",
        days.join(" / "),
        LABEL_TIME_SEPARATOR,
        time.format("%H:%M")
    );
    label.trim_start().to_string()
}

/// Parse a schedule label back into a pattern and a time of day.
///
/// Day tokens may appear in any order and repeat; the result is the same set.
pub fn parse_schedule_label(label: &str) -> Result<(WeekdayPattern, NaiveTime)> {
    let (days, time) = label.split_once(LABEL_TIME_SEPARATOR).ok_or_else(|| {
        EngineError::InvalidFormat(format!(
            "schedule label '{label}' is missing '{LABEL_TIME_SEPARATOR}'"
        ))
    })?;

    let mut pattern = WeekdayPattern::empty();
    for token in days.split('/').map(str::trim).filter(|t| !t.is_empty()) {
        let day = parse_weekday_token(token).ok_or_else(|| {
            EngineError::InvalidFormat(format!("unknown weekday '{token}' in '{label}'"))
        })?;
        pattern.insert(day);
    }

    Ok((pattern, parse_hhmm(time)?))
}

// ── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraSessionRecord {
    pub date: String,
}

impl From<&ExtraSession> for ExtraSessionRecord {
    fn from(extra: &ExtraSession) -> Self {
        let date = match extra.time {
            Some(t) => extra.date.and_time(t).format("%Y-%m-%dT%H:%M:%S").to_string(),
            None => extra.date.format("%Y-%m-%d").to_string(),
        };
        Self { date }
    }
}

impl TryFrom<&ExtraSessionRecord> for ExtraSession {
    type Error = EngineError;

    fn try_from(record: &ExtraSessionRecord) -> Result<Self> {
        let raw = record.date.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        {
            return Ok(ExtraSession::at(dt.date(), dt.time()));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(ExtraSession::on)
            .map_err(|_| {
                EngineError::InvalidFormat(format!("extra session date '{raw}' is not ISO 8601"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationRecord {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hhmm::option")]
    pub time: Option<NaiveTime>,
}

/// One class as stored and exchanged with collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub id: String,
    pub teacher_id: String,
    #[serde(default)]
    pub room_ref: Option<String>,
    #[serde(default)]
    pub mode: DeliveryMode,
    /// `"Mon / Wed • 18:00"`; absent while the class is not yet configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sessions_target: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub off_days: Vec<NaiveDate>,
    #[serde(default)]
    pub extra_sessions: Vec<ExtraSessionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relocations: Vec<RelocationRecord>,
    #[serde(default)]
    pub version: u64,
}

impl ScheduleRecord {
    /// Build the persisted form. `end_date` should come from
    /// [`crate::end_date::compute_end_date`]; pass `None` for unconfigured classes.
    pub fn from_schedule(
        schedule: &ClassSchedule,
        end_date: Option<NaiveDate>,
        version: u64,
    ) -> Self {
        let (total_sessions_target, hard_end_date) = match schedule.limit {
            SessionLimit::TotalSessions(n) => (Some(n), None),
            SessionLimit::HardEndDate(d) => (None, Some(d)),
        };
        Self {
            id: schedule.id.clone(),
            teacher_id: schedule.teacher_id.clone(),
            room_ref: schedule.room_ref.clone(),
            mode: schedule.mode,
            schedule: schedule
                .time_of_day
                .map(|t| format_schedule_label(&schedule.weekday_pattern, t)),
            duration_minutes: Some(schedule.duration_minutes),
            start_date: schedule.start_date,
            total_sessions_target,
            hard_end_date,
            end_date,
            off_days: schedule.off_days.iter().copied().collect(),
            extra_sessions: schedule.extra_sessions.iter().map(Into::into).collect(),
            relocations: schedule
                .relocations
                .iter()
                .map(|r| RelocationRecord {
                    from: r.from,
                    to: r.to,
                    time: r.time,
                })
                .collect(),
            version,
        }
    }

    /// Convert back into the domain model. Any stored `endDate` is discarded.
    pub fn into_schedule(self, config: &EngineConfig) -> Result<VersionedSchedule> {
        let limit = match (self.total_sessions_target, self.hard_end_date) {
            (Some(n), None) => SessionLimit::TotalSessions(n),
            (None, Some(d)) => SessionLimit::HardEndDate(d),
            (Some(_), Some(_)) => {
                return Err(EngineError::InvalidFormat(format!(
                    "class '{}' sets both totalSessionsTarget and hardEndDate",
                    self.id
                )))
            }
            (None, None) => {
                return Err(EngineError::InvalidFormat(format!(
                    "class '{}' needs totalSessionsTarget or hardEndDate",
                    self.id
                )))
            }
        };

        let (weekday_pattern, time_of_day) = match self.schedule.as_deref() {
            Some(label) => {
                let (pattern, time) = parse_schedule_label(label)?;
                (pattern, Some(time))
            }
            None => (WeekdayPattern::empty(), None),
        };

        let extra_sessions = self
            .extra_sessions
            .iter()
            .map(ExtraSession::try_from)
            .collect::<Result<Vec<_>>>()?;

        let schedule = ClassSchedule {
            id: self.id,
            teacher_id: self.teacher_id,
            room_ref: self.room_ref,
            mode: self.mode,
            weekday_pattern,
            time_of_day,
            duration_minutes: self
                .duration_minutes
                .unwrap_or(config.default_duration_minutes),
            start_date: self.start_date,
            limit,
            off_days: self.off_days.into_iter().collect::<BTreeSet<_>>(),
            extra_sessions,
            relocations: self
                .relocations
                .into_iter()
                .map(|r| Relocation {
                    from: r.from,
                    to: r.to,
                    time: r.time,
                })
                .collect(),
        };

        Ok(VersionedSchedule {
            schedule,
            version: self.version,
        })
    }
}

/// Parse a JSON array of [`ScheduleRecord`]s, preserving order.
pub fn parse_roster(json: &str, config: &EngineConfig) -> Result<Vec<VersionedSchedule>> {
    let records: Vec<ScheduleRecord> = serde_json::from_str(json)?;
    records
        .into_iter()
        .map(|r| r.into_schedule(config))
        .collect()
}
