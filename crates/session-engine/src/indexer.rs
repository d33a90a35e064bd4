//! Chronological session numbering ("session 3 of 24").
//!
//! Ordinals are a pure function of the generated list and are recomputed on
//! every read; nothing here is ever stored.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::generator::{generate, GeneratedOccurrence, GenerationBound, OccurrenceKind};
use crate::model::{session_window, ClassSchedule};
use crate::wire::hhmm;

/// A concrete class meeting with its 1-based chronological ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOccurrence {
    pub ordinal: u32,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub kind: OccurrenceKind,
    pub teacher_id: String,
    pub room_ref: Option<String>,
}

impl SessionOccurrence {
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn end(&self) -> NaiveDateTime {
        session_window(self.date, self.start_time, self.duration_minutes).1
    }
}

/// Sort `generated` chronologically and number it from 1, attaching the
/// teacher, room and duration inherited from `schedule`.
pub fn index_occurrences(
    schedule: &ClassSchedule,
    mut generated: Vec<GeneratedOccurrence>,
) -> Vec<SessionOccurrence> {
    generated.sort_by_key(|o| (o.date, o.time));
    let room_ref = schedule.effective_room().map(str::to_string);

    generated
        .into_iter()
        .zip(1u32..)
        .map(|(o, ordinal)| SessionOccurrence {
            ordinal,
            date: o.date,
            start_time: o.time,
            duration_minutes: schedule.duration_minutes,
            kind: o.kind,
            teacher_id: schedule.teacher_id.clone(),
            room_ref: room_ref.clone(),
        })
        .collect()
}

/// Generate and number the occurrences of `schedule` under its own limit.
pub fn generate_occurrences(
    schedule: &ClassSchedule,
    config: &EngineConfig,
) -> Result<Vec<SessionOccurrence>> {
    let generated = generate(schedule, GenerationBound::Schedule, config)?;
    Ok(index_occurrences(schedule, generated))
}

/// Look up the occurrence with the given ordinal.
pub fn find_ordinal(occurrences: &[SessionOccurrence], ordinal: u32) -> Option<&SessionOccurrence> {
    ordinal
        .checked_sub(1)
        .and_then(|i| occurrences.get(i as usize))
        .filter(|o| o.ordinal == ordinal)
}

/// Look up the occurrence on the given date.
pub fn find_date(occurrences: &[SessionOccurrence], date: NaiveDate) -> Option<&SessionOccurrence> {
    occurrences
        .binary_search_by_key(&date, |o| o.date)
        .ok()
        .map(|i| &occurrences[i])
}
