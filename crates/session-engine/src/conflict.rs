//! Detect a proposed slot colliding with another class's use of a shared
//! teacher or room.
//!
//! A class is a candidate for conflict only when it shares the slot's
//! teacher, or shares a room with it (online slots carry no room and can only
//! collide on teacher). Each candidate's occurrences are generated and tested
//! for a same-day overlap: `test_start < other_end && test_end > other_start`.
//! Adjacent sessions (one ends exactly when the other starts) do NOT conflict.
//! Only sessions on the slot's own date are compared, so a session running
//! past midnight never conflicts with the next day's slots.
//!
//! [`detect_conflict`] stops at the first conflicting class in the caller's
//! iteration order; it does not look for the worst conflict.
//! [`detect_all_conflicts`] is the exhaustive alternative.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generator::{generate, GeneratedOccurrence, GenerationBound};
use crate::model::{session_window, CandidateSlot, ClassSchedule};
use crate::wire::hhmm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Teacher,
    Room,
}

/// A detected collision between the slot under test and another class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub conflicting_class_id: String,
    /// `Teacher` whenever the teacher matched, even if the room matched too.
    pub resource_type: ResourceType,
    pub conflicting_date: NaiveDate,
    /// Start time of the other class's session.
    #[serde(with = "hhmm")]
    pub conflicting_time: NaiveTime,
    pub overlap_minutes: i64,
}

/// Return the first conflict against `classes`, skipping `excluding_class_id`.
pub fn detect_conflict<'a, I>(
    candidate: &CandidateSlot,
    excluding_class_id: &str,
    classes: I,
    config: &EngineConfig,
) -> Option<ConflictReport>
where
    I: IntoIterator<Item = &'a ClassSchedule>,
{
    classes
        .into_iter()
        .filter(|c| c.id != excluding_class_id)
        .find_map(|c| conflict_with(candidate, c, config))
}

/// Return one conflict per conflicting class, in iteration order.
pub fn detect_all_conflicts<'a, I>(
    candidate: &CandidateSlot,
    excluding_class_id: &str,
    classes: I,
    config: &EngineConfig,
) -> Vec<ConflictReport>
where
    I: IntoIterator<Item = &'a ClassSchedule>,
{
    classes
        .into_iter()
        .filter(|c| c.id != excluding_class_id)
        .filter_map(|c| conflict_with(candidate, c, config))
        .collect()
}

/// Test one other class against the candidate slot.
fn conflict_with(
    candidate: &CandidateSlot,
    other: &ClassSchedule,
    config: &EngineConfig,
) -> Option<ConflictReport> {
    let teacher_shared =
        !candidate.teacher_id.trim().is_empty() && candidate.teacher_id == other.teacher_id;
    let room_shared = match (candidate.room_ref.as_deref(), other.effective_room()) {
        (Some(tested), Some(theirs)) => config.room_match.matches(tested, theirs),
        _ => false,
    };
    if !teacher_shared && !room_shared {
        return None;
    }

    let occurrences = occurrences_for_scan(other, config)?;
    let (test_start, test_end) = candidate.window();

    occurrences
        .iter()
        .filter(|o| o.date == candidate.date)
        .find_map(|o| {
            let (other_start, other_end) = session_window(o.date, o.time, other.duration_minutes);
            if test_start < other_end && test_end > other_start {
                let overlap_minutes =
                    (test_end.min(other_end) - test_start.max(other_start)).num_minutes();
                Some(ConflictReport {
                    conflicting_class_id: other.id.clone(),
                    resource_type: if teacher_shared {
                        ResourceType::Teacher
                    } else {
                        ResourceType::Room
                    },
                    conflicting_date: o.date,
                    conflicting_time: o.time,
                    overlap_minutes,
                })
            } else {
                None
            }
        })
}

/// Occurrences of `other` to scan; partial lists are used when the
/// generator hits its horizon, unconfigured classes are skipped.
fn occurrences_for_scan(
    other: &ClassSchedule,
    config: &EngineConfig,
) -> Option<Vec<GeneratedOccurrence>> {
    match generate(other, GenerationBound::Schedule, config) {
        Ok(occurrences) => Some(occurrences),
        Err(EngineError::SafetyCapExceeded { partial, .. }) => Some(partial),
        Err(e) => {
            debug!(class_id = %other.id, error = %e, "skipping class in conflict scan");
            None
        }
    }
}
