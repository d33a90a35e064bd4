//! Propose nearby alternative start times after a conflict.
//!
//! [`suggest_alternatives`] offers the busy time shifted back and forward by
//! the configured offset (two hours by default), keeping only times inside
//! the operating window. It does not re-run conflict detection on what it
//! returns; callers must re-validate before committing, or use
//! [`suggest_validated_alternatives`].

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use tracing::debug;

use crate::config::EngineConfig;
use crate::conflict::detect_conflict;
use crate::model::{CandidateSlot, ClassSchedule};

/// Alternatives to `busy_time` on `conflict_date`, earliest first.
pub fn suggest_alternatives(
    conflict_date: NaiveDate,
    busy_time: NaiveTime,
    config: &EngineConfig,
) -> Vec<NaiveTime> {
    let offset = TimeDelta::minutes(i64::from(config.suggestion_offset_minutes));

    // Shifts that wrap past midnight land on another day; drop them.
    let earlier = busy_time.overflowing_sub_signed(offset);
    let later = busy_time.overflowing_add_signed(offset);

    let suggestions: Vec<NaiveTime> = [earlier, later]
        .into_iter()
        .filter(|(_, wrapped)| *wrapped == 0)
        .map(|(t, _)| t)
        .filter(|t| *t >= config.operating_window_start && *t <= config.operating_window_end)
        .collect();

    debug!(
        date = %conflict_date,
        busy = %busy_time.format("%H:%M"),
        offered = suggestions.len(),
        "suggested alternatives"
    );
    suggestions
}

/// Like [`suggest_alternatives`], but keeps only times that pass conflict
/// detection for `candidate` (its date, duration, teacher and room are reused).
pub fn suggest_validated_alternatives<'a, I>(
    candidate: &CandidateSlot,
    busy_time: NaiveTime,
    excluding_class_id: &str,
    classes: I,
    config: &EngineConfig,
) -> Vec<NaiveTime>
where
    I: IntoIterator<Item = &'a ClassSchedule>,
{
    let classes: Vec<&ClassSchedule> = classes.into_iter().collect();
    suggest_alternatives(candidate.date, busy_time, config)
        .into_iter()
        .filter(|t| {
            let slot = CandidateSlot {
                time: *t,
                ..candidate.clone()
            };
            detect_conflict(&slot, excluding_class_id, classes.iter().copied(), config).is_none()
        })
        .collect()
}
