//! Course end date: the single source of truth for that field.
//!
//! The end date is never edited directly. It is the date of the last
//! occurrence the generator produces when stopped after the session target,
//! and it must be recomputed after any change to the pattern, off-days,
//! makeup sessions, relocations or the target itself.

use chrono::NaiveDate;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::generator::{generate, GenerationBound};
use crate::indexer::{index_occurrences, SessionOccurrence};
use crate::model::{ClassSchedule, SessionLimit};

/// End date plus the occurrence map it was derived from.
///
/// Both halves come from a single generation pass, so they can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleProjection {
    pub end_date: NaiveDate,
    pub occurrences: Vec<SessionOccurrence>,
}

fn bound_for(schedule: &ClassSchedule) -> GenerationBound {
    match schedule.limit {
        SessionLimit::TotalSessions(n) => GenerationBound::Sessions(n),
        SessionLimit::HardEndDate(d) => GenerationBound::Until(d),
    }
}

/// Compute the end date and numbered occurrences of a configured schedule.
///
/// # Errors
///
/// - [`EngineError::InvalidSchedule`] when the pattern is empty, the start
///   date or time is missing, the target is zero, or nothing was generated.
/// - [`EngineError::SafetyCapExceeded`] when the target cannot be reached
///   within the scan horizon.
pub fn project_schedule(
    schedule: &ClassSchedule,
    config: &EngineConfig,
) -> Result<ScheduleProjection> {
    schedule.ensure_configured()?;
    let generated = generate(schedule, bound_for(schedule), config)?;
    let occurrences = index_occurrences(schedule, generated);

    let end_date = occurrences.last().map(|o| o.date).ok_or_else(|| {
        EngineError::InvalidSchedule(format!(
            "class '{}' produces no sessions ({})",
            schedule.id, schedule.limit
        ))
    })?;

    debug!(
        class_id = %schedule.id,
        %end_date,
        sessions = occurrences.len(),
        "schedule projected"
    );
    Ok(ScheduleProjection {
        end_date,
        occurrences,
    })
}

/// Compute only the course end date.
///
/// For a session-count schedule this equals the date of the last element of
/// [`crate::indexer::generate_occurrences`]: the walk stops after
/// `total_sessions` counted sessions and makeup sessions are unioned in.
/// For a hard-end-date schedule it is the last session on or before that date.
pub fn compute_end_date(schedule: &ClassSchedule, config: &EngineConfig) -> Result<NaiveDate> {
    project_schedule(schedule, config).map(|p| p.end_date)
}
