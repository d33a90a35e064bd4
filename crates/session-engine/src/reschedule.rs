//! Chain rescheduling and class-edit commands.
//!
//! Every mutation runs the same pipeline under an exclusive per-class lock:
//!
//! ```text
//! Idle → Validating → { Blocked | Committing } → Committed → Idle
//! ```
//!
//! - **Validating** checks the request against the current schedule and, for
//!   moves, runs conflict detection on the proposed slot.
//! - **Blocked** is a normal outcome, not an error: the caller gets the
//!   conflict, suggestions, and an unmutated copy of the schedule.
//! - **Committing** applies the change to a copy, recomputes the end date and
//!   occurrence map together, optionally re-checks conflicts, and saves with
//!   the version read at the start. A safety-cap hit or a stale version
//!   aborts the commit with nothing written.
//!
//! A Move relocates one session; the sessions after it are regenerated by
//! walking the weekly pattern on from the new date, so the target count is
//! preserved. The end date follows from that walk, not from the size of the
//! move: Wed to the next day's Thu leaves a Mon/Wed/Fri end date in place.
//! On a class with a hard end date a session cannot move past it.
//!
//! A Cancel adds the date to the off-day registry; the target is unchanged,
//! so one more session is generated past the old end date.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::conflict::{detect_conflict, ConflictReport};
use crate::end_date::{project_schedule, ScheduleProjection};
use crate::error::{EngineError, Result};
use crate::generator::OccurrenceKind;
use crate::indexer::{find_date, find_ordinal, generate_occurrences, SessionOccurrence};
use crate::model::{
    CandidateSlot, ClassSchedule, ExtraSession, Relocation, SessionLimit, WeekdayPattern,
};
use crate::repository::{ClassRepository, VersionedSchedule};
use crate::suggest::suggest_alternatives;
use crate::wire::hhmm;

// ── Requests and outcomes ───────────────────────────────────────────────────

/// Move session `target_ordinal` of `class_id` to `new_date` at `new_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub class_id: String,
    pub target_ordinal: u32,
    pub new_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub new_time: NaiveTime,
    /// Ask to commit despite a detected conflict.
    #[serde(default)]
    pub override_conflict: bool,
    /// Whether the requester's role allows overrides.
    #[serde(default)]
    pub requester_is_privileged: bool,
}

/// The result of a committed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedSchedule {
    pub schedule: ClassSchedule,
    pub version: u64,
    pub end_date: NaiveDate,
    /// End date before the command; `None` if it could not be computed.
    pub previous_end_date: Option<NaiveDate>,
    pub occurrences: Vec<SessionOccurrence>,
}

impl UpdatedSchedule {
    /// Whether the course end date moved. Worth surfacing to the user, but
    /// not an error.
    pub fn schedule_shifted(&self) -> bool {
        self.previous_end_date
            .is_some_and(|previous| previous != self.end_date)
    }
}

/// Why a reschedule did not commit, with everything the caller needs to
/// offer a way forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedReschedule {
    pub report: ConflictReport,
    /// Alternative start times on the requested date. Not re-validated.
    pub suggestions: Vec<NaiveTime>,
    /// The schedule exactly as stored; nothing was changed.
    pub schedule: ClassSchedule,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleOutcome {
    Committed(UpdatedSchedule),
    /// A conflict was found and no override was requested (or the commit-time
    /// re-check found a new one).
    Blocked(BlockedReschedule),
    /// A conflict was found and an override was requested by a requester
    /// without the privilege to override.
    PermissionDenied(BlockedReschedule),
}

impl RescheduleOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RescheduleOutcome::Committed(_))
    }

    pub fn committed(&self) -> Option<&UpdatedSchedule> {
        match self {
            RescheduleOutcome::Committed(updated) => Some(updated),
            _ => None,
        }
    }

    /// The blocking details for both `Blocked` and `PermissionDenied`.
    pub fn blocked(&self) -> Option<&BlockedReschedule> {
        match self {
            RescheduleOutcome::Blocked(b) | RescheduleOutcome::PermissionDenied(b) => Some(b),
            RescheduleOutcome::Committed(_) => None,
        }
    }
}

/// Pipeline states, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    Validating,
    Blocked,
    Committing,
    Committed,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainState::Idle => "idle",
            ChainState::Validating => "validating",
            ChainState::Blocked => "blocked",
            ChainState::Committing => "committing",
            ChainState::Committed => "committed",
        };
        f.write_str(name)
    }
}

// ── RescheduleChain ─────────────────────────────────────────────────────────

/// Command handler for every schedule mutation.
///
/// Holds the repository, the engine config, and a lock table with one mutex
/// per class id, so two requests for the same class never both validate
/// against state that the other is about to replace. An entry is dropped
/// once no request holds or waits on it.
pub struct RescheduleChain<R> {
    repository: R,
    config: EngineConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: ClassRepository> RescheduleChain<R> {
    pub fn new(repository: R, config: EngineConfig) -> Self {
        Self {
            repository,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `f` while holding the exclusive lock for `class_id`.
    fn with_class_lock<T>(&self, class_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(class_id.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.locks.lock();
        // Only the table and this request still hold the mutex.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(class_id);
        }
        result
    }

    /// Read-only projection of a stored class: end date plus numbered occurrences.
    pub fn projection(&self, class_id: &str) -> Result<ScheduleProjection> {
        let current = self.repository.get_class(class_id)?;
        project_schedule(&current.schedule, &self.config)
    }

    /// Create a class. The schedule must be fully configured.
    pub fn schedule_class(&self, schedule: ClassSchedule) -> Result<UpdatedSchedule> {
        if schedule.id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("class id is empty".to_string()));
        }
        if schedule.teacher_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest(format!(
                "class '{}' has no teacher",
                schedule.id
            )));
        }
        let class_id = schedule.id.clone();
        self.with_class_lock(&class_id, || {
            let projection = project_schedule(&schedule, &self.config)?;
            let version = self.repository.save_class(schedule.clone(), 0)?;
            info!(
                class_id = %schedule.id,
                end_date = %projection.end_date,
                sessions = projection.occurrences.len(),
                "class scheduled"
            );
            Ok(UpdatedSchedule {
                schedule,
                version,
                end_date: projection.end_date,
                previous_end_date: None,
                occurrences: projection.occurrences,
            })
        })
    }

    // ── Move ────────────────────────────────────────────────────────────────

    /// Move one session, propagating the change to the rest of the schedule.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ClassNotFound`] / [`EngineError::SessionNotFound`] for
    ///   an unknown class or ordinal.
    /// - [`EngineError::InvalidRequest`] when the new date would reorder
    ///   sessions, lands on an off-day, collides with another session, or
    ///   falls after the class's hard end date.
    /// - [`EngineError::SafetyCapExceeded`] when the recomputed schedule does
    ///   not fit the scan horizon (nothing is written).
    /// - [`EngineError::VersionConflict`] when the class changed underneath.
    ///
    /// Conflicts are reported through [`RescheduleOutcome`], not as errors.
    pub fn reschedule(&self, request: &RescheduleRequest) -> Result<RescheduleOutcome> {
        self.with_class_lock(&request.class_id, || {
            debug!(class_id = %request.class_id, state = %ChainState::Validating, "reschedule");
            let current = self.repository.get_class(&request.class_id)?;
            let occurrences = generate_occurrences(&current.schedule, &self.config)?;

            let target = find_ordinal(&occurrences, request.target_ordinal)
                .cloned()
                .ok_or_else(|| EngineError::SessionNotFound {
                    class_id: request.class_id.clone(),
                    detail: format!(
                        "no session #{} (class has {})",
                        request.target_ordinal,
                        occurrences.len()
                    ),
                })?;
            validate_move(&current.schedule, &occurrences, &target, request.new_date)?;

            let candidate =
                CandidateSlot::for_class(&current.schedule, request.new_date, request.new_time);
            let classes = self.repository.list_classes()?;
            let overridden = match detect_conflict(
                &candidate,
                &request.class_id,
                &classes,
                &self.config,
            ) {
                None => false,
                Some(report) if request.override_conflict && request.requester_is_privileged => {
                    warn!(
                        class_id = %request.class_id,
                        conflicting_class_id = %report.conflicting_class_id,
                        resource = ?report.resource_type,
                        "privileged override of conflict"
                    );
                    true
                }
                Some(report) => {
                    let blocked = self.blocked(current, report);
                    debug!(
                        class_id = %request.class_id,
                        state = %ChainState::Blocked,
                        "reschedule"
                    );
                    return Ok(if request.override_conflict {
                        RescheduleOutcome::PermissionDenied(blocked)
                    } else {
                        RescheduleOutcome::Blocked(blocked)
                    });
                }
            };

            debug!(class_id = %request.class_id, state = %ChainState::Committing, "reschedule");
            let mut next = current.schedule.clone();
            apply_move(&mut next, &target, request.new_date, request.new_time);
            let projection = project_schedule(&next, &self.config)?;

            if self.config.revalidate_before_commit && !overridden {
                let fresh = self.repository.list_classes()?;
                if let Some(report) =
                    detect_conflict(&candidate, &request.class_id, &fresh, &self.config)
                {
                    warn!(
                        class_id = %request.class_id,
                        conflicting_class_id = %report.conflicting_class_id,
                        "conflict appeared before commit"
                    );
                    return Ok(RescheduleOutcome::Blocked(self.blocked(current, report)));
                }
            }

            let updated = self.commit(&current, next, projection, "reschedule")?;
            Ok(RescheduleOutcome::Committed(updated))
        })
    }

    fn blocked(&self, current: VersionedSchedule, report: ConflictReport) -> BlockedReschedule {
        let suggestions =
            suggest_alternatives(report.conflicting_date, report.conflicting_time, &self.config);
        BlockedReschedule {
            report,
            suggestions,
            schedule: current.schedule,
            version: current.version,
        }
    }

    // ── Cancel and class edits ──────────────────────────────────────────────

    /// Cancel the session on `date`.
    ///
    /// A pattern session (regular or moved) is cancelled by adding its date
    /// to the off-days; the target is unchanged, so the schedule grows by one
    /// session at the end. A makeup session is removed outright.
    pub fn cancel_session(&self, class_id: &str, date: NaiveDate) -> Result<UpdatedSchedule> {
        self.edit(class_id, "cancel_session", |schedule, config| {
            let occurrences = generate_occurrences(schedule, config)?;
            let target = find_date(&occurrences, date).ok_or_else(|| {
                EngineError::SessionNotFound {
                    class_id: schedule.id.clone(),
                    detail: format!("no session on {date}"),
                }
            })?;
            match target.kind {
                OccurrenceKind::Extra => schedule.extra_sessions.retain(|e| e.date != date),
                OccurrenceKind::Regular | OccurrenceKind::Moved => {
                    schedule.off_days.insert(date);
                }
            }
            Ok(())
        })
    }

    pub fn set_pattern(&self, class_id: &str, pattern: WeekdayPattern) -> Result<UpdatedSchedule> {
        self.edit(class_id, "set_pattern", |schedule, _| {
            schedule.weekday_pattern = pattern;
            Ok(())
        })
    }

    /// Change the regular time of day. Sessions with their own time override
    /// (moved or makeup) keep it.
    pub fn set_time(&self, class_id: &str, time: NaiveTime) -> Result<UpdatedSchedule> {
        self.edit(class_id, "set_time", |schedule, _| {
            schedule.time_of_day = Some(time);
            Ok(())
        })
    }

    pub fn set_total_sessions(&self, class_id: &str, total: u32) -> Result<UpdatedSchedule> {
        if total == 0 {
            return Err(EngineError::InvalidRequest(
                "session target must be positive".to_string(),
            ));
        }
        self.edit(class_id, "set_total_sessions", |schedule, _| {
            schedule.limit = SessionLimit::TotalSessions(total);
            Ok(())
        })
    }

    /// Register a holiday or other off-day. Adding an existing one is a no-op.
    pub fn add_off_day(&self, class_id: &str, date: NaiveDate) -> Result<UpdatedSchedule> {
        self.edit(class_id, "add_off_day", |schedule, _| {
            schedule.off_days.insert(date);
            Ok(())
        })
    }

    pub fn remove_off_day(&self, class_id: &str, date: NaiveDate) -> Result<UpdatedSchedule> {
        self.edit(class_id, "remove_off_day", |schedule, _| {
            if schedule.off_days.remove(&date) {
                Ok(())
            } else {
                Err(EngineError::InvalidRequest(format!(
                    "{date} is not an off-day of class '{}'",
                    schedule.id
                )))
            }
        })
    }

    pub fn add_extra_session(
        &self,
        class_id: &str,
        extra: ExtraSession,
    ) -> Result<UpdatedSchedule> {
        self.edit(class_id, "add_extra_session", |schedule, _| {
            if schedule.extra_sessions.iter().any(|e| e.date == extra.date) {
                return Err(EngineError::InvalidRequest(format!(
                    "class '{}' already has a makeup session on {}",
                    schedule.id, extra.date
                )));
            }
            schedule.extra_sessions.push(extra);
            Ok(())
        })
    }

    pub fn remove_extra_session(&self, class_id: &str, date: NaiveDate) -> Result<UpdatedSchedule> {
        self.edit(class_id, "remove_extra_session", |schedule, _| {
            let before = schedule.extra_sessions.len();
            schedule.extra_sessions.retain(|e| e.date != date);
            if schedule.extra_sessions.len() == before {
                return Err(EngineError::SessionNotFound {
                    class_id: schedule.id.clone(),
                    detail: format!("no makeup session on {date}"),
                });
            }
            Ok(())
        })
    }

    /// Load, mutate a copy, recompute, save: the shared tail of every edit.
    fn edit<F>(&self, class_id: &str, operation: &str, mutate: F) -> Result<UpdatedSchedule>
    where
        F: FnOnce(&mut ClassSchedule, &EngineConfig) -> Result<()>,
    {
        self.with_class_lock(class_id, || {
            debug!(class_id, operation, state = %ChainState::Validating, "edit");
            let current = self.repository.get_class(class_id)?;
            let mut next = current.schedule.clone();
            mutate(&mut next, &self.config)?;

            debug!(class_id, operation, state = %ChainState::Committing, "edit");
            let projection = project_schedule(&next, &self.config)?;
            self.commit(&current, next, projection, operation)
        })
    }

    fn commit(
        &self,
        current: &VersionedSchedule,
        next: ClassSchedule,
        projection: ScheduleProjection,
        operation: &str,
    ) -> Result<UpdatedSchedule> {
        let previous_end_date = project_schedule(&current.schedule, &self.config)
            .ok()
            .map(|p| p.end_date);
        let version = self.repository.save_class(next.clone(), current.version)?;

        let updated = UpdatedSchedule {
            schedule: next,
            version,
            end_date: projection.end_date,
            previous_end_date,
            occurrences: projection.occurrences,
        };
        info!(
            class_id = %updated.schedule.id,
            operation,
            version,
            end_date = %updated.end_date,
            shifted = updated.schedule_shifted(),
            state = %ChainState::Committed,
            "schedule updated"
        );
        debug!(class_id = %updated.schedule.id, state = %ChainState::Idle, "command finished");
        Ok(updated)
    }
}

// ── Move helpers ────────────────────────────────────────────────────────────

/// Reject moves that would reorder sessions or silently swallow one.
fn validate_move(
    schedule: &ClassSchedule,
    occurrences: &[SessionOccurrence],
    target: &SessionOccurrence,
    new_date: NaiveDate,
) -> Result<()> {
    let taken_by_other = occurrences
        .iter()
        .any(|o| o.date == new_date && o.ordinal != target.ordinal);

    if target.kind == OccurrenceKind::Extra {
        if taken_by_other {
            return Err(EngineError::InvalidRequest(format!(
                "{new_date} already has a session of class '{}'",
                schedule.id
            )));
        }
        return Ok(());
    }

    if let Some(previous) = target
        .ordinal
        .checked_sub(1)
        .and_then(|p| find_ordinal(occurrences, p))
    {
        if new_date <= previous.date {
            return Err(EngineError::InvalidRequest(format!(
                "session #{} cannot move to {new_date}: session #{} is on {}",
                target.ordinal, previous.ordinal, previous.date
            )));
        }
    }
    if let SessionLimit::HardEndDate(end) = schedule.limit {
        if new_date > end {
            return Err(EngineError::InvalidRequest(format!(
                "session #{} cannot move to {new_date}: class '{}' ends on {end}",
                target.ordinal, schedule.id
            )));
        }
    }
    if schedule.off_days.contains(&new_date) {
        return Err(EngineError::InvalidRequest(format!(
            "{new_date} is an off-day of class '{}'",
            schedule.id
        )));
    }
    if schedule.extra_sessions.iter().any(|e| e.date == new_date) {
        return Err(EngineError::InvalidRequest(format!(
            "{new_date} already has a makeup session of class '{}'",
            schedule.id
        )));
    }
    if let Some(passed) = occurrences.iter().find(|o| {
        o.ordinal > target.ordinal && o.kind == OccurrenceKind::Moved && o.date <= new_date
    }) {
        return Err(EngineError::InvalidRequest(format!(
            "session #{} cannot move past moved session #{} on {}",
            target.ordinal, passed.ordinal, passed.date
        )));
    }
    Ok(())
}

/// Record the move on the schedule. Regular sessions get a new relocation;
/// moved sessions update theirs; makeup sessions are simply re-dated.
fn apply_move(
    schedule: &mut ClassSchedule,
    target: &SessionOccurrence,
    new_date: NaiveDate,
    new_time: NaiveTime,
) {
    match target.kind {
        OccurrenceKind::Regular => schedule.relocations.push(Relocation {
            from: target.date,
            to: new_date,
            time: Some(new_time),
        }),
        OccurrenceKind::Moved => {
            if let Some(r) = schedule
                .relocations
                .iter_mut()
                .find(|r| r.to == target.date)
            {
                r.to = new_date;
                r.time = Some(new_time);
            }
        }
        OccurrenceKind::Extra => {
            if let Some(e) = schedule
                .extra_sessions
                .iter_mut()
                .find(|e| e.date == target.date)
            {
                e.date = new_date;
                e.time = Some(new_time);
            }
        }
    }
}
