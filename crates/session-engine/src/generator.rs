//! Turn a class's static schedule description into concrete calendar occurrences.
//!
//! The generator walks the calendar one day at a time from the start date,
//! accepting a day as a session when its weekday is in the pattern and it is
//! not an off-day, until the bound is satisfied. Makeup sessions are unioned
//! in afterwards and the combined list is sorted chronologically.
//!
//! A fixed scan horizon ([`EngineConfig::safety_horizon_days`]) guarantees
//! termination. Running out of horizon before the bound is met is reported
//! as [`EngineError::SafetyCapExceeded`] with the partial list attached.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{ClassSchedule, SessionLimit};
use crate::wire::hhmm;

/// How an occurrence came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceKind {
    /// Produced by the weekly pattern.
    Regular,
    /// A pattern session relocated by a reschedule; counts toward the target.
    Moved,
    /// An explicit makeup session; does not count toward the target.
    Extra,
}

/// A generated (date, time, kind) triple, before ordinals are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedOccurrence {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub kind: OccurrenceKind,
}

/// When the day-walk stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationBound {
    /// Use the schedule's own [`SessionLimit`].
    #[default]
    Schedule,
    /// Stop after this many counted sessions, ignoring any hard end date.
    /// Pass `target + buffer` for lookahead.
    Sessions(u32),
    /// Stop after this date (inclusive).
    Until(NaiveDate),
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    AfterCount(u32),
    PastDate(NaiveDate),
}

impl GenerationBound {
    fn resolve(self, limit: SessionLimit) -> Stop {
        match self {
            GenerationBound::Schedule => match limit {
                SessionLimit::TotalSessions(n) => Stop::AfterCount(n),
                SessionLimit::HardEndDate(d) => Stop::PastDate(d),
            },
            GenerationBound::Sessions(n) => Stop::AfterCount(n),
            GenerationBound::Until(d) => Stop::PastDate(d),
        }
    }
}

/// Generate the ordered occurrence list for `schedule`.
///
/// # Errors
///
/// - [`EngineError::InvalidSchedule`] if the start date or time of day is missing.
/// - [`EngineError::SafetyCapExceeded`] if the horizon runs out first; the
///   partial list (extras included) travels with the error.
///
/// An empty weekday pattern is not an error here: the regular set is simply
/// empty and only makeup sessions are returned.
pub fn generate(
    schedule: &ClassSchedule,
    bound: GenerationBound,
    config: &EngineConfig,
) -> Result<Vec<GeneratedOccurrence>> {
    let (start, time) = schedule.anchor()?;
    let stop = bound.resolve(schedule.limit);

    let mut accepted = Vec::new();
    let mut exhausted = None;

    if !schedule.weekday_pattern.is_empty() {
        // A session moved before the start date pulls the walk back with it.
        let walk_start = schedule
            .relocations
            .iter()
            .map(|r| r.to)
            .fold(start, NaiveDate::min);

        let mut day = walk_start;
        let mut scanned = 0u32;
        loop {
            match stop {
                Stop::AfterCount(n) if accepted.len() as u32 >= n => break,
                Stop::PastDate(end) if day > end => break,
                _ => {}
            }
            if scanned >= config.safety_horizon_days {
                exhausted = Some(scanned);
                break;
            }
            if let Some(occurrence) = accept_day(schedule, start, time, day) {
                trace!(class_id = %schedule.id, date = %day, kind = ?occurrence.kind, "accepted");
                accepted.push(occurrence);
            }
            scanned += 1;
            day = match day.succ_opt() {
                Some(next) => next,
                None => {
                    exhausted = Some(scanned);
                    break;
                }
            };
        }
    }

    let occurrences = merge_extras(schedule, time, accepted);

    if let Some(scanned_days) = exhausted {
        warn!(
            class_id = %schedule.id,
            scanned_days,
            accepted = occurrences.len(),
            limit = %schedule.limit,
            "generation hit the safety horizon"
        );
        return Err(EngineError::SafetyCapExceeded {
            scanned_days,
            partial: occurrences,
        });
    }

    Ok(occurrences)
}

/// Decide whether `day` yields a counted session.
fn accept_day(
    schedule: &ClassSchedule,
    start: NaiveDate,
    time: NaiveTime,
    day: NaiveDate,
) -> Option<GeneratedOccurrence> {
    if schedule.off_days.contains(&day) {
        return None;
    }

    if let Some(relocation) = schedule.relocations.iter().find(|r| r.to == day) {
        return Some(GeneratedOccurrence {
            date: day,
            time: relocation.time.unwrap_or(time),
            kind: OccurrenceKind::Moved,
        });
    }

    if day < start || !schedule.meets_on(day) {
        return None;
    }
    if schedule.relocations.iter().any(|r| r.suppresses(day)) {
        return None;
    }

    Some(GeneratedOccurrence {
        date: day,
        time,
        kind: OccurrenceKind::Regular,
    })
}

/// Union makeup sessions into the walked list and sort chronologically.
///
/// Extras are added even when they fall on an off-day (a makeup overrides a
/// holiday). An extra whose date is already taken is dropped, which keeps
/// dates strictly increasing.
fn merge_extras(
    schedule: &ClassSchedule,
    time: NaiveTime,
    mut occurrences: Vec<GeneratedOccurrence>,
) -> Vec<GeneratedOccurrence> {
    let mut taken: BTreeSet<NaiveDate> = occurrences.iter().map(|o| o.date).collect();

    for extra in &schedule.extra_sessions {
        if taken.insert(extra.date) {
            occurrences.push(GeneratedOccurrence {
                date: extra.date,
                time: extra.time.unwrap_or(time),
                kind: OccurrenceKind::Extra,
            });
        }
    }

    occurrences.sort_by_key(|o| o.date);
    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtraSession, Relocation};
    use chrono::{Datelike, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn mwf(total: u32) -> ClassSchedule {
        ClassSchedule::new("c1", "alice")
            .in_room("P101")
            .with_pattern([Weekday::Mon, Weekday::Wed, Weekday::Fri])
            .at(time(18, 0))
            .starting(date(2024, 1, 1))
            .with_total_sessions(total)
    }

    fn dates(occurrences: &[GeneratedOccurrence]) -> Vec<NaiveDate> {
        occurrences.iter().map(|o| o.date).collect()
    }

    #[test]
    fn test_basic_mwf_three_sessions() {
        let out = generate(&mwf(3), GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 5)]
        );
        assert!(out.iter().all(|o| o.kind == OccurrenceKind::Regular));
        assert!(out.iter().all(|o| o.time == time(18, 0)));
    }

    #[test]
    fn test_off_day_pushes_tail() {
        let schedule = mwf(3).with_off_days([date(2024, 1, 3)]);
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![date(2024, 1, 1), date(2024, 1, 5), date(2024, 1, 8)]
        );
    }

    #[test]
    fn test_start_mid_week_skips_earlier_pattern_days() {
        // 2024-01-02 is a Tuesday; first Mon/Wed/Fri on or after it is the 3rd.
        let schedule = mwf(2).starting(date(2024, 1, 2));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(dates(&out), vec![date(2024, 1, 3), date(2024, 1, 5)]);
    }

    #[test]
    fn test_hard_end_date_bounds_walk() {
        let schedule = mwf(100).with_hard_end_date(date(2024, 1, 10));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 3),
                date(2024, 1, 5),
                date(2024, 1, 8),
                date(2024, 1, 10)
            ]
        );
    }

    #[test]
    fn test_sessions_bound_ignores_hard_end_date() {
        let schedule = mwf(3).with_hard_end_date(date(2024, 1, 2));
        let out =
            generate(&schedule, GenerationBound::Sessions(4), &EngineConfig::default()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out.last().unwrap().date, date(2024, 1, 8));
    }

    #[test]
    fn test_extras_unioned_and_sorted() {
        let schedule = mwf(3).with_extra_session(ExtraSession::at(date(2024, 1, 2), time(9, 0)));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 2),
                date(2024, 1, 3),
                date(2024, 1, 5)
            ]
        );
        assert_eq!(out[1].kind, OccurrenceKind::Extra);
        assert_eq!(out[1].time, time(9, 0));
    }

    #[test]
    fn test_extra_on_off_day_is_kept() {
        let schedule = mwf(3)
            .with_off_days([date(2024, 1, 3)])
            .with_extra_session(ExtraSession::on(date(2024, 1, 3)));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        let on_third: Vec<_> = out.iter().filter(|o| o.date == date(2024, 1, 3)).collect();
        assert_eq!(on_third.len(), 1);
        assert_eq!(on_third[0].kind, OccurrenceKind::Extra);
        assert_eq!(on_third[0].time, time(18, 0));
    }

    #[test]
    fn test_extra_on_regular_date_is_deduplicated() {
        let schedule = mwf(3).with_extra_session(ExtraSession::on(date(2024, 1, 3)));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|o| o.kind == OccurrenceKind::Regular));
    }

    #[test]
    fn test_empty_pattern_yields_only_extras() {
        let schedule = mwf(3)
            .with_pattern([])
            .with_extra_session(ExtraSession::on(date(2024, 2, 1)));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, OccurrenceKind::Extra);
    }

    #[test]
    fn test_missing_start_date_is_invalid() {
        let mut schedule = mwf(3);
        schedule.start_date = None;
        let err = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("Invalid schedule"), "got: {err}");
    }

    #[test]
    fn test_safety_cap_returns_partial() {
        // One session per week cannot reach 100 sessions in 365 days.
        let schedule = mwf(100).with_pattern([Weekday::Mon]);
        let err = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default())
            .unwrap_err();
        match err {
            EngineError::SafetyCapExceeded {
                scanned_days,
                partial,
            } => {
                assert_eq!(scanned_days, 365);
                assert_eq!(partial.len(), 53);
                assert!(partial.iter().all(|o| o.date.weekday() == Weekday::Mon));
            }
            other => panic!("expected SafetyCapExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_relocation_later_regenerates_tail() {
        // Session #2 (Wed 3rd) moved to Tue 9th: the 3rd, 5th and 8th are
        // suppressed and the tail continues from the 9th.
        let mut schedule = mwf(4);
        schedule.relocations.push(Relocation {
            from: date(2024, 1, 3),
            to: date(2024, 1, 9),
            time: Some(time(17, 0)),
        });
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 9),
                date(2024, 1, 10),
                date(2024, 1, 12)
            ]
        );
        assert_eq!(out[1].kind, OccurrenceKind::Moved);
        assert_eq!(out[1].time, time(17, 0));
    }

    #[test]
    fn test_relocation_earlier_shifts_tail_back() {
        // Session #2 (Wed 3rd) moved to Tue 2nd: the 3rd becomes session #3.
        let mut schedule = mwf(3);
        schedule.relocations.push(Relocation {
            from: date(2024, 1, 3),
            to: date(2024, 1, 2),
            time: None,
        });
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]
        );
    }

    #[test]
    fn test_relocation_before_start_date() {
        let mut schedule = mwf(2);
        schedule.relocations.push(Relocation {
            from: date(2024, 1, 1),
            to: date(2023, 12, 30),
            time: None,
        });
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(dates(&out), vec![date(2023, 12, 30), date(2024, 1, 1)]);
    }

    #[test]
    fn test_off_day_cancels_moved_session() {
        let mut schedule = mwf(3);
        schedule.relocations.push(Relocation {
            from: date(2024, 1, 3),
            to: date(2024, 1, 4),
            time: None,
        });
        schedule.off_days.insert(date(2024, 1, 4));
        let out = generate(&schedule, GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert_eq!(
            dates(&out),
            vec![date(2024, 1, 1), date(2024, 1, 5), date(2024, 1, 8)]
        );
    }

    #[test]
    fn test_zero_target_is_empty() {
        let out = generate(&mwf(0), GenerationBound::Schedule, &EngineConfig::default()).unwrap();
        assert!(out.is_empty());
    }
}
