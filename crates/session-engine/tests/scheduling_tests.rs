//! End-to-end scheduling scenarios: generation, numbering, end dates and
//! conflict checks through the public API.

use chrono::{NaiveDate, NaiveTime, Weekday};
use session_engine::{
    compute_end_date, detect_conflict, generate_occurrences, parse_roster, CandidateSlot,
    ClassSchedule, DeliveryMode, EngineConfig, ExtraSession, OccurrenceKind, ResourceType,
    ScheduleRecord,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn mwf(total: u32) -> ClassSchedule {
    ClassSchedule::new("A", "alice")
        .in_room("P101")
        .with_pattern([Weekday::Mon, Weekday::Wed, Weekday::Fri])
        .at(time(18, 0))
        .starting(date(2024, 1, 1))
        .with_total_sessions(total)
}

fn ordinal_dates(schedule: &ClassSchedule) -> Vec<(u32, NaiveDate)> {
    generate_occurrences(schedule, &EngineConfig::default())
        .unwrap()
        .iter()
        .map(|o| (o.ordinal, o.date))
        .collect()
}

#[test]
fn three_sessions_on_mon_wed_fri() {
    let schedule = mwf(3);
    assert_eq!(
        ordinal_dates(&schedule),
        vec![
            (1, date(2024, 1, 1)),
            (2, date(2024, 1, 3)),
            (3, date(2024, 1, 5))
        ]
    );
    assert_eq!(
        compute_end_date(&schedule, &EngineConfig::default()).unwrap(),
        date(2024, 1, 5)
    );
}

#[test]
fn off_day_is_compensated_at_the_end() {
    let schedule = mwf(3).with_off_days([date(2024, 1, 3)]);
    assert_eq!(
        ordinal_dates(&schedule),
        vec![
            (1, date(2024, 1, 1)),
            (2, date(2024, 1, 5)),
            (3, date(2024, 1, 8))
        ]
    );
    assert_eq!(
        compute_end_date(&schedule, &EngineConfig::default()).unwrap(),
        date(2024, 1, 8)
    );
}

#[test]
fn shared_room_is_a_room_conflict() {
    let a = ClassSchedule::new("A", "Alice")
        .in_room("P101")
        .with_pattern([Weekday::Mon])
        .at(time(18, 0))
        .starting(date(2024, 1, 1))
        .with_total_sessions(4);
    let b = ClassSchedule::new("B", "Bob")
        .in_room("P101")
        .with_pattern([Weekday::Mon])
        .at(time(18, 30))
        .starting(date(2024, 1, 1))
        .with_total_sessions(4);

    let candidate = CandidateSlot::for_class(&b, date(2024, 1, 8), time(18, 30));
    let report = detect_conflict(&candidate, "B", [&a, &b], &EngineConfig::default())
        .expect("rooms overlap for an hour");

    assert_eq!(report.conflicting_class_id, "A");
    assert_eq!(report.resource_type, ResourceType::Room);
    assert_eq!(report.conflicting_date, date(2024, 1, 8));
    assert_eq!(report.conflicting_time, time(18, 0));
    assert_eq!(report.overlap_minutes, 60);
}

#[test]
fn online_class_never_conflicts_on_room() {
    let a = ClassSchedule::new("A", "Alice")
        .in_room("P101")
        .with_pattern([Weekday::Mon])
        .at(time(18, 0))
        .starting(date(2024, 1, 1))
        .with_total_sessions(4);
    let b = ClassSchedule::new("B", "Bob")
        .with_pattern([Weekday::Mon])
        .at(time(18, 0))
        .starting(date(2024, 1, 1))
        .with_total_sessions(4);
    assert_eq!(b.mode, DeliveryMode::Online);

    let candidate = CandidateSlot::for_class(&b, date(2024, 1, 8), time(18, 0));
    assert!(detect_conflict(&candidate, "B", [&a, &b], &EngineConfig::default()).is_none());
}

#[test]
fn makeup_session_gets_an_ordinal() {
    let schedule = mwf(3).with_extra_session(ExtraSession::at(date(2024, 1, 6), time(10, 0)));
    let occurrences = generate_occurrences(&schedule, &EngineConfig::default()).unwrap();

    assert_eq!(occurrences.len(), 4);
    assert_eq!(occurrences[3].ordinal, 4);
    assert_eq!(occurrences[3].kind, OccurrenceKind::Extra);
    assert_eq!(occurrences[3].start_time, time(10, 0));
    assert_eq!(
        compute_end_date(&schedule, &EngineConfig::default()).unwrap(),
        date(2024, 1, 6)
    );
}

#[test]
fn ordinals_are_dense_and_chronological() {
    let schedule = mwf(12)
        .with_off_days([date(2024, 1, 3), date(2024, 1, 10)])
        .with_extra_session(ExtraSession::on(date(2024, 1, 4)));
    let occurrences = generate_occurrences(&schedule, &EngineConfig::default()).unwrap();

    for (i, o) in occurrences.iter().enumerate() {
        assert_eq!(o.ordinal as usize, i + 1);
    }
    assert!(occurrences.windows(2).all(|w| w[0].date < w[1].date));
}

#[test]
fn roster_round_trip_recomputes_end_date() {
    let json = r#"[
        {
            "id": "A",
            "teacherId": "alice",
            "roomRef": "P101",
            "mode": "offline",
            "schedule": "Fri / Mon / Wed • 18:00",
            "startDate": "2024-01-01",
            "totalSessionsTarget": 3,
            "endDate": "1999-01-01",
            "offDays": ["2024-01-03"],
            "extraSessions": [],
            "version": 4
        }
    ]"#;
    let roster = parse_roster(json, &EngineConfig::default()).unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].version, 4);

    let schedule = &roster[0].schedule;
    let end = compute_end_date(schedule, &EngineConfig::default()).unwrap();
    assert_eq!(end, date(2024, 1, 8));

    let record = ScheduleRecord::from_schedule(schedule, Some(end), roster[0].version);
    assert_eq!(record.schedule.as_deref(), Some("Mon / Wed / Fri • 18:00"));
    assert_eq!(record.end_date, Some(date(2024, 1, 8)));
    assert_eq!(record.off_days, vec![date(2024, 1, 3)]);
}
