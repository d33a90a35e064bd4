//! Black-box tests for the `sessions` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

const ROSTER: &str = r#"[
    {
        "id": "A",
        "teacherId": "alice",
        "roomRef": "P101",
        "mode": "offline",
        "schedule": "Mon / Wed / Fri • 18:00",
        "startDate": "2024-01-01",
        "totalSessionsTarget": 6,
        "offDays": [],
        "extraSessions": [],
        "version": 1
    },
    {
        "id": "C",
        "teacherId": "carol",
        "roomRef": "P101",
        "mode": "offline",
        "schedule": "Thu • 18:00",
        "startDate": "2024-01-04",
        "totalSessionsTarget": 4,
        "version": 1
    }
]"#;

fn sessions() -> Command {
    Command::cargo_bin("sessions").unwrap()
}

fn run_json(args: &[&str], expected_code: i32) -> Value {
    let output = sessions()
        .args(args)
        .write_stdin(ROSTER)
        .assert()
        .code(expected_code)
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn end_date_for_class() {
    let out = run_json(&["end-date", "--class", "A"], 0);
    assert_eq!(out["endDate"], "2024-01-12");
    assert_eq!(out["sessions"], 6);
}

#[test]
fn occurrences_are_numbered() {
    let out = run_json(&["occurrences", "--class", "A"], 0);
    let list = out.as_array().unwrap();
    assert_eq!(list.len(), 6);
    assert_eq!(list[0]["ordinal"], 1);
    assert_eq!(list[0]["date"], "2024-01-01");
    assert_eq!(list[0]["startTime"], "18:00");
    assert_eq!(list[0]["kind"], "regular");
    assert_eq!(list[5]["date"], "2024-01-12");
}

#[test]
fn check_reports_room_conflict() {
    let out = run_json(
        &["check", "--class", "A", "--date", "2024-01-04", "--time", "18:30"],
        2,
    );
    let conflict = &out["conflicts"][0];
    assert_eq!(conflict["conflictingClassId"], "C");
    assert_eq!(conflict["resourceType"], "room");
    assert_eq!(conflict["conflictingTime"], "18:00");
    assert_eq!(conflict["overlapMinutes"], 60);
}

#[test]
fn check_free_slot_succeeds() {
    let out = run_json(
        &["check", "--class", "A", "--date", "2024-01-04", "--time", "20:00"],
        0,
    );
    assert_eq!(out["conflicts"].as_array().unwrap().len(), 0);
}

#[test]
fn suggest_around_busy_time() {
    let out = run_json(&["suggest", "--date", "2024-01-04", "--time", "18:00"], 0);
    assert_eq!(out["suggestions"], serde_json::json!(["16:00", "20:00"]));
}

#[test]
fn blocked_reschedule_exits_two() {
    let out = run_json(
        &[
            "reschedule", "--class", "A", "--ordinal", "2", "--date", "2024-01-04", "--time",
            "18:30",
        ],
        2,
    );
    assert_eq!(out["outcome"], "blocked");
    assert_eq!(out["conflict"]["conflictingClassId"], "C");
    assert_eq!(out["class"]["version"], 1);
    assert_eq!(out["class"]["endDate"], "2024-01-12");
}

#[test]
fn unprivileged_override_is_denied() {
    let out = run_json(
        &[
            "reschedule", "--class", "A", "--ordinal", "2", "--date", "2024-01-04", "--time",
            "18:30", "--override",
        ],
        2,
    );
    assert_eq!(out["outcome"], "permission_denied");
}

#[test]
fn reschedule_to_free_slot_commits() {
    let out = run_json(
        &[
            "reschedule", "--class", "A", "--ordinal", "2", "--date", "2024-01-04", "--time",
            "20:00",
        ],
        0,
    );
    assert_eq!(out["outcome"], "committed");
    assert_eq!(out["class"]["version"], 2);
    assert_eq!(out["class"]["endDate"], "2024-01-12");
    assert_eq!(out["scheduleShifted"], false);
    assert_eq!(out["occurrences"][1]["kind"], "moved");
    assert_eq!(out["occurrences"][1]["startTime"], "20:00");
}

#[test]
fn cancel_pushes_end_date() {
    let out = run_json(&["cancel", "--class", "A", "--date", "2024-01-05"], 0);
    assert_eq!(out["class"]["endDate"], "2024-01-15");
    assert_eq!(out["class"]["offDays"], serde_json::json!(["2024-01-05"]));
    assert_eq!(out["previousEndDate"], "2024-01-12");
    assert_eq!(out["scheduleShifted"], true);
}

#[test]
fn unknown_class_fails() {
    sessions()
        .args(["end-date", "--class", "Z"])
        .write_stdin(ROSTER)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Class not found: Z"));
}

#[test]
fn malformed_time_rejected() {
    sessions()
        .args(["suggest", "--date", "2024-01-04", "--time", "6pm"])
        .write_stdin(ROSTER)
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected HH:MM"));
}

#[test]
fn config_file_changes_suggestion_offset() {
    let path = std::env::temp_dir().join(format!("sessions-cli-{}.toml", std::process::id()));
    std::fs::write(&path, "suggestion_offset_minutes = 60\n").unwrap();

    let output = sessions()
        .args(["suggest", "--date", "2024-01-04", "--time", "18:00", "--config"])
        .arg(&path)
        .write_stdin(ROSTER)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    std::fs::remove_file(&path).ok();

    let out: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(out["suggestions"], serde_json::json!(["17:00", "19:00"]));
}
