//! `sessions`: query and reschedule class sessions from a JSON roster.
//!
//! The roster is a JSON array of schedule records, read from `--roster` or
//! stdin. Results are printed to stdout as JSON; logs go to stderr and are
//! controlled by `RUST_LOG`.
//!
//! Exit codes: 0 on success, 1 on error, 2 when a conflict was found (for
//! `check`) or a reschedule was blocked.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use session_engine::wire::parse_hhmm;
use session_engine::{
    compute_end_date, detect_all_conflicts, detect_conflict, parse_roster, suggest_alternatives,
    suggest_validated_alternatives, CandidateSlot, ClassRepository, ClassSchedule, EngineConfig,
    InMemoryClassRepository, RescheduleChain, RescheduleOutcome, RescheduleRequest,
    ScheduleRecord, UpdatedSchedule,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "sessions", version, about = "Class session scheduling engine")]
struct Cli {
    /// Engine settings (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Roster JSON file. Read from stdin when omitted.
    #[arg(long, global = true)]
    roster: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a class's numbered sessions.
    Occurrences {
        #[arg(long = "class")]
        class_id: String,
    },
    /// Compute a class's course end date.
    EndDate {
        #[arg(long = "class")]
        class_id: String,
    },
    /// Check whether a class could hold a session at the given slot.
    Check {
        #[arg(long = "class")]
        class_id: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,
        /// Report every conflicting class instead of the first.
        #[arg(long)]
        all: bool,
    },
    /// Suggest alternative start times around a busy time.
    Suggest {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,
        /// Only offer times this class could actually take.
        #[arg(long = "class")]
        class_id: Option<String>,
    },
    /// Move one session and print the updated class.
    Reschedule {
        #[arg(long = "class")]
        class_id: String,
        #[arg(long)]
        ordinal: u32,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,
        #[arg(long = "override")]
        override_conflict: bool,
        #[arg(long)]
        privileged: bool,
    },
    /// Cancel the session on a date and print the updated class.
    Cancel {
        #[arg(long = "class")]
        class_id: String,
        #[arg(long)]
        date: NaiveDate,
    },
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    parse_hhmm(s).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok((output, code)) => {
            println!("{output:#}");
            code
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn load_roster(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading roster {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading roster from stdin")?;
            Ok(buf)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<(Value, ExitCode)> {
    let config = load_config(cli.config.as_ref())?;
    let roster = parse_roster(&load_roster(cli.roster.as_ref())?, &config)
        .context("parsing roster")?;
    debug!(classes = roster.len(), "roster loaded");

    let chain = RescheduleChain::new(InMemoryClassRepository::with_entries(roster), config);
    let config = chain.config();
    let classes = chain.repository().list_classes()?;

    match cli.command {
        Command::Occurrences { class_id } => {
            let projection = chain.projection(&class_id)?;
            Ok((json!(projection.occurrences), ExitCode::SUCCESS))
        }
        Command::EndDate { class_id } => {
            let projection = chain.projection(&class_id)?;
            Ok((
                json!({
                    "classId": class_id,
                    "endDate": projection.end_date,
                    "sessions": projection.occurrences.len(),
                }),
                ExitCode::SUCCESS,
            ))
        }
        Command::Check {
            class_id,
            date,
            time,
            all,
        } => {
            let class = find_class(&classes, &class_id)?;
            let candidate = CandidateSlot::for_class(class, date, time);
            let conflicts = if all {
                detect_all_conflicts(&candidate, &class_id, &classes, config)
            } else {
                detect_conflict(&candidate, &class_id, &classes, config)
                    .into_iter()
                    .collect()
            };
            let code = if conflicts.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            };
            Ok((json!({ "conflicts": conflicts }), code))
        }
        Command::Suggest {
            date,
            time,
            class_id,
        } => {
            let times = match class_id {
                Some(class_id) => {
                    let class = find_class(&classes, &class_id)?;
                    let candidate = CandidateSlot::for_class(class, date, time);
                    suggest_validated_alternatives(&candidate, time, &class_id, &classes, config)
                }
                None => suggest_alternatives(date, time, config),
            };
            Ok((json!({ "suggestions": hhmm_list(&times) }), ExitCode::SUCCESS))
        }
        Command::Reschedule {
            class_id,
            ordinal,
            date,
            time,
            override_conflict,
            privileged,
        } => {
            let outcome = chain.reschedule(&RescheduleRequest {
                class_id,
                target_ordinal: ordinal,
                new_date: date,
                new_time: time,
                override_conflict,
                requester_is_privileged: privileged,
            })?;
            Ok(render_outcome(&outcome, config))
        }
        Command::Cancel { class_id, date } => {
            let updated = chain.cancel_session(&class_id, date)?;
            Ok((render_committed(&updated), ExitCode::SUCCESS))
        }
    }
}

fn find_class<'a>(
    classes: &'a [ClassSchedule],
    class_id: &str,
) -> anyhow::Result<&'a ClassSchedule> {
    match classes.iter().find(|c| c.id == class_id) {
        Some(class) => Ok(class),
        None => bail!("class '{class_id}' not found in roster"),
    }
}

fn hhmm_list(times: &[NaiveTime]) -> Vec<String> {
    times.iter().map(|t| t.format("%H:%M").to_string()).collect()
}

fn render_committed(updated: &UpdatedSchedule) -> Value {
    let record =
        ScheduleRecord::from_schedule(&updated.schedule, Some(updated.end_date), updated.version);
    json!({
        "outcome": "committed",
        "class": record,
        "previousEndDate": updated.previous_end_date,
        "scheduleShifted": updated.schedule_shifted(),
        "occurrences": updated.occurrences,
    })
}

fn render_outcome(outcome: &RescheduleOutcome, config: &EngineConfig) -> (Value, ExitCode) {
    let (label, blocked) = match outcome {
        RescheduleOutcome::Committed(updated) => {
            return (render_committed(updated), ExitCode::SUCCESS)
        }
        RescheduleOutcome::Blocked(blocked) => ("blocked", blocked),
        RescheduleOutcome::PermissionDenied(blocked) => ("permission_denied", blocked),
    };
    let end_date = compute_end_date(&blocked.schedule, config).ok();
    (
        json!({
            "outcome": label,
            "conflict": blocked.report,
            "suggestions": hhmm_list(&blocked.suggestions),
            "class": ScheduleRecord::from_schedule(&blocked.schedule, end_date, blocked.version),
        }),
        ExitCode::from(2),
    )
}
