//! # session-engine
//!
//! Deterministic scheduling for recurring class sessions.
//!
//! A class is described by a weekly pattern, a time of day, a start date and
//! either a session target or a hard end date. Everything else (concrete
//! session dates, "session N of M" numbering, the course end date) is derived
//! on demand, so the derived data can never drift from the description.
//!
//! ## Modules
//!
//! - [`generator`]: Walk the calendar into occurrences (off-days, makeups, moves)
//! - [`indexer`]: Number occurrences chronologically from 1
//! - [`end_date`]: Project the course end date from the session target
//! - [`conflict`]: Detect teacher/room double-booking against other classes
//! - [`suggest`]: Offer nearby alternative start times after a conflict
//! - [`reschedule`]: Move and cancel sessions, edit classes, and commit atomically
//! - [`repository`]: Storage seam with optimistic versioning
//! - [`wire`]: JSON records and the `"Mon / Wed • 18:00"` schedule label
//! - [`model`]: Class schedule aggregate and value types
//! - [`config`]: Engine settings, loadable from TOML
//! - [`error`]: Error types

pub mod config;
pub mod conflict;
pub mod end_date;
pub mod error;
pub mod generator;
pub mod indexer;
pub mod model;
pub mod repository;
pub mod reschedule;
pub mod suggest;
pub mod wire;

pub use config::{EngineConfig, RoomMatch};
pub use conflict::{detect_all_conflicts, detect_conflict, ConflictReport, ResourceType};
pub use end_date::{compute_end_date, project_schedule, ScheduleProjection};
pub use error::{EngineError, Result};
pub use generator::{generate, GeneratedOccurrence, GenerationBound, OccurrenceKind};
pub use indexer::{
    find_date, find_ordinal, generate_occurrences, index_occurrences, SessionOccurrence,
};
pub use model::{
    CandidateSlot, ClassSchedule, DeliveryMode, ExtraSession, Relocation, SessionLimit,
    WeekdayPattern,
};
pub use repository::{ClassRepository, InMemoryClassRepository, VersionedSchedule};
pub use reschedule::{
    BlockedReschedule, ChainState, RescheduleChain, RescheduleOutcome, RescheduleRequest,
    UpdatedSchedule,
};
pub use suggest::{suggest_alternatives, suggest_validated_alternatives};
pub use wire::{format_schedule_label, parse_roster, parse_schedule_label, ScheduleRecord};
