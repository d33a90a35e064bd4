//! Error types for session-engine operations.

use thiserror::Error;

use crate::generator::GeneratedOccurrence;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Generation ran out of scan horizon before it could stop on its own.
    /// `partial` holds whatever was accepted up to that point (extras included).
    #[error("Safety cap exceeded: no termination within {scanned_days} scanned days")]
    SafetyCapExceeded {
        scanned_days: u32,
        partial: Vec<GeneratedOccurrence>,
    },

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Session not found in class {class_id}: {detail}")]
    SessionNotFound { class_id: String, detail: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Version conflict on class {class_id}: expected {expected}, found {actual}")]
    VersionConflict {
        class_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
