//! Engine tuning knobs.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//! Times are written as `"HH:MM"`.
//!
//! ```toml
//! safety_horizon_days = 365
//! default_duration_minutes = 90
//! operating_window_start = "07:00"
//! operating_window_end = "21:00"
//! suggestion_offset_minutes = 120
//! room_match = "exact"
//! revalidate_before_commit = true
//! ```

use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::wire::hhmm;

pub const DEFAULT_SAFETY_HORIZON_DAYS: u32 = 365;
pub const DEFAULT_DURATION_MINUTES: u32 = 90;
pub const DEFAULT_SUGGESTION_OFFSET_MINUTES: u32 = 120;

/// How two room identifiers are compared when looking for a shared room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMatch {
    /// Identifiers must be equal after trimming.
    #[default]
    Exact,
    /// The other class's room label contains the tested room as a substring
    /// (e.g. `"P101"` matches `"Campus A - P101"`).
    Contains,
}

impl RoomMatch {
    /// Compare the room under test against another class's room label.
    pub fn matches(self, tested: &str, other: &str) -> bool {
        let tested = tested.trim();
        let other = other.trim();
        if tested.is_empty() || other.is_empty() {
            return false;
        }
        match self {
            RoomMatch::Exact => tested == other,
            RoomMatch::Contains => other.contains(tested),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Calendar days the generator may scan before giving up.
    pub safety_horizon_days: u32,
    /// Session length used when a class record omits one.
    pub default_duration_minutes: u32,
    /// Earliest start time the suggestion engine will offer.
    #[serde(with = "hhmm")]
    pub operating_window_start: NaiveTime,
    /// Latest start time the suggestion engine will offer.
    #[serde(with = "hhmm")]
    pub operating_window_end: NaiveTime,
    /// Distance between a busy slot and each suggested alternative.
    pub suggestion_offset_minutes: u32,
    pub room_match: RoomMatch,
    /// Re-run conflict detection inside the class lock right before a write.
    pub revalidate_before_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            safety_horizon_days: DEFAULT_SAFETY_HORIZON_DAYS,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            operating_window_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            operating_window_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default(),
            suggestion_offset_minutes: DEFAULT_SUGGESTION_OFFSET_MINUTES,
            room_match: RoomMatch::default(),
            revalidate_before_commit: true,
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("'{}': {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.safety_horizon_days == 0 {
            return Err(EngineError::Config(
                "safety_horizon_days must be positive".to_string(),
            ));
        }
        if self.default_duration_minutes == 0 {
            return Err(EngineError::Config(
                "default_duration_minutes must be positive".to_string(),
            ));
        }
        if self.operating_window_start >= self.operating_window_end {
            return Err(EngineError::Config(format!(
                "operating window is empty: {} - {}",
                self.operating_window_start.format("%H:%M"),
                self.operating_window_end.format("%H:%M")
            )));
        }
        Ok(())
    }
}
