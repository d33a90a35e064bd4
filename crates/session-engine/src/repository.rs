//! Storage seam for class schedules.
//!
//! The engine never holds ambient shared state: the reschedule chain and the
//! conflict scan receive a [`ClassRepository`] and read snapshots from it.
//! Writes are guarded by a per-class optimistic version check.
//!
//! # Thread Safety
//! Implementations must be `Send + Sync` so one repository can back
//! concurrent command handlers.

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::model::ClassSchedule;

/// A schedule together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSchedule {
    pub schedule: ClassSchedule,
    /// Starts at 1 on insert and increases by one per successful save.
    pub version: u64,
}

pub trait ClassRepository: Send + Sync {
    /// Fetch one class.
    ///
    /// # Returns
    /// * `Err(EngineError::ClassNotFound)` - If no class has this id
    fn get_class(&self, class_id: &str) -> Result<VersionedSchedule>;

    /// Snapshot of every class, in stable insertion order.
    fn list_classes(&self) -> Result<Vec<ClassSchedule>>;

    /// Store `schedule` if the stored version still equals `expected_version`.
    ///
    /// An `expected_version` of 0 inserts a new class.
    ///
    /// # Returns
    /// * `Ok(u64)` - The new version
    /// * `Err(EngineError::VersionConflict)` - If the stored version moved on
    fn save_class(&self, schedule: ClassSchedule, expected_version: u64) -> Result<u64>;
}

impl<R: ClassRepository + ?Sized> ClassRepository for std::sync::Arc<R> {
    fn get_class(&self, class_id: &str) -> Result<VersionedSchedule> {
        (**self).get_class(class_id)
    }

    fn list_classes(&self) -> Result<Vec<ClassSchedule>> {
        (**self).list_classes()
    }

    fn save_class(&self, schedule: ClassSchedule, expected_version: u64) -> Result<u64> {
        (**self).save_class(schedule, expected_version)
    }
}

/// Process-local repository for tests, the CLI, and embedding.
#[derive(Debug, Default)]
pub struct InMemoryClassRepository {
    entries: RwLock<Vec<VersionedSchedule>>,
}

impl InMemoryClassRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already-versioned entries (e.g. from [`crate::wire::parse_roster`]).
    /// A version of 0 is bumped to 1 so every stored class is saveable.
    pub fn with_entries(entries: impl IntoIterator<Item = VersionedSchedule>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut e| {
                e.version = e.version.max(1);
                e
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Seed with fresh classes at version 1.
    pub fn with_classes(classes: impl IntoIterator<Item = ClassSchedule>) -> Self {
        Self::with_entries(classes.into_iter().map(|schedule| VersionedSchedule {
            schedule,
            version: 1,
        }))
    }

    /// Every entry with its version, in insertion order.
    pub fn entries(&self) -> Vec<VersionedSchedule> {
        self.entries.read().clone()
    }
}

impl ClassRepository for InMemoryClassRepository {
    fn get_class(&self, class_id: &str) -> Result<VersionedSchedule> {
        self.entries
            .read()
            .iter()
            .find(|e| e.schedule.id == class_id)
            .cloned()
            .ok_or_else(|| EngineError::ClassNotFound(class_id.to_string()))
    }

    fn list_classes(&self) -> Result<Vec<ClassSchedule>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|e| e.schedule.clone())
            .collect())
    }

    fn save_class(&self, schedule: ClassSchedule, expected_version: u64) -> Result<u64> {
        let mut entries = self.entries.write();
        let position = entries.iter().position(|e| e.schedule.id == schedule.id);

        match position {
            None if expected_version == 0 => {
                entries.push(VersionedSchedule {
                    schedule,
                    version: 1,
                });
                Ok(1)
            }
            None => Err(EngineError::ClassNotFound(schedule.id)),
            Some(i) if entries[i].version == expected_version => {
                let entry = &mut entries[i];
                entry.version += 1;
                entry.schedule = schedule;
                Ok(entry.version)
            }
            Some(i) => {
                let entry = &entries[i];
                warn!(
                    class_id = %schedule.id,
                    expected = expected_version,
                    actual = entry.version,
                    "rejecting stale write"
                );
                Err(EngineError::VersionConflict {
                    class_id: schedule.id,
                    expected: expected_version,
                    actual: entry.version,
                })
            }
        }
    }
}
