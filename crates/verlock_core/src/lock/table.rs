//! Process-wide lock table.

use crate::entity::EntityId;
use crate::lock::LockMode;
use crate::types::SessionId;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct LockEntry {
    readers: HashSet<SessionId>,
    writer: Option<SessionId>,
}

impl LockEntry {
    fn is_free(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }
}

/// Sessions currently holding locks on one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockHolders {
    /// Sessions holding Read, sorted.
    pub readers: Vec<SessionId>,
    /// Session holding Write, if any.
    pub writer: Option<SessionId>,
}

/// Conflict authority for every lock in the process.
///
/// Each entity has at most one entry, holding either any number of readers
/// or exactly one writer. A session appears at most once per entry: taking
/// Write moves it out of the readers, taking Read clears its Write.
///
/// All checks and updates for one entity happen under that entity's shard
/// lock, so two sessions can never both be granted Write.
#[derive(Debug, Default)]
pub struct LockTable {
    entries: DashMap<EntityId, LockEntry>,
}

impl LockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to grant `mode` on `id` to `owner`.
    ///
    /// Returns `false` without changing anything if another session holds a
    /// conflicting lock.
    pub fn try_acquire(&self, owner: SessionId, id: EntityId, mode: LockMode) -> bool {
        let mut entry = self.entries.entry(id).or_default();
        let other_writer = entry.writer.is_some_and(|writer| writer != owner);
        if other_writer {
            return false;
        }

        match mode {
            LockMode::Write => {
                if entry.readers.iter().any(|reader| *reader != owner) {
                    return false;
                }
                entry.readers.remove(&owner);
                entry.writer = Some(owner);
            }
            LockMode::Read => {
                entry.writer = None;
                entry.readers.insert(owner);
            }
        }
        true
    }

    /// Drops whatever `owner` holds on `id`.
    ///
    /// Returns `false` if `owner` held nothing there.
    pub fn release(&self, owner: SessionId, id: EntityId) -> bool {
        let (released, free) = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                let was_writer = entry.writer == Some(owner);
                if was_writer {
                    entry.writer = None;
                }
                let was_reader = entry.readers.remove(&owner);
                (was_writer || was_reader, entry.is_free())
            }
            None => (false, false),
        };
        if free {
            self.entries.remove_if(&id, |_, entry| entry.is_free());
        }
        released
    }

    /// Returns who holds locks on `id`.
    #[must_use]
    pub fn holders(&self, id: EntityId) -> LockHolders {
        self.entries
            .get(&id)
            .map(|entry| {
                let mut readers: Vec<SessionId> = entry.readers.iter().copied().collect();
                readers.sort();
                LockHolders {
                    readers,
                    writer: entry.writer,
                }
            })
            .unwrap_or_default()
    }

    /// Returns the number of entities with at least one lock.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_free()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share() {
        let table = LockTable::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let id = EntityId::new();

        assert!(table.try_acquire(a, id, LockMode::Read));
        assert!(table.try_acquire(b, id, LockMode::Read));
        assert_eq!(table.holders(id).readers.len(), 2);
    }

    #[test]
    fn writer_excludes_everyone_else() {
        let table = LockTable::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let id = EntityId::new();

        assert!(table.try_acquire(a, id, LockMode::Write));
        assert!(!table.try_acquire(b, id, LockMode::Read));
        assert!(!table.try_acquire(b, id, LockMode::Write));
        assert_eq!(table.holders(id).writer, Some(a));
    }

    #[test]
    fn other_reader_blocks_upgrade() {
        let table = LockTable::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let id = EntityId::new();

        assert!(table.try_acquire(a, id, LockMode::Read));
        assert!(table.try_acquire(b, id, LockMode::Read));
        assert!(!table.try_acquire(a, id, LockMode::Write));

        assert!(table.release(b, id));
        assert!(table.try_acquire(a, id, LockMode::Write));
        let holders = table.holders(id);
        assert!(holders.readers.is_empty());
        assert_eq!(holders.writer, Some(a));
    }

    #[test]
    fn downgrade_to_read() {
        let table = LockTable::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let id = EntityId::new();

        assert!(table.try_acquire(a, id, LockMode::Write));
        assert!(table.try_acquire(a, id, LockMode::Read));
        assert!(table.try_acquire(b, id, LockMode::Read));
        assert_eq!(table.holders(id).writer, None);
    }

    #[test]
    fn release_frees_entry() {
        let table = LockTable::new();
        let a = SessionId::new();
        let id = EntityId::new();

        assert!(table.try_acquire(a, id, LockMode::Write));
        assert_eq!(table.locked_count(), 1);
        assert!(table.release(a, id));
        assert!(!table.release(a, id));
        assert_eq!(table.locked_count(), 0);
        assert_eq!(table.holders(id), LockHolders::default());
    }
}
