//! Per-session lock manager.

use crate::entity::EntityId;
use crate::lock::{LockMode, LockTable};
use crate::types::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lock book of one session.
///
/// Acquisition never blocks: [`LockManager::get_lock`] asks the shared
/// [`LockTable`] and returns `false` when another session holds a
/// conflicting lock. Locks are advisory; the data mapper is the place that
/// insists on them before writing.
///
/// Dropping or closing the manager releases everything it still holds. A
/// closed manager grants nothing.
#[derive(Debug)]
pub struct LockManager {
    owner: SessionId,
    table: Arc<LockTable>,
    held: Mutex<HashMap<EntityId, LockMode>>,
    closed: AtomicBool,
}

impl LockManager {
    /// Creates an empty lock book for `owner`.
    pub fn new(owner: SessionId, table: Arc<LockTable>) -> Self {
        Self {
            owner,
            table,
            held: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the owning session.
    #[must_use]
    pub fn owner(&self) -> SessionId {
        self.owner
    }

    /// Attempts to take `mode` on `id`.
    ///
    /// An existing hold is upgraded (Read to Write) or downgraded (Write to
    /// Read) in place. Returns `false` if another session holds a
    /// conflicting lock, or if this manager is closed.
    pub fn get_lock(&self, id: EntityId, mode: LockMode) -> bool {
        let mut held = self.held.lock();
        if self.is_closed() {
            debug!(session = %self.owner, entity = %id, ?mode, "lock refused, session closed");
            return false;
        }
        if held.get(&id) == Some(&mode) {
            return true;
        }

        if self.table.try_acquire(self.owner, id, mode) {
            held.insert(id, mode);
            debug!(session = %self.owner, entity = %id, ?mode, "lock granted");
            true
        } else {
            debug!(session = %self.owner, entity = %id, ?mode, "lock denied");
            false
        }
    }

    /// Releases whatever this session holds on `id`.
    ///
    /// Returns `false` if nothing was held.
    pub fn release_lock(&self, id: EntityId) -> bool {
        let mut held = self.held.lock();
        let Some(mode) = held.remove(&id) else {
            return false;
        };
        self.table.release(self.owner, id);
        drop(held);
        debug!(session = %self.owner, entity = %id, ?mode, "lock released");
        true
    }

    /// Releases every lock held by this session.
    ///
    /// Returns `true` if at least one lock was released.
    pub fn release_all_locks(&self) -> bool {
        let mut held = self.held.lock();
        self.release_held(&mut held)
    }

    /// Releases everything and refuses every later request.
    ///
    /// Returns `true` if at least one lock was released.
    pub fn close(&self) -> bool {
        let mut held = self.held.lock();
        self.closed.store(true, Ordering::Release);
        self.release_held(&mut held)
    }

    /// Returns true once [`LockManager::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns true if the held lock on `id` satisfies `mode`.
    #[must_use]
    pub fn holds(&self, id: EntityId, mode: LockMode) -> bool {
        self.mode(id).is_some_and(|held| held.satisfies(mode))
    }

    /// Returns the mode held on `id`.
    #[must_use]
    pub fn mode(&self, id: EntityId) -> Option<LockMode> {
        self.held.lock().get(&id).copied()
    }

    /// Returns the number of entities this session holds locks on.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    fn release_held(&self, held: &mut HashMap<EntityId, LockMode>) -> bool {
        let count = held.len();
        for (id, _) in held.drain() {
            self.table.release(self.owner, id);
        }
        if count > 0 {
            debug!(session = %self.owner, count, "all locks released");
        }
        count > 0
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.release_all_locks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockHolders;

    fn pair() -> (LockManager, LockManager) {
        let table = Arc::new(LockTable::new());
        (
            LockManager::new(SessionId::new(), Arc::clone(&table)),
            LockManager::new(SessionId::new(), table),
        )
    }

    #[test]
    fn write_blocks_other_session_until_released() {
        let (a, b) = pair();
        let id = EntityId::new();

        assert!(a.get_lock(id, LockMode::Write));
        assert!(!b.get_lock(id, LockMode::Write));
        assert!(!b.get_lock(id, LockMode::Read));

        assert!(a.release_lock(id));
        assert!(b.get_lock(id, LockMode::Write));
    }

    #[test]
    fn read_blocks_other_writer() {
        let (a, b) = pair();
        let id = EntityId::new();

        assert!(a.get_lock(id, LockMode::Read));
        assert!(!b.get_lock(id, LockMode::Write));
        assert!(b.get_lock(id, LockMode::Read));
    }

    #[test]
    fn upgrade_and_downgrade_in_place() {
        let (a, _b) = pair();
        let id = EntityId::new();

        assert!(a.get_lock(id, LockMode::Read));
        assert!(a.get_lock(id, LockMode::Write));
        assert_eq!(a.mode(id), Some(LockMode::Write));
        assert!(a.holds(id, LockMode::Read));

        assert!(a.get_lock(id, LockMode::Read));
        assert_eq!(a.mode(id), Some(LockMode::Read));
        assert!(!a.holds(id, LockMode::Write));
        assert_eq!(a.held_count(), 1);
    }

    #[test]
    fn release_unheld_is_false() {
        let (a, _b) = pair();
        assert!(!a.release_lock(EntityId::new()));
        assert!(!a.release_all_locks());
    }

    #[test]
    fn release_all_frees_everything() {
        let (a, b) = pair();
        let ids = [EntityId::new(), EntityId::new(), EntityId::new()];
        for id in ids {
            assert!(a.get_lock(id, LockMode::Write));
        }

        assert!(a.release_all_locks());
        assert_eq!(a.held_count(), 0);
        for id in ids {
            assert!(b.get_lock(id, LockMode::Write));
        }
    }

    #[test]
    fn closed_manager_grants_nothing() {
        let (a, b) = pair();
        let id = EntityId::new();
        assert!(a.get_lock(id, LockMode::Write));

        assert!(a.close());
        assert!(a.is_closed());
        assert_eq!(a.held_count(), 0);
        assert!(!a.get_lock(id, LockMode::Write));
        assert!(!a.get_lock(EntityId::new(), LockMode::Read));
        assert!(b.get_lock(id, LockMode::Write));
    }

    #[test]
    fn release_keeps_book_and_table_in_step() {
        let table = Arc::new(LockTable::new());
        let a = Arc::new(LockManager::new(SessionId::new(), Arc::clone(&table)));
        let id = EntityId::new();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let a = Arc::clone(&a);
                scope.spawn(move || {
                    for i in 0..500 {
                        if i % 2 == 0 {
                            a.get_lock(id, LockMode::Write);
                        } else {
                            a.release_lock(id);
                        }
                    }
                });
            }
        });

        let holders = table.holders(id);
        match a.mode(id) {
            Some(LockMode::Write) => assert_eq!(holders.writer, Some(a.owner())),
            Some(LockMode::Read) => unreachable!("only write locks were taken"),
            None => assert_eq!(holders, LockHolders::default()),
        }
    }

    #[test]
    fn drop_releases_locks() {
        let table = Arc::new(LockTable::new());
        let id = EntityId::new();
        {
            let a = LockManager::new(SessionId::new(), Arc::clone(&table));
            assert!(a.get_lock(id, LockMode::Write));
        }
        assert_eq!(table.locked_count(), 0);
    }
}
