//! Sessions and the session registry.
//!
//! A session is one named actor's view of the store: its lock book, its
//! identity map and its pending unit of work. Sessions are opened and
//! closed through the [`SessionManager`], which also owns the state shared
//! between them (the version registry and the process-wide lock table).

mod manager;

pub use manager::SessionManager;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::identity::IdentityMap;
use crate::lock::{LockManager, LockTable};
use crate::types::SessionId;
use crate::unit_of_work::UnitOfWork;
use crate::version::VersionRegistry;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use verlock_store::RecordStore;

/// An open session.
///
/// Obtained from [`SessionManager::get_session`] and passed explicitly to
/// every mapper operation. Once closed, a retained handle takes no locks and
/// every store operation through it fails with `SessionNotFound`.
pub struct Session {
    id: SessionId,
    name: String,
    store: Arc<dyn RecordStore>,
    versions: Arc<VersionRegistry>,
    config: Arc<Config>,
    locks: LockManager,
    identity: Mutex<IdentityMap>,
    work: Mutex<UnitOfWork>,
}

impl Session {
    pub(crate) fn new(
        name: String,
        store: Arc<dyn RecordStore>,
        versions: Arc<VersionRegistry>,
        lock_table: Arc<LockTable>,
        config: Arc<Config>,
    ) -> Self {
        let id = SessionId::new();
        Self {
            id,
            name,
            store,
            versions,
            config,
            locks: LockManager::new(id, lock_table),
            identity: Mutex::new(IdentityMap::new()),
            work: Mutex::new(UnitOfWork::new()),
        }
    }

    /// Returns the session handle.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the actor name recorded in version token audits.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Returns the shared version registry.
    #[must_use]
    pub fn versions(&self) -> &VersionRegistry {
        &self.versions
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns this session's lock manager.
    #[must_use]
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Locks this session's identity map.
    pub fn identity_map(&self) -> MutexGuard<'_, IdentityMap> {
        self.identity.lock()
    }

    /// Locks this session's unit of work.
    pub fn unit_of_work(&self) -> MutexGuard<'_, UnitOfWork> {
        self.work.lock()
    }

    /// Commits the pending unit of work as one atomic batch.
    ///
    /// # Errors
    ///
    /// See [`UnitOfWork::commit`].
    pub fn commit(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let mut work = std::mem::take(&mut *self.work.lock());
        work.commit(self)
    }

    /// Discards the pending unit of work.
    pub fn rollback(&self) {
        self.work.lock().clear();
    }

    /// Returns true once the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.locks.is_closed()
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::SessionNotFound {
                session_id: self.id,
            });
        }
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.locks.close();
        self.rollback();
        self.identity.lock().clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("locks_held", &self.locks.held_count())
            .field("identity_map", &self.identity.lock().len())
            .field("pending", &self.work.lock().len())
            .finish_non_exhaustive()
    }
}
