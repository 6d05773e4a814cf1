//! Session registry.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lock::LockTable;
use crate::session::Session;
use crate::types::SessionId;
use crate::version::VersionRegistry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use verlock_store::RecordStore;

/// Registry of open sessions over one store.
///
/// The manager owns what sessions share: the store handle, the
/// [`VersionRegistry`] and the [`LockTable`]. It also keeps a "current
/// session" cursor for callers that want one, but no operation reads it
/// implicitly.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use verlock_core::SessionManager;
/// use verlock_store::InMemoryStore;
///
/// let manager = SessionManager::new(Arc::new(InMemoryStore::new()));
/// let id = manager.open("User1");
/// assert_eq!(manager.current(), Some(id));
///
/// let session = manager.get_session(id).unwrap();
/// assert_eq!(session.name(), "User1");
///
/// manager.close(id).unwrap();
/// assert!(manager.get_session(id).is_err());
/// ```
pub struct SessionManager {
    store: Arc<dyn RecordStore>,
    versions: Arc<VersionRegistry>,
    locks: Arc<LockTable>,
    config: Arc<Config>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    current: RwLock<Option<SessionId>>,
}

impl SessionManager {
    /// Creates a manager with the default configuration.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(store, Config::default())
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(store: Arc<dyn RecordStore>, config: Config) -> Self {
        let versions = Arc::new(VersionRegistry::new(
            Arc::clone(&store),
            config.version_table.clone(),
        ));
        Self {
            store,
            versions,
            locks: Arc::new(LockTable::new()),
            config: Arc::new(config),
            sessions: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
        }
    }

    /// Opens a session for actor `name` and returns its handle.
    ///
    /// The new session becomes current if no session is.
    pub fn open(&self, name: impl Into<String>) -> SessionId {
        let session = Arc::new(Session::new(
            name.into(),
            Arc::clone(&self.store),
            Arc::clone(&self.versions),
            Arc::clone(&self.locks),
            Arc::clone(&self.config),
        ));
        let id = session.id();
        info!(session = %id, name = session.name(), "session opened");

        self.sessions.write().insert(id, session);
        let mut current = self.current.write();
        if current.is_none() {
            *current = Some(id);
        }
        id
    }

    /// Returns an open session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the handle is unknown or closed.
    pub fn get_session(&self, id: SessionId) -> CoreResult<Arc<Session>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::SessionNotFound { session_id: id })
    }

    /// Returns the current session handle.
    #[must_use]
    pub fn current(&self) -> Option<SessionId> {
        *self.current.read()
    }

    /// Makes `id` the current session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the handle is unknown or closed.
    pub fn set_current(&self, id: SessionId) -> CoreResult<()> {
        let sessions = self.sessions.read();
        if !sessions.contains_key(&id) {
            return Err(CoreError::SessionNotFound { session_id: id });
        }
        *self.current.write() = Some(id);
        Ok(())
    }

    /// Returns the current session.
    ///
    /// # Errors
    ///
    /// Returns `NoCurrentSession` if no session is current.
    pub fn current_session(&self) -> CoreResult<Arc<Session>> {
        let id = self.current().ok_or(CoreError::NoCurrentSession)?;
        self.get_session(id)
    }

    /// Closes a session: releases its locks, clears its identity map,
    /// discards its pending work and unregisters it.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the handle is unknown or already closed.
    pub fn close(&self, id: SessionId) -> CoreResult<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(CoreError::SessionNotFound { session_id: id })?;

        let released = session.lock_manager().held_count();
        session.close();
        {
            let mut current = self.current.write();
            if *current == Some(id) {
                *current = None;
            }
        }
        info!(session = %id, name = session.name(), released, "session closed");
        Ok(())
    }

    /// Returns the number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns the handles of all open sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Returns the shared version registry.
    #[must_use]
    pub fn versions(&self) -> &Arc<VersionRegistry> {
        &self.versions
    }

    /// Returns the process-wide lock table.
    #[must_use]
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.read().len())
            .field("current", &self.current())
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::lock::LockMode;
    use verlock_store::InMemoryStore;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn first_session_becomes_current() {
        let manager = manager();
        assert_eq!(manager.current(), None);
        assert!(matches!(
            manager.current_session(),
            Err(CoreError::NoCurrentSession)
        ));

        let first = manager.open("User1");
        let second = manager.open("User2");
        assert_eq!(manager.current(), Some(first));
        assert_eq!(manager.session_count(), 2);

        manager.set_current(second).unwrap();
        assert_eq!(manager.current_session().unwrap().name(), "User2");
    }

    #[test]
    fn unknown_session_is_not_found() {
        let manager = manager();
        let err = manager.get_session(SessionId::new()).unwrap_err();
        assert!(err.is_not_found());
        assert!(manager.set_current(SessionId::new()).is_err());
        assert!(manager.close(SessionId::new()).is_err());
    }

    #[test]
    fn close_releases_locks_and_clears_cursor() {
        let manager = manager();
        let a = manager.open("User1");
        let b = manager.open("User2");
        let entity = EntityId::new();

        let session_a = manager.get_session(a).unwrap();
        assert!(session_a.lock_manager().get_lock(entity, LockMode::Write));
        let session_b = manager.get_session(b).unwrap();
        assert!(!session_b.lock_manager().get_lock(entity, LockMode::Write));

        manager.close(a).unwrap();
        assert_eq!(manager.current(), None);
        assert!(manager.get_session(a).is_err());
        assert!(manager.close(a).is_err());
        assert!(session_b.lock_manager().get_lock(entity, LockMode::Write));

        assert!(session_a.is_closed());
        assert!(!session_b.is_closed());
        assert!(session_b.lock_manager().release_lock(entity));
        assert!(!session_a.lock_manager().get_lock(entity, LockMode::Write));
        assert!(matches!(
            session_a.commit(),
            Err(CoreError::SessionNotFound { session_id }) if session_id == a
        ));
    }

    #[test]
    fn sessions_share_registry_and_lock_table() {
        let manager = manager();
        let a = manager.get_session(manager.open("User1")).unwrap();
        let b = manager.get_session(manager.open("User2")).unwrap();

        assert!(std::ptr::eq(a.versions(), b.versions()));
        assert_ne!(a.id(), b.id());
        assert_eq!(manager.session_ids().len(), 2);
    }
}
