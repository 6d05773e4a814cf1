//! Loaded entity wrapper.

use crate::entity::EntityId;
use crate::types::VersionId;
use crate::version::VersionToken;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;

/// A loaded entity: ID, version token handle and payload.
///
/// The payload can be edited in place through [`Entity::write`] without
/// holding any entity lock; locks are only checked when the change is
/// persisted. Within one session there is at most one `Entity` per ID, handed
/// out as `Arc<Entity<T>>` by the identity map.
pub struct Entity<T> {
    id: EntityId,
    version_id: VersionId,
    token: Mutex<VersionToken>,
    data: RwLock<T>,
}

impl<T> Entity<T> {
    pub(crate) fn new(id: EntityId, token: VersionToken, data: T) -> Self {
        Self {
            id,
            version_id: token.id(),
            token: Mutex::new(token),
            data: RwLock::new(data),
        }
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the ID of the entity's version token.
    #[must_use]
    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    /// Returns a copy of the version token handle.
    #[must_use]
    pub fn version(&self) -> VersionToken {
        self.token.lock().clone()
    }

    /// Locks the payload for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.data.read()
    }

    /// Locks the payload for editing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write()
    }

    pub(crate) fn token(&self) -> MutexGuard<'_, VersionToken> {
        self.token.lock()
    }
}

impl<T: Clone> Entity<T> {
    /// Returns a copy of the payload.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.data.read().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("version", &self.token.lock().value())
            .field("data", &*self.data.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionStamp;
    use chrono::Utc;

    #[test]
    fn edits_in_place() {
        let token = VersionToken::new(
            VersionId::new(),
            VersionStamp::initial("User1", Utc::now()),
            true,
        );
        let version_id = token.id();
        let entity = Entity::new(EntityId::new(), token, String::from("Ana"));

        entity.write().push_str(" Lima");
        assert_eq!(entity.snapshot(), "Ana Lima");
        assert_eq!(entity.version_id(), version_id);
        assert_eq!(entity.version().value(), 0);
    }
}
