//! Process-wide version token registry.

use crate::error::{ConflictSubject, CoreError, CoreResult};
use crate::types::VersionId;
use crate::version::stamp::VALUE_COLUMN;
use crate::version::{VersionStamp, VersionToken};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use verlock_store::{BatchOutcome, Filter, Mutation, RecordStore, Row, Value};

/// Registry of version tokens shared by every session of a manager.
///
/// The registry caches the latest durable stamp known for each token and
/// performs the token's conditional writes against the store. The store's
/// conditional update is the only serialization point: the registry never
/// decides a race, it only records the outcome.
///
/// Registration is monotonic per token. A stamp never replaces one with a
/// higher counter, so a slow reader cannot roll the cache back.
pub struct VersionRegistry {
    store: Arc<dyn RecordStore>,
    table: String,
    versions: DashMap<VersionId, VersionStamp>,
}

impl VersionRegistry {
    /// Creates a registry over `table` of `store`.
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            versions: DashMap::new(),
        }
    }

    /// Returns the token table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates a new, unpersisted token with value 0.
    ///
    /// Does not touch the store or the registry.
    #[must_use]
    pub fn create(&self, actor: &str) -> VersionToken {
        VersionToken::new(VersionId::new(), VersionStamp::initial(actor, Utc::now()), true)
    }

    /// Returns a handle on a token.
    ///
    /// A registered token is served from the registry; otherwise it is
    /// loaded from the store and registered.
    ///
    /// # Errors
    ///
    /// Returns `VersionNotFound` if the store has no such token.
    pub fn find(&self, id: VersionId) -> CoreResult<VersionToken> {
        if let Some(stamp) = self.versions.get(&id) {
            return Ok(VersionToken::new(id, stamp.clone(), false));
        }

        let row = self
            .store
            .find_by_id(&self.table, &Value::from(id))?
            .ok_or(CoreError::VersionNotFound { version_id: id })?;
        let (_, stamp) = VersionStamp::from_row(&row)?;
        self.register(id, stamp.clone());
        Ok(VersionToken::new(id, stamp, false))
    }

    /// Persists a new token. A no-op for tokens that are already persisted.
    ///
    /// # Errors
    ///
    /// Returns a store error if the record cannot be written.
    pub fn insert(&self, token: &mut VersionToken) -> CoreResult<()> {
        if !token.is_new() {
            return Ok(());
        }
        self.store.apply(&[self.insert_mutation(token)])?;
        self.register(token.id(), token.stamp().clone());
        token.mark_persisted();
        Ok(())
    }

    /// Advances the token's counter by one on behalf of `actor`.
    ///
    /// A no-op while the token is soft locked. Otherwise the store write
    /// only succeeds if the stored value still equals the value this handle
    /// observed; on success the handle becomes soft locked.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrencyConflict` carrying the winner's audit pair if the
    /// observed value is stale, and `InvalidOperation` if the token was
    /// never persisted.
    pub fn increment(&self, token: &mut VersionToken, actor: &str) -> CoreResult<()> {
        if token.is_soft_locked() {
            return Ok(());
        }
        if token.is_new() {
            return Err(CoreError::invalid_operation(format!(
                "{} has not been inserted",
                token.id()
            )));
        }

        let next = token.stamp().advanced(actor, Utc::now());
        let mutation = self.increment_mutation(token.id(), token.value(), &next);
        match self.store.apply(&[mutation])? {
            BatchOutcome::Applied { .. } => {
                self.register(token.id(), next.clone());
                token.advance(next);
                Ok(())
            }
            BatchOutcome::Rejected { .. } => {
                Err(self.conflict(ConflictSubject::Version(token.id()), token.id()))
            }
        }
    }

    /// Deletes the token record, conditioned on the observed value.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrencyConflict` if the stored record no longer matches.
    pub fn delete(&self, token: &VersionToken) -> CoreResult<()> {
        match self
            .store
            .apply(&[self.delete_mutation(token.id(), token.value())])?
        {
            BatchOutcome::Applied { .. } => {
                self.unregister(token.id());
                Ok(())
            }
            BatchOutcome::Rejected { .. } => {
                Err(self.conflict(ConflictSubject::Version(token.id()), token.id()))
            }
        }
    }

    /// Returns true if the token is registered.
    #[must_use]
    pub fn is_registered(&self, id: VersionId) -> bool {
        self.versions.contains_key(&id)
    }

    /// Returns the registered stamp of a token.
    #[must_use]
    pub fn registered(&self, id: VersionId) -> Option<VersionStamp> {
        self.versions.get(&id).map(|stamp| stamp.clone())
    }

    /// Returns the number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if no token is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub(crate) fn insert_mutation(&self, token: &VersionToken) -> Mutation {
        Mutation::insert(self.table.as_str(), token.stamp().to_row(token.id()))
    }

    pub(crate) fn increment_mutation(
        &self,
        id: VersionId,
        observed: u64,
        next: &VersionStamp,
    ) -> Mutation {
        Mutation::update(
            self.table.as_str(),
            Filter::by_id(id).and(VALUE_COLUMN, observed),
            next.audit_row(),
        )
    }

    /// Rewrites nothing but rejects the batch unless the stored value is
    /// still `observed`.
    pub(crate) fn check_mutation(&self, id: VersionId, observed: u64) -> Mutation {
        Mutation::update(
            self.table.as_str(),
            Filter::by_id(id).and(VALUE_COLUMN, observed),
            Row::new(),
        )
    }

    pub(crate) fn delete_mutation(&self, id: VersionId, observed: u64) -> Mutation {
        Mutation::delete(
            self.table.as_str(),
            Filter::by_id(id).and(VALUE_COLUMN, observed),
        )
    }

    pub(crate) fn register(&self, id: VersionId, stamp: VersionStamp) {
        match self.versions.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().value <= stamp.value {
                    entry.insert(stamp);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(stamp);
            }
        }
    }

    pub(crate) fn unregister(&self, id: VersionId) {
        self.versions.remove(&id);
    }

    /// Builds the conflict error for a rejected write on token `id`,
    /// reloading the winner's audit pair from the store.
    pub(crate) fn conflict(&self, subject: ConflictSubject, id: VersionId) -> CoreError {
        let reloaded = match self.store.find_by_id(&self.table, &Value::from(id)) {
            Ok(row) => row,
            Err(e) => return e.into(),
        };
        let last_modified = match reloaded {
            Some(row) => match VersionStamp::from_row(&row) {
                Ok((_, stamp)) => {
                    let last = stamp.last_modification();
                    self.register(id, stamp);
                    Some(last)
                }
                Err(e) => return e,
            },
            None => {
                debug!(version = %id, "conflicting token no longer exists");
                self.unregister(id);
                None
            }
        };
        warn!(
            %subject,
            modified_by = last_modified.as_ref().map(|last| last.modified_by.as_str()),
            "concurrency conflict"
        );
        CoreError::conflict(subject, last_modified)
    }
}

impl fmt::Debug for VersionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionRegistry")
            .field("table", &self.table)
            .field("registered", &self.versions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verlock_store::InMemoryStore;

    fn registry() -> (Arc<InMemoryStore>, VersionRegistry) {
        let store = Arc::new(InMemoryStore::new());
        let registry = VersionRegistry::new(store.clone(), "VersionLock");
        (store, registry)
    }

    fn persisted(registry: &VersionRegistry, actor: &str) -> VersionToken {
        let mut token = registry.create(actor);
        registry.insert(&mut token).unwrap();
        token
    }

    #[test]
    fn create_does_not_touch_store() {
        let (store, registry) = registry();
        let token = registry.create("User1");

        assert!(token.is_new());
        assert_eq!(token.value(), 0);
        assert_eq!(token.created_by(), "User1");
        assert_eq!(token.modified_by(), "User1");
        assert_eq!(store.row_count("VersionLock"), 0);
        assert!(!registry.is_registered(token.id()));
    }

    #[test]
    fn insert_is_idempotent() {
        let (store, registry) = registry();
        let mut token = registry.create("User1");

        registry.insert(&mut token).unwrap();
        registry.insert(&mut token).unwrap();

        assert!(!token.is_new());
        assert!(registry.is_registered(token.id()));
        assert_eq!(store.row_count("VersionLock"), 1);
    }

    #[test]
    fn find_loads_unregistered_token() {
        let (store, registry) = registry();
        let token = persisted(&registry, "User1");

        let other = VersionRegistry::new(store, "VersionLock");
        let found = other.find(token.id()).unwrap();
        assert_eq!(found.stamp(), token.stamp());
        assert!(!found.is_new());
        assert!(other.is_registered(token.id()));
    }

    #[test]
    fn find_unknown_is_not_found() {
        let (_store, registry) = registry();
        let err = registry.find(VersionId::new()).unwrap_err();
        assert!(matches!(err, CoreError::VersionNotFound { .. }));
    }

    #[test]
    fn increment_once_per_hold() {
        let (_store, registry) = registry();
        let mut token = persisted(&registry, "User1");

        registry.increment(&mut token, "User2").unwrap();
        registry.increment(&mut token, "User2").unwrap();
        registry.increment(&mut token, "User3").unwrap();
        assert_eq!(token.value(), 1);
        assert_eq!(token.modified_by(), "User2");

        token.release();
        registry.increment(&mut token, "User3").unwrap();
        assert_eq!(token.value(), 2);
        assert_eq!(registry.registered(token.id()).unwrap().value, 2);
    }

    #[test]
    fn stale_handle_conflicts_with_winner_audit() {
        let (_store, registry) = registry();
        let token = persisted(&registry, "User1");
        let mut winner = registry.find(token.id()).unwrap();
        let mut loser = registry.find(token.id()).unwrap();

        registry.increment(&mut winner, "User2").unwrap();
        let err = registry.increment(&mut loser, "User3").unwrap_err();

        assert!(err.is_conflict());
        let last = err.last_modification().unwrap();
        assert_eq!(last.modified_by, "User2");
        assert_eq!(last.modified, winner.modified());
        assert_eq!(loser.value(), 0);
    }

    #[test]
    fn increment_unpersisted_is_invalid() {
        let (_store, registry) = registry();
        let mut token = registry.create("User1");
        let err = registry.increment(&mut token, "User1").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn delete_is_conditional() {
        let (store, registry) = registry();
        let token = persisted(&registry, "User1");
        let mut winner = registry.find(token.id()).unwrap();
        registry.increment(&mut winner, "User2").unwrap();

        assert!(registry.delete(&token).unwrap_err().is_conflict());

        registry.delete(&winner).unwrap();
        assert!(!registry.is_registered(token.id()));
        assert_eq!(store.row_count("VersionLock"), 0);

        let err = registry.delete(&winner).unwrap_err();
        assert!(err.is_conflict());
        assert!(err.last_modification().is_none());
    }

    #[test]
    fn registration_is_monotonic() {
        let (_store, registry) = registry();
        let token = persisted(&registry, "User1");
        let newer = token.stamp().advanced("User2", Utc::now());

        registry.register(token.id(), newer.clone());
        registry.register(token.id(), token.stamp().clone());
        assert_eq!(registry.registered(token.id()), Some(newer));
    }
}
