//! Generic data mapper.
//!
//! The mapper is where everything meets: it consults the identity map,
//! reads records and their version tokens, takes read locks on load, checks
//! write locks before persisting, and turns each write into one atomic store
//! batch covering the record row and its version token.

mod codec;

pub use codec::{RecordCodec, VERSION_ID_COLUMN};

use crate::entity::{Entity, EntityId};
use crate::error::{ConflictSubject, CoreError, CoreResult};
use crate::lock::LockMode;
use crate::session::Session;
use crate::types::VersionId;
use crate::unit_of_work::WritePlan;
use chrono::Utc;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use verlock_store::{Filter, Mutation, Row, Value, ID_COLUMN};

/// Result of [`DataMapper::find_matching`].
#[derive(Debug)]
pub struct Matches<T> {
    /// Matching entities that were loaded.
    pub available: Vec<Arc<Entity<T>>>,
    /// Matching entities another session holds a conflicting lock on.
    pub unavailable: Vec<EntityId>,
}

/// Load and persist orchestration for payload type `T`.
///
/// Every operation takes the session it acts for explicitly.
///
/// # Example
///
/// ```rust,ignore
/// let mapper = DataMapper::<Customer>::new();
///
/// let customer = mapper.find(&session, id)?.expect("locked by another session");
/// session.lock_manager().get_lock(customer.id(), LockMode::Write);
/// customer.write().name = "Ana".into();
/// mapper.update(&session, &customer)?;
/// mapper.release(&session, &customer);
/// ```
pub struct DataMapper<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: RecordCodec> Default for DataMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RecordCodec> DataMapper<T> {
    /// Creates a mapper.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Wraps `payload` as a new entity with a fresh, unpersisted version
    /// token. Nothing is written until [`DataMapper::insert`].
    #[must_use]
    pub fn create(&self, session: &Session, payload: T) -> Arc<Entity<T>> {
        let token = session.versions().create(session.name());
        Arc::new(Entity::new(EntityId::new(), token, payload))
    }

    /// Loads an entity.
    ///
    /// An entity already in the session's identity map is returned as is.
    /// Otherwise the record and its version token are loaded and a read
    /// lock is taken. Returns `Ok(None)` if another session holds a write
    /// lock on the entity.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if no record has this ID, and
    /// `SessionNotFound` if the session is closed.
    pub fn find(&self, session: &Session, id: EntityId) -> CoreResult<Option<Arc<Entity<T>>>> {
        session.ensure_open()?;
        if let Some(hit) = session.identity_map().get::<Entity<T>>(id)? {
            return Ok(Some(hit));
        }

        let row = Self::read_row(session, id)?;
        let version_id = VersionId::from_uuid(row.uuid(VERSION_ID_COLUMN)?);
        let token = session.versions().find(version_id)?;

        let locks = session.lock_manager();
        let locked_here = if session.config().read_lock_on_find && !locks.holds(id, LockMode::Read) {
            if !locks.get_lock(id, LockMode::Read) {
                debug!(session = %session.id(), entity = %id, "entity unavailable");
                return Ok(None);
            }
            true
        } else {
            false
        };

        // The payload must not be older than the token it is paired with.
        let loaded = Self::read_row(session, id).and_then(|row| T::from_row(&row));
        let data = match loaded {
            Ok(data) => data,
            Err(e) => {
                if locked_here {
                    locks.release_lock(id);
                }
                return Err(e);
            }
        };

        let entity = session
            .identity_map()
            .get_or_add(id, || Ok(Arc::new(Entity::new(id, token, data))))?;
        Ok(Some(entity))
    }

    /// Loads every entity whose record matches `filter`.
    ///
    /// Entities locked by another session are reported in
    /// [`Matches::unavailable`]; records deleted while the search runs are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if the table cannot be read.
    pub fn find_matching(&self, session: &Session, filter: &Filter) -> CoreResult<Matches<T>> {
        session.ensure_open()?;
        let mut matches = Matches {
            available: Vec::new(),
            unavailable: Vec::new(),
        };
        for row in session.store().select(T::TABLE, filter)? {
            let id = EntityId::from_uuid(row.uuid(ID_COLUMN)?);
            match self.find(session, id) {
                Ok(Some(entity)) => matches.available.push(entity),
                Ok(None) => matches.unavailable.push(id),
                Err(CoreError::EntityNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(matches)
    }

    /// Persists a new entity and its version token in one batch, then
    /// registers it in the session's identity map.
    ///
    /// # Errors
    ///
    /// Returns a store error, e.g. a duplicate key if the entity was already
    /// inserted, or `SessionNotFound` if the session is closed.
    pub fn insert(&self, session: &Session, entity: &Arc<Entity<T>>) -> CoreResult<()> {
        session.ensure_open()?;
        let mut plan = WritePlan::new();
        Self::stage_insert(&mut plan, session, entity)?;
        plan.execute(session)
    }

    /// Persists the entity's payload and advances its version token.
    ///
    /// Within one hold the token is advanced once; later updates before
    /// [`DataMapper::release`] only check it is still current.
    ///
    /// # Errors
    ///
    /// Returns `LockRequired` if the session does not hold a write lock, and
    /// `ConcurrencyConflict` if the record or token changed since it was
    /// loaded.
    pub fn update(&self, session: &Session, entity: &Arc<Entity<T>>) -> CoreResult<()> {
        session.ensure_open()?;
        let mut plan = WritePlan::new();
        Self::stage_update(&mut plan, session, entity)?;
        plan.execute(session)
    }

    /// Deletes the entity's record and version token.
    ///
    /// On success the entity is evicted from the identity map and its lock
    /// released.
    ///
    /// # Errors
    ///
    /// Same as [`DataMapper::update`].
    pub fn delete(&self, session: &Session, entity: &Arc<Entity<T>>) -> CoreResult<()> {
        session.ensure_open()?;
        let mut plan = WritePlan::new();
        Self::stage_delete(&mut plan, session, entity)?;
        plan.execute(session)
    }

    /// Ends the session's hold on the entity: clears the token's soft lock,
    /// releases the entity lock and evicts it from the identity map.
    ///
    /// Returns true if a lock was released.
    pub fn release(&self, session: &Session, entity: &Arc<Entity<T>>) -> bool {
        entity.token().release();
        session.identity_map().remove(entity.id());
        session.lock_manager().release_lock(entity.id())
    }

    pub(crate) fn stage_insert(
        plan: &mut WritePlan,
        session: &Session,
        entity: &Arc<Entity<T>>,
    ) -> CoreResult<()> {
        let id = entity.id();
        let version_id = entity.version_id();
        let row = Self::payload_row(entity)
            .with(ID_COLUMN, id)
            .with(VERSION_ID_COLUMN, version_id);
        plan.push(
            Mutation::insert(T::TABLE, row),
            ConflictSubject::Entity(id),
            None,
        );

        let token = entity.token();
        if token.is_new() {
            plan.push(
                session.versions().insert_mutation(&token),
                ConflictSubject::Entity(id),
                Some(version_id),
            );
            let stamp = token.stamp().clone();
            let inserted = Arc::clone(entity);
            plan.on_success(move |session| {
                inserted.token().mark_persisted();
                session.versions().register(version_id, stamp);
            });
        }

        let cached = Arc::clone(entity);
        plan.on_success(move |session| session.identity_map().add(id, cached));
        Ok(())
    }

    pub(crate) fn stage_update(
        plan: &mut WritePlan,
        session: &Session,
        entity: &Arc<Entity<T>>,
    ) -> CoreResult<()> {
        let id = entity.id();
        let version_id = entity.version_id();
        Self::require_write_lock(session, id)?;

        let token = entity.token();
        if token.is_new() {
            return Err(CoreError::invalid_operation(format!(
                "entity {id} has not been inserted"
            )));
        }

        let changes = Self::payload_row(entity).with(VERSION_ID_COLUMN, version_id);
        plan.push(
            Mutation::update(T::TABLE, Self::record_filter(id, version_id), changes),
            ConflictSubject::Entity(id),
            Some(version_id),
        );

        if token.is_soft_locked() {
            plan.push(
                session.versions().check_mutation(version_id, token.value()),
                ConflictSubject::Entity(id),
                Some(version_id),
            );
            return Ok(());
        }

        let next = token.stamp().advanced(session.name(), Utc::now());
        plan.push(
            session
                .versions()
                .increment_mutation(version_id, token.value(), &next),
            ConflictSubject::Entity(id),
            Some(version_id),
        );
        let updated = Arc::clone(entity);
        plan.on_success(move |session| {
            session.versions().register(version_id, next.clone());
            updated.token().advance(next);
        });
        Ok(())
    }

    pub(crate) fn stage_delete(
        plan: &mut WritePlan,
        session: &Session,
        entity: &Arc<Entity<T>>,
    ) -> CoreResult<()> {
        let id = entity.id();
        let version_id = entity.version_id();
        Self::require_write_lock(session, id)?;

        let token = entity.token();
        if token.is_new() {
            return Err(CoreError::invalid_operation(format!(
                "entity {id} has not been inserted"
            )));
        }

        plan.push(
            Mutation::delete(T::TABLE, Self::record_filter(id, version_id)),
            ConflictSubject::Entity(id),
            Some(version_id),
        );

        let mut last = token.stamp().clone();
        if !token.is_soft_locked() {
            let next = last.advanced(session.name(), Utc::now());
            plan.push(
                session
                    .versions()
                    .increment_mutation(version_id, token.value(), &next),
                ConflictSubject::Entity(id),
                Some(version_id),
            );
            last = next;
        }
        plan.push(
            session.versions().delete_mutation(version_id, last.value),
            ConflictSubject::Entity(id),
            Some(version_id),
        );

        let deleted = Arc::clone(entity);
        plan.on_success(move |session| {
            deleted.token().advance(last);
            session.versions().unregister(version_id);
            session.identity_map().remove(id);
            session.lock_manager().release_lock(id);
        });
        Ok(())
    }

    fn require_write_lock(session: &Session, id: EntityId) -> CoreResult<()> {
        if session.config().enforce_write_locks
            && !session.lock_manager().holds(id, LockMode::Write)
        {
            return Err(CoreError::LockRequired {
                entity_id: id,
                mode: LockMode::Write,
            });
        }
        Ok(())
    }

    fn read_row(session: &Session, id: EntityId) -> CoreResult<Row> {
        session
            .store()
            .find_by_id(T::TABLE, &Value::from(id))?
            .ok_or(CoreError::EntityNotFound {
                table: T::TABLE,
                entity_id: id,
            })
    }

    fn record_filter(id: EntityId, version_id: VersionId) -> Filter {
        Filter::by_id(id).and(VERSION_ID_COLUMN, version_id)
    }

    fn payload_row(entity: &Entity<T>) -> Row {
        let row = entity.read().to_row();
        row.iter()
            .filter(|(column, _)| *column != ID_COLUMN && *column != VERSION_ID_COLUMN)
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect()
    }
}
