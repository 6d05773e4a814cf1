//! Unit of work: pending writes of one session, committed as one batch.

use crate::entity::{Entity, EntityId};
use crate::error::{ConflictSubject, CoreError, CoreResult};
use crate::mapper::{DataMapper, RecordCodec};
use crate::session::Session;
use crate::types::VersionId;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use verlock_store::{BatchOutcome, Mutation};

/// Kind of a pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Insert a new entity.
    Insert,
    /// Persist an edited entity.
    Update,
    /// Delete an entity.
    Delete,
}

trait PendingChange: Send {
    fn entity_id(&self) -> EntityId;
    fn kind(&self) -> ChangeKind;
    fn set_kind(&mut self, kind: ChangeKind);
    fn stage(&self, plan: &mut WritePlan, session: &Session) -> CoreResult<()>;
}

struct Staged<T> {
    kind: ChangeKind,
    entity: Arc<Entity<T>>,
}

impl<T: RecordCodec> PendingChange for Staged<T> {
    fn entity_id(&self) -> EntityId {
        self.entity.id()
    }

    fn kind(&self) -> ChangeKind {
        self.kind
    }

    fn set_kind(&mut self, kind: ChangeKind) {
        self.kind = kind;
    }

    fn stage(&self, plan: &mut WritePlan, session: &Session) -> CoreResult<()> {
        match self.kind {
            ChangeKind::Insert => DataMapper::<T>::stage_insert(plan, session, &self.entity),
            ChangeKind::Update => DataMapper::<T>::stage_update(plan, session, &self.entity),
            ChangeKind::Delete => DataMapper::<T>::stage_delete(plan, session, &self.entity),
        }
    }
}

/// Ordered set of pending changes for one session.
///
/// Changes keep the order of their first registration. Registering the same
/// entity again collapses into one change:
///
/// | registered | then      | result         |
/// |------------|-----------|----------------|
/// | new        | dirty     | insert         |
/// | new        | removed   | nothing        |
/// | dirty      | removed   | delete         |
/// | removed    | dirty     | error          |
/// | any        | new       | error          |
///
/// [`UnitOfWork::commit`] stages every change into a single store batch.
/// Either all of them are persisted or none is, and in-memory state
/// (tokens, registry, identity map, locks) only moves after the batch is
/// applied.
#[derive(Default)]
pub struct UnitOfWork {
    changes: Vec<Box<dyn PendingChange>>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entity for insertion.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the entity is already registered.
    pub fn register_new<T: RecordCodec>(&mut self, entity: &Arc<Entity<T>>) -> CoreResult<()> {
        if self.position(entity.id()).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "entity {} is already registered",
                entity.id()
            )));
        }
        self.push(ChangeKind::Insert, entity);
        Ok(())
    }

    /// Registers an edited entity for update.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the entity is registered for removal.
    pub fn register_dirty<T: RecordCodec>(&mut self, entity: &Arc<Entity<T>>) -> CoreResult<()> {
        match self.position(entity.id()) {
            Some(index) => match self.changes[index].kind() {
                ChangeKind::Insert | ChangeKind::Update => Ok(()),
                ChangeKind::Delete => Err(CoreError::invalid_operation(format!(
                    "entity {} is registered for removal",
                    entity.id()
                ))),
            },
            None => {
                self.push(ChangeKind::Update, entity);
                Ok(())
            }
        }
    }

    /// Registers an entity for deletion.
    ///
    /// An entity registered as new is simply dropped from the unit of work.
    pub fn register_removed<T: RecordCodec>(&mut self, entity: &Arc<Entity<T>>) {
        match self.position(entity.id()) {
            Some(index) => match self.changes[index].kind() {
                ChangeKind::Insert => {
                    self.changes.remove(index);
                }
                ChangeKind::Update => self.changes[index].set_kind(ChangeKind::Delete),
                ChangeKind::Delete => {}
            },
            None => self.push(ChangeKind::Delete, entity),
        }
    }

    /// Returns the pending changes in commit order.
    #[must_use]
    pub fn pending(&self) -> Vec<(EntityId, ChangeKind)> {
        self.changes
            .iter()
            .map(|change| (change.entity_id(), change.kind()))
            .collect()
    }

    /// Returns the number of pending changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Discards every pending change.
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Persists every pending change as one atomic batch.
    ///
    /// The unit of work is empty afterwards, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first staging error (`LockRequired`, `InvalidOperation`)
    /// or the batch's `ConcurrencyConflict` or store error. Nothing is
    /// persisted in that case.
    pub fn commit(&mut self, session: &Session) -> CoreResult<()> {
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return Ok(());
        }

        let mut plan = WritePlan::new();
        for change in &changes {
            change.stage(&mut plan, session)?;
        }
        debug!(
            session = %session.id(),
            changes = changes.len(),
            mutations = plan.len(),
            "committing unit of work"
        );
        plan.execute(session)
    }

    fn position(&self, id: EntityId) -> Option<usize> {
        self.changes.iter().position(|change| change.entity_id() == id)
    }

    fn push<T: RecordCodec>(&mut self, kind: ChangeKind, entity: &Arc<Entity<T>>) {
        self.changes.push(Box::new(Staged {
            kind,
            entity: Arc::clone(entity),
        }));
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending", &self.pending())
            .finish()
    }
}

type Effect = Box<dyn FnOnce(&Session) + Send>;

#[derive(Clone, Copy)]
struct Origin {
    subject: ConflictSubject,
    version: Option<VersionId>,
}

/// One atomic store batch plus the in-memory effects to apply once the
/// batch is accepted.
pub(crate) struct WritePlan {
    mutations: Vec<Mutation>,
    origins: Vec<Origin>,
    effects: Vec<Effect>,
}

impl WritePlan {
    pub(crate) fn new() -> Self {
        Self {
            mutations: Vec::new(),
            origins: Vec::new(),
            effects: Vec::new(),
        }
    }

    /// Adds a mutation. A rejection of it is reported as a conflict on
    /// `subject`, with the audit pair of token `version` if given.
    pub(crate) fn push(
        &mut self,
        mutation: Mutation,
        subject: ConflictSubject,
        version: Option<VersionId>,
    ) {
        self.mutations.push(mutation);
        self.origins.push(Origin { subject, version });
    }

    pub(crate) fn on_success(&mut self, effect: impl FnOnce(&Session) + Send + 'static) {
        self.effects.push(Box::new(effect));
    }

    pub(crate) fn len(&self) -> usize {
        self.mutations.len()
    }

    pub(crate) fn execute(self, session: &Session) -> CoreResult<()> {
        if !self.mutations.is_empty() {
            if let BatchOutcome::Rejected { index } = session.store().apply(&self.mutations)? {
                return Err(match self.origins.get(index) {
                    Some(Origin {
                        subject,
                        version: Some(version),
                    }) => session.versions().conflict(*subject, *version),
                    Some(Origin { subject, .. }) => CoreError::conflict(*subject, None),
                    None => CoreError::invalid_operation(format!(
                        "store rejected mutation {index} of a {}-mutation batch",
                        self.mutations.len()
                    )),
                });
            }
        }
        for effect in self.effects {
            effect(session);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use verlock_store::{Filter, InMemoryStore, Row};

    #[derive(Debug, Clone)]
    struct Note(String);

    impl RecordCodec for Note {
        const TABLE: &'static str = "Notes";

        fn to_row(&self) -> Row {
            Row::new().with("Text", self.0.as_str())
        }

        fn from_row(row: &Row) -> CoreResult<Self> {
            Ok(Self(row.text("Text")?.to_string()))
        }
    }

    fn setup() -> (SessionManager, Arc<Session>) {
        let manager = SessionManager::new(Arc::new(InMemoryStore::new()));
        let id = manager.open("User1");
        let session = manager.get_session(id).unwrap();
        (manager, session)
    }

    #[test]
    fn collapses_repeated_registrations() {
        let (_manager, session) = setup();
        let mapper = DataMapper::<Note>::new();
        let a = mapper.create(&session, Note("a".into()));
        let b = mapper.create(&session, Note("b".into()));
        let mut work = UnitOfWork::new();

        work.register_new(&a).unwrap();
        work.register_dirty(&a).unwrap();
        work.register_dirty(&b).unwrap();
        work.register_removed(&b);
        assert_eq!(
            work.pending(),
            vec![(a.id(), ChangeKind::Insert), (b.id(), ChangeKind::Delete)]
        );
        assert!(work.register_dirty(&b).is_err());
        assert!(work.register_new(&a).is_err());

        work.register_removed(&a);
        assert_eq!(work.pending(), vec![(b.id(), ChangeKind::Delete)]);
    }

    #[test]
    fn commit_inserts_everything() {
        let (manager, session) = setup();
        let mapper = DataMapper::<Note>::new();
        let a = mapper.create(&session, Note("a".into()));
        let b = mapper.create(&session, Note("b".into()));

        {
            let mut work = session.unit_of_work();
            work.register_new(&a).unwrap();
            work.register_new(&b).unwrap();
        }
        session.commit().unwrap();

        assert!(session.unit_of_work().is_empty());
        assert!(!a.version().is_new());
        assert!(manager.versions().is_registered(b.version_id()));
        assert!(session.identity_map().contains(a.id()));
        assert_eq!(session.store().select("Notes", &Filter::all()).unwrap().len(), 2);
    }

    #[test]
    fn failed_commit_persists_nothing_and_clears() {
        let (_manager, session) = setup();
        let mapper = DataMapper::<Note>::new();
        let existing = mapper.create(&session, Note("existing".into()));
        mapper.insert(&session, &existing).unwrap();

        let fresh = mapper.create(&session, Note("fresh".into()));
        {
            let mut work = session.unit_of_work();
            work.register_new(&fresh).unwrap();
            // No write lock held on `existing`.
            work.register_dirty(&existing).unwrap();
        }

        let err = session.commit().unwrap_err();
        assert!(matches!(err, CoreError::LockRequired { .. }));
        assert!(session.unit_of_work().is_empty());
        assert!(fresh.version().is_new());
        assert_eq!(session.store().select("Notes", &Filter::all()).unwrap().len(), 1);
    }

    #[test]
    fn empty_commit_is_a_no_op() {
        let (_manager, session) = setup();
        session.commit().unwrap();
    }
}
