//! Property tests for version tokens and locks.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use verlock_core::{EntityId, LockManager, LockMode, LockTable, SessionId, VersionRegistry};
use verlock_store::InMemoryStore;
use verlock_testkit::prelude::*;

#[derive(Debug, Default, Clone)]
struct ModelEntry {
    readers: BTreeSet<usize>,
    writer: Option<usize>,
}

impl ModelEntry {
    fn holds(&self, session: usize) -> bool {
        self.writer == Some(session) || self.readers.contains(&session)
    }

    fn acquire(&mut self, session: usize, mode: LockMode) -> bool {
        if self.writer.is_some_and(|writer| writer != session) {
            return false;
        }
        match mode {
            LockMode::Write => {
                if self.readers.iter().any(|reader| *reader != session) {
                    return false;
                }
                self.readers.remove(&session);
                self.writer = Some(session);
            }
            LockMode::Read => {
                self.writer = None;
                self.readers.insert(session);
            }
        }
        true
    }

    fn release(&mut self, session: usize) -> bool {
        let held = self.holds(session);
        self.readers.remove(&session);
        if self.writer == Some(session) {
            self.writer = None;
        }
        held
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn lock_managers_follow_the_reader_writer_model(
        ops in lock_sequence_strategy(3, 4, 40),
    ) {
        let table = Arc::new(LockTable::new());
        let managers: Vec<LockManager> = (0..3)
            .map(|_| LockManager::new(SessionId::new(), Arc::clone(&table)))
            .collect();
        let entities: Vec<EntityId> = (0..4).map(|_| EntityId::new()).collect();
        let mut model: HashMap<usize, ModelEntry> = HashMap::new();

        for op in ops {
            match op {
                LockOperation::Acquire { session, entity, mode } => {
                    let expected = model.entry(entity).or_default().acquire(session, mode);
                    prop_assert_eq!(managers[session].get_lock(entities[entity], mode), expected);
                }
                LockOperation::Release { session, entity } => {
                    let expected = model.entry(entity).or_default().release(session);
                    prop_assert_eq!(managers[session].release_lock(entities[entity]), expected);
                }
                LockOperation::ReleaseAll { session } => {
                    let mut expected = false;
                    for entry in model.values_mut() {
                        expected |= entry.release(session);
                    }
                    prop_assert_eq!(managers[session].release_all_locks(), expected);
                }
            }

            for (slot, id) in entities.iter().enumerate() {
                let holders = table.holders(*id);
                let entry = model.get(&slot).cloned().unwrap_or_default();
                prop_assert!(holders.writer.is_none() || holders.readers.is_empty());
                prop_assert_eq!(holders.writer, entry.writer.map(|s| managers[s].owner()));
                let mut readers: Vec<SessionId> =
                    entry.readers.iter().map(|s| managers[*s].owner()).collect();
                readers.sort();
                prop_assert_eq!(holders.readers, readers);
            }
        }
    }

    #[test]
    fn increments_advance_once_per_hold(
        holds in prop::collection::vec(1_usize..6, 1..8),
        actor in actor_name_strategy(),
    ) {
        let registry = VersionRegistry::new(Arc::new(InMemoryStore::new()), "VersionLock");
        let mut token = registry.create("Creator");
        registry.insert(&mut token).unwrap();

        for (hold, calls) in holds.iter().enumerate() {
            for _ in 0..*calls {
                registry.increment(&mut token, &actor).unwrap();
            }
            prop_assert_eq!(token.value(), hold as u64 + 1);
            prop_assert!(token.is_soft_locked());
            token.release();
        }

        let stored = registry.find(token.id()).unwrap();
        prop_assert_eq!(stored.value(), holds.len() as u64);
        prop_assert_eq!(stored.modified_by(), actor.as_str());
    }

    #[test]
    fn inserted_accounts_read_back_unchanged(account in account_strategy()) {
        let env = TestEnv::memory();
        let writer = env.session("User1");
        let mapper = env.accounts();
        let entity = mapper.create(&writer, account.clone());
        mapper.insert(&writer, &entity).unwrap();

        let reader = env.session("User2");
        let found = mapper.find(&reader, entity.id()).unwrap().unwrap();
        prop_assert_eq!(found.snapshot(), account);
        prop_assert_eq!(found.version().value(), 0);
    }
}
