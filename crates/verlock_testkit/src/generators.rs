//! Property-based test generators using proptest.
//!
//! Provides strategies for generating actors, accounts and lock operation
//! sequences.

use crate::fixtures::Account;
use proptest::prelude::*;
use verlock_core::{EntityId, LockMode};

/// Strategy for generating valid entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// Strategy for generating actor names.
pub fn actor_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("User[1-9][0-9]{0,2}").expect("Invalid regex")
}

/// Strategy for generating accounts.
pub fn account_strategy() -> impl Strategy<Value = Account> {
    (
        prop::string::string_regex("[A-Z][a-z]{1,15}").expect("Invalid regex"),
        -1_000_000_i64..1_000_000,
    )
        .prop_map(|(owner, balance)| Account::new(owner, balance))
}

/// Strategy for generating lock modes.
pub fn lock_mode_strategy() -> impl Strategy<Value = LockMode> {
    prop_oneof![Just(LockMode::Read), Just(LockMode::Write)]
}

/// One lock manager call, addressed by session and entity slot.
#[derive(Debug, Clone)]
pub enum LockOperation {
    /// `get_lock` on an entity
    Acquire {
        /// Session slot
        session: usize,
        /// Entity slot
        entity: usize,
        /// Requested mode
        mode: LockMode,
    },
    /// `release_lock` on an entity
    Release {
        /// Session slot
        session: usize,
        /// Entity slot
        entity: usize,
    },
    /// `release_all_locks`
    ReleaseAll {
        /// Session slot
        session: usize,
    },
}

/// Strategy for generating lock operations over `sessions` sessions and
/// `entities` entities.
pub fn lock_operation_strategy(
    sessions: usize,
    entities: usize,
) -> impl Strategy<Value = LockOperation> {
    prop_oneof![
        4 => (0..sessions, 0..entities, lock_mode_strategy())
            .prop_map(|(session, entity, mode)| LockOperation::Acquire { session, entity, mode }),
        2 => (0..sessions, 0..entities)
            .prop_map(|(session, entity)| LockOperation::Release { session, entity }),
        1 => (0..sessions).prop_map(|session| LockOperation::ReleaseAll { session }),
    ]
}

/// Strategy for generating a sequence of lock operations.
pub fn lock_sequence_strategy(
    sessions: usize,
    entities: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<LockOperation>> {
    prop::collection::vec(lock_operation_strategy(sessions, entities), 1..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
