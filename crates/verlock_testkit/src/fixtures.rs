//! Test fixtures and environment helpers.
//!
//! Provides a sample mapped type, a store that fails on demand, and
//! ready-made session managers over in-memory and file-backed stores.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use verlock_core::{Config, CoreResult, DataMapper, EntityId, RecordCodec, Session, SessionManager};
use verlock_store::{
    BatchOutcome, FileStore, Filter, InMemoryStore, Mutation, RecordStore, Row, StoreError,
    StoreResult,
};

/// A bank account, the mapped type used throughout the tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account holder.
    pub owner: String,
    /// Balance in cents.
    pub balance: i64,
}

impl Account {
    /// Creates an account.
    pub fn new(owner: impl Into<String>, balance: i64) -> Self {
        Self {
            owner: owner.into(),
            balance,
        }
    }
}

impl RecordCodec for Account {
    const TABLE: &'static str = "Accounts";

    fn to_row(&self) -> Row {
        Row::new()
            .with("Owner", self.owner.as_str())
            .with("Balance", self.balance)
    }

    fn from_row(row: &Row) -> CoreResult<Self> {
        Ok(Self {
            owner: row.text("Owner")?.to_string(),
            balance: row.integer("Balance")?,
        })
    }
}

/// In-memory store whose batches fail with `Unavailable` while armed.
///
/// Reads always succeed.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

impl FaultyStore {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms or disarms write failures.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl RecordStore for FaultyStore {
    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.inner.select(table, filter)
    }

    fn apply(&self, batch: &[Mutation]) -> StoreResult<BatchOutcome> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected write failure"));
        }
        self.inner.apply(batch)
    }
}

/// A session manager over a throwaway store.
pub struct TestEnv {
    /// The session manager.
    pub manager: SessionManager,
    /// The store underneath it.
    pub store: Arc<dyn RecordStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEnv {
    /// Creates an environment over an in-memory store with the default
    /// configuration (write locks enforced).
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates an environment where locks are advisory: finds take no read
    /// lock and writes need no write lock, leaving the version token as the
    /// only guard.
    pub fn advisory() -> Self {
        Self::memory_with_config(
            Config::new()
                .enforce_write_locks(false)
                .read_lock_on_find(false),
        )
    }

    /// Creates an in-memory environment with the given configuration.
    pub fn memory_with_config(config: Config) -> Self {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
        Self {
            manager: SessionManager::with_config(Arc::clone(&store), config),
            store,
            _temp_dir: None,
        }
    }

    /// Creates an environment over a [`FaultyStore`], returned alongside so
    /// the test can arm it.
    pub fn faulty() -> (Self, Arc<FaultyStore>) {
        let faults = Arc::new(FaultyStore::new());
        let store: Arc<dyn RecordStore> = faults.clone();
        let env = Self {
            manager: SessionManager::new(Arc::clone(&store)),
            store,
            _temp_dir: None,
        };
        (env, faults)
    }

    /// Creates an environment over a file store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn RecordStore> = Arc::new(
            FileStore::open(&temp_dir.path().join("store.cbor"))
                .expect("Failed to open file store"),
        );
        Self {
            manager: SessionManager::new(Arc::clone(&store)),
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store file path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|d| d.path().join("store.cbor"))
    }

    /// Opens a session and returns it.
    pub fn session(&self, name: &str) -> Arc<Session> {
        let id = self.manager.open(name);
        self.manager
            .get_session(id)
            .expect("Freshly opened session should exist")
    }

    /// Returns the account mapper.
    pub fn accounts(&self) -> DataMapper<Account> {
        DataMapper::new()
    }

    /// Inserts an account through a short-lived session and returns its ID.
    ///
    /// The seeding session is closed afterwards, so it holds no locks.
    pub fn seed_account(&self, owner: &str, balance: i64) -> EntityId {
        let session = self.session("Seeder");
        let mapper = self.accounts();
        let account = mapper.create(&session, Account::new(owner, balance));
        mapper
            .insert(&session, &account)
            .expect("Failed to seed account");
        self.manager
            .close(session.id())
            .expect("Failed to close seeding session");
        account.id()
    }
}

impl std::ops::Deref for TestEnv {
    type Target = SessionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Runs a test with a temporary in-memory environment.
pub fn with_env<F, R>(f: F) -> R
where
    F: FnOnce(&TestEnv) -> R,
{
    let env = TestEnv::memory();
    f(&env)
}

/// Runs a test with a temporary file-backed environment.
pub fn with_file_env<F, R>(f: F) -> R
where
    F: FnOnce(&TestEnv) -> R,
{
    let env = TestEnv::file();
    f(&env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_account_is_persisted_unlocked() {
        with_env(|env| {
            let id = env.seed_account("Ana", 100);
            assert_eq!(env.session_count(), 0);
            assert_eq!(env.lock_table().locked_count(), 0);

            let session = env.session("User1");
            let account = env.accounts().find(&session, id).unwrap().unwrap();
            assert_eq!(*account.read(), Account::new("Ana", 100));
            assert_eq!(account.version().value(), 0);
            assert_eq!(account.version().created_by(), "Seeder");
        });
    }

    #[test]
    fn faulty_store_fails_only_while_armed() {
        let (env, faults) = TestEnv::faulty();
        let id = env.seed_account("Ana", 5);

        faults.fail_writes(true);
        let err = env
            .store
            .execute(Mutation::delete("Accounts", Filter::all()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(env.store.select("Accounts", &Filter::all()).unwrap().len(), 1);

        faults.fail_writes(false);
        let session = env.session("User1");
        assert!(env.accounts().find(&session, id).unwrap().is_some());
    }

    #[test]
    fn file_env_has_path() {
        with_file_env(|env| {
            let path = env.path().unwrap();
            assert!(path.exists());
        });
        assert!(TestEnv::memory().path().is_none());
    }
}
