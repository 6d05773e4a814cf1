//! Demo command implementation.
//!
//! Three users load, edit and save the same customer through separate
//! sessions. Scenarios 1 and 2 run with write locks enforced and show the
//! locks deciding who may save; scenario 3 runs with advisory locks and
//! shows the version token rejecting a stale save.

use std::path::Path;
use std::sync::Arc;
use tracing::info;
use verlock_core::{
    Config, CoreResult, DataMapper, Entity, EntityId, LockMode, RecordCodec, Session,
    SessionManager,
};
use verlock_store::{FileStore, InMemoryStore, RecordStore, Row};

/// A customer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
}

impl RecordCodec for Customer {
    const TABLE: &'static str = "Customers";

    fn to_row(&self) -> Row {
        Row::new()
            .with("FirstName", self.first_name.as_str())
            .with("LastName", self.last_name.as_str())
    }

    fn from_row(row: &Row) -> CoreResult<Self> {
        Ok(Self {
            first_name: row.text("FirstName")?.to_string(),
            last_name: row.text("LastName")?.to_string(),
        })
    }
}

/// One simulated user with its own session.
struct User<'a> {
    manager: &'a SessionManager,
    session: Arc<Session>,
    customers: DataMapper<Customer>,
    target: EntityId,
    loaded: Option<Arc<Entity<Customer>>>,
}

impl<'a> User<'a> {
    fn open(manager: &'a SessionManager, name: &str, target: EntityId) -> CoreResult<Self> {
        let session = manager.get_session(manager.open(name))?;
        Ok(Self {
            manager,
            session,
            customers: DataMapper::new(),
            target,
            loaded: None,
        })
    }

    fn name(&self) -> &str {
        self.session.name()
    }

    fn load(&mut self) -> CoreResult<()> {
        self.manager.set_current(self.session.id())?;
        match self.customers.find(&self.session, self.target)? {
            Some(customer) => {
                println!(
                    "{}: loaded \"{}\" at version {}",
                    self.name(),
                    customer.read().first_name,
                    customer.version().value()
                );
                self.loaded = Some(customer);
            }
            None => println!("{}: cannot load, customer is locked", self.name()),
        }
        Ok(())
    }

    fn edit(&self, first_name: &str) {
        match &self.loaded {
            Some(customer) => {
                customer.write().first_name = first_name.to_string();
                println!("{}: edits first name to \"{first_name}\"", self.name());
            }
            None => println!("{}: nothing loaded to edit", self.name()),
        }
    }

    fn save(&self) -> CoreResult<()> {
        let Some(customer) = &self.loaded else {
            println!("{}: nothing loaded to save", self.name());
            return Ok(());
        };
        self.manager.set_current(self.session.id())?;

        let locks = self.session.lock_manager();
        let enforced = self.session.config().enforce_write_locks;
        if enforced && !locks.get_lock(customer.id(), LockMode::Write) {
            println!("{}: cannot save, write lock unavailable", self.name());
            return Ok(());
        }

        match self.customers.update(&self.session, customer) {
            Ok(()) => println!(
                "{}: saved \"{}\" at version {}",
                self.name(),
                customer.read().first_name,
                customer.version().value()
            ),
            Err(e) if e.is_recoverable() => println!("{}: save rejected: {e}", self.name()),
            Err(e) => return Err(e),
        }

        // Keep reading the customer after saving.
        if enforced {
            locks.get_lock(customer.id(), LockMode::Read);
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(customer) = self.loaded.take() {
            self.customers.release(&self.session, &customer);
            println!("{}: releases the customer", self.name());
        }
    }

    fn first_name(&self) -> Option<String> {
        self.loaded
            .as_ref()
            .map(|customer| customer.read().first_name.clone())
    }

    fn close(self) -> CoreResult<()> {
        self.manager.close(self.session.id())
    }
}

/// Runs the demo command.
pub fn run(path: Option<&Path>, scenario: Option<u8>) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn RecordStore> = match path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(InMemoryStore::new()),
    };

    let scenarios: &[u8] = match scenario {
        None => &[1, 2, 3],
        Some(1) => &[1],
        Some(2) => &[2],
        Some(3) => &[3],
        Some(n) => return Err(format!("Unknown scenario {n}, expected 1, 2 or 3").into()),
    };

    for (i, number) in scenarios.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("SCENARIO {number}");
        let name = match number {
            1 => scenario_one(&store)?,
            2 => scenario_two(&store)?,
            _ => scenario_three(&store)?,
        };
        println!("Stored first name: \"{name}\"");
    }
    Ok(())
}

/// Every user holds a read lock, so nobody can save.
fn scenario_one(store: &Arc<dyn RecordStore>) -> CoreResult<String> {
    let manager = SessionManager::new(Arc::clone(store));
    let id = seed(&manager)?;

    let mut user1 = User::open(&manager, "User1", id)?;
    let mut user2 = User::open(&manager, "User2", id)?;
    let mut user3 = User::open(&manager, "User3", id)?;

    user1.load()?;
    user2.load()?;
    user1.edit("KaikeU1");
    user2.edit("KaikeU2");

    user2.save()?;
    user3.load()?;
    user1.save()?;

    user3.edit("Alfonso U3 wins");
    user3.save()?;

    user1.release();
    user2.release();
    user3.release();
    for user in [user1, user2, user3] {
        user.close()?;
    }
    stored_first_name(&manager, id)
}

/// Users step aside one by one until User1 can save.
fn scenario_two(store: &Arc<dyn RecordStore>) -> CoreResult<String> {
    let manager = SessionManager::new(Arc::clone(store));
    let id = seed(&manager)?;

    let mut user1 = User::open(&manager, "User1", id)?;
    let mut user2 = User::open(&manager, "User2", id)?;
    let mut user3 = User::open(&manager, "User3", id)?;

    user1.load()?;
    user2.load()?;
    user1.edit("KaikeU1");
    user1.save()?;
    user2.release();
    user3.load()?;
    user1.save()?;
    user3.release();
    user1.save()?;

    user3.load()?;
    if let Some(name) = user3.first_name() {
        println!("User3 gets new name: {name}");
    }

    user1.release();
    user3.release();
    for user in [user1, user2, user3] {
        user.close()?;
    }
    stored_first_name(&manager, id)
}

/// Locks are advisory; the version token rejects the stale save.
fn scenario_three(store: &Arc<dyn RecordStore>) -> CoreResult<String> {
    let config = Config::new()
        .enforce_write_locks(false)
        .read_lock_on_find(false);
    let manager = SessionManager::with_config(Arc::clone(store), config);
    let id = seed(&manager)?;

    let mut user1 = User::open(&manager, "User1", id)?;
    let mut user2 = User::open(&manager, "User2", id)?;

    user1.load()?;
    user2.load()?;
    user1.edit("KaikeU1");
    user2.edit("KaikeU2");

    user2.save()?;
    user1.save()?;

    user1.release();
    user1.load()?;
    if let Some(name) = user1.first_name() {
        println!("User1 reloads and sees: {name}");
    }

    user1.release();
    user2.release();
    user1.close()?;
    user2.close()?;
    stored_first_name(&manager, id)
}

fn seed(manager: &SessionManager) -> CoreResult<EntityId> {
    let session = manager.get_session(manager.open("Admin"))?;
    let customers = DataMapper::<Customer>::new();
    let customer = customers.create(
        &session,
        Customer {
            first_name: "Kaike".to_string(),
            last_name: "Silva".to_string(),
        },
    );
    customers.insert(&session, &customer)?;
    manager.close(session.id())?;
    info!(customer = %customer.id(), "seeded customer");
    Ok(customer.id())
}

fn stored_first_name(manager: &SessionManager, id: EntityId) -> CoreResult<String> {
    let session = manager.get_session(manager.open("Auditor"))?;
    let name = DataMapper::<Customer>::new()
        .find(&session, id)?
        .map(|customer| customer.read().first_name.clone())
        .unwrap_or_default();
    manager.close(session.id())?;
    Ok(name)
}
