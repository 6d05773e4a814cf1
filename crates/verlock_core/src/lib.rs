//! # verlock Core
//!
//! Concurrency control for an object/relational mapping layer.
//!
//! This crate provides:
//! - Version tokens: durable counters advanced by compare-and-swap
//! - Per-session, non-blocking read/write locks on entities
//! - Per-session identity maps
//! - A session registry
//! - Units of work committed as one atomic store batch
//! - A generic data mapper tying all of the above together
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use verlock_core::{CoreResult, DataMapper, LockMode, RecordCodec, SessionManager};
//! use verlock_store::{InMemoryStore, Row};
//!
//! #[derive(Clone)]
//! struct Customer {
//!     name: String,
//! }
//!
//! impl RecordCodec for Customer {
//!     const TABLE: &'static str = "Customers";
//!
//!     fn to_row(&self) -> Row {
//!         Row::new().with("Name", self.name.as_str())
//!     }
//!
//!     fn from_row(row: &Row) -> CoreResult<Self> {
//!         Ok(Self { name: row.text("Name")?.to_string() })
//!     }
//! }
//!
//! let manager = SessionManager::new(Arc::new(InMemoryStore::new()));
//! let session = manager.get_session(manager.open("User1")).unwrap();
//! let customers = DataMapper::<Customer>::new();
//!
//! let customer = customers.create(&session, Customer { name: "Ana".into() });
//! customers.insert(&session, &customer).unwrap();
//!
//! assert!(session.lock_manager().get_lock(customer.id(), LockMode::Write));
//! customer.write().name = "Ana Lima".into();
//! customers.update(&session, &customer).unwrap();
//! assert_eq!(customer.version().value(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod identity;
mod lock;
mod mapper;
mod session;
mod types;
mod unit_of_work;
mod version;

pub use config::{Config, DEFAULT_VERSION_TABLE};
pub use entity::{Entity, EntityId};
pub use error::{ConflictSubject, CoreError, CoreResult, LastModification};
pub use identity::IdentityMap;
pub use lock::{LockHolders, LockManager, LockMode, LockTable};
pub use mapper::{DataMapper, Matches, RecordCodec, VERSION_ID_COLUMN};
pub use session::{Session, SessionManager};
pub use types::{SessionId, VersionId};
pub use unit_of_work::{ChangeKind, UnitOfWork};
pub use version::{VersionRegistry, VersionStamp, VersionToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
