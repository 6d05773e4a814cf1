//! # verlock Store
//!
//! Record store contract and implementations for verlock.
//!
//! This crate is the backing store underneath the concurrency layer. A
//! store holds named tables of [`Row`]s keyed by their `Id` column and
//! applies batches of [`Mutation`]s.
//!
//! ## Design Principles
//!
//! - Stores know nothing about entities, version tokens or locks
//! - Conditional writes are expressed as filters plus a match requirement,
//!   and a conditional write that touches zero rows rejects its batch
//! - Batches are all-or-nothing
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral data
//! - [`FileStore`] - CBOR snapshot persisted after every batch
//!
//! ## Example
//!
//! ```rust
//! use verlock_store::{BatchOutcome, Filter, InMemoryStore, Mutation, RecordStore, Row};
//!
//! let store = InMemoryStore::new();
//! store
//!     .execute(Mutation::insert("VersionLock", Row::new().with("Id", 1_i64).with("Value", 0_i64)))
//!     .unwrap();
//!
//! // Compare-and-swap: only succeeds while Value is still 0.
//! let bump = Mutation::update(
//!     "VersionLock",
//!     Filter::by_id(1_i64).and("Value", 0_i64),
//!     Row::new().with("Value", 1_i64),
//! );
//! assert!(store.apply(&[bump.clone()]).unwrap().is_applied());
//! assert_eq!(store.apply(&[bump]).unwrap(), BatchOutcome::Rejected { index: 0 });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod mutation;
mod value;

pub use backend::RecordStore;
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use mutation::{BatchOutcome, Filter, Mutation};
pub use value::{Row, Value, ID_COLUMN};
