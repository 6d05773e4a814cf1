//! # verlock Testkit
//!
//! Test utilities for verlock.
//!
//! This crate provides:
//! - Test environments over in-memory and file-backed stores
//! - A sample mapped type ([`Account`])
//! - Property-based test generators using proptest
//! - Concurrent read-modify-write stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use verlock_testkit::prelude::*;
//!
//! let env = TestEnv::memory();
//! let id = env.seed_account("Ana", 100);
//! let session = env.session("User1");
//! let account = env.accounts().find(&session, id).unwrap().unwrap();
//! assert_eq!(account.read().balance, 100);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
