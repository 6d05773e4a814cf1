//! Pessimistic read/write locks on entities.
//!
//! Locks are advisory and non-blocking:
//! - **Read** is shared between sessions
//! - **Write** is exclusive: no other session may hold Read or Write
//! - A failed acquisition returns `false`; retrying is the caller's choice
//!
//! The [`LockTable`] is the process-wide authority on who holds what. Each
//! session owns a [`LockManager`] recording the locks held by that session.

mod manager;
mod table;

pub use manager::LockManager;
pub use table::{LockHolders, LockTable};

/// Lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for reading.
    Read,
    /// Exclusive lock for writing.
    Write,
}

impl LockMode {
    /// Returns true if holding `self` is enough for an operation needing
    /// `required`. Write implies Read.
    #[must_use]
    pub const fn satisfies(self, required: LockMode) -> bool {
        matches!((self, required), (Self::Write, _) | (Self::Read, Self::Read))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_satisfies_read() {
        assert!(LockMode::Write.satisfies(LockMode::Read));
        assert!(LockMode::Write.satisfies(LockMode::Write));
        assert!(LockMode::Read.satisfies(LockMode::Read));
        assert!(!LockMode::Read.satisfies(LockMode::Write));
    }
}
