//! Error types for verlock core.

use crate::entity::EntityId;
use crate::lock::LockMode;
use crate::types::{SessionId, VersionId};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use verlock_store::StoreError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// What a concurrency conflict was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSubject {
    /// A mapped entity (its record row or its version token).
    Entity(EntityId),
    /// A version token operated on directly.
    Version(VersionId),
}

impl fmt::Display for ConflictSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "entity {id}"),
            Self::Version(id) => write!(f, "{id}"),
        }
    }
}

/// The write that invalidated a stale pre-image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastModification {
    /// Actor recorded by the winning write.
    pub modified_by: String,
    /// Time recorded by the winning write.
    pub modified: DateTime<Utc>,
}

impl fmt::Display for LastModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "modified by {} at {}",
            self.modified_by,
            self.modified.to_rfc3339()
        )
    }
}

fn describe(last: &Option<LastModification>) -> String {
    match last {
        Some(last) => format!(": {last}"),
        None => ": record no longer exists".to_string(),
    }
}

/// Errors that can occur in verlock core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No record of the mapped type has this ID.
    #[error("entity not found: {entity_id} in table {table}")]
    EntityNotFound {
        /// The table searched.
        table: &'static str,
        /// The entity ID that was not found.
        entity_id: EntityId,
    },

    /// Neither the registry nor the store knows this version token.
    #[error("version not found: {version_id}")]
    VersionNotFound {
        /// The version ID that was not found.
        version_id: VersionId,
    },

    /// The session is unknown or already closed.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The session handle.
        session_id: SessionId,
    },

    /// A conditional write observed a stale pre-image.
    #[error("concurrency conflict on {subject}{}", describe(.last_modified))]
    ConcurrencyConflict {
        /// What the conflict was detected on.
        subject: ConflictSubject,
        /// Who won, reloaded from the store; `None` if the record is gone.
        last_modified: Option<LastModification>,
    },

    /// A write was attempted without holding the required lock.
    #[error("{mode:?} lock required on entity {entity_id}")]
    LockRequired {
        /// The entity written.
        entity_id: EntityId,
        /// The lock mode the write needs.
        mode: LockMode,
    },

    /// No session is selected as current.
    #[error("no current session")]
    NoCurrentSession,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a concurrency conflict error.
    pub fn conflict(subject: ConflictSubject, last_modified: Option<LastModification>) -> Self {
        Self::ConcurrencyConflict {
            subject,
            last_modified,
        }
    }

    /// Returns true for any of the not-found kinds.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound { .. } | Self::VersionNotFound { .. } | Self::SessionNotFound { .. }
        )
    }

    /// Returns true for a concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns true if the caller is expected to resolve the error, by
    /// reloading and retrying or by aborting.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_not_found() || self.is_conflict() || matches!(self, Self::LockRequired { .. })
    }

    /// Returns the winning modification of a conflict, if known.
    #[must_use]
    pub fn last_modification(&self) -> Option<&LastModification> {
        match self {
            Self::ConcurrencyConflict { last_modified, .. } => last_modified.as_ref(),
            _ => None,
        }
    }
}
