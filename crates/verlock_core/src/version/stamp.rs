//! Durable part of a version token.

use crate::error::{CoreResult, LastModification};
use crate::types::VersionId;
use chrono::{DateTime, Utc};
use verlock_store::{Row, ID_COLUMN};

pub(crate) const VALUE_COLUMN: &str = "Value";
const CREATED_BY_COLUMN: &str = "CreatedBy";
const CREATED_COLUMN: &str = "Created";
const MODIFIED_BY_COLUMN: &str = "ModifiedBy";
const MODIFIED_COLUMN: &str = "Modified";

/// Counter and audit trail of a version token, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStamp {
    /// Number of successful writes. Starts at 0.
    pub value: u64,
    /// Actor that created the token.
    pub created_by: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Actor of the last successful write.
    pub modified_by: String,
    /// Time of the last successful write.
    pub modified: DateTime<Utc>,
}

impl VersionStamp {
    /// Creates the initial stamp for a token created by `actor`.
    #[must_use]
    pub fn initial(actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            value: 0,
            created_by: actor.to_string(),
            created: now,
            modified_by: actor.to_string(),
            modified: now,
        }
    }

    /// Returns the stamp after one more write by `actor`.
    #[must_use]
    pub fn advanced(&self, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            value: self.value + 1,
            created_by: self.created_by.clone(),
            created: self.created,
            modified_by: actor.to_string(),
            modified: now,
        }
    }

    /// Returns the last-modification audit pair.
    #[must_use]
    pub fn last_modification(&self) -> LastModification {
        LastModification {
            modified_by: self.modified_by.clone(),
            modified: self.modified,
        }
    }

    /// Encodes the full token record.
    pub(crate) fn to_row(&self, id: VersionId) -> Row {
        self.audit_row()
            .with(ID_COLUMN, id)
            .with(CREATED_BY_COLUMN, self.created_by.as_str())
            .with(CREATED_COLUMN, self.created)
    }

    /// Encodes the columns a write rewrites.
    pub(crate) fn audit_row(&self) -> Row {
        Row::new()
            .with(VALUE_COLUMN, self.value)
            .with(MODIFIED_BY_COLUMN, self.modified_by.as_str())
            .with(MODIFIED_COLUMN, self.modified)
    }

    /// Decodes a token record.
    pub(crate) fn from_row(row: &Row) -> CoreResult<(VersionId, Self)> {
        let id = VersionId::from_uuid(row.uuid(ID_COLUMN)?);
        let stamp = Self {
            value: row.unsigned(VALUE_COLUMN)?,
            created_by: row.text(CREATED_BY_COLUMN)?.to_string(),
            created: row.timestamp(CREATED_COLUMN)?,
            modified_by: row.text(MODIFIED_BY_COLUMN)?.to_string(),
            modified: row.timestamp(MODIFIED_COLUMN)?,
        };
        Ok((id, stamp))
    }
}
