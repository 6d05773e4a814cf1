//! Version token handle.

use crate::error::LastModification;
use crate::types::VersionId;
use crate::version::VersionStamp;
use chrono::{DateTime, Utc};

/// One hold on a version token.
///
/// The handle remembers the stamp it last observed. That value is the
/// pre-image its next increment is conditioned on, so two handles on the
/// same token can disagree: the stale one loses its next write.
///
/// The soft lock is set by a successful increment and cleared by
/// [`VersionToken::release`]. While it is set, further increments are
/// no-ops, so one edit advances the counter once no matter how many times
/// it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken {
    id: VersionId,
    stamp: VersionStamp,
    is_new: bool,
    soft_locked: bool,
}

impl VersionToken {
    pub(crate) fn new(id: VersionId, stamp: VersionStamp, is_new: bool) -> Self {
        Self {
            id,
            stamp,
            is_new,
            soft_locked: false,
        }
    }

    /// Returns the token ID.
    #[must_use]
    pub fn id(&self) -> VersionId {
        self.id
    }

    /// Returns the observed counter value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.stamp.value
    }

    /// Returns the observed stamp.
    #[must_use]
    pub fn stamp(&self) -> &VersionStamp {
        &self.stamp
    }

    /// Returns the creating actor.
    #[must_use]
    pub fn created_by(&self) -> &str {
        &self.stamp.created_by
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.stamp.created
    }

    /// Returns the actor of the last observed write.
    #[must_use]
    pub fn modified_by(&self) -> &str {
        &self.stamp.modified_by
    }

    /// Returns the time of the last observed write.
    #[must_use]
    pub fn modified(&self) -> DateTime<Utc> {
        self.stamp.modified
    }

    /// Returns the last observed modification.
    #[must_use]
    pub fn last_modification(&self) -> LastModification {
        self.stamp.last_modification()
    }

    /// Returns true if the token has not been persisted yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Returns true if this hold already advanced the counter.
    #[must_use]
    pub fn is_soft_locked(&self) -> bool {
        self.soft_locked
    }

    /// Ends the current hold so the next increment takes effect.
    ///
    /// Does not touch the store.
    pub fn release(&mut self) {
        self.soft_locked = false;
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    /// Records a successful increment.
    pub(crate) fn advance(&mut self, stamp: VersionStamp) {
        self.stamp = stamp;
        self.soft_locked = true;
    }
}
