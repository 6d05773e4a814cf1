//! Version tokens: durable optimistic concurrency stamps.
//!
//! Each mapped entity references one version token record through its
//! `VersionId` column. A token carries a counter (`Value`) and an audit pair
//! for creation and last modification. Writers advance the counter with a
//! compare-and-swap against the value they observed; a writer whose
//! pre-image is stale is rejected with a concurrency conflict.
//!
//! ## Sharing
//!
//! The [`VersionRegistry`] is shared by every session of a manager and holds
//! the latest known durable stamp of each token. Each loaded entity keeps its
//! own [`VersionToken`] handle: the value that handle observed is the
//! pre-image of its next write, and its soft lock belongs to that one hold.

mod registry;
mod stamp;
mod token;

pub use registry::VersionRegistry;
pub use stamp::VersionStamp;
pub use token::VersionToken;
