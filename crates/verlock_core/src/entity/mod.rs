//! Entities: identified payloads carrying a version token.

mod id;
mod tracked;

pub use id::EntityId;
pub use tracked::Entity;
