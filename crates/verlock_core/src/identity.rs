//! Per-session identity map.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Cached = Arc<dyn Any + Send + Sync>;

/// Cache of loaded entities, one instance per entity ID.
///
/// Two lookups of the same ID within one session return the same `Arc`, so
/// edits made through one reference are visible through the other. Entries
/// are typed: asking for an ID under a different type than it was cached
/// with is an error.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<EntityId, Cached>,
}

impl IdentityMap {
    /// Creates an empty identity map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instance for `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `id` is cached under another type.
    pub fn get<T: Any + Send + Sync>(&self, id: EntityId) -> CoreResult<Option<Arc<T>>> {
        self.entries
            .get(&id)
            .map(|cached| downcast(id, Arc::clone(cached)))
            .transpose()
    }

    /// Returns the cached instance for `id`, or caches the one `loader`
    /// produces.
    ///
    /// `loader` runs only on a miss.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error, and returns `InvalidOperation` if `id`
    /// is cached under another type.
    pub fn get_or_add<T, F>(&mut self, id: EntityId, loader: F) -> CoreResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> CoreResult<Arc<T>>,
    {
        if let Some(cached) = self.entries.get(&id) {
            return downcast(id, Arc::clone(cached));
        }
        let loaded = loader()?;
        self.entries.insert(id, loaded.clone());
        Ok(loaded)
    }

    /// Caches `entity` under `id`, replacing any previous entry.
    pub fn add<T: Any + Send + Sync>(&mut self, id: EntityId, entity: Arc<T>) {
        self.entries.insert(id, entity);
    }

    /// Evicts `id`. Returns false if it was not cached.
    pub fn remove(&mut self, id: EntityId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Returns true if `id` is cached.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn downcast<T: Any + Send + Sync>(id: EntityId, cached: Cached) -> CoreResult<Arc<T>> {
    cached.downcast::<T>().map_err(|_| {
        CoreError::invalid_operation(format!(
            "entity {id} is cached as a different type than {}",
            std::any::type_name::<T>()
        ))
    })
}
