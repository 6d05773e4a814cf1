//! Record store trait definition.

use crate::error::StoreResult;
use crate::mutation::{BatchOutcome, Filter, Mutation};
use crate::value::{Row, Value};

/// A table-oriented record store.
///
/// Stores know nothing about entities, version tokens or sessions. They hold
/// rows keyed by the `Id` column and apply batches of writes.
///
/// # Invariants
///
/// - `apply` is all-or-nothing: either every mutation of the batch becomes
///   visible, or none does
/// - A conditional mutation that affects zero rows rejects the whole batch
///   and reports its position
/// - Readers never observe a partially applied batch
/// - Stores must be `Send + Sync` so sessions on different threads can share
///   one store
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For tests and ephemeral data
/// - [`super::FileStore`] - Snapshot-persisted store
pub trait RecordStore: Send + Sync {
    /// Returns every row of `table` that satisfies `filter`.
    ///
    /// An unknown table is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Applies a batch of mutations atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if a mutation is malformed (missing or duplicate
    /// primary key, primary key rewrite) or the store fails. No mutation of
    /// the batch is visible afterwards.
    fn apply(&self, batch: &[Mutation]) -> StoreResult<BatchOutcome>;

    /// Returns the row of `table` whose primary key is `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_by_id(&self, table: &str, id: &Value) -> StoreResult<Option<Row>> {
        Ok(self
            .select(table, &Filter::by_id(id.clone()))?
            .into_iter()
            .next())
    }

    /// Applies one mutation and returns the affected row count.
    ///
    /// A rejected conditional mutation reports zero rows.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::apply`].
    fn execute(&self, mutation: Mutation) -> StoreResult<u64> {
        match self.apply(std::slice::from_ref(&mutation))? {
            BatchOutcome::Applied { affected } => Ok(affected.first().copied().unwrap_or(0)),
            BatchOutcome::Rejected { .. } => Ok(0),
        }
    }
}
