//! In-memory record store.

use crate::backend::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::mutation::{BatchOutcome, Filter, Mutation};
use crate::value::{Row, Value, ID_COLUMN};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

type Table = BTreeMap<Value, Row>;

/// Snapshot format version written by [`InMemoryStore::snapshot`].
const SNAPSHOT_FORMAT: u16 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format: u16,
    tables: BTreeMap<String, Vec<Row>>,
}

/// Inverse of one applied change, replayed newest-first on rollback.
enum Undo {
    Remove { table: String, key: Value },
    Restore { table: String, key: Value, row: Row },
}

/// An in-memory record store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral data that doesn't need persistence
///
/// # Thread Safety
///
/// Batches are applied under a single write lock, so readers see either the
/// state before a batch or the state after it.
///
/// # Example
///
/// ```rust
/// use verlock_store::{Filter, InMemoryStore, Mutation, RecordStore, Row};
///
/// let store = InMemoryStore::new();
/// store
///     .execute(Mutation::insert("Customers", Row::new().with("Id", 1_i64).with("Name", "Ana")))
///     .unwrap();
/// let rows = store.select("Customers", &Filter::eq("Name", "Ana")).unwrap();
/// assert_eq!(rows.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from bytes produced by [`InMemoryStore::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if the bytes cannot be decoded.
    pub fn from_snapshot(bytes: &[u8]) -> StoreResult<Self> {
        let store = Self::new();
        store.restore(bytes)?;
        Ok(store)
    }

    /// Encodes the full store contents as CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if encoding fails.
    pub fn snapshot(&self) -> StoreResult<Vec<u8>> {
        let tables = self.tables.read();
        let snapshot = Snapshot {
            format: SNAPSHOT_FORMAT,
            tables: tables
                .iter()
                .map(|(name, rows)| (name.clone(), rows.values().cloned().collect()))
                .collect(),
        };
        drop(tables);

        let mut bytes = Vec::new();
        ciborium::into_writer(&snapshot, &mut bytes)
            .map_err(|e| StoreError::Corrupted(format!("snapshot encoding failed: {e}")))?;
        Ok(bytes)
    }

    /// Replaces the store contents with a decoded snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if the bytes cannot be decoded, hold
    /// an unknown format version, or contain a row without a primary key.
    /// The store is left untouched in that case.
    pub fn restore(&self, bytes: &[u8]) -> StoreResult<()> {
        let snapshot: Snapshot = ciborium::from_reader(bytes)
            .map_err(|e| StoreError::Corrupted(format!("snapshot decoding failed: {e}")))?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(StoreError::Corrupted(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }

        let mut decoded = HashMap::with_capacity(snapshot.tables.len());
        for (name, rows) in snapshot.tables {
            let mut table = Table::new();
            for row in rows {
                let key = row.id().cloned().ok_or_else(|| {
                    StoreError::Corrupted(format!("row without {ID_COLUMN} in table {name}"))
                })?;
                table.insert(key, row);
            }
            decoded.insert(name, table);
        }

        *self.tables.write() = decoded;
        Ok(())
    }

    /// Returns the names of all tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Removes every table.
    pub fn clear(&self) {
        self.tables.write().clear();
    }

    fn matching_keys(rows: &Table, filter: &Filter) -> Vec<Value> {
        match filter.pinned_id() {
            Some(id) => rows
                .get(id)
                .filter(|row| filter.matches(row))
                .map(|_| vec![id.clone()])
                .unwrap_or_default(),
            None => rows
                .iter()
                .filter(|(_, row)| filter.matches(row))
                .map(|(key, _)| key.clone())
                .collect(),
        }
    }

    fn apply_one(
        tables: &mut HashMap<String, Table>,
        mutation: &Mutation,
        undo: &mut Vec<Undo>,
    ) -> StoreResult<u64> {
        match mutation {
            Mutation::Insert { table, row } => {
                let key = row
                    .id()
                    .cloned()
                    .ok_or_else(|| StoreError::missing_column(ID_COLUMN))?;
                let rows = tables.entry(table.clone()).or_default();
                if rows.contains_key(&key) {
                    return Err(StoreError::DuplicateKey {
                        table: table.clone(),
                        key: key.to_string(),
                    });
                }
                rows.insert(key.clone(), row.clone());
                undo.push(Undo::Remove {
                    table: table.clone(),
                    key,
                });
                Ok(1)
            }
            Mutation::Update {
                table,
                filter,
                changes,
                ..
            } => {
                if changes.contains(ID_COLUMN) {
                    return Err(StoreError::ImmutableColumn {
                        table: table.clone(),
                        column: ID_COLUMN.to_string(),
                    });
                }
                let Some(rows) = tables.get_mut(table) else {
                    return Ok(0);
                };
                let keys = Self::matching_keys(rows, filter);
                for key in &keys {
                    if let Some(row) = rows.get_mut(key) {
                        undo.push(Undo::Restore {
                            table: table.clone(),
                            key: key.clone(),
                            row: row.clone(),
                        });
                        row.merge(changes);
                    }
                }
                Ok(keys.len() as u64)
            }
            Mutation::Delete { table, filter, .. } => {
                let Some(rows) = tables.get_mut(table) else {
                    return Ok(0);
                };
                let keys = Self::matching_keys(rows, filter);
                for key in &keys {
                    if let Some(row) = rows.remove(key) {
                        undo.push(Undo::Restore {
                            table: table.clone(),
                            key: key.clone(),
                            row,
                        });
                    }
                }
                Ok(keys.len() as u64)
            }
        }
    }

    fn rollback(tables: &mut HashMap<String, Table>, undo: Vec<Undo>) {
        for change in undo.into_iter().rev() {
            match change {
                Undo::Remove { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
                Undo::Restore { table, key, row } => {
                    tables.entry(table).or_default().insert(key, row);
                }
            }
        }
    }
}

impl RecordStore for InMemoryStore {
    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(Self::matching_keys(rows, filter)
            .iter()
            .filter_map(|key| rows.get(key).cloned())
            .collect())
    }

    fn apply(&self, batch: &[Mutation]) -> StoreResult<BatchOutcome> {
        let mut tables = self.tables.write();
        let mut undo = Vec::new();
        let mut affected = Vec::with_capacity(batch.len());

        for (index, mutation) in batch.iter().enumerate() {
            let count = match Self::apply_one(&mut tables, mutation, &mut undo) {
                Ok(count) => count,
                Err(e) => {
                    Self::rollback(&mut tables, undo);
                    return Err(e);
                }
            };
            if count == 0 && mutation.requires_match() {
                Self::rollback(&mut tables, undo);
                return Ok(BatchOutcome::Rejected { index });
            }
            affected.push(count);
        }

        Ok(BatchOutcome::Applied { affected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, value: i64) -> Row {
        Row::new().with(ID_COLUMN, id).with("Value", value)
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .apply(&[
                Mutation::insert("T", row(1, 10)),
                Mutation::insert("T", row(2, 20)),
            ])
            .unwrap();
        store
    }

    #[test]
    fn new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.table_names().is_empty());
        assert!(store.select("T", &Filter::all()).unwrap().is_empty());
    }

    #[test]
    fn insert_then_find() {
        let store = seeded();
        let found = store.find_by_id("T", &Value::Integer(2)).unwrap().unwrap();
        assert_eq!(found.integer("Value").unwrap(), 20);
        assert_eq!(store.row_count("T"), 2);
    }

    #[test]
    fn insert_without_id_fails() {
        let store = InMemoryStore::new();
        let result = store.apply(&[Mutation::insert("T", Row::new().with("Value", 1_i64))]);
        assert!(matches!(result, Err(StoreError::MissingColumn { .. })));
    }

    #[test]
    fn duplicate_insert_rolls_back_batch() {
        let store = seeded();
        let result = store.apply(&[
            Mutation::insert("T", row(3, 30)),
            Mutation::insert("T", row(1, 99)),
        ]);

        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(store.row_count("T"), 2);
        assert!(store.find_by_id("T", &Value::Integer(3)).unwrap().is_none());
    }

    #[test]
    fn conditional_update_matches_previous_value() {
        let store = seeded();
        let affected = store
            .execute(Mutation::update(
                "T",
                Filter::by_id(1_i64).and("Value", 10_i64),
                Row::new().with("Value", 11_i64),
            ))
            .unwrap();
        assert_eq!(affected, 1);

        let stale = store
            .execute(Mutation::update(
                "T",
                Filter::by_id(1_i64).and("Value", 10_i64),
                Row::new().with("Value", 12_i64),
            ))
            .unwrap();
        assert_eq!(stale, 0);

        let row = store.find_by_id("T", &Value::Integer(1)).unwrap().unwrap();
        assert_eq!(row.integer("Value").unwrap(), 11);
    }

    #[test]
    fn rejected_batch_leaves_no_trace() {
        let store = seeded();
        let outcome = store
            .apply(&[
                Mutation::update("T", Filter::by_id(1_i64), Row::new().with("Value", 100_i64)),
                Mutation::delete("T", Filter::by_id(2_i64)),
                Mutation::update("T", Filter::by_id(9_i64), Row::new().with("Value", 0_i64)),
            ])
            .unwrap();

        assert_eq!(outcome, BatchOutcome::Rejected { index: 2 });
        let one = store.find_by_id("T", &Value::Integer(1)).unwrap().unwrap();
        assert_eq!(one.integer("Value").unwrap(), 10);
        assert!(store.find_by_id("T", &Value::Integer(2)).unwrap().is_some());
    }

    #[test]
    fn unconditional_miss_is_not_a_rejection() {
        let store = seeded();
        let outcome = store
            .apply(&[Mutation::delete("T", Filter::by_id(9_i64)).unconditional()])
            .unwrap();
        assert_eq!(outcome, BatchOutcome::Applied { affected: vec![0] });
    }

    #[test]
    fn update_cannot_rewrite_id() {
        let store = seeded();
        let result = store.apply(&[Mutation::update(
            "T",
            Filter::by_id(1_i64),
            Row::new().with(ID_COLUMN, 5_i64),
        )]);
        assert!(matches!(result, Err(StoreError::ImmutableColumn { .. })));
    }

    #[test]
    fn select_by_non_key_column() {
        let store = seeded();
        store.execute(Mutation::insert("T", row(3, 20))).unwrap();
        let rows = store.select("T", &Filter::eq("Value", 20_i64)).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn snapshot_restores_contents() {
        let store = seeded();
        let bytes = store.snapshot().unwrap();

        let restored = InMemoryStore::from_snapshot(&bytes).unwrap();
        assert_eq!(restored.table_names(), vec!["T".to_string()]);
        assert_eq!(
            restored.select("T", &Filter::all()).unwrap(),
            store.select("T", &Filter::all()).unwrap()
        );
    }

    #[test]
    fn garbage_snapshot_is_corrupted() {
        let result = InMemoryStore::from_snapshot(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn clear_drops_tables() {
        let store = seeded();
        store.clear();
        assert_eq!(store.row_count("T"), 0);
    }
}
