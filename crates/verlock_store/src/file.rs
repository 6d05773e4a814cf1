//! Snapshot-persisted record store.

use crate::backend::RecordStore;
use crate::error::StoreResult;
use crate::memory::InMemoryStore;
use crate::mutation::{BatchOutcome, Filter, Mutation};
use crate::value::Row;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A record store persisted to a single file.
///
/// Reads are served from memory. Every applied batch rewrites the file with
/// a CBOR snapshot of the whole store: the snapshot goes to a sibling
/// `.tmp` file, is synced, and is then renamed over the original. The
/// directory is synced after the rename, so once `apply` returns the file
/// on disk holds the state after that batch, even across a crash.
///
/// If the snapshot cannot be written, the in-memory state is rolled back to
/// the last persisted snapshot and the I/O error is returned.
///
/// # Example
///
/// ```no_run
/// use verlock_store::{FileStore, Mutation, RecordStore, Row};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("records.cbor")).unwrap();
/// store.execute(Mutation::insert("Customers", Row::new().with("Id", 1_i64))).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: InMemoryStore,
    /// Last snapshot written to disk. Also serializes writers.
    persisted: Mutex<Vec<u8>>,
}

impl FileStore {
    /// Opens or creates a file store at the given path.
    ///
    /// If the file exists its snapshot is loaded; otherwise an empty store is
    /// created and written out, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, written, or decoded.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let store = if path.exists() {
            let bytes = fs::read(path)?;
            let inner = if bytes.is_empty() {
                InMemoryStore::new()
            } else {
                InMemoryStore::from_snapshot(&bytes)?
            };
            Self {
                path: path.to_path_buf(),
                inner,
                persisted: Mutex::new(bytes),
            }
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let inner = InMemoryStore::new();
            let bytes = inner.snapshot()?;
            let store = Self {
                path: path.to_path_buf(),
                inner,
                persisted: Mutex::new(Vec::new()),
            };
            store.write_snapshot(&bytes)?;
            *store.persisted.lock() = bytes;
            store
        };
        Ok(store)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the in-memory view, for inspection.
    #[must_use]
    pub fn contents(&self) -> &InMemoryStore {
        &self.inner
    }

    fn write_snapshot(&self, bytes: &[u8]) -> StoreResult<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.sync_parent()
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> StoreResult<()> {
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        File::open(parent)?.sync_all()?;
        Ok(())
    }

    // Directories cannot be opened as files here; the rename is durable once
    // the file itself is synced.
    #[cfg(not(unix))]
    fn sync_parent(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.inner.select(table, filter)
    }

    fn apply(&self, batch: &[Mutation]) -> StoreResult<BatchOutcome> {
        let mut persisted = self.persisted.lock();
        let outcome = self.inner.apply(batch)?;
        if !outcome.is_applied() {
            return Ok(outcome);
        }

        let written = self
            .inner
            .snapshot()
            .and_then(|bytes| self.write_snapshot(&bytes).map(|()| bytes));
        match written {
            Ok(bytes) => {
                *persisted = bytes;
                Ok(outcome)
            }
            Err(e) => {
                if persisted.is_empty() {
                    self.inner.clear();
                } else {
                    self.inner.restore(&persisted)?;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ID_COLUMN};
    use tempfile::tempdir;

    #[test]
    fn open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.cbor");

        let store = FileStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
        assert!(store.contents().table_names().is_empty());
    }

    #[test]
    fn applied_batches_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.cbor");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .execute(Mutation::insert(
                    "Customers",
                    Row::new().with(ID_COLUMN, 1_i64).with("Name", "Ana"),
                ))
                .unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        let row = reopened
            .find_by_id("Customers", &Value::Integer(1))
            .unwrap()
            .unwrap();
        assert_eq!(row.text("Name").unwrap(), "Ana");
    }

    #[test]
    fn rejected_batches_are_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        let store = FileStore::open(&path).unwrap();
        store
            .execute(Mutation::insert("T", Row::new().with(ID_COLUMN, 1_i64)))
            .unwrap();
        let before = fs::read(&path).unwrap();

        let outcome = store
            .apply(&[Mutation::delete("T", Filter::by_id(2_i64))])
            .unwrap();
        assert_eq!(outcome, BatchOutcome::Rejected { index: 0 });
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn failed_snapshot_write_rolls_back_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        let store = FileStore::open(&path).unwrap();
        store
            .execute(Mutation::insert("T", Row::new().with(ID_COLUMN, 1_i64)))
            .unwrap();
        let before = fs::read(&path).unwrap();

        // A directory in the way of the temp file makes the write fail.
        fs::create_dir(path.with_extension("tmp")).unwrap();
        let err = store
            .execute(Mutation::insert("T", Row::new().with(ID_COLUMN, 2_i64)))
            .unwrap_err();
        assert!(matches!(err, crate::StoreError::Io(_)));

        assert!(store.find_by_id("T", &Value::Integer(2)).unwrap().is_none());
        assert!(store.find_by_id("T", &Value::Integer(1)).unwrap().is_some());
        assert_eq!(fs::read(&path).unwrap(), before);

        fs::remove_dir(path.with_extension("tmp")).unwrap();
        store
            .execute(Mutation::insert("T", Row::new().with(ID_COLUMN, 2_i64)))
            .unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.contents().row_count("T"), 2);
    }

    #[test]
    fn failed_first_write_leaves_store_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        let store = FileStore::open(&path).unwrap();

        fs::create_dir(path.with_extension("tmp")).unwrap();
        assert!(store
            .execute(Mutation::insert("T", Row::new().with(ID_COLUMN, 1_i64)))
            .is_err());
        assert_eq!(store.contents().row_count("T"), 0);
    }

    #[test]
    fn corrupted_file_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        fs::write(&path, b"not cbor at all").unwrap();

        assert!(FileStore::open(&path).is_err());
    }
}
