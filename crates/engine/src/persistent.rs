//! Persistent state
//!
//! A small bucketed key-value store. Two buckets are used:
//! - `entryState`: target absolute path -> JSON [`EntryState`](crate::entry_state::EntryState)
//!   of what was last written there
//! - `scriptState`: hex SHA-256 of a run-once script -> JSON [`ScriptState`]
//!
//! `RedbPersistentState` is the durable store, opened read-write or through
//! a shared read-only handle. `MockPersistentState` holds everything in
//! memory and backs dry runs, `ReadOnlyPersistentState` refuses writes and
//! `NullPersistentState` forgets them.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use redb::{
    Database, ReadOnlyDatabase, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition,
    TableError, TableHandle, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Bucket recording the last written state of each target
pub const ENTRY_STATE_BUCKET: &str = "entryState";

/// Bucket recording executed run-once scripts
pub const SCRIPT_STATE_BUCKET: &str = "scriptState";

/// Record of a run-once script execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptState {
    /// Target name of the script
    pub name: String,
    /// When the script finished successfully
    pub run_at: DateTime<Utc>,
}

/// Bucketed key-value storage
///
/// Using a store after [`close`](PersistentState::close) returns
/// [`Error::Closed`].
pub trait PersistentState {
    /// Get a value from a bucket
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a value in a bucket, creating the bucket if needed
    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key from a bucket
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()>;

    /// Delete an entire bucket
    fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Call `f` for every key-value pair in a bucket, in key order
    fn for_each(&self, bucket: &str, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>)
    -> Result<()>;

    /// Names of the buckets that exist
    fn buckets(&self) -> Result<Vec<String>>;

    /// Close the store
    fn close(&self) -> Result<()>;

    /// Copy every bucket into `other`
    fn copy_to(&self, other: &dyn PersistentState) -> Result<()> {
        for bucket in self.buckets()? {
            self.for_each(&bucket, &mut |key, value| other.set(&bucket, key, value))?;
        }
        Ok(())
    }
}

fn recover<T>(poisoned: PoisonError<T>) -> T {
    warn!("Persistent state lock was poisoned, recovering");
    poisoned.into_inner()
}

enum Handle {
    ReadWrite(Database),
    ReadOnly(ReadOnlyDatabase),
}

/// Persistent state implementation using redb
///
/// A read-write handle holds redb's exclusive lock. Any number of
/// read-only handles can be open at once, but not alongside a read-write
/// one.
pub struct RedbPersistentState {
    db: RwLock<Option<Handle>>,
}

impl RedbPersistentState {
    /// Create or open a persistent state database
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or is not a database
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path)
            .map_err(|e| Error::State(format!("Failed to create database: {e}")))?;
        Ok(Self::from_handle(Handle::ReadWrite(db)))
    }

    /// Open an existing database for reading and writing
    ///
    /// # Errors
    ///
    /// Returns error if the file does not exist or is not a database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path)
            .map_err(|e| Error::State(format!("Failed to open database: {e}")))?;
        Ok(Self::from_handle(Handle::ReadWrite(db)))
    }

    /// Open an existing database with a shared read-only handle
    ///
    /// Every write returns [`Error::ReadOnlyState`].
    ///
    /// # Errors
    ///
    /// Returns error if the file does not exist, is not a database, or a
    /// read-write handle is open
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let db = ReadOnlyDatabase::open(path)
            .map_err(|e| Error::State(format!("Failed to open database read-only: {e}")))?;
        Ok(Self::from_handle(Handle::ReadOnly(db)))
    }

    fn from_handle(handle: Handle) -> Self {
        Self {
            db: RwLock::new(Some(handle)),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&ReadTransaction) -> Result<T>) -> Result<T> {
        let guard = self.db.read().unwrap_or_else(recover);
        let txn = match guard.as_ref() {
            Some(Handle::ReadWrite(db)) => db.begin_read(),
            Some(Handle::ReadOnly(db)) => db.begin_read(),
            None => return Err(Error::Closed),
        }
        .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;
        f(&txn)
    }

    fn write(&self, f: impl FnOnce(&WriteTransaction) -> Result<()>) -> Result<()> {
        let guard = self.db.read().unwrap_or_else(recover);
        let db = match guard.as_ref() {
            Some(Handle::ReadWrite(db)) => db,
            Some(Handle::ReadOnly(_)) => return Err(Error::ReadOnlyState),
            None => return Err(Error::Closed),
        };
        let txn = db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        f(&txn)?;
        txn.commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }
}

fn table_def(bucket: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(bucket)
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read(|txn| {
            let table = match txn.open_table(table_def(bucket)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(Error::State(format!("Failed to open table: {e}"))),
            };
            let value = table
                .get(key)
                .map_err(|e| Error::State(format!("Failed to get value: {e}")))?;
            Ok(value.map(|v| v.value().to_vec()))
        })
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(|txn| {
            let mut table = txn
                .open_table(table_def(bucket))
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .insert(key, value)
                .map_err(|e| Error::State(format!("Failed to insert value: {e}")))?;
            Ok(())
        })
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        self.write(|txn| {
            let mut table = txn
                .open_table(table_def(bucket))
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .remove(key)
                .map_err(|e| Error::State(format!("Failed to remove value: {e}")))?;
            Ok(())
        })
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.write(|txn| {
            txn.delete_table(table_def(bucket))
                .map_err(|e| Error::State(format!("Failed to delete table: {e}")))?;
            Ok(())
        })
    }

    fn for_each(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        self.read(|txn| {
            let table = match txn.open_table(table_def(bucket)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(()),
                Err(e) => return Err(Error::State(format!("Failed to open table: {e}"))),
            };
            let iter = table
                .iter()
                .map_err(|e| Error::State(format!("Failed to iterate table: {e}")))?;
            for item in iter {
                let (key, value) =
                    item.map_err(|e| Error::State(format!("Failed to read item: {e}")))?;
                f(key.value(), value.value())?;
            }
            Ok(())
        })
    }

    fn buckets(&self) -> Result<Vec<String>> {
        self.read(|txn| {
            let tables = txn
                .list_tables()
                .map_err(|e| Error::State(format!("Failed to list tables: {e}")))?;
            Ok(tables.map(|t| t.name().to_string()).collect())
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.db.write().unwrap_or_else(recover);
        match guard.take() {
            Some(db) => {
                drop(db);
                Ok(())
            }
            None => Err(Error::Closed),
        }
    }
}

type BucketData = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory persistent state
///
/// Dry runs copy the durable store into one of these so that nothing they
/// record outlives the process.
#[derive(Debug)]
pub struct MockPersistentState {
    data: RwLock<Option<BTreeMap<String, BucketData>>>,
}

impl MockPersistentState {
    /// Create an empty mock persistent state
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Some(BTreeMap::new())),
        }
    }
}

impl Default for MockPersistentState {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentState for MockPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let guard = self.data.read().unwrap_or_else(recover);
        let data = guard.as_ref().ok_or(Error::Closed)?;
        Ok(data.get(bucket).and_then(|b| b.get(key).cloned()))
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(recover);
        let data = guard.as_mut().ok_or(Error::Closed)?;
        data.entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(recover);
        let data = guard.as_mut().ok_or(Error::Closed)?;
        if let Some(bucket_data) = data.get_mut(bucket) {
            bucket_data.remove(key);
        }
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(recover);
        let data = guard.as_mut().ok_or(Error::Closed)?;
        data.remove(bucket);
        Ok(())
    }

    fn for_each(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        // Snapshot first so `f` may write back into this store.
        let entries: Vec<(Vec<u8>, Vec<u8>)> = {
            let guard = self.data.read().unwrap_or_else(recover);
            let data = guard.as_ref().ok_or(Error::Closed)?;
            data.get(bucket)
                .map(|b| b.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()
        };
        for (key, value) in &entries {
            f(key, value)?;
        }
        Ok(())
    }

    fn buckets(&self) -> Result<Vec<String>> {
        let guard = self.data.read().unwrap_or_else(recover);
        let data = guard.as_ref().ok_or(Error::Closed)?;
        Ok(data.keys().cloned().collect())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(recover);
        match guard.take() {
            Some(_) => Ok(()),
            None => Err(Error::Closed),
        }
    }
}

/// A persistent state that reads through and refuses every write
pub struct ReadOnlyPersistentState<P> {
    inner: P,
}

impl<P: PersistentState> ReadOnlyPersistentState<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: PersistentState> PersistentState for ReadOnlyPersistentState<P> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(bucket, key)
    }

    fn set(&self, _bucket: &str, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(Error::ReadOnlyState)
    }

    fn delete(&self, _bucket: &str, _key: &[u8]) -> Result<()> {
        Err(Error::ReadOnlyState)
    }

    fn delete_bucket(&self, _bucket: &str) -> Result<()> {
        Err(Error::ReadOnlyState)
    }

    fn for_each(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        self.inner.for_each(bucket, f)
    }

    fn buckets(&self) -> Result<Vec<String>> {
        self.inner.buckets()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// A persistent state that stores nothing
///
/// Used when entries are applied into the source directory, whose state is
/// not tracked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPersistentState;

impl PersistentState for NullPersistentState {
    fn get(&self, _bucket: &str, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _bucket: &str, _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _bucket: &str, _key: &[u8]) -> Result<()> {
        Ok(())
    }

    fn delete_bucket(&self, _bucket: &str) -> Result<()> {
        Ok(())
    }

    fn for_each(
        &self,
        _bucket: &str,
        _f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        Ok(())
    }

    fn buckets(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A persistent state that logs every call
pub struct DebugPersistentState<P> {
    inner: P,
}

impl<P: PersistentState> DebugPersistentState<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: PersistentState> PersistentState for DebugPersistentState<P> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let result = self.inner.get(bucket, key);
        debug!(
            bucket,
            key = %String::from_utf8_lossy(key),
            found = matches!(result, Ok(Some(_))),
            "Persistent state get"
        );
        result
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let result = self.inner.set(bucket, key, value);
        debug!(
            bucket,
            key = %String::from_utf8_lossy(key),
            value = %String::from_utf8_lossy(value),
            ok = result.is_ok(),
            "Persistent state set"
        );
        result
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let result = self.inner.delete(bucket, key);
        debug!(bucket, key = %String::from_utf8_lossy(key), ok = result.is_ok(), "Persistent state delete");
        result
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let result = self.inner.delete_bucket(bucket);
        debug!(bucket, ok = result.is_ok(), "Persistent state delete bucket");
        result
    }

    fn for_each(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let result = self.inner.for_each(bucket, f);
        debug!(bucket, ok = result.is_ok(), "Persistent state for_each");
        result
    }

    fn buckets(&self) -> Result<Vec<String>> {
        self.inner.buckets()
    }

    fn close(&self) -> Result<()> {
        let result = self.inner.close();
        debug!(ok = result.is_ok(), "Persistent state close");
        result
    }
}

/// Every bucket as `bucket -> key -> value`
///
/// Values that are JSON are decoded, anything else is shown as a string.
pub fn dump(state: &dyn PersistentState) -> Result<BTreeMap<String, BTreeMap<String, serde_json::Value>>> {
    let mut dump = BTreeMap::new();
    for bucket in state.buckets()? {
        let mut entries = BTreeMap::new();
        state.for_each(&bucket, &mut |key, value| {
            let value = serde_json::from_slice(value).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(value).into_owned())
            });
            entries.insert(String::from_utf8_lossy(key).into_owned(), value);
            Ok(())
        })?;
        dump.insert(bucket, entries);
    }
    Ok(dump)
}
