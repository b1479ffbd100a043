//! Scoped transactions
//!
//! A scope binds one transaction to one sub-database of one backing file.
//!
//! - [`ReadScope`]: MVCC snapshot fixed when the scope begins. A sub-database
//!   that does not exist yet reads as empty; it is never created.
//! - [`WriteScope`]: the single writer of its backing file. Beginning one
//!   blocks while another writer on the same file is active. The sub-database
//!   is created on first write access. Dropping a scope that was not
//!   committed aborts it, so early returns, `?` and panics all release the
//!   writer.

use redb::{
    ReadOnlyTable, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition,
    TableError, TableHandle, WriteTransaction,
};

use crate::error::{CapacityError, RepositoryError, Result};

use super::ConnectionHandle;

type KeyType = &'static str;
type ValueType = &'static [u8];

fn table_def(name: &str) -> TableDefinition<'_, KeyType, ValueType> {
    TableDefinition::new(name)
}

/// Key/value pairs returned by prefix scans, in key order
pub type ScanResult = Vec<(String, Vec<u8>)>;

// =============================================================================
// Read Scope
// =============================================================================

/// Read-only snapshot over one sub-database
pub struct ReadScope {
    database: String,
    sub_db: String,
    // Declared before the transaction so it is dropped first.
    table: Option<ReadOnlyTable<KeyType, ValueType>>,
    _txn: ReadTransaction,
}

impl ReadScope {
    pub(crate) fn begin(handle: &ConnectionHandle, sub_db: &str) -> Result<Self> {
        let txn = handle.database().begin_read()?;
        let table = match txn.open_table(table_def(sub_db)) {
            Ok(table) => Some(table),
            Err(TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            database: handle.key().database.clone(),
            sub_db: sub_db.to_string(),
            table,
            _txn: txn,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn sub_database(&self) -> &str {
        &self.sub_db
    }

    /// False when the sub-database has never been written
    pub fn sub_database_exists(&self) -> bool {
        self.table.is_some()
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match &self.table {
            Some(table) => get_value(table, key),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        match &self.table {
            Some(table) => contains_key(table, key),
            None => Ok(false),
        }
    }

    /// Entries whose key starts with `prefix`, at most `limit` of them
    pub fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<ScanResult> {
        match &self.table {
            Some(table) => scan_entries(table, prefix, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Keys starting with `prefix`; values are never copied out
    pub fn scan_prefix_keys(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<String>> {
        match &self.table {
            Some(table) => scan_keys(table, prefix, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Total entries in the sub-database
    pub fn len(&self) -> Result<u64> {
        match &self.table {
            Some(table) => Ok(table.len()?),
            None => Ok(0),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// =============================================================================
// Write Scope
// =============================================================================

/// Limits enforced by a write scope
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteLimits {
    pub map_size: u64,
    pub max_sub_databases: u32,
}

/// Exclusive write transaction over one sub-database
pub struct WriteScope {
    database: String,
    sub_db: String,
    limits: WriteLimits,
    /// `None` once committed or aborted
    txn: Option<WriteTransaction>,
}

impl WriteScope {
    pub(crate) fn begin(
        handle: &ConnectionHandle,
        sub_db: &str,
        limits: WriteLimits,
    ) -> Result<Self> {
        if handle.is_readonly() {
            return Err(RepositoryError::ReadOnly {
                database: handle.key().database.clone(),
            });
        }

        let scope = Self {
            database: handle.key().database.clone(),
            sub_db: sub_db.to_string(),
            limits,
            txn: Some(handle.database().begin_write()?),
        };
        scope.ensure_sub_database()?;
        Ok(scope)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn sub_database(&self) -> &str {
        &self.sub_db
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let table = self.txn()?.open_table(table_def(&self.sub_db))?;
        get_value(&table, key)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let table = self.txn()?.open_table(table_def(&self.sub_db))?;
        contains_key(&table, key)
    }

    /// Upsert
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let mut table = self.txn()?.open_table(table_def(&self.sub_db))?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Returns whether the key existed
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let mut table = self.txn()?.open_table(table_def(&self.sub_db))?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    pub fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<ScanResult> {
        let table = self.txn()?.open_table(table_def(&self.sub_db))?;
        scan_entries(&table, prefix, limit)
    }

    pub fn scan_prefix_keys(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let table = self.txn()?.open_table(table_def(&self.sub_db))?;
        scan_keys(&table, prefix, limit)
    }

    pub fn len(&self) -> Result<u64> {
        let table = self.txn()?.open_table(table_def(&self.sub_db))?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Commit, unless the backing file would outgrow the configured map size
    pub fn commit(mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(RepositoryError::TransactionClosed)?;

        let stats = match txn.stats() {
            Ok(stats) => stats,
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "abort after failed stats call also failed");
                }
                return Err(e.into());
            }
        };

        let used = stats.stored_bytes() + stats.metadata_bytes() + stats.fragmented_bytes();
        if used > self.limits.map_size {
            txn.abort()?;
            return Err(RepositoryError::Capacity(CapacityError::MapFull {
                used,
                limit: self.limits.map_size,
            }));
        }

        txn.commit()?;
        Ok(())
    }

    /// Discard every change made in this scope
    pub fn abort(mut self) -> Result<()> {
        if let Some(txn) = self.txn.take() {
            txn.abort()?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn txn(&self) -> Result<&WriteTransaction> {
        self.txn.as_ref().ok_or(RepositoryError::TransactionClosed)
    }

    fn ensure_sub_database(&self) -> Result<()> {
        let txn = self.txn()?;

        let mut existing = 0u32;
        for table in txn.list_tables()? {
            if table.name() == self.sub_db {
                return Ok(());
            }
            existing += 1;
        }

        if existing >= self.limits.max_sub_databases {
            return Err(RepositoryError::Capacity(CapacityError::SubDatabaseLimit {
                name: self.sub_db.clone(),
                limit: self.limits.max_sub_databases,
            }));
        }

        txn.open_table(table_def(&self.sub_db))?;
        tracing::debug!(database = %self.database, sub_db = %self.sub_db, "created sub-database");
        Ok(())
    }
}

impl Drop for WriteScope {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            tracing::debug!(
                database = %self.database,
                sub_db = %self.sub_db,
                "write scope released without commit, aborting"
            );
            if let Err(e) = txn.abort() {
                tracing::warn!(error = %e, "failed to abort write transaction");
            }
        }
    }
}

// =============================================================================
// Scoped Transaction
// =============================================================================

/// Either kind of scope, as returned by `StorageManager::get_transaction`
pub enum ScopedTransaction {
    Read(ReadScope),
    Write(WriteScope),
}

impl ScopedTransaction {
    pub fn is_write(&self) -> bool {
        matches!(self, ScopedTransaction::Write(_))
    }

    pub fn sub_database(&self) -> &str {
        match self {
            ScopedTransaction::Read(scope) => scope.sub_database(),
            ScopedTransaction::Write(scope) => scope.sub_database(),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            ScopedTransaction::Read(scope) => scope.get(key),
            ScopedTransaction::Write(scope) => scope.get(key),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        match self {
            ScopedTransaction::Read(scope) => scope.contains(key),
            ScopedTransaction::Write(scope) => scope.contains(key),
        }
    }

    pub fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<ScanResult> {
        match self {
            ScopedTransaction::Read(scope) => scope.scan_prefix(prefix, limit),
            ScopedTransaction::Write(scope) => scope.scan_prefix(prefix, limit),
        }
    }

    pub fn len(&self) -> Result<u64> {
        match self {
            ScopedTransaction::Read(scope) => scope.len(),
            ScopedTransaction::Write(scope) => scope.len(),
        }
    }

    /// The write scope, or `None` for a read transaction
    pub fn into_write(self) -> Option<WriteScope> {
        match self {
            ScopedTransaction::Write(scope) => Some(scope),
            ScopedTransaction::Read(_) => None,
        }
    }

    pub fn into_read(self) -> Option<ReadScope> {
        match self {
            ScopedTransaction::Read(scope) => Some(scope),
            ScopedTransaction::Write(_) => None,
        }
    }

    /// Commit a write scope; releasing a read snapshot always succeeds
    pub fn commit(self) -> Result<()> {
        match self {
            ScopedTransaction::Read(_) => Ok(()),
            ScopedTransaction::Write(scope) => scope.commit(),
        }
    }
}

// =============================================================================
// Table Helpers
// =============================================================================

fn get_value<T>(table: &T, key: &str) -> Result<Option<Vec<u8>>>
where
    T: ReadableTable<KeyType, ValueType>,
{
    Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
}

fn contains_key<T>(table: &T, key: &str) -> Result<bool>
where
    T: ReadableTable<KeyType, ValueType>,
{
    Ok(table.get(key)?.is_some())
}

/// Walk keys from `prefix` in order and stop at the first one outside it
fn scan_entries<T>(table: &T, prefix: &str, limit: Option<usize>) -> Result<ScanResult>
where
    T: ReadableTable<KeyType, ValueType>,
{
    let mut entries = Vec::new();
    for item in table.range(prefix..)? {
        if limit.is_some_and(|limit| entries.len() >= limit) {
            break;
        }
        let (key, value) = item?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key.to_string(), value.value().to_vec()));
    }
    Ok(entries)
}

fn scan_keys<T>(table: &T, prefix: &str, limit: Option<usize>) -> Result<Vec<String>>
where
    T: ReadableTable<KeyType, ValueType>,
{
    let mut keys = Vec::new();
    for item in table.range(prefix..)? {
        if limit.is_some_and(|limit| keys.len() >= limit) {
            break;
        }
        let (key, _) = item?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_string());
    }
    Ok(keys)
}
