use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;
use crate::context::{Cancellation, Context};

/// Error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    /// Storage-level failure. Callers may retry with backoff.
    BackendUnavailable,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ErrorKind::Conflict => write!(f, "CONFLICT"),
            ErrorKind::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorKind::BackendUnavailable => write!(f, "BACKEND_UNAVAILABLE"),
            ErrorKind::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Cancelled(Cancellation),
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("Worker error: {0}")]
    Worker(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        StoreError::Conflict(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::Cancelled(_) => ErrorKind::Cancelled,
            _ => ErrorKind::BackendUnavailable,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Only backend failures are worth retrying; the store never retries itself.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::BackendUnavailable
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        StoreError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for StoreError {
    fn from(e: redb::Error) -> Self {
        StoreError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        StoreError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Transaction(Box::new(e))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Worker(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the embedded metadata database.
///
/// redb admits one write transaction at a time, so every read-modify-write
/// operation below runs inside a single write transaction and cannot lose an
/// update to a concurrent writer.
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub files: u64,
    pub revisions: u64,
    pub permissions: u64,
    pub accounts: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("homecloud-meta.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        let write_txn = db.begin_write()?;
        for table in ALL_TABLES {
            let _ = write_txn.open_table(table)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction once the context is confirmed live.
    pub(crate) fn begin_read(&self, ctx: &Context) -> StoreResult<ReadTransaction> {
        ctx.check()?;
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction once the context is confirmed live.
    pub(crate) fn begin_write(&self, ctx: &Context) -> StoreResult<WriteTransaction> {
        ctx.check()?;
        Ok(self.db.begin_write()?)
    }

    /// Commit unless the context was cancelled while the transaction was open.
    pub(crate) fn commit(&self, ctx: &Context, txn: WriteTransaction) -> StoreResult<()> {
        if let Err(e) = ctx.check() {
            txn.abort()?;
            return Err(e);
        }
        txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all data - for testing only
    pub fn purge_all(&self, ctx: &Context) -> StoreResult<PurgeStats> {
        let write_txn = self.begin_write(ctx)?;
        let mut stats = PurgeStats::default();

        stats.files = clear_table(&write_txn, FILES)?;
        clear_table(&write_txn, OWNER_FILES)?;
        stats.revisions = clear_table(&write_txn, REVISIONS)?;
        clear_table(&write_txn, FILE_REVISIONS)?;
        stats.permissions = clear_table(&write_txn, PERMISSIONS)?;
        clear_table(&write_txn, FILE_PERMISSIONS)?;
        stats.accounts = clear_table(&write_txn, ACCOUNTS)?;

        self.commit(ctx, write_txn)?;
        tracing::warn!(
            files = stats.files,
            revisions = stats.revisions,
            permissions = stats.permissions,
            accounts = stats.accounts,
            "Purged all data"
        );
        Ok(stats)
    }
}

fn clear_table(txn: &WriteTransaction, table: RecordTable) -> StoreResult<u64> {
    let keys: Vec<String> = {
        let t = txn.open_table(table)?;
        let keys = t
            .iter()?
            .map(|r| r.map(|(k, _)| k.value().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        keys
    };

    let mut t = txn.open_table(table)?;
    for key in &keys {
        t.remove(key.as_str())?;
    }
    Ok(keys.len() as u64)
}

// ============================================================================
// Record helpers shared by the per-entity modules
// ============================================================================

pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(data: &[u8]) -> StoreResult<T> {
    Ok(rmp_serde::from_slice(data)?)
}

/// Read one record inside a read transaction.
pub(crate) fn read<T: DeserializeOwned>(
    txn: &ReadTransaction,
    table: RecordTable,
    key: &str,
) -> StoreResult<Option<T>> {
    let t = txn.open_table(table)?;
    let result = match t.get(key)? {
        Some(data) => Some(decode(data.value())?),
        None => None,
    };
    Ok(result)
}

/// Read one record inside a write transaction.
pub(crate) fn load<T: DeserializeOwned>(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
) -> StoreResult<Option<T>> {
    let t = txn.open_table(table)?;
    let result = match t.get(key)? {
        Some(data) => Some(decode(data.value())?),
        None => None,
    };
    Ok(result)
}

pub(crate) fn store<T: Serialize>(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let data = encode(value)?;
    let mut t = txn.open_table(table)?;
    t.insert(key, data.as_slice())?;
    Ok(())
}

/// Remove a record, returning whether it existed.
pub(crate) fn erase(txn: &WriteTransaction, table: RecordTable, key: &str) -> StoreResult<bool> {
    let mut t = txn.open_table(table)?;
    let existed = t.remove(key)?.is_some();
    Ok(existed)
}

/// Ids listed under `key` in an index table, read-only.
pub(crate) fn read_index(
    txn: &ReadTransaction,
    table: RecordTable,
    key: &str,
) -> StoreResult<Vec<String>> {
    Ok(read::<Vec<String>>(txn, table, key)?.unwrap_or_default())
}

/// Ids listed under `key` in an index table, inside a write transaction.
pub(crate) fn load_index(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
) -> StoreResult<Vec<String>> {
    Ok(load::<Vec<String>>(txn, table, key)?.unwrap_or_default())
}

pub(crate) fn index_insert(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
    id: &str,
) -> StoreResult<()> {
    let mut ids = load_index(txn, table, key)?;
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        store(txn, table, key, &ids)?;
    }
    Ok(())
}

/// Remove `id` from the index entry, dropping the entry once it is empty.
pub(crate) fn index_remove(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
    id: &str,
) -> StoreResult<()> {
    let mut ids = load_index(txn, table, key)?;
    let before = ids.len();
    ids.retain(|existing| existing != id);
    if ids.len() == before {
        return Ok(());
    }
    if ids.is_empty() {
        erase(txn, table, key)?;
    } else {
        store(txn, table, key, &ids)?;
    }
    Ok(())
}
