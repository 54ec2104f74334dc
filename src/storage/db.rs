use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;
use crate::ids::RandomError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Random(#[from] RandomError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("Board version is {actual}, expected {expected}")]
    VersionMismatch { expected: u64, actual: u64 },
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// Events retained when no capacity is configured.
pub const DEFAULT_EVENT_CAPACITY: u64 = 10_000;

pub struct Database {
    db: Arc<RedbDatabase>,
    event_capacity: u64,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            event_capacity: self.event_capacity,
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub boards: u64,
    pub events: u64,
    pub files: u64,
    pub links: u64,
    pub tasks: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("pkm-hub.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(BOARDS)?;
            let _ = write_txn.open_table(TASKS)?;
            let _ = write_txn.open_table(BOARD_TASKS)?;
            let _ = write_txn.open_table(LINKS)?;
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(FILE_NAMES)?;
            let _ = write_txn.open_table(EVENTS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        })
    }

    /// Cap the number of events the bus retains.
    pub fn with_event_capacity(mut self, capacity: u64) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn event_capacity(&self) -> u64 {
        self.event_capacity
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all data - for testing only
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stats = PurgeStats {
            boards: clear_str_table(&write_txn, BOARDS)?,
            tasks: clear_str_table(&write_txn, TASKS)?,
            links: clear_str_table(&write_txn, LINKS)?,
            files: clear_u64_table(&write_txn, FILES)?,
            events: clear_u64_table(&write_txn, EVENTS)?,
        };
        clear_str_table(&write_txn, BOARD_TASKS)?;
        clear_str_table(&write_txn, FILE_NAMES)?;
        clear_str_table(&write_txn, SEQUENCES)?;

        write_txn.commit()?;
        Ok(stats)
    }
}

fn clear_str_table<V: redb::Value + 'static>(
    write_txn: &WriteTransaction,
    definition: redb::TableDefinition<'static, &'static str, V>,
) -> Result<u64, DatabaseError> {
    let table = write_txn.open_table(definition)?;
    let keys: Vec<String> = table
        .iter()?
        .map(|r| r.map(|(k, _)| k.value().to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    drop(table);

    let mut table = write_txn.open_table(definition)?;
    for key in &keys {
        table.remove(key.as_str())?;
    }
    Ok(keys.len() as u64)
}

fn clear_u64_table<V: redb::Value + 'static>(
    write_txn: &WriteTransaction,
    definition: redb::TableDefinition<'static, u64, V>,
) -> Result<u64, DatabaseError> {
    let table = write_txn.open_table(definition)?;
    let keys: Vec<u64> = table
        .iter()?
        .map(|r| r.map(|(k, _)| k.value()))
        .collect::<Result<Vec<_>, _>>()?;
    drop(table);

    let mut table = write_txn.open_table(definition)?;
    for key in &keys {
        table.remove(*key)?;
    }
    Ok(keys.len() as u64)
}

/// Fetch and decode a msgpack row keyed by string.
pub(crate) fn get_record<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<Option<T>, DatabaseError> {
    match table.get(key)? {
        Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
        None => Ok(None),
    }
}

/// Allocate the next value of a named counter inside `write_txn`, starting at 1.
pub(crate) fn next_sequence(
    write_txn: &WriteTransaction,
    name: &str,
) -> Result<u64, DatabaseError> {
    let mut table = write_txn.open_table(SEQUENCES)?;
    let next = table.get(name)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(name, next)?;
    Ok(next)
}
