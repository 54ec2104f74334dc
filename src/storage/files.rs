use redb::ReadableTable;

use super::db::{next_sequence, Database, DatabaseError};
use super::models::{FileListing, FileRecord};
use super::tables::*;

const FILE_SEQUENCE: &str = "next_file_id";
const FILES_REVISION: &str = "files_revision";

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a file record, assigning its id. The stored filename must be unused.
    pub fn insert_file(&self, mut file: FileRecord) -> Result<FileRecord, DatabaseError> {
        debug_assert!(!file.filename.is_empty(), "stored filename must not be empty");

        let write_txn = self.begin_write()?;
        {
            let names = write_txn.open_table(FILE_NAMES)?;
            if names.get(file.filename.as_str())?.is_some() {
                return Err(DatabaseError::Conflict(format!(
                    "filename '{}' is already in use",
                    file.filename
                )));
            }
        }

        file.id = next_sequence(&write_txn, FILE_SEQUENCE)?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(&file)?;
            table.insert(file.id, data.as_slice())?;

            let mut names = write_txn.open_table(FILE_NAMES)?;
            names.insert(file.filename.as_str(), file.id)?;
        }
        next_sequence(&write_txn, FILES_REVISION)?;
        write_txn.commit()?;
        Ok(file)
    }

    pub fn get_file(&self, id: u64) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a stored filename to its record
    pub fn get_file_by_name(&self, filename: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let names = read_txn.open_table(FILE_NAMES)?;

        let id = match names.get(filename)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(FILES)?;
        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Delete a file record and its filename index entry, returning the removed record.
    pub fn delete_file(&self, id: u64) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let removed = {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = match table.remove(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            existing
        };

        if let Some(ref file) = removed {
            let mut names = write_txn.open_table(FILE_NAMES)?;
            names.remove(file.filename.as_str())?;
            drop(names);
            next_sequence(&write_txn, FILES_REVISION)?;
        }

        write_txn.commit()?;
        Ok(removed)
    }

    /// All files, newest first
    pub fn list_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        Ok(self.file_listing()?.files)
    }

    /// All files, newest first, with the revision they were read at.
    pub fn file_listing(&self) -> Result<FileListing, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        let sequences = read_txn.open_table(SEQUENCES)?;

        let revision = sequences.get(FILES_REVISION)?.map(|v| v.value()).unwrap_or(0);

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            files.push(rmp_serde::from_slice::<FileRecord>(value.value())?);
        }

        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(FileListing { revision, files })
    }
}
