use chrono::Utc;
use redb::ReadableTable;

use super::db::{get_record, Database, DatabaseError};
use super::models::LinkRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // Link operations
    // ========================================================================

    /// Insert a new link. Fails with `Conflict` when the slug is taken.
    pub fn create_link(&self, slug: &str, url: &str) -> Result<LinkRecord, DatabaseError> {
        debug_assert!(!slug.is_empty(), "link slug must not be empty");

        let write_txn = self.begin_write()?;
        let link = {
            let mut table = write_txn.open_table(LINKS)?;
            if table.get(slug)?.is_some() {
                return Err(DatabaseError::Conflict(format!(
                    "link slug '{slug}' is already in use"
                )));
            }

            let link = LinkRecord {
                slug: slug.to_string(),
                url: url.to_string(),
                views: 0,
                created_at: Utc::now(),
            };
            let data = rmp_serde::to_vec_named(&link)?;
            table.insert(slug, data.as_slice())?;
            link
        };
        write_txn.commit()?;
        Ok(link)
    }

    pub fn get_link(&self, slug: &str) -> Result<Option<LinkRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(LINKS)?;
        get_record(&table, slug)
    }

    /// Increment the view counter, returning the updated link.
    pub fn record_link_view(&self, slug: &str) -> Result<Option<LinkRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(LINKS)?;
            match get_record::<LinkRecord>(&table, slug)? {
                Some(mut link) => {
                    link.views += 1;
                    let data = rmp_serde::to_vec_named(&link)?;
                    table.insert(slug, data.as_slice())?;
                    Some(link)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }
}
