use redb::{ReadableTable, ReadableTableMetadata, WriteTransaction};

use super::db::{next_sequence, Database, DatabaseError};
use super::models::EventRecord;
use super::tables::*;

const EVENT_SEQUENCE: &str = "next_event_seq";

impl Database {
    // ========================================================================
    // Event bus
    // ========================================================================

    /// Append an event in its own transaction.
    pub fn append_event(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventRecord, DatabaseError> {
        let write_txn = self.begin_write()?;
        let event = self.append_event_in(&write_txn, event_type, payload)?;
        write_txn.commit()?;
        Ok(event)
    }

    /// Append an event as part of a caller-owned transaction, dropping the
    /// oldest entries once the log exceeds its capacity.
    pub(crate) fn append_event_in(
        &self,
        write_txn: &WriteTransaction,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventRecord, DatabaseError> {
        let seq = next_sequence(write_txn, EVENT_SEQUENCE)?;
        let event = EventRecord {
            id: uuid::Uuid::new_v4().simple().to_string(),
            ts: chrono::Utc::now().timestamp(),
            event_type: event_type.to_string(),
            payload,
        };

        let mut table = write_txn.open_table(EVENTS)?;
        let data = rmp_serde::to_vec_named(&event)?;
        table.insert(seq, data.as_slice())?;

        let excess = table.len()?.saturating_sub(self.event_capacity());
        if excess > 0 {
            let stale: Vec<u64> = table
                .iter()?
                .take(excess as usize)
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()?;
            for key in stale {
                table.remove(key)?;
            }
        }

        Ok(event)
    }

    /// The most recent `n` events, oldest first.
    pub fn tail_events(&self, n: usize) -> Result<Vec<EventRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(EVENTS)?;

        let mut events = Vec::with_capacity(n);
        for result in table.iter()?.rev().take(n) {
            let (_, value) = result?;
            events.push(rmp_serde::from_slice::<EventRecord>(value.value())?);
        }
        events.reverse();
        Ok(events)
    }
}
