use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table};

use super::db::{get_record, Database, DatabaseError};
use super::models::{
    BoardRecord, BoardSnapshot, TaskOp, TaskOpOutcome, TaskRecord, TextLimits,
};
use super::tables::*;
use crate::ids::{random_id, TASK_ID_BYTES};

type BlobTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

impl Database {
    // ========================================================================
    // Board operations
    // ========================================================================

    /// Return the board for `slug`, creating it with the default title if it
    /// does not exist yet.
    pub fn ensure_board(&self, slug: &str) -> Result<BoardRecord, DatabaseError> {
        {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(BOARDS)?;
            if let Some(board) = get_record::<BoardRecord>(&table, slug)? {
                return Ok(board);
            }
        }

        let write_txn = self.begin_write()?;
        let board = {
            let mut table = write_txn.open_table(BOARDS)?;
            // Another writer may have created it between the two transactions
            match get_record::<BoardRecord>(&table, slug)? {
                Some(existing) => existing,
                None => {
                    let board = BoardRecord::new(slug, Utc::now());
                    let data = rmp_serde::to_vec_named(&board)?;
                    table.insert(slug, data.as_slice())?;
                    tracing::debug!(board = %slug, "Created board");
                    board
                }
            }
        };
        write_txn.commit()?;
        Ok(board)
    }

    /// Get a board without creating it
    pub fn get_board(&self, slug: &str) -> Result<Option<BoardRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(BOARDS)?;
        get_record(&table, slug)
    }

    /// Read a board and its tasks ordered by `(sort_order, created_at)`.
    /// Unknown boards are created first.
    pub fn board_snapshot(&self, slug: &str) -> Result<BoardSnapshot, DatabaseError> {
        self.ensure_board(slug)?;

        let read_txn = self.begin_read()?;
        let boards = read_txn.open_table(BOARDS)?;
        let tasks_table = read_txn.open_table(TASKS)?;
        let index = read_txn.open_table(BOARD_TASKS)?;

        // A purge may race the upsert above; fall back to a fresh record
        let board = get_record::<BoardRecord>(&boards, slug)?
            .unwrap_or_else(|| BoardRecord::new(slug, Utc::now()));

        let ids: Vec<String> = get_record(&index, slug)?.unwrap_or_default();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = get_record::<TaskRecord>(&tasks_table, &id)? {
                tasks.push(task);
            }
        }
        sort_tasks(&mut tasks);

        Ok(BoardSnapshot { board, tasks })
    }

    /// Apply one task operation atomically and refresh the board's
    /// `updated_at` and `version`, whether or not the operation changed
    /// anything. Nothing is written when `expected_version` is stale.
    pub fn apply_task_op(
        &self,
        slug: &str,
        op: &TaskOp,
        expected_version: Option<u64>,
        limits: TextLimits,
    ) -> Result<TaskOpOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;

        let outcome = {
            let mut boards = write_txn.open_table(BOARDS)?;
            let mut tasks = write_txn.open_table(TASKS)?;
            let mut index = write_txn.open_table(BOARD_TASKS)?;

            let mut board = get_record::<BoardRecord>(&boards, slug)?
                .unwrap_or_else(|| BoardRecord::new(slug, Utc::now()));

            if let Some(expected) = expected_version {
                if expected != board.version {
                    return Err(DatabaseError::VersionMismatch {
                        expected,
                        actual: board.version,
                    });
                }
            }

            let stamp = board.next_stamp(Utc::now());
            let mut ids: Vec<String> = get_record(&index, slug)?.unwrap_or_default();
            let mut outcome = TaskOpOutcome::default();

            match op {
                TaskOp::Add { text } => {
                    let text = text.trim();
                    if !text.is_empty() && text.len() <= limits.max_text_length {
                        let next_order = max_sort_order(&tasks, &ids)? + 1;
                        let task = TaskRecord {
                            id: random_id(TASK_ID_BYTES)?,
                            board_slug: slug.to_string(),
                            text: text.to_string(),
                            is_done: false,
                            is_published: false,
                            sort_order: next_order,
                            created_at: stamp,
                            updated_at: stamp,
                        };
                        put_task(&mut tasks, &task)?;
                        ids.push(task.id.clone());
                        outcome.added_task_id = Some(task.id);
                    }
                }
                TaskOp::Toggle { id } => {
                    update_task(&mut tasks, slug, id, stamp, |t| t.is_done = !t.is_done)?;
                }
                TaskOp::Edit { id, text } => {
                    let text = text.trim();
                    if text.len() <= limits.max_text_length {
                        update_task(&mut tasks, slug, id, stamp, |t| t.text = text.to_string())?;
                    }
                }
                TaskOp::Del { id } => {
                    if ids.contains(id) && board_task(&tasks, slug, id)?.is_some() {
                        tasks.remove(id.as_str())?;
                        ids.retain(|tid| tid != id);
                    }
                }
                TaskOp::Title { title } => {
                    let title = title.trim();
                    if title.len() <= limits.max_title_length {
                        board.title = title.to_string();
                    }
                }
                TaskOp::ClearDone => {
                    let mut kept = Vec::with_capacity(ids.len());
                    for id in ids {
                        match board_task(&tasks, slug, &id)? {
                            Some(task) if task.is_done => {
                                tasks.remove(id.as_str())?;
                            }
                            Some(_) => kept.push(id),
                            None => {}
                        }
                    }
                    ids = kept;
                }
                TaskOp::SetAll { done } => {
                    for id in &ids {
                        update_task(&mut tasks, slug, id, stamp, |t| t.is_done = *done)?;
                    }
                }
                TaskOp::ClearAll => {
                    for id in ids.drain(..) {
                        tasks.remove(id.as_str())?;
                    }
                }
                TaskOp::Reorder { order } => {
                    for (position, id) in order.iter().enumerate() {
                        if ids.contains(id) {
                            update_task(&mut tasks, slug, id, stamp, |t| {
                                t.sort_order = position as i64
                            })?;
                        }
                    }
                }
                TaskOp::Publish { id } => {
                    if update_task(&mut tasks, slug, id, stamp, |t| t.is_published = true)? {
                        outcome.published_task_id = Some(id.clone());
                    }
                }
            }

            board.updated_at = stamp;
            board.version += 1;
            outcome.version = board.version;

            let data = rmp_serde::to_vec_named(&board)?;
            boards.insert(slug, data.as_slice())?;

            let index_data = rmp_serde::to_vec_named(&ids)?;
            index.insert(slug, index_data.as_slice())?;

            outcome
        };

        if let (Some(task_id), TaskOp::Add { text }) = (&outcome.added_task_id, op) {
            self.append_event_in(
                &write_txn,
                "task_added",
                serde_json::json!({ "board": slug, "task_id": task_id, "text": text.trim() }),
            )?;
        }
        if let Some(ref task_id) = outcome.published_task_id {
            self.append_event_in(
                &write_txn,
                "task_published",
                serde_json::json!({ "board": slug, "task_id": task_id }),
            )?;
        }

        write_txn.commit()?;
        Ok(outcome)
    }

    /// Every published task across all boards, most recently updated first.
    pub fn list_published_tasks(&self) -> Result<Vec<TaskRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(TASKS)?;

        let mut published = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let task: TaskRecord = rmp_serde::from_slice(value.value())?;
            if task.is_published {
                published.push(task);
            }
        }
        published.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(published)
    }
}

/// Display order: `sort_order` ascending, ties broken by creation time.
pub fn sort_tasks(tasks: &mut [TaskRecord]) {
    tasks.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then(a.created_at.cmp(&b.created_at))
    });
}

fn put_task(tasks: &mut BlobTable<'_>, task: &TaskRecord) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(task)?;
    tasks.insert(task.id.as_str(), data.as_slice())?;
    Ok(())
}

/// Load a task only if it belongs to `slug`.
fn board_task(
    tasks: &BlobTable<'_>,
    slug: &str,
    id: &str,
) -> Result<Option<TaskRecord>, DatabaseError> {
    Ok(get_record::<TaskRecord>(tasks, id)?.filter(|t| t.board_slug == slug))
}

/// Apply `change` to a task of `slug` and stamp it. Returns false when the
/// task is not on this board.
fn update_task(
    tasks: &mut BlobTable<'_>,
    slug: &str,
    id: &str,
    stamp: DateTime<Utc>,
    change: impl FnOnce(&mut TaskRecord),
) -> Result<bool, DatabaseError> {
    match board_task(tasks, slug, id)? {
        Some(mut task) => {
            change(&mut task);
            task.updated_at = stamp;
            put_task(tasks, &task)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn max_sort_order(tasks: &BlobTable<'_>, ids: &[String]) -> Result<i64, DatabaseError> {
    let mut max = 0;
    for id in ids {
        if let Some(task) = get_record::<TaskRecord>(tasks, id)? {
            max = max.max(task.sort_order);
        }
    }
    Ok(max)
}
