use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A board row. Boards are created on first reference to their slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRecord {
    pub slug: String,
    pub title: String,
    /// Incremented on every successful task operation
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BoardRecord {
    pub fn new(slug: &str, now: DateTime<Utc>) -> Self {
        Self {
            slug: slug.to_string(),
            title: default_board_title(slug),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Timestamp for the next mutation; strictly later than the current `updated_at`
    /// even when the wall clock has not advanced.
    pub fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        }
    }
}

pub fn default_board_title(slug: &str) -> String {
    format!("Board: {slug}")
}

/// A task row, owned by exactly one board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub board_slug: String,
    pub text: String,
    pub is_done: bool,
    pub is_published: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A board with its tasks in display order.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub board: BoardRecord,
    pub tasks: Vec<TaskRecord>,
}

impl BoardSnapshot {
    /// Latest task modification, if the board has any tasks.
    pub fn last_task_update(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.updated_at).max()
    }
}

/// A symbolic task operation. The `op` field selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskOp {
    Add {
        #[serde(default)]
        text: String,
    },
    Toggle {
        #[serde(default)]
        id: String,
    },
    Edit {
        #[serde(default)]
        id: String,
        #[serde(default)]
        text: String,
    },
    Del {
        #[serde(default)]
        id: String,
    },
    Title {
        #[serde(default = "default_title_op")]
        title: String,
    },
    ClearDone,
    SetAll {
        #[serde(default)]
        done: bool,
    },
    ClearAll,
    Reorder {
        #[serde(default)]
        order: Vec<String>,
    },
    Publish {
        #[serde(default)]
        id: String,
    },
}

fn default_title_op() -> String {
    "My Board".to_string()
}

impl TaskOp {
    pub fn name(&self) -> &'static str {
        match self {
            TaskOp::Add { .. } => "add",
            TaskOp::Toggle { .. } => "toggle",
            TaskOp::Edit { .. } => "edit",
            TaskOp::Del { .. } => "del",
            TaskOp::Title { .. } => "title",
            TaskOp::ClearDone => "clear_done",
            TaskOp::SetAll { .. } => "set_all",
            TaskOp::ClearAll => "clear_all",
            TaskOp::Reorder { .. } => "reorder",
            TaskOp::Publish { .. } => "publish",
        }
    }
}

/// Length limits applied to free text carried by task operations (bytes).
#[derive(Debug, Clone, Copy)]
pub struct TextLimits {
    pub max_text_length: usize,
    pub max_title_length: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            max_text_length: 10_000,
            max_title_length: 200,
        }
    }
}

/// What a committed task operation did.
#[derive(Debug, Clone, Default)]
pub struct TaskOpOutcome {
    pub version: u64,
    /// Set when `add` inserted a task
    pub added_task_id: Option<String>,
    /// Set when `publish` hit an existing task
    pub published_task_id: Option<String>,
}

/// A shortened link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub slug: String,
    pub url: String,
    pub views: u64,
    pub created_at: DateTime<Utc>,
}

/// Metadata for an uploaded blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Assigned by the store on insert
    pub id: u64,
    /// Unique name of the blob on disk
    pub filename: String,
    /// Display name supplied by the client
    pub original_name: String,
    pub filesize: u64,
    pub mime_type: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

/// Every stored file plus a revision that each insert and delete advances.
#[derive(Debug, Clone, Default)]
pub struct FileListing {
    pub revision: u64,
    /// Newest first
    pub files: Vec<FileRecord>,
}

/// An entry on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    /// Unix seconds
    pub ts: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}
