use redb::TableDefinition;

/// Boards: slug -> BoardRecord (msgpack)
pub const BOARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("boards");

/// Tasks: task id -> TaskRecord (msgpack)
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Board index: board slug -> msgpack Vec of task ids
pub const BOARD_TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("board_tasks");

/// Short links: slug -> LinkRecord (msgpack)
pub const LINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("links");

/// File records: numeric id -> FileRecord (msgpack)
pub const FILES: TableDefinition<u64, &[u8]> = TableDefinition::new("files");

/// Stored filename index: filename -> file id (for /static/ route lookups)
pub const FILE_NAMES: TableDefinition<&str, u64> = TableDefinition::new("file_names");

/// Event bus: sequence number -> EventRecord (msgpack)
pub const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

/// Counters for id allocation (`next_file_id`, `next_event_seq`)
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
