mod admin;
mod boards;
mod events;
mod files;
mod links;
mod notes;
mod static_files;

use crate::api::response::ApiError;
use crate::dispatcher::DispatchError;

pub use admin::{admin_purge, health};
pub use boards::{
    calendar, calendar_query, get_board, inbox_item, post_task_op, published, quick_add,
};
pub use events::{emit_event, tail_events};
pub use files::{create_file, delete_file, list_files};
pub use links::{create_link, get_link, redirect_link};
pub use notes::publish_note;
pub use static_files::serve_static;

/// Map a dispatcher failure to an ApiError
fn dispatch_error(e: DispatchError) -> ApiError {
    match e {
        DispatchError::Unrecognized(message) => {
            ApiError::bad_request(format!("Unrecognized operation: {message}"))
        }
        DispatchError::Storage(e) => ApiError::storage("Failed to apply task operation")(e),
    }
}

/// Record an event without letting a failure reach the caller.
fn log_event(state: &crate::AppState, event_type: &str, payload: serde_json::Value) {
    if let Err(e) = state.db.append_event(event_type, payload) {
        tracing::warn!(event_type, error = %e, "Failed to record event");
    }
}
