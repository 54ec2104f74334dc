mod boards;
pub mod db;
mod events;
mod files;
mod links;
pub mod models;
mod tables;

pub use boards::sort_tasks;
pub use db::{Database, DatabaseError};
pub use tables::*;
