// todo - personal task tracker on SQLite

pub mod error;
pub mod filter;
pub mod models;
pub mod output;
pub mod store;

// Re-export main types for convenience
pub use error::{Result, StoreError};
pub use filter::{DateFilter, TaskFilter};
pub use models::{Task, TaskCounts, TaskId, TaskState, parse_task_id};
pub use store::{SCHEMA_VERSION, Store};
