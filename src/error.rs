// Error taxonomy for the task store

use crate::models::TaskId;
use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file or its directory cannot be created, opened, read or written
    #[error("storage unavailable during {op}: {source}")]
    StorageUnavailable {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("task with the id {0} not found")]
    TaskNotFound(TaskId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The database was written by a newer schema than this build knows about
    #[error("database schema version {found} is newer than supported {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// Any other SQLite failure, tagged with the operation that hit it
    #[error("{op} failed: {source}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        StoreError::InvalidInput(msg.into())
    }

    /// True for errors a caller can report and re-prompt on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::TaskNotFound(_) | StoreError::InvalidInput(_))
    }

    pub(crate) fn io(op: &'static str, err: std::io::Error) -> Self {
        StoreError::StorageUnavailable {
            op,
            source: Box::new(err),
        }
    }

    /// Classify a rusqlite error: I/O-ish codes become `StorageUnavailable`,
    /// everything else is wrapped with the operation name.
    pub(crate) fn sqlite(op: &'static str, err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::DiskFull
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase,
            ) => StoreError::StorageUnavailable {
                op,
                source: Box::new(err),
            },
            _ => StoreError::Sqlite { op, source: err },
        }
    }
}

/// Shorthand for `.map_err(sql_err("op"))`
pub(crate) fn sql_err(op: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |err| StoreError::sqlite(op, err)
}
