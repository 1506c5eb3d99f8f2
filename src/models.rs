// Data models for the task store

use crate::error::{Result, StoreError};
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat};
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned task identifier
pub type TaskId = i64;

/// Snapshot of a stored task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub state: TaskState,
    pub tag: Option<String>,
    pub created_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.state == TaskState::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Done,
}

impl TaskState {
    /// Integer persisted in the `state` column
    pub fn code(self) -> i64 {
        match self {
            TaskState::Pending => 0,
            TaskState::Done => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TaskState::Pending),
            1 => Some(TaskState::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Done => "done",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "todo" => Ok(TaskState::Pending),
            "done" => Ok(TaskState::Done),
            other => Err(StoreError::invalid_input(format!("unknown task state: {:?}", other))),
        }
    }
}

impl ToSql for TaskState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for TaskState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        TaskState::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// Number of tasks per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: u64,
    pub done: u64,
}

impl TaskCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.done
    }
}

/// Parse a user-supplied task id
pub fn parse_task_id(s: &str) -> Result<TaskId> {
    let s = s.trim();
    match s.parse::<TaskId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(StoreError::invalid_input(format!("not a valid task id: {:?}", s))),
    }
}

/// Timestamps are persisted as RFC 3339 text in the local offset, so the
/// first ten characters are always the local calendar date.
pub(crate) fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub(crate) fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Local>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Local))
}

/// Parse timestamps written by earlier releases: RFC 3339 (with or without
/// nanoseconds), `YYYY-MM-DD HH:MM:SS[.f][+HH:MM]`, or a naive local time.
pub(crate) fn parse_legacy_timestamp(s: &str) -> Option<DateTime<Local>> {
    let s = s.trim();
    if let Ok(ts) = parse_timestamp(s) {
        return Some(ts);
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Some(ts.with_timezone(&Local));
        }
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_state_codes() {
        assert_eq!(TaskState::Pending.code(), 0);
        assert_eq!(TaskState::Done.code(), 1);
        assert_eq!(TaskState::from_code(0), Some(TaskState::Pending));
        assert_eq!(TaskState::from_code(1), Some(TaskState::Done));
        assert_eq!(TaskState::from_code(2), None);
        assert_eq!(TaskState::from_code(-1), None);
    }

    #[test]
    fn test_state_display_and_parse() {
        assert_eq!(TaskState::Pending.to_string(), "pending");
        assert_eq!(TaskState::Done.to_string(), "done");
        assert_eq!("Done".parse::<TaskState>().unwrap(), TaskState::Done);
        assert_eq!("todo".parse::<TaskState>().unwrap(), TaskState::Pending);
        assert!(matches!("later".parse::<TaskState>(), Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&TaskState::Done).unwrap();
        assert_eq!(json, "\"done\"");
    }

    #[test]
    fn test_parse_task_id() {
        assert_eq!(parse_task_id("12").unwrap(), 12);
        assert_eq!(parse_task_id(" 3 ").unwrap(), 3);
        assert!(matches!(parse_task_id("abc"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(parse_task_id(""), Err(StoreError::InvalidInput(_))));
        assert!(matches!(parse_task_id("0"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(parse_task_id("-4"), Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn test_timestamp_keeps_local_date_prefix() {
        let ts = Local.with_ymd_and_hms(2024, 2, 1, 23, 30, 0).unwrap();
        let text = format_timestamp(&ts);
        assert!(text.starts_with("2024-02-01T23:30:00"));

        let parsed = parse_timestamp(&text).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_legacy_timestamp() {
        let expected = Local.with_ymd_and_hms(2024, 2, 1, 9, 15, 0).unwrap();
        assert_eq!(parse_legacy_timestamp("2024-02-01 09:15:00"), Some(expected));
        assert_eq!(parse_legacy_timestamp("2024-02-01T09:15:00"), Some(expected));

        let utc = DateTime::parse_from_rfc3339("2024-02-01T09:15:00Z").unwrap();
        assert_eq!(parse_legacy_timestamp("2024-02-01T09:15:00.5Z").unwrap().timestamp(), utc.timestamp());
        assert_eq!(parse_legacy_timestamp("2024-02-01 09:15:00+00:00").unwrap(), utc);
        assert_eq!(parse_legacy_timestamp("2024-02-01 10:15:00 +0100").unwrap(), utc);

        assert_eq!(parse_legacy_timestamp("yesterday"), None);
    }

    #[test]
    fn test_task_counts_total() {
        let counts = TaskCounts { pending: 2, done: 3 };
        assert_eq!(counts.total(), 5);
    }
}
