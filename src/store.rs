// Task store implementation on SQLite

use crate::error::{Result, StoreError, sql_err};
use crate::filter::TaskFilter;
use crate::models::{Task, TaskCounts, TaskId, TaskState, format_timestamp, parse_legacy_timestamp, parse_timestamp};
use chrono::{DateTime, Local, NaiveDate};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Schema version recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

const TASK_COLUMNS: &str = "id, text, state, tag, date_created, date_completed";

const CREATE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        text           TEXT NOT NULL,
        state          INTEGER NOT NULL,
        tag            TEXT,
        date_created   TEXT NOT NULL,
        date_completed TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);
    CREATE INDEX IF NOT EXISTS idx_tasks_date_created ON tasks(date_created);
"#;

/// Durable collection of tasks backed by a single SQLite file
///
/// All access to task records goes through this type; callers only ever see
/// [`Task`] snapshots.
pub struct Store {
    path: PathBuf,
    db: Connection,
}

impl Store {
    /// Open or create a store at the given database file path
    ///
    /// Missing parent directories are created. The schema is migrated on
    /// every open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_store_dir(parent)?;
        }

        let db = Connection::open(&path).map_err(sql_err("open"))?;
        db.busy_timeout(Duration::from_secs(5)).map_err(sql_err("open"))?;

        let mut store = Self { path, db };
        store.migrate()?;

        info!(path = %store.path.display(), "Opened task store");
        Ok(store)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the connection, reporting any error SQLite raises while doing so
    pub fn close(self) -> Result<()> {
        debug!(path = %self.path.display(), "close: called");
        self.db.close().map_err(|(_, err)| StoreError::sqlite("close", err))
    }

    fn migrate(&mut self) -> Result<()> {
        let found: u32 = self
            .db
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(sql_err("migrate"))?;

        if found > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        let tx = self.db.transaction().map_err(sql_err("migrate"))?;
        tx.execute_batch(CREATE_SCHEMA).map_err(sql_err("migrate"))?;

        let imported = import_legacy_todos(&tx)?;
        if imported > 0 {
            info!(count = imported, "Imported tasks from legacy todos table");
        }

        if found < SCHEMA_VERSION {
            debug!(from = found, to = SCHEMA_VERSION, "migrate: bumping user_version");
            tx.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .map_err(sql_err("migrate"))?;
        }

        tx.commit().map_err(sql_err("migrate"))?;
        Ok(())
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Add a new pending task and return its id
    pub fn create_task(&mut self, text: &str, tag: Option<&str>) -> Result<TaskId> {
        self.create_task_at(text, tag, Local::now())
    }

    pub(crate) fn create_task_at(&mut self, text: &str, tag: Option<&str>, created_at: DateTime<Local>) -> Result<TaskId> {
        let text = validate_text(text)?;
        let tag = tag.filter(|t| !t.is_empty());

        self.db
            .execute(
                "INSERT INTO tasks (text, state, tag, date_created) VALUES (?1, ?2, ?3, ?4)",
                params![text, TaskState::Pending, tag, format_timestamp(&created_at)],
            )
            .map_err(sql_err("create_task"))?;

        let id = self.db.last_insert_rowid();
        debug!(id, ?tag, "create_task: inserted");
        Ok(id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every task, optionally restricted to a tag
    pub fn list_all(&self, tag: Option<&str>) -> Result<Vec<Task>> {
        self.query("list_all", &TaskFilter::new().tag(tag))
    }

    /// Tasks in exactly one state
    pub fn list_by_state(&self, state: TaskState, tag: Option<&str>) -> Result<Vec<Task>> {
        self.query("list_by_state", &TaskFilter::new().state(state).tag(tag))
    }

    /// Tasks created on the given local calendar day
    pub fn list_by_creation_date(&self, date: NaiveDate, tag: Option<&str>) -> Result<Vec<Task>> {
        self.query("list_by_creation_date", &TaskFilter::new().created_on(date).tag(tag))
    }

    /// Tasks in the given state created on the given local calendar day
    pub fn list_by_state_and_date(&self, state: TaskState, date: NaiveDate, tag: Option<&str>) -> Result<Vec<Task>> {
        let filter = TaskFilter::new().state(state).created_on(date).tag(tag);
        self.query("list_by_state_and_date", &filter)
    }

    /// List tasks matching an arbitrary filter, in id order
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.query("list", filter)
    }

    /// Fetch a single task snapshot
    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.db
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                [id],
                task_from_row,
            )
            .optional()
            .map_err(sql_err("get_task"))
    }

    /// Number of pending and done tasks
    pub fn count_by_state(&self) -> Result<TaskCounts> {
        let mut stmt = self
            .db
            .prepare("SELECT state, COUNT(*) FROM tasks GROUP BY state")
            .map_err(sql_err("count_by_state"))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, TaskState>(0)?, row.get::<_, i64>(1)?)))
            .map_err(sql_err("count_by_state"))?;

        let mut counts = TaskCounts::default();
        for row in rows {
            let (state, n) = row.map_err(sql_err("count_by_state"))?;
            match state {
                TaskState::Pending => counts.pending = n as u64,
                TaskState::Done => counts.done = n as u64,
            }
        }

        Ok(counts)
    }

    fn query(&self, op: &'static str, filter: &TaskFilter) -> Result<Vec<Task>> {
        debug!(op, ?filter, "query: called");

        let (where_clause, params) = filter.to_sql();
        let sql = format!("SELECT {} FROM tasks{} ORDER BY id ASC", TASK_COLUMNS, where_clause);

        let mut stmt = self.db.prepare(&sql).map_err(sql_err(op))?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), task_from_row)
            .map_err(sql_err(op))?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql_err(op))
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    /// Mark a task as done
    ///
    /// Completing a task that is already done changes nothing, including its
    /// completion time.
    pub fn complete_task(&mut self, id: TaskId) -> Result<()> {
        self.complete_task_at(id, Local::now())
    }

    pub(crate) fn complete_task_at(&mut self, id: TaskId, completed_at: DateTime<Local>) -> Result<()> {
        let tx = self.db.transaction().map_err(sql_err("complete_task"))?;

        let state: Option<TaskState> = tx
            .query_row("SELECT state FROM tasks WHERE id = ?1", [id], |row| row.get(0))
            .optional()
            .map_err(sql_err("complete_task"))?;

        match state {
            None => return Err(StoreError::TaskNotFound(id)),
            Some(TaskState::Done) => {
                debug!(id, "complete_task: already done");
                return Ok(());
            }
            Some(TaskState::Pending) => {}
        }

        tx.execute(
            "UPDATE tasks SET state = ?1, date_completed = ?2 WHERE id = ?3",
            params![TaskState::Done, format_timestamp(&completed_at), id],
        )
        .map_err(sql_err("complete_task"))?;

        tx.commit().map_err(sql_err("complete_task"))?;
        debug!(id, "complete_task: done");
        Ok(())
    }

    /// Mark a task as pending again and clear its completion time
    pub fn reopen_task(&mut self, id: TaskId) -> Result<()> {
        let changed = self
            .db
            .execute(
                "UPDATE tasks SET state = ?1, date_completed = NULL WHERE id = ?2",
                params![TaskState::Pending, id],
            )
            .map_err(sql_err("reopen_task"))?;

        expect_one_row(id, changed)?;
        debug!(id, "reopen_task: done");
        Ok(())
    }

    /// Replace a task's text; state and timestamps are left alone
    pub fn rename_task(&mut self, id: TaskId, new_text: &str) -> Result<()> {
        let new_text = validate_text(new_text)?;

        let changed = self
            .db
            .execute("UPDATE tasks SET text = ?1 WHERE id = ?2", params![new_text, id])
            .map_err(sql_err("rename_task"))?;

        expect_one_row(id, changed)?;
        debug!(id, "rename_task: done");
        Ok(())
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Permanently remove a task
    pub fn delete_task(&mut self, id: TaskId) -> Result<()> {
        let changed = self
            .db
            .execute("DELETE FROM tasks WHERE id = ?1", [id])
            .map_err(sql_err("delete_task"))?;

        expect_one_row(id, changed)?;
        debug!(id, "delete_task: done");
        Ok(())
    }
}

/// Move rows from the `todos` table written by earlier releases into `tasks`
///
/// Ids are kept unless already taken. The legacy table is dropped afterwards,
/// so this runs at most once per database.
fn import_legacy_todos(tx: &Transaction<'_>) -> Result<usize> {
    let columns: Vec<String> = {
        let mut stmt = tx
            .prepare("SELECT name FROM pragma_table_info('todos')")
            .map_err(sql_err("migrate"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_err("migrate"))?;
        rows.collect::<rusqlite::Result<_>>().map_err(sql_err("migrate"))?
    };

    if columns.is_empty() {
        return Ok(0);
    }

    // The oldest layout had no tag column
    let tag_column = if columns.iter().any(|c| c == "tag") { "tag" } else { "NULL" };

    let legacy: Vec<Task> = {
        let mut stmt = tx
            .prepare(&format!(
                "SELECT id, todo, state, {}, date_created, date_completed FROM todos ORDER BY id ASC",
                tag_column
            ))
            .map_err(sql_err("migrate"))?;
        let rows = stmt.query_map([], legacy_task_from_row).map_err(sql_err("migrate"))?;
        rows.collect::<rusqlite::Result<_>>().map_err(sql_err("migrate"))?
    };

    for task in &legacy {
        let id_taken = tx
            .query_row("SELECT 1 FROM tasks WHERE id = ?1", [task.id], |_| Ok(()))
            .optional()
            .map_err(sql_err("migrate"))?
            .is_some();

        if id_taken {
            debug!(id = task.id, "import_legacy_todos: id taken, assigning a new one");
        }

        tx.execute(
            "INSERT INTO tasks (id, text, state, tag, date_created, date_completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                (!id_taken).then_some(task.id),
                task.text,
                task.state,
                task.tag,
                format_timestamp(&task.created_at),
                task.completed_at.as_ref().map(format_timestamp),
            ],
        )
        .map_err(sql_err("migrate"))?;
    }

    tx.execute_batch("DROP TABLE todos").map_err(sql_err("migrate"))?;
    Ok(legacy.len())
}

fn legacy_task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let state: TaskState = row.get(2)?;
    let tag: Option<String> = row.get(3)?;
    let created_at = legacy_timestamp_column(4, row.get(4)?)?;
    let completed_at = match row.get::<_, Value>(5)? {
        Value::Null => None,
        value => Some(legacy_timestamp_column(5, value)?),
    };

    // Keep completed_at present exactly when the task is done
    let completed_at = match state {
        TaskState::Pending => None,
        TaskState::Done => completed_at.or(Some(created_at)),
    };

    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        state,
        tag: tag.filter(|t| !t.is_empty()),
        created_at,
        completed_at,
    })
}

fn legacy_timestamp_column(idx: usize, value: Value) -> rusqlite::Result<DateTime<Local>> {
    match value {
        Value::Text(text) => parse_legacy_timestamp(&text)
            .ok_or_else(|| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unrecognised timestamp: {:?}", text).into())),
        Value::Integer(secs) => DateTime::from_timestamp(secs, 0)
            .map(|ts| ts.with_timezone(&Local))
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs)),
        other => Err(rusqlite::Error::InvalidColumnType(idx, "timestamp".to_string(), other.data_type())),
    }
}

fn create_store_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o770);
    }

    builder.create(dir).map_err(|e| StoreError::io("open", e))
}

fn validate_text(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StoreError::invalid_input("task text cannot be empty"));
    }
    Ok(text)
}

fn expect_one_row(id: TaskId, changed: usize) -> Result<()> {
    if changed == 0 {
        return Err(StoreError::TaskNotFound(id));
    }
    Ok(())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let tag: Option<String> = row.get(3)?;
    let created: String = row.get(4)?;
    let completed: Option<String> = row.get(5)?;

    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        state: row.get(2)?,
        tag: tag.filter(|t| !t.is_empty()),
        created_at: timestamp_column(4, &created)?,
        completed_at: completed.as_deref().map(|s| timestamp_column(5, s)).transpose()?,
    })
}

fn timestamp_column(idx: usize, value: &str) -> rusqlite::Result<DateTime<Local>> {
    parse_timestamp(value).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
