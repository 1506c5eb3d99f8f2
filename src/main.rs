use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use eyre::{Result, WrapErr, eyre};
use std::io::IsTerminal;
use std::path::PathBuf;
use todo::{DateFilter, Store, TaskState, output, parse_task_id};
use tracing::level_filters::LevelFilter;

const TODO_DIR: &str = ".todo";
const TODO_DB_FILE: &str = "todos.db";

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "todo is a simple cli utility to manage tasks in progress")]
#[command(version)]
struct Cli {
    /// Path to the SQLite database [default: ~/.todo/todos.db]
    #[arg(long, env = "TODO_DB", global = true)]
    db: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new task
    Add {
        /// Task description
        text: String,

        /// Optional label to filter by later
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// List your tasks; only pending ones unless told otherwise
    List {
        #[arg(value_enum, default_value_t = ListScope::Pending)]
        scope: ListScope,

        /// Creation date: YYYY-MM-DD, today or yesterday
        #[arg(short, long)]
        date: Option<String>,

        /// Only tasks with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Print tasks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark the task with the given id as done
    Done { id: String },

    /// Mark the task with the given id as pending again
    Pending { id: String },

    /// Change the text of a task
    Rename { id: String, text: String },

    /// Delete the task with the given id
    Delete { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListScope {
    All,
    Pending,
    Done,
}

impl ListScope {
    fn state(self) -> Option<TaskState> {
        match self {
            ListScope::All => None,
            ListScope::Pending => Some(TaskState::Pending),
            ListScope::Done => Some(TaskState::Done),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };

    let mut store = Store::open(&db_path)
        .wrap_err_with(|| format!("Database initialization failed at {}", db_path.display()))?;

    let result = run(&mut store, cli.command);
    finish(result, store.close())
}

/// A failed command outranks a failed close
fn finish(result: Result<()>, closed: todo::Result<()>) -> Result<()> {
    result?;
    closed.wrap_err("Cannot close the database")
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn default_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| eyre!("Home user directory couldn't be used"))?;
    Ok(home.join(TODO_DIR).join(TODO_DB_FILE))
}

fn run(store: &mut Store, command: Commands) -> Result<()> {
    match command {
        Commands::Add { text, tag } => {
            store
                .create_task(&text, tag.as_deref())
                .wrap_err("Cannot add task")?;
            println!("new task {:?} created correctly.", text.trim());
        }
        Commands::List {
            scope,
            date,
            tag,
            json,
        } => list(store, scope, date.as_deref(), tag.as_deref(), json)?,
        Commands::Done { id } => {
            let id = parse_task_id(&id)?;
            store
                .complete_task(id)
                .wrap_err_with(|| format!("task with id {} couldn't be marked as done", id))?;
            println!("task with the id {} marked as done.", id);
        }
        Commands::Pending { id } => {
            let id = parse_task_id(&id)?;
            store
                .reopen_task(id)
                .wrap_err_with(|| format!("task with id {} couldn't be marked as pending", id))?;
            println!("task with the id {} marked as pending.", id);
        }
        Commands::Rename { id, text } => {
            let id = parse_task_id(&id)?;
            store
                .rename_task(id, &text)
                .wrap_err_with(|| format!("task with id {} couldn't be renamed", id))?;
            println!("task with the id {} renamed to {:?}.", id, text.trim());
        }
        Commands::Delete { id } => {
            let id = parse_task_id(&id)?;
            store
                .delete_task(id)
                .wrap_err_with(|| format!("task with id {} couldn't be deleted", id))?;
            println!("task with the id {} deleted.", id);
        }
    }

    Ok(())
}

fn list(store: &Store, scope: ListScope, date: Option<&str>, tag: Option<&str>, json: bool) -> Result<()> {
    let date = date
        .map(DateFilter::parse)
        .transpose()?
        .map(DateFilter::resolve_local);

    let tasks = match (scope.state(), date) {
        (None, None) => store.list_all(tag),
        (Some(state), None) => store.list_by_state(state, tag),
        (None, Some(date)) => store.list_by_creation_date(date, tag),
        (Some(state), Some(date)) => store.list_by_state_and_date(state, date, tag),
    }
    .wrap_err("Cannot list tasks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    let color = std::io::stdout().is_terminal();
    print!("{}", output::format_task_table(&tasks, color));

    let counts = store.count_by_state()?;
    println!("{}", output::format_summary(tasks.len(), &counts));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo::StoreError;

    #[test]
    fn test_finish_prefers_command_error() {
        let result = finish(
            Err(eyre!("task with id 4 couldn't be deleted")),
            Err(StoreError::invalid_input("close went wrong")),
        );
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "task with id 4 couldn't be deleted");
    }

    #[test]
    fn test_finish_reports_close_error() {
        let result = finish(Ok(()), Err(StoreError::invalid_input("close went wrong")));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Cannot close the database");
        assert!(err.root_cause().to_string().contains("close went wrong"));

        assert!(finish(Ok(()), Ok(())).is_ok());
    }
}
