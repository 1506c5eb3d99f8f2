// Plain-text rendering of task listings

use crate::models::{Task, TaskCounts, TaskState};
use colored::Colorize;

const HEADERS: [&str; 5] = ["ID", "Todo", "State", "Tag", "Created"];

/// Render tasks as an aligned table; `color` toggles ANSI styling of the state column
pub fn format_task_table(tasks: &[Task], color: bool) -> String {
    if tasks.is_empty() {
        return "no tasks found\n".to_string();
    }

    let rows: Vec<[String; 5]> = tasks
        .iter()
        .map(|task| {
            [
                task.id.to_string(),
                task.text.clone(),
                task.state.to_string(),
                task.tag.clone().unwrap_or_default(),
                task.created_at.format("%Y-%m-%d").to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = HEADERS
        .iter()
        .zip(widths.iter())
        .map(|(h, w)| format!("{:<width$}", h, width = *w))
        .collect();
    let header = header.join("  ");
    out.push_str(header.trim_end());
    out.push('\n');

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');

    for (row, task) in rows.iter().zip(tasks) {
        let cells: Vec<String> = row
            .iter()
            .zip(widths.iter())
            .enumerate()
            .map(|(i, (cell, w))| {
                let padded = format!("{:<width$}", cell, width = *w);
                if i == 2 && color {
                    paint_state(task.state, &padded)
                } else {
                    padded
                }
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }

    out
}

fn paint_state(state: TaskState, cell: &str) -> String {
    match state {
        TaskState::Pending => cell.yellow().to_string(),
        TaskState::Done => cell.green().to_string(),
    }
}

/// One-line summary shown under a listing
pub fn format_summary(shown: usize, counts: &TaskCounts) -> String {
    format!(
        "{} shown, {} pending, {} done, {} total",
        shown,
        counts.pending,
        counts.done,
        counts.total()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn task(id: i64, text: &str, state: TaskState, tag: Option<&str>) -> Task {
        let created_at = Local.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        Task {
            id,
            text: text.to_string(),
            state,
            tag: tag.map(str::to_string),
            created_at,
            completed_at: (state == TaskState::Done).then_some(created_at),
        }
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(format_task_table(&[], false), "no tasks found\n");
    }

    #[test]
    fn test_table_layout() {
        let tasks = vec![
            task(1, "buy milk", TaskState::Pending, None),
            task(12, "ship release", TaskState::Done, Some("work")),
        ];

        let table = format_task_table(&tasks, false);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ID  Todo          State    Tag   Created");
        assert!(lines[1].starts_with("--  ------------"));
        assert_eq!(lines[2], "1   buy milk      pending        2024-02-01");
        assert_eq!(lines[3], "12  ship release  done     work  2024-02-01");
    }

    #[test]
    fn test_colored_table_keeps_text() {
        let tasks = vec![task(3, "stretch", TaskState::Done, None)];
        colored::control::set_override(true);
        let table = format_task_table(&tasks, true);
        let plain = format_task_table(&tasks, false);
        colored::control::unset_override();

        assert!(table.contains("stretch"));
        assert!(table.contains("done"));
        let row = table.lines().nth(2).unwrap();
        assert!(row.contains("\u{1b}["), "state cell is not styled: {:?}", row);
        assert!(!plain.contains('\u{1b}'));
    }

    #[test]
    fn test_summary() {
        let counts = TaskCounts { pending: 2, done: 1 };
        assert_eq!(format_summary(2, &counts), "2 shown, 2 pending, 1 done, 3 total");
    }
}
