// Query filtering for tasks

use crate::error::{Result, StoreError};
use crate::models::TaskState;
use chrono::{Days, Local, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Conjunction of optional task predicates
///
/// Every unset field matches all tasks. An empty tag is the same as no tag:
/// there is no way to ask for explicitly untagged tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub created_on: Option<NaiveDate>,
    pub tag: Option<String>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn created_on(mut self, date: NaiveDate) -> Self {
        self.created_on = Some(date);
        self
    }

    pub fn tag(mut self, tag: Option<&str>) -> Self {
        self.tag = tag.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    /// Render the WHERE clause (empty when nothing is filtered) and its
    /// positional parameters, in placeholder order.
    pub(crate) fn to_sql(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(state) = self.state {
            params.push(Box::new(state));
            clauses.push(format!("state = ?{}", params.len()));
        }

        // Stored timestamps start with the local date, so a text range covers one day
        if let Some(date) = self.created_on {
            let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
            params.push(Box::new(date.format("%Y-%m-%d").to_string()));
            let from = params.len();
            params.push(Box::new(next.format("%Y-%m-%d").to_string()));
            clauses.push(format!("date_created >= ?{} AND date_created < ?{}", from, params.len()));
        }

        if let Some(tag) = self.tag.as_deref().filter(|t| !t.is_empty()) {
            params.push(Box::new(tag.to_string()));
            clauses.push(format!("tag = ?{}", params.len()));
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

/// Creation-date filter as typed by a user: `today`, `yesterday` or `YYYY-MM-DD`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    Yesterday,
    On(NaiveDate),
}

impl DateFilter {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "today" => Ok(DateFilter::Today),
            "yesterday" => Ok(DateFilter::Yesterday),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(DateFilter::On)
                .map_err(|_| StoreError::invalid_input(format!("not a valid date: {:?}", other))),
        }
    }

    /// Resolve against the given calendar day
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            DateFilter::Today => today,
            DateFilter::Yesterday => today.checked_sub_days(Days::new(1)).unwrap_or(today),
            DateFilter::On(date) => date,
        }
    }

    pub fn resolve_local(self) -> NaiveDate {
        self.resolve(Local::now().date_naive())
    }
}

impl FromStr for DateFilter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        DateFilter::parse(s)
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFilter::Today => write!(f, "today"),
            DateFilter::Yesterday => write!(f, "yesterday"),
            DateFilter::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_filter_has_no_where() {
        let (sql, params) = TaskFilter::new().to_sql();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_tag_is_no_filter() {
        assert_eq!(TaskFilter::new().tag(Some("")), TaskFilter::new());
        assert_eq!(TaskFilter::new().tag(None), TaskFilter::new());
        assert_eq!(TaskFilter::new().tag(Some("work")).tag.as_deref(), Some("work"));
    }

    #[test]
    fn test_empty_tag_in_struct_literal_is_no_filter() {
        let filter = TaskFilter {
            tag: Some(String::new()),
            ..Default::default()
        };
        let (sql, params) = filter.to_sql();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_placeholders_follow_order() {
        let filter = TaskFilter::new()
            .state(TaskState::Done)
            .created_on(date(2024, 2, 1))
            .tag(Some("home"));
        let (sql, params) = filter.to_sql();
        assert_eq!(
            sql,
            " WHERE state = ?1 AND date_created >= ?2 AND date_created < ?3 AND tag = ?4"
        );
        assert_eq!(params.len(), 4);

        let (sql, params) = TaskFilter::new().tag(Some("home")).to_sql();
        assert_eq!(sql, " WHERE tag = ?1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_date_filter_parse() {
        assert_eq!(DateFilter::parse("today").unwrap(), DateFilter::Today);
        assert_eq!(DateFilter::parse("yesterday").unwrap(), DateFilter::Yesterday);
        assert_eq!(
            DateFilter::parse("2024-02-01").unwrap(),
            DateFilter::On(date(2024, 2, 1))
        );
        assert!(matches!(DateFilter::parse("01/02/2024"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(DateFilter::parse("2024-13-01"), Err(StoreError::InvalidInput(_))));
        assert!(matches!(DateFilter::parse(""), Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn test_date_filter_resolve() {
        let today = date(2024, 3, 1);
        assert_eq!(DateFilter::Today.resolve(today), today);
        assert_eq!(DateFilter::Yesterday.resolve(today), date(2024, 2, 29));
        assert_eq!(DateFilter::On(date(2023, 1, 5)).resolve(today), date(2023, 1, 5));
    }

    #[test]
    fn test_date_filter_display() {
        assert_eq!(DateFilter::Today.to_string(), "today");
        assert_eq!(DateFilter::On(date(2024, 2, 1)).to_string(), "2024-02-01");
    }
}
