// ABOUTME: In-memory Connection double for engine unit tests
// ABOUTME: Serves scripted pages and records every statement with its bound parameters

use super::{ColumnMeta, Connection, Page};
use crate::value::{Row, Value};
use anyhow::{bail, Result};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Query { sql: String, params: Vec<Value> },
    Execute { sql: String },
    ExecuteEach { sql: String, param_sets: Vec<Vec<Value>> },
}

/// Scripted connection: each `query` pops the next queued page, falling back
/// to an empty page carrying the last seen columns once the script runs out.
#[derive(Debug, Default)]
pub(crate) struct RecordingConnection {
    pages: VecDeque<Page>,
    last_columns: Vec<ColumnMeta>,
    pub calls: Vec<Call>,
    fail_on_execute: Option<String>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self {
            pages: pages.into(),
            ..Self::default()
        }
    }

    /// Serve `rows` as offset pages of `page_size`, followed by the empty page.
    pub fn paged(columns: Vec<ColumnMeta>, rows: Vec<Row>, page_size: usize) -> Self {
        let pages = rows
            .chunks(page_size)
            .map(|chunk| Page {
                columns: columns.clone(),
                rows: chunk.to_vec(),
            })
            .collect::<Vec<_>>();
        let mut conn = Self::with_pages(pages);
        conn.last_columns = columns;
        conn
    }

    /// Fail any `execute`/`execute_each` whose SQL contains `needle`.
    pub fn fail_on_execute(mut self, needle: &str) -> Self {
        self.fail_on_execute = Some(needle.to_string());
        self
    }

    pub fn queries(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Query { .. }))
            .collect()
    }

    pub fn writes(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Call::Query { .. }))
            .collect()
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        if let Some(needle) = &self.fail_on_execute {
            if sql.contains(needle.as_str()) {
                bail!("scripted failure for statement containing '{}'", needle);
            }
        }
        Ok(())
    }
}

impl Connection for RecordingConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Page> {
        self.calls.push(Call::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match self.pages.pop_front() {
            Some(page) => {
                self.last_columns = page.columns.clone();
                Ok(page)
            }
            None => Ok(Page {
                columns: self.last_columns.clone(),
                rows: Vec::new(),
            }),
        }
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.calls.push(Call::Execute {
            sql: sql.to_string(),
        });
        self.check_failure(sql)
    }

    fn execute_each(&mut self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        self.calls.push(Call::ExecuteEach {
            sql: sql.to_string(),
            param_sets: param_sets.to_vec(),
        });
        self.check_failure(sql)?;
        Ok(param_sets.len() as u64)
    }
}
