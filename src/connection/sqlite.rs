// ABOUTME: SQLite adapter for the Connection seam, backed by rusqlite
// ABOUTME: Reports declared column types in PostgreSQL's type-modifier convention

use super::{ColumnMeta, Connection, Page};
use crate::error::ReplicationError;
use crate::value::{Row, Value};
use anyhow::{Context, Result};
use rusqlite::params_from_iter;

/// Length overhead PostgreSQL adds to a `varchar(n)` type modifier.
const TYPMOD_OVERHEAD: i32 = 4;

/// A SQLite database opened as a source, relay, or destination store.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open a SQLite database from a path or `sqlite:` URL.
    ///
    /// Accepts `sqlite:///abs/path.db`, `sqlite://rel.db`, `sqlite:path.db`,
    /// `sqlite::memory:`, `:memory:` and bare paths.
    pub fn open(url: &str) -> Result<Self> {
        let path = sqlite_path(url);
        tracing::debug!("Opening SQLite database '{}'", path);

        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| ReplicationError::connection(path, e))?;

        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Borrow the underlying rusqlite connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Page> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ReplicationError::query(sql, e))?;

        let mut columns: Vec<ColumnMeta> = stmt
            .columns()
            .iter()
            .map(|c| column_meta(c.name(), c.decl_type()))
            .collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..width)
                    .map(|idx| row.get::<_, rusqlite::types::Value>(idx).map(Value::from))
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(|e| ReplicationError::query(sql, e))?
            .collect::<rusqlite::Result<Vec<Row>>>()
            .map_err(|e| ReplicationError::query(sql, e))?;
        infer_undeclared_types(&mut columns, &rows);

        Ok(Page { columns, rows })
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| ReplicationError::query(sql, e))?;
        Ok(())
    }

    fn execute_each(&mut self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ReplicationError::query(sql, e))?;

        let mut affected = 0u64;
        for (row_idx, params) in param_sets.iter().enumerate() {
            affected += stmt
                .execute(params_from_iter(params.iter()))
                .map_err(|e| ReplicationError::query(sql, e))
                .with_context(|| format!("Failed on parameter set {}", row_idx))?
                as u64;
        }
        Ok(affected)
    }
}

fn sqlite_path(url: &str) -> &str {
    let trimmed = url.trim();
    if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else {
        trimmed
    }
}

/// Derive column metadata from a SQLite declared type such as `VARCHAR(24)`.
///
/// The native type is the lower-cased base name. A declared length is
/// reported as length + 4, the same convention PostgreSQL uses for
/// `varchar`, so one type policy applies to both stores. Expression columns
/// have no declared type and report an empty native type here.
fn column_meta(name: &str, decl_type: Option<&str>) -> ColumnMeta {
    let decl = decl_type.unwrap_or("").trim();
    let (base, precision) = match decl.split_once('(') {
        Some((base, args)) => {
            let length = args
                .trim_end_matches(')')
                .split(',')
                .next()
                .and_then(|n| n.trim().parse::<i32>().ok());
            (base.trim(), length.map_or(-1, |n| n + TYPMOD_OVERHEAD))
        }
        None => (decl, -1),
    };

    ColumnMeta {
        name: name.to_string(),
        native_type: base.to_lowercase(),
        precision,
    }
}

/// Give undeclared columns the storage class of their first non-null value.
///
/// Columns that are NULL on every row keep the empty native type.
fn infer_undeclared_types(columns: &mut [ColumnMeta], rows: &[Row]) {
    for (idx, column) in columns.iter_mut().enumerate() {
        if !column.native_type.is_empty() {
            continue;
        }
        if let Some(class) = rows.iter().find_map(|row| storage_class(row.get(idx)?)) {
            column.native_type = class.to_string();
        }
    }
}

fn storage_class(value: &Value) -> Option<&'static str> {
    match value {
        Value::Int(_) => Some("integer"),
        Value::Float(_) => Some("real"),
        Value::Text(_) => Some("text"),
        Value::Bytes(_) => Some("blob"),
        _ => None,
    }
}
