// ABOUTME: TableMaterializer - create-if-absent DDL and idempotent per-row upserts
// ABOUTME: Drives a ChunkedCursor over a source query into one destination table

use super::cursor::for_each_page;
use super::spec::TableSpec;
use super::typemap::{declare_columns, declare_primary_key, ColumnDeclaration};
use crate::connection::{Connection, Page};
use crate::error::ReplicationError;
use crate::value::{Row, Value};
use anyhow::{Context, Result};

/// Whether materialization may create the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Infer columns from the first page and `CREATE TABLE IF NOT EXISTS`.
    CreateIfAbsent,
    /// The destination table already exists; issue no DDL.
    Existing,
}

/// Outcome of materializing one table from one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    pub table: String,
    /// Non-empty pages upserted
    pub pages: usize,
    /// Rows upserted, counted whether or not the store changed them
    pub rows: u64,
}

impl TableStats {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` with the primary key as the last list entry.
pub fn create_table_statement(
    table: &str,
    declarations: &[ColumnDeclaration],
    primary_key: &str,
) -> String {
    let entries = declarations
        .iter()
        .map(|d| d.to_string())
        .chain(std::iter::once(primary_key.to_string()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({});", table, entries)
}

/// Create `table` unless it exists. An existing table is left untouched.
pub fn ensure_table(
    target: &mut dyn Connection,
    table: &str,
    declarations: &[ColumnDeclaration],
    primary_key: &str,
) -> Result<()> {
    let sql = create_table_statement(table, declarations, primary_key);
    tracing::debug!("{}", sql);
    target
        .execute(&sql)
        .with_context(|| format!("Failed to create table '{}'", table))
}

/// Non-key columns, in `columns` order.
pub fn update_columns(columns: &[String], primary_columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !primary_columns.contains(c))
        .cloned()
        .collect()
}

/// Single-row upsert keyed by `primary_columns`.
///
/// ```text
/// INSERT INTO t (a, b, c) VALUES (?, ?, ?) ON CONFLICT (a) DO UPDATE SET b=?, c=?
/// ```
///
/// When every column is a key column there is nothing to update and the
/// conflict arm is `DO NOTHING`.
pub fn upsert_statement(table: &str, columns: &[String], primary_columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates = update_columns(columns, primary_columns);
    let conflict_action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!(
            "DO UPDATE SET {}",
            updates
                .iter()
                .map(|c| format!("{}=?", c))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        table,
        columns.join(", "),
        placeholders,
        primary_columns.join(", "),
        conflict_action
    )
}

/// Parameters for one row: the whole row, then its non-key values again.
///
/// Booleans are bound as 0/1. The repeated values feed `DO UPDATE SET`, so a
/// conflicting row is replaced by the incoming one rather than merged.
pub fn bind_values(row: &[Value], update_indices: &[usize]) -> Vec<Value> {
    let normalized: Vec<Value> = row.iter().map(Value::normalized_for_bind).collect();
    let mut params = Vec::with_capacity(normalized.len() + update_indices.len());
    params.extend(normalized.iter().cloned());
    params.extend(update_indices.iter().map(|&i| normalized[i].clone()));
    params
}

/// Upsert `rows` into `table`, one execution of a single prepared statement per row.
///
/// Every row is checked against `columns` before anything executes; an arity
/// mismatch fails the whole batch with [`ReplicationError::Upsert`].
pub fn upsert_batch(
    target: &mut dyn Connection,
    table: &str,
    columns: &[String],
    primary_columns: &[String],
    rows: &[Row],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let update_indices: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !primary_columns.contains(c))
        .map(|(i, _)| i)
        .collect();

    let mut param_sets = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(ReplicationError::Upsert {
                table: table.to_string(),
                row: row_idx,
                expected: columns.len(),
                actual: row.len(),
            }
            .into());
        }
        param_sets.push(bind_values(row, &update_indices));
    }

    let sql = upsert_statement(table, columns, primary_columns);
    tracing::debug!("{} ({} rows)", sql, rows.len());

    target
        .execute_each(&sql, &param_sets)
        .with_context(|| format!("Failed to upsert {} rows into '{}'", rows.len(), table))
}

/// Apply one page of a table copy. Returns whether the cursor should continue.
///
/// Page 0 decides the schema: its column metadata is mapped and the table is
/// created if absent, even when the page has no rows. Later pages are trusted
/// to have the same shape; the column list is taken from each page as-is.
fn apply_page(
    target: &mut dyn Connection,
    spec: &TableSpec,
    policy: SchemaPolicy,
    page: Page,
    index: usize,
    stats: &mut TableStats,
) -> Result<bool> {
    if page.columns.is_empty() {
        return Ok(false);
    }

    if index == 0 && policy == SchemaPolicy::CreateIfAbsent {
        let declarations = declare_columns(&page.columns)
            .with_context(|| format!("Failed to infer schema for table '{}'", spec.table()))?;
        let primary_key = declare_primary_key(spec.primary_columns());
        ensure_table(target, spec.table(), &declarations, &primary_key)?;
    }

    if page.is_empty() {
        return Ok(false);
    }

    let columns = page.column_names();
    upsert_batch(
        target,
        spec.table(),
        &columns,
        spec.primary_columns(),
        &page.rows,
    )?;
    stats.rows += page.len() as u64;
    stats.pages += 1;
    Ok(true)
}

/// Copy every page of `spec.source_query()` from `source` into `spec.table()` on `target`.
///
/// Running this twice over identical source data leaves identical
/// destination content: rows are keyed by the primary columns.
pub fn materialize_table(
    source: &mut dyn Connection,
    target: &mut dyn Connection,
    spec: &TableSpec,
    policy: SchemaPolicy,
) -> Result<TableStats> {
    let mut stats = TableStats::new(spec.table());

    for_each_page(
        source,
        spec.source_query(),
        Vec::new(),
        spec.chunk_size(),
        |page, index| apply_page(target, spec, policy, page, index, &mut stats),
    )
    .with_context(|| format!("Failed to materialize table '{}'", spec.table()))?;

    tracing::info!(
        "Materialized {} rows into '{}' ({} pages)",
        stats.rows,
        stats.table,
        stats.pages
    );

    Ok(stats)
}
