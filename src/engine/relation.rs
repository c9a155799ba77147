// ABOUTME: RelationExpander - turns anchor rows into a literal key list for a child query
// ABOUTME: Each anchor page re-runs the keyed child copy, upserting additively into one table

use super::cursor::ChunkedCursor;
use super::materializer::{materialize_table, SchemaPolicy};
use super::spec::{LiteralPolicy, RelationSpec, TableSpec, RELAY_RESULT_PLACEHOLDER};
use crate::connection::{Connection, Page};
use crate::error::ReplicationError;
use crate::value::{Row, Value};
use anyhow::{Context, Result};

const LITERAL_SEPARATOR: &str = " ,";

/// Outcome of one relation expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationStats {
    pub table: String,
    /// Non-empty anchor pages that triggered a child copy
    pub anchor_pages: usize,
    pub anchor_rows: u64,
    pub child_rows: u64,
}

/// Render one row as a parenthesized tuple, e.g. `(1 ,abc)`.
pub fn render_tuple(row: &[Value]) -> String {
    let values = row
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(LITERAL_SEPARATOR);
    format!("({})", values)
}

/// Render anchor rows as a value list for an `IN (...)` predicate.
///
/// `[[1], [2]]` renders as `(1) ,(2)`. An empty page renders as the empty
/// string.
pub fn build_result_partial_query(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| render_tuple(row))
        .collect::<Vec<_>>()
        .join(LITERAL_SEPARATOR)
}

/// Reject anchor values the policy does not allow to be embedded.
pub fn check_literals(rows: &[Row], policy: LiteralPolicy) -> Result<(), ReplicationError> {
    if policy == LiteralPolicy::Verbatim {
        return Ok(());
    }
    for value in rows.iter().flatten() {
        if !value.is_numeric_literal() {
            return Err(ReplicationError::UnsafeLiteral {
                value: crate::utils::sanitize_identifier(&value.to_string()),
            });
        }
    }
    Ok(())
}

/// Replace every `{{relay_query_result}}` marker in `template` with `partial`.
///
/// # Injection boundary
///
/// `partial` is spliced into the SQL text unescaped. Anchor values become
/// literals, not bound parameters, so text containing quotes or SQL syntax
/// rewrites the child query. Only numeric or otherwise opaque identifiers are
/// safe here; use [`LiteralPolicy::NumericOnly`] to enforce that.
pub fn embed_literals(template: &str, partial: &str) -> String {
    template.replace(RELAY_RESULT_PLACEHOLDER, partial)
}

/// Handle one anchor page. Returns whether the anchor cursor should continue.
fn expand_page(
    source: &mut dyn Connection,
    target: &mut dyn Connection,
    spec: &RelationSpec,
    page: Page,
    index: usize,
    stats: &mut RelationStats,
) -> Result<bool> {
    let partial = build_result_partial_query(&page.rows);
    if partial.is_empty() {
        return Ok(false);
    }

    check_literals(&page.rows, spec.literal_policy())
        .with_context(|| format!("Anchor page {} for '{}' has unsafe values", index, spec.table()))?;

    let child_query = embed_literals(spec.child_query_template(), &partial);
    tracing::debug!(
        "Anchor page {} ({} rows) -> {}",
        index,
        page.len(),
        crate::utils::abbreviate_sql(&child_query)
    );

    let child = TableSpec::new(
        spec.table(),
        spec.primary_columns().to_vec(),
        &child_query,
        spec.child_chunk_size(),
    )?;
    let table_stats = materialize_table(source, target, &child, SchemaPolicy::CreateIfAbsent)?;

    stats.anchor_pages += 1;
    stats.anchor_rows += page.len() as u64;
    stats.child_rows += table_stats.rows;
    Ok(true)
}

/// Resolve a relation: page through the anchor query on `target`, and for each
/// anchor page copy the keyed child rows from `source` into `spec.table()`.
///
/// Child rows accumulate across anchor pages; nothing is replaced wholesale.
pub fn expand_and_materialize(
    source: &mut dyn Connection,
    target: &mut dyn Connection,
    spec: &RelationSpec,
) -> Result<RelationStats> {
    let mut stats = RelationStats {
        table: spec.table().to_string(),
        ..RelationStats::default()
    };

    // The anchor cursor and the child upserts share `target`; each page is
    // fully handed off before the next anchor offset is fetched.
    let mut cursor = ChunkedCursor::new(
        spec.anchor_query(),
        Vec::new(),
        spec.anchor_chunk_size(),
    );
    let mut index = 0;
    while let Some(page) = cursor
        .next_page(target)
        .with_context(|| format!("Failed to read anchor rows for '{}'", spec.table()))?
    {
        let keep_going = expand_page(source, target, spec, page, index, &mut stats)
            .with_context(|| format!("Failed to expand relation into '{}'", spec.table()))?;
        index += 1;
        if !keep_going {
            cursor.stop();
        }
    }

    tracing::info!(
        "Relation '{}': {} anchor rows in {} pages -> {} child rows",
        stats.table,
        stats.anchor_rows,
        stats.anchor_pages,
        stats.child_rows
    );

    Ok(stats)
}
