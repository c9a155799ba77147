// ABOUTME: Immutable job-configuration values read by the engine
// ABOUTME: TableSpec and RelationSpec are validated once, at construction

use crate::error::ReplicationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Rows fetched per page unless a job says otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Marker replaced in a relation's child-query template.
pub const RELAY_RESULT_PLACEHOLDER: &str = "{{relay_query_result}}";

/// One independent copy job: a source query materialized into `table`.
///
/// `source_query` must carry a deterministic `ORDER BY`, or offset
/// pagination may skip or repeat rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    table: String,
    primary_columns: Vec<String>,
    source_query: String,
    chunk_size: usize,
}

impl TableSpec {
    pub fn new(
        table: &str,
        primary_columns: Vec<String>,
        source_query: &str,
        chunk_size: usize,
    ) -> Result<Self, ReplicationError> {
        require_non_empty("table", table)?;
        validate_primary_columns(table, &primary_columns)?;
        require_non_empty(&format!("query for table '{}'", table), source_query)?;
        validate_chunk_size(&format!("chunk size for table '{}'", table), chunk_size)?;

        Ok(Self {
            table: table.to_string(),
            primary_columns,
            source_query: source_query.to_string(),
            chunk_size,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_columns(&self) -> &[String] {
        &self.primary_columns
    }

    pub fn source_query(&self) -> &str {
        &self.source_query
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// How anchor values are vetted before being embedded into a child query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralPolicy {
    /// Embed every value's plain rendering, unescaped.
    #[default]
    Verbatim,
    /// Refuse anything but integers, finite floats, and decimals.
    NumericOnly,
}

/// A dependent copy job.
///
/// The anchor query runs against the relay store; its rows become a literal
/// tuple list substituted into the child template, which then runs against
/// the source and is materialized into `table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    anchor_query: String,
    child_query_template: String,
    table: String,
    primary_columns: Vec<String>,
    anchor_chunk_size: usize,
    child_chunk_size: usize,
    literal_policy: LiteralPolicy,
}

impl RelationSpec {
    pub fn new(
        anchor_query: &str,
        child_query_template: &str,
        table: &str,
        primary_columns: Vec<String>,
        anchor_chunk_size: usize,
        child_chunk_size: usize,
    ) -> Result<Self, ReplicationError> {
        require_non_empty("table", table)?;
        validate_primary_columns(table, &primary_columns)?;
        require_non_empty(&format!("anchor query for table '{}'", table), anchor_query)?;
        if !child_query_template.contains(RELAY_RESULT_PLACEHOLDER) {
            return Err(ReplicationError::Config(format!(
                "child query for table '{}' must contain the {} placeholder",
                table, RELAY_RESULT_PLACEHOLDER
            )));
        }
        validate_chunk_size(
            &format!("anchor chunk size for table '{}'", table),
            anchor_chunk_size,
        )?;
        validate_chunk_size(
            &format!("child chunk size for table '{}'", table),
            child_chunk_size,
        )?;

        Ok(Self {
            anchor_query: anchor_query.to_string(),
            child_query_template: child_query_template.to_string(),
            table: table.to_string(),
            primary_columns,
            anchor_chunk_size,
            child_chunk_size,
            literal_policy: LiteralPolicy::default(),
        })
    }

    pub fn with_literal_policy(mut self, policy: LiteralPolicy) -> Self {
        self.literal_policy = policy;
        self
    }

    pub fn anchor_query(&self) -> &str {
        &self.anchor_query
    }

    pub fn child_query_template(&self) -> &str {
        &self.child_query_template
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_columns(&self) -> &[String] {
        &self.primary_columns
    }

    pub fn anchor_chunk_size(&self) -> usize {
        self.anchor_chunk_size
    }

    pub fn child_chunk_size(&self) -> usize {
        self.child_chunk_size
    }

    pub fn literal_policy(&self) -> LiteralPolicy {
        self.literal_policy
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<(), ReplicationError> {
    if value.trim().is_empty() {
        return Err(ReplicationError::Config(format!("{} cannot be empty", what)));
    }
    Ok(())
}

fn validate_chunk_size(what: &str, size: usize) -> Result<(), ReplicationError> {
    if size == 0 {
        return Err(ReplicationError::Config(format!("{} must be at least 1", what)));
    }
    Ok(())
}

fn validate_primary_columns(table: &str, columns: &[String]) -> Result<(), ReplicationError> {
    if columns.is_empty() {
        return Err(ReplicationError::Config(format!(
            "table '{}' needs at least one primary column",
            table
        )));
    }
    let mut seen = HashSet::new();
    for column in columns {
        require_non_empty(&format!("primary column of table '{}'", table), column)?;
        if !seen.insert(column.as_str()) {
            return Err(ReplicationError::Config(format!(
                "primary column '{}' listed twice for table '{}'",
                column, table
            )));
        }
    }
    Ok(())
}
