// ABOUTME: ReplicationJob and StoreJob - sequential orchestration of table and relation copies
// ABOUTME: Runs inside a caller-owned transaction and surfaces the first failure unchanged

use super::materializer::{materialize_table, SchemaPolicy, TableStats};
use super::relation::{expand_and_materialize, RelationStats};
use super::spec::{RelationSpec, TableSpec};
use crate::connection::Connection;
use anyhow::{Context, Result};
use std::time::Instant;

/// Statistics from one job run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub tables: Vec<TableStats>,
    pub relations: Vec<RelationStats>,
    pub duration_ms: u64,
}

impl JobReport {
    /// Rows upserted across every table and relation.
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum::<u64>()
            + self.relations.iter().map(|r| r.child_rows).sum::<u64>()
    }

    fn log_summary(&self, job: &str) {
        tracing::info!(
            "{} finished: {} tables, {} relations, {} rows in {}ms",
            job,
            self.tables.len(),
            self.relations.len(),
            self.total_rows(),
            self.duration_ms
        );
    }
}

/// Source to relay: independent tables first, then relations.
///
/// Every table and relation runs strictly in list order against one target.
/// The job never begins, commits, or rolls back; wrap [`run`](Self::run) in
/// [`with_transaction`](crate::transaction::with_transaction) and let any
/// error reach it.
#[derive(Debug, Clone, Default)]
pub struct ReplicationJob {
    pub tables: Vec<TableSpec>,
    pub relations: Vec<RelationSpec>,
}

impl ReplicationJob {
    pub fn new(tables: Vec<TableSpec>, relations: Vec<RelationSpec>) -> Self {
        Self { tables, relations }
    }

    /// Run the whole job. The first failure aborts it.
    ///
    /// Relation anchors are read from `target`, so relations may depend on
    /// tables materialized earlier in the same run.
    pub fn run(
        &self,
        source: &mut dyn Connection,
        target: &mut dyn Connection,
    ) -> Result<JobReport> {
        let start = Instant::now();
        let mut report = JobReport::default();

        for spec in &self.tables {
            tracing::info!("Relaying table '{}'", spec.table());
            let stats = materialize_table(source, target, spec, SchemaPolicy::CreateIfAbsent)
                .with_context(|| format!("Relay of table '{}' failed", spec.table()))?;
            report.tables.push(stats);
        }

        for spec in &self.relations {
            tracing::info!("Relaying relation into '{}'", spec.table());
            let stats = expand_and_materialize(source, target, spec)
                .with_context(|| format!("Relay of relation '{}' failed", spec.table()))?;
            report.relations.push(stats);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.log_summary("Relay");
        Ok(report)
    }
}

/// Relay to destination: page each table query on the relay and upsert
/// into the destination.
#[derive(Debug, Clone)]
pub struct StoreJob {
    pub tables: Vec<TableSpec>,
    pub schema_policy: SchemaPolicy,
}

impl Default for StoreJob {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            schema_policy: SchemaPolicy::Existing,
        }
    }
}

impl StoreJob {
    pub fn new(tables: Vec<TableSpec>, schema_policy: SchemaPolicy) -> Self {
        Self {
            tables,
            schema_policy,
        }
    }

    pub fn run(
        &self,
        relay: &mut dyn Connection,
        destination: &mut dyn Connection,
    ) -> Result<JobReport> {
        let start = Instant::now();
        let mut report = JobReport::default();

        for spec in &self.tables {
            tracing::info!("Storing table '{}'", spec.table());
            let stats = materialize_table(relay, destination, spec, self.schema_policy)
                .with_context(|| format!("Store of table '{}' failed", spec.table()))?;
            report.tables.push(stats);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.log_summary("Store");
        Ok(report)
    }
}
