// ABOUTME: validate command - checks a job file without connecting to any store
// ABOUTME: Builds both jobs so every validation rule is applied

use std::path::Path;

use anyhow::Result;

use crate::config::JobConfig;

/// Counts of what a valid job file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    pub relay_tables: usize,
    pub relations: usize,
    pub store_tables: usize,
}

pub fn run(config_path: &Path) -> Result<ValidationSummary> {
    let config = JobConfig::load(config_path)?;
    let relay = config.relay_job()?;
    let store = config.store_job()?;

    for relation in &relay.relations {
        if relation.literal_policy() == crate::engine::LiteralPolicy::Verbatim {
            tracing::warn!(
                "Relation '{}' embeds anchor values verbatim; set literal_policy = \"numeric_only\" for numeric keys",
                relation.table()
            );
        }
    }

    Ok(ValidationSummary {
        relay_tables: relay.tables.len(),
        relations: relay.relations.len(),
        store_tables: store.tables.len(),
    })
}
