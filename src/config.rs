// ABOUTME: Job configuration file - connections, relay tables/relations, and store tables
// ABOUTME: Parsed from TOML and converted into validated engine specs

use crate::engine::{
    LiteralPolicy, RelationSpec, ReplicationJob, SchemaPolicy, StoreJob, TableSpec,
    DEFAULT_CHUNK_SIZE,
};
use crate::error::ReplicationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted for each store URL when no flag is given.
pub const SOURCE_URL_ENV: &str = "RELAY_SOURCE_URL";
pub const RELAY_URL_ENV: &str = "RELAY_RELAY_URL";
pub const DESTINATION_URL_ENV: &str = "RELAY_DESTINATION_URL";

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Top-level job file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub store: StoreSection,
}

/// Store URLs. Any of them may instead come from a flag or the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionsConfig {
    pub source: Option<String>,
    pub relay: Option<String>,
    pub destination: Option<String>,
}

/// Which store a URL is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Source,
    Relay,
    Destination,
}

impl StoreRole {
    pub fn name(&self) -> &'static str {
        match self {
            StoreRole::Source => "source",
            StoreRole::Relay => "relay",
            StoreRole::Destination => "destination",
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            StoreRole::Source => SOURCE_URL_ENV,
            StoreRole::Relay => RELAY_URL_ENV,
            StoreRole::Destination => DESTINATION_URL_ENV,
        }
    }
}

impl ConnectionsConfig {
    /// Pick the URL for `role`: an explicit override first, then the file.
    ///
    /// Overrides already carry the environment fallback (the CLI reads
    /// `RELAY_*_URL` into them).
    pub fn resolve(
        &self,
        role: StoreRole,
        override_url: Option<&str>,
    ) -> Result<String, ReplicationError> {
        let from_file = match role {
            StoreRole::Source => self.source.as_deref(),
            StoreRole::Relay => self.relay.as_deref(),
            StoreRole::Destination => self.destination.as_deref(),
        };

        override_url
            .or(from_file)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ReplicationError::Config(format!(
                    "no {} connection: set [connections] {} in the job file, pass --{}, or export {}",
                    role.name(),
                    role.name(),
                    role.name(),
                    role.env_var()
                ))
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    #[serde(default)]
    pub tables: Vec<RelayTableConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// `[[relay.tables]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayTableConfig {
    pub table: String,
    pub primary_columns: Vec<String>,
    pub source_query: String,
    #[serde(default = "default_chunk_size")]
    pub source_limit: usize,
}

/// `[[relay.relations]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationConfig {
    /// Anchor query, run against the relay
    pub relay_query: String,
    /// Child template, run against the source
    pub source_query: String,
    pub table: String,
    pub primary_columns: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub relay_limit: usize,
    #[serde(default = "default_chunk_size")]
    pub source_limit: usize,
    #[serde(default)]
    pub literal_policy: LiteralPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Create destination tables when absent (off: they must already exist)
    #[serde(default)]
    pub create_tables: bool,
    #[serde(default)]
    pub tables: Vec<StoreTableConfig>,
}

/// `[[store.tables]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreTableConfig {
    pub table: String,
    pub primary_columns: Vec<String>,
    /// Query run against the relay
    pub query: String,
    #[serde(default = "default_chunk_size")]
    pub relay_limit: usize,
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {:?}", path))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse job file {:?}", path))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: JobConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Build the source-to-relay job, validating every entry.
    pub fn relay_job(&self) -> Result<ReplicationJob, ReplicationError> {
        let tables = self
            .relay
            .tables
            .iter()
            .map(|t| {
                TableSpec::new(
                    &t.table,
                    t.primary_columns.clone(),
                    &t.source_query,
                    t.source_limit,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let relations = self
            .relay
            .relations
            .iter()
            .map(|r| {
                RelationSpec::new(
                    &r.relay_query,
                    &r.source_query,
                    &r.table,
                    r.primary_columns.clone(),
                    r.relay_limit,
                    r.source_limit,
                )
                .map(|spec| spec.with_literal_policy(r.literal_policy))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReplicationJob::new(tables, relations))
    }

    /// Build the relay-to-destination job, validating every entry.
    pub fn store_job(&self) -> Result<StoreJob, ReplicationError> {
        let tables = self
            .store
            .tables
            .iter()
            .map(|t| TableSpec::new(&t.table, t.primary_columns.clone(), &t.query, t.relay_limit))
            .collect::<Result<Vec<_>, _>>()?;

        let policy = if self.store.create_tables {
            SchemaPolicy::CreateIfAbsent
        } else {
            SchemaPolicy::Existing
        };

        Ok(StoreJob::new(tables, policy))
    }
}
