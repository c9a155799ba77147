// ABOUTME: relay command - source to relay replication inside one relay-side transaction
// ABOUTME: Tables first, then relations whose anchors read what was just relayed

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::{JobConfig, StoreRole};
use crate::connection::{connect, ConnectOptions};
use crate::engine::JobReport;
use crate::transaction::with_transaction;

pub struct RelayOptions {
    pub config_path: PathBuf,
    pub source: Option<String>,
    pub relay: Option<String>,
    pub connect: ConnectOptions,
}

pub fn run(opts: RelayOptions) -> Result<JobReport> {
    let config = JobConfig::load(&opts.config_path)?;
    let job = config.relay_job()?;

    let source_url = config
        .connections
        .resolve(StoreRole::Source, opts.source.as_deref())?;
    let relay_url = config
        .connections
        .resolve(StoreRole::Relay, opts.relay.as_deref())?;

    tracing::info!(
        "Relaying {} tables and {} relations from {} into {}",
        job.tables.len(),
        job.relations.len(),
        crate::utils::redact_url(&source_url),
        crate::utils::redact_url(&relay_url)
    );

    let mut source = connect(&source_url, opts.connect).context("Failed to open source")?;
    let mut relay = connect(&relay_url, opts.connect).context("Failed to open relay")?;

    with_transaction(relay.as_mut(), |relay| job.run(source.as_mut(), relay))
}
