// ABOUTME: store command - relay to destination copy inside one destination-side transaction
// ABOUTME: Upserts into existing tables unless the job file enables table creation

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::{JobConfig, StoreRole};
use crate::connection::{connect, ConnectOptions};
use crate::engine::JobReport;
use crate::transaction::with_transaction;

pub struct StoreOptions {
    pub config_path: PathBuf,
    pub relay: Option<String>,
    pub destination: Option<String>,
    pub connect: ConnectOptions,
}

pub fn run(opts: StoreOptions) -> Result<JobReport> {
    let config = JobConfig::load(&opts.config_path)?;
    let job = config.store_job()?;

    let relay_url = config
        .connections
        .resolve(StoreRole::Relay, opts.relay.as_deref())?;
    let destination_url = config
        .connections
        .resolve(StoreRole::Destination, opts.destination.as_deref())?;

    tracing::info!(
        "Storing {} tables from {} into {} ({:?})",
        job.tables.len(),
        crate::utils::redact_url(&relay_url),
        crate::utils::redact_url(&destination_url),
        job.schema_policy
    );

    let mut relay = connect(&relay_url, opts.connect).context("Failed to open relay")?;
    let mut destination =
        connect(&destination_url, opts.connect).context("Failed to open destination")?;

    with_transaction(destination.as_mut(), |destination| {
        job.run(relay.as_mut(), destination)
    })
}
