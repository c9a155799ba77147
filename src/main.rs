// ABOUTME: CLI entry point for relay-replicator
// ABOUTME: Parses commands, initializes logging, and routes to the relay/store/validate handlers

use clap::{Parser, Subcommand};
use relay_replicator::commands::{self, RelayOptions, StoreOptions};
use relay_replicator::config::{DESTINATION_URL_ENV, RELAY_URL_ENV, SOURCE_URL_ENV};
use relay_replicator::{ConnectOptions, JobReport};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "relay-replicator")]
#[command(about = "Relay rows from a source database into a staging store, then into a destination", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy tables and relations from the source into the relay
    Relay {
        /// Path to the job file
        #[arg(long)]
        config: PathBuf,
        /// Source connection URL (overrides the job file)
        #[arg(long, env = SOURCE_URL_ENV)]
        source: Option<String>,
        /// Relay connection URL (overrides the job file)
        #[arg(long, env = RELAY_URL_ENV)]
        relay: Option<String>,
    },
    /// Copy store tables from the relay into the destination
    Store {
        /// Path to the job file
        #[arg(long)]
        config: PathBuf,
        /// Relay connection URL (overrides the job file)
        #[arg(long, env = RELAY_URL_ENV)]
        relay: Option<String>,
        /// Destination connection URL (overrides the job file)
        #[arg(long, env = DESTINATION_URL_ENV)]
        destination: Option<String>,
    },
    /// Check a job file without connecting to anything
    Validate {
        /// Path to the job file
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let connect = ConnectOptions {
        allow_self_signed_certs: cli.allow_self_signed_certs,
    };

    match cli.command {
        Commands::Relay {
            config,
            source,
            relay,
        } => {
            let report = commands::relay::run(RelayOptions {
                config_path: config,
                source,
                relay,
                connect,
            })?;
            print_report("Relay", &report);
        }
        Commands::Store {
            config,
            relay,
            destination,
        } => {
            let report = commands::store::run(StoreOptions {
                config_path: config,
                relay,
                destination,
                connect,
            })?;
            print_report("Store", &report);
        }
        Commands::Validate { config } => {
            let summary = commands::validate::run(&config)?;
            println!(
                "Job file OK: {} relay tables, {} relations, {} store tables",
                summary.relay_tables, summary.relations, summary.store_tables
            );
        }
    }
    Ok(())
}

fn print_report(job: &str, report: &JobReport) {
    for table in &report.tables {
        println!(
            "  {:<30} {:>10} rows  {:>6} pages",
            table.table, table.rows, table.pages
        );
    }
    for relation in &report.relations {
        println!(
            "  {:<30} {:>10} rows  {:>6} anchor pages ({} anchor rows)",
            relation.table, relation.child_rows, relation.anchor_pages, relation.anchor_rows
        );
    }
    println!(
        "{} complete: {} rows in {}ms",
        job,
        report.total_rows(),
        report.duration_ms
    );
}
