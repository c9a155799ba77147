// ABOUTME: Typed failure taxonomy for the replication engine
// ABOUTME: Raised inside anyhow chains so callers can classify failures by downcasting

use thiserror::Error;

/// Boxed driver error carried as the source of connection/query failures.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures the engine distinguishes.
///
/// Library functions return `anyhow::Result` with context attached at each
/// I/O boundary. The underlying error is one of these variants whenever the
/// failure belongs to the engine's taxonomy, so callers can recover it with
/// `err.downcast_ref::<ReplicationError>()`.
///
/// None of these are retried anywhere in the crate. Every one of them must
/// reach the transaction scope so the job can be rolled back.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Column metadata is missing a name or a native type.
    #[error("Schema inference failed for column {index}: {reason}")]
    SchemaInference { index: usize, reason: String },

    /// A row's arity does not match the column list captured for its query.
    #[error("Row {row} for table '{table}' has {actual} values, expected {expected}")]
    Upsert {
        table: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Opening a connection failed. `target` never contains a password.
    #[error("Failed to connect to {target}")]
    Connection {
        target: String,
        #[source]
        source: DriverError,
    },

    /// Preparing or executing a statement failed.
    #[error("Failed to execute statement: {statement}")]
    QueryExecution {
        statement: String,
        #[source]
        source: DriverError,
    },

    /// The job specification was rejected at construction time.
    #[error("Invalid job configuration: {0}")]
    Config(String),

    /// An anchor value was refused for literal embedding under a strict policy.
    #[error("Anchor value '{value}' cannot be embedded as a SQL literal")]
    UnsafeLiteral { value: String },
}

impl ReplicationError {
    pub(crate) fn query(statement: &str, source: impl Into<DriverError>) -> Self {
        ReplicationError::QueryExecution {
            statement: statement.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn connection(target: &str, source: impl Into<DriverError>) -> Self {
        ReplicationError::Connection {
            target: target.to_string(),
            source: source.into(),
        }
    }
}
