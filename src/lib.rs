// ABOUTME: Library root for relay-replicator
// ABOUTME: Chunked source-to-relay and relay-to-destination copies with upserts and relation cascades

pub mod commands;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod transaction;
pub mod utils;
pub mod value;

pub use connection::{connect, detect_store_kind, ConnectOptions, Connection, StoreKind};
pub use engine::{JobReport, ReplicationJob, StoreJob};
pub use error::ReplicationError;
pub use transaction::with_transaction;
pub use value::{Row, Value};
