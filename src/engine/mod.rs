// ABOUTME: Replication engine - paged extraction, schema inference, upsert, relation cascades
// ABOUTME: Fully synchronous; every call blocks until the store answers

pub mod cursor;
pub mod job;
pub mod materializer;
pub mod relation;
pub mod spec;
pub mod typemap;

pub use cursor::{for_each_page, paged_statement, ChunkedCursor};
pub use job::{JobReport, ReplicationJob, StoreJob};
pub use materializer::{
    ensure_table, materialize_table, upsert_batch, upsert_statement, SchemaPolicy, TableStats,
};
pub use relation::{build_result_partial_query, embed_literals, expand_and_materialize, RelationStats};
pub use spec::{LiteralPolicy, RelationSpec, TableSpec, DEFAULT_CHUNK_SIZE, RELAY_RESULT_PLACEHOLDER};
pub use typemap::{declare_column, declare_columns, declare_primary_key, ColumnDeclaration};
