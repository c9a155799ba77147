// ABOUTME: Integration tests against live PostgreSQL source and target databases
// ABOUTME: Ignored by default; set TEST_SOURCE_URL and TEST_TARGET_URL and run with --ignored

use relay_replicator::connection::{ColumnMeta, PgConnection};
use relay_replicator::engine::{RelationSpec, ReplicationJob, TableSpec};
use relay_replicator::{with_transaction, ConnectOptions, Connection, Value};
use std::env;

/// Helper to get test database URLs from environment
fn get_test_urls() -> Option<(String, String)> {
    let source = env::var("TEST_SOURCE_URL").ok()?;
    let target = env::var("TEST_TARGET_URL").ok()?;
    Some((source, target))
}

fn connect_pair() -> Option<(PgConnection, PgConnection)> {
    let (source_url, target_url) = get_test_urls()?;
    let source = PgConnection::connect(&source_url, ConnectOptions::default()).unwrap();
    let target = PgConnection::connect(&target_url, ConnectOptions::default()).unwrap();
    Some((source, target))
}

fn setup(source: &mut PgConnection, target: &mut PgConnection) {
    source
        .execute(
            "DROP TABLE IF EXISTS relay_test_accounts;
             DROP TABLE IF EXISTS relay_test_users;
             CREATE TABLE relay_test_users (
                 id INTEGER PRIMARY KEY,
                 email VARCHAR(20) NOT NULL,
                 active BOOLEAN NOT NULL,
                 created_at TIMESTAMPTZ DEFAULT NOW()
             );
             INSERT INTO relay_test_users (id, email, active) VALUES
                 (1, 'a@example.com', true), (2, 'b@example.com', false), (3, 'c@example.com', true);
             CREATE TABLE relay_test_accounts (
                 id BIGINT PRIMARY KEY,
                 user_id INTEGER NOT NULL,
                 balance NUMERIC(12, 2) NOT NULL
             );
             INSERT INTO relay_test_accounts VALUES (10, 1, 100.50), (11, 2, 5), (12, 3, 0);",
        )
        .unwrap();
    target
        .execute(
            "DROP TABLE IF EXISTS relay_test_accounts;
             DROP TABLE IF EXISTS relay_test_users;",
        )
        .unwrap();
}

fn count(conn: &mut PgConnection, table: &str) -> i64 {
    let page = conn
        .query(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .unwrap();
    match &page.rows[0][0] {
        Value::Int(n) => *n,
        other => panic!("unexpected count {:?}", other),
    }
}

#[test]
#[ignore]
fn test_column_metadata_reports_varchar_typmod() {
    let Some((mut source, mut target)) = connect_pair() else {
        eprintln!("Skipping: TEST_SOURCE_URL / TEST_TARGET_URL not set");
        return;
    };
    setup(&mut source, &mut target);

    let page = source
        .query(
            "SELECT id, email, active FROM relay_test_users ORDER BY id LIMIT ? OFFSET ?",
            &[Value::Int(0), Value::Int(0)],
        )
        .unwrap();

    assert!(page.is_empty());
    assert_eq!(page.columns[0], ColumnMeta::new("id", "int4", -1));
    assert_eq!(page.columns[1], ColumnMeta::new("email", "varchar", 24));
    assert_eq!(page.columns[2].native_type, "bool");
}

#[test]
#[ignore]
fn test_relay_tables_and_relation_into_postgres() {
    let Some((mut source, mut target)) = connect_pair() else {
        eprintln!("Skipping: TEST_SOURCE_URL / TEST_TARGET_URL not set");
        return;
    };
    setup(&mut source, &mut target);

    let job = ReplicationJob::new(
        vec![TableSpec::new(
            "relay_test_users",
            vec!["id".to_string()],
            "SELECT * FROM relay_test_users WHERE id IN (1, 2) ORDER BY id",
            1,
        )
        .unwrap()],
        vec![RelationSpec::new(
            "SELECT id FROM relay_test_users ORDER BY id",
            "SELECT * FROM relay_test_accounts WHERE user_id IN ({{relay_query_result}}) ORDER BY id",
            "relay_test_accounts",
            vec!["id".to_string()],
            1,
            1000,
        )
        .unwrap()],
    );

    let report = with_transaction(&mut target, |t| job.run(&mut source, t)).unwrap();
    assert_eq!(report.total_rows(), 4);
    assert_eq!(count(&mut target, "relay_test_users"), 2);
    assert_eq!(count(&mut target, "relay_test_accounts"), 2);

    // Second run converges on the same content
    with_transaction(&mut target, |t| job.run(&mut source, t)).unwrap();
    assert_eq!(count(&mut target, "relay_test_users"), 2);

    // Booleans were bound as 0/1 and converted back by the server
    let page = target
        .query(
            "SELECT active FROM relay_test_users WHERE id = ?",
            &[Value::Int(1)],
        )
        .unwrap();
    assert_eq!(page.rows[0][0], Value::Bool(true));
}

#[test]
#[ignore]
fn test_interval_enum_and_time_columns_pass_through() {
    let Some((mut source, mut target)) = connect_pair() else {
        eprintln!("Skipping: TEST_SOURCE_URL / TEST_TARGET_URL not set");
        return;
    };
    let ddl = "DROP TABLE IF EXISTS relay_test_shifts;
               DROP TYPE IF EXISTS relay_test_mood;
               CREATE TYPE relay_test_mood AS ENUM ('calm', 'busy');
               CREATE TABLE relay_test_shifts (
                   id INTEGER PRIMARY KEY,
                   mood relay_test_mood NOT NULL,
                   length INTERVAL NOT NULL,
                   starts_at TIME NOT NULL
               );";
    source.execute(ddl).unwrap();
    source
        .execute(
            "INSERT INTO relay_test_shifts VALUES
                 (1, 'calm', INTERVAL '8 hours', '09:00'),
                 (2, 'busy', INTERVAL '1 day 30 minutes', '22:15:30');",
        )
        .unwrap();
    // Column metadata cannot recreate an enum type, so the target gets the same DDL
    target.execute(ddl).unwrap();

    let job = ReplicationJob::new(
        vec![TableSpec::new(
            "relay_test_shifts",
            vec!["id".to_string()],
            "SELECT * FROM relay_test_shifts ORDER BY id",
            1,
        )
        .unwrap()],
        vec![],
    );

    let report = with_transaction(&mut target, |t| job.run(&mut source, t)).unwrap();
    assert_eq!(report.total_rows(), 2);

    let page = target
        .query(
            "SELECT mood::text AS mood, length::text AS length, starts_at FROM relay_test_shifts ORDER BY id",
            &[],
        )
        .unwrap();
    assert_eq!(page.rows[0][0], Value::from("calm"));
    assert_eq!(page.rows[0][1], Value::from("08:00:00"));
    assert_eq!(page.rows[1][0], Value::from("busy"));
    assert_eq!(page.rows[1][1], Value::from("1 day 00:30:00"));
    assert_eq!(page.rows[1][2].to_string(), "22:15:30");

    let page = source
        .query("SELECT length FROM relay_test_shifts WHERE id = ?", &[Value::Int(1)])
        .unwrap();
    assert!(matches!(page.rows[0][0], Value::Raw { .. }));
}
