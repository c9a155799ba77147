// ABOUTME: CLI tests driving the compiled relay-replicator binary
// ABOUTME: Uses SQLite files in a temp directory for source, relay, and destination

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_relay-replicator"));
    cmd.env_remove("RUST_LOG")
        .env_remove("RELAY_SOURCE_URL")
        .env_remove("RELAY_RELAY_URL")
        .env_remove("RELAY_DESTINATION_URL");
    cmd
}

fn seed_source(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(20));
         INSERT INTO users VALUES (1, 'Ann'), (2, 'Bob'), (3, 'Cy');
         CREATE TABLE accounts (id INTEGER PRIMARY KEY, user_id INTEGER, balance INTEGER);
         INSERT INTO accounts VALUES (10, 1, 100), (11, 2, 5), (12, 3, 0);",
    )
    .unwrap();
}

fn count(path: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

fn job_file(dir: &Path, source: &Path, relay: &Path, destination: &Path) -> std::path::PathBuf {
    let contents = format!(
        r#"
[connections]
source = "{}"
relay = "{}"
destination = "{}"

[[relay.tables]]
table = "users"
primary_columns = ["id"]
source_query = "SELECT * FROM users WHERE id IN (1, 2) ORDER BY id"
source_limit = 1

[[relay.relations]]
relay_query = "SELECT id FROM users ORDER BY id"
source_query = "SELECT * FROM accounts WHERE user_id IN ({{{{relay_query_result}}}}) ORDER BY id"
table = "accounts"
primary_columns = ["id"]
literal_policy = "numeric_only"

[store]
create_tables = true

[[store.tables]]
table = "accounts"
primary_columns = ["id"]
query = "SELECT * FROM accounts ORDER BY id"
"#,
        source.display(),
        relay.display(),
        destination.display()
    );
    let path = dir.join("job.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_relay_then_store() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.db");
    let relay = dir.path().join("relay.db");
    let destination = dir.path().join("destination.db");
    seed_source(&source);
    let job = job_file(dir.path(), &source, &relay, &destination);

    let output = bin()
        .arg("relay")
        .arg("--config")
        .arg(&job)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Relay complete: 4 rows"));
    assert_eq!(count(&relay, "users"), 2);
    assert_eq!(count(&relay, "accounts"), 2);

    let output = bin()
        .arg("store")
        .arg("--config")
        .arg(&job)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(count(&destination, "accounts"), 2);
}

#[test]
fn test_env_overrides_job_file() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.db");
    let relay = dir.path().join("relay.db");
    let other_relay = dir.path().join("other_relay.db");
    let destination = dir.path().join("destination.db");
    seed_source(&source);
    let job = job_file(dir.path(), &source, &relay, &destination);

    let output = bin()
        .arg("relay")
        .arg("--config")
        .arg(&job)
        .env("RELAY_RELAY_URL", &other_relay)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(count(&other_relay, "users"), 2);
    assert!(!relay.exists());
}

#[test]
fn test_validate_reports_counts() {
    let dir = tempdir().unwrap();
    let job = job_file(
        dir.path(),
        &dir.path().join("s.db"),
        &dir.path().join("r.db"),
        &dir.path().join("d.db"),
    );

    let output = bin()
        .arg("validate")
        .arg("--config")
        .arg(&job)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("1 relay tables, 1 relations, 1 store tables"));
    // Validation never opens a store
    assert!(!dir.path().join("s.db").exists());
}

#[test]
fn test_invalid_job_fails_with_message() {
    let dir = tempdir().unwrap();
    let job = dir.path().join("job.toml");
    fs::write(
        &job,
        r#"
[[relay.relations]]
relay_query = "SELECT id FROM users ORDER BY id"
source_query = "SELECT * FROM accounts ORDER BY id"
table = "accounts"
primary_columns = ["id"]
"#,
    )
    .unwrap();

    let output = bin()
        .arg("validate")
        .arg("--config")
        .arg(&job)
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("{{relay_query_result}}"));
}

#[test]
fn test_missing_connection_is_reported() {
    let dir = tempdir().unwrap();
    let job = dir.path().join("job.toml");
    fs::write(
        &job,
        r#"
[[store.tables]]
table = "users"
primary_columns = ["id"]
query = "SELECT * FROM users ORDER BY id"
"#,
    )
    .unwrap();

    let output = bin()
        .arg("store")
        .arg("--config")
        .arg(&job)
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("RELAY_RELAY_URL"));
}
