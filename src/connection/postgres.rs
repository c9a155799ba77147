// ABOUTME: PostgreSQL adapter for the Connection seam, backed by tokio-postgres
// ABOUTME: Drives the async client from a private runtime so the engine stays synchronous

use super::{ColumnMeta, ConnectOptions, Connection, Page};
use crate::error::ReplicationError;
use crate::value::{value_from_pg_row, Value};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio::runtime::Runtime;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// A PostgreSQL store.
///
/// Every call blocks the calling thread until the server answers. The
/// connection task is driven by a current-thread runtime owned by this value,
/// which only makes progress while one of the methods below is waiting on it.
pub struct PgConnection {
    runtime: Runtime,
    client: Client,
    /// `(table_oid, column_id)` -> `atttypmod`
    typmods: HashMap<(u32, i16), i32>,
}

impl PgConnection {
    /// Connect with TLS when the server offers it.
    ///
    /// With `allow_self_signed_certs`, certificate and hostname verification
    /// are disabled. Use only for testing.
    pub fn connect(url: &str, options: ConnectOptions) -> Result<Self> {
        crate::utils::validate_connection_string(url)?;
        let display_url = crate::utils::redact_url(url);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start PostgreSQL I/O runtime")?;

        let mut builder = native_tls::TlsConnector::builder();
        if options.allow_self_signed_certs {
            tracing::warn!("TLS certificate verification disabled for {}", display_url);
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        let connector = builder
            .build()
            .map_err(|e| ReplicationError::connection(&display_url, e))?;
        let tls = postgres_native_tls::MakeTlsConnector::new(connector);

        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(url, tls))
            .map_err(|e| ReplicationError::connection(&display_url, e))?;

        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        tracing::debug!("Connected to {}", display_url);

        Ok(Self {
            runtime,
            client,
            typmods: HashMap::new(),
        })
    }

    /// Look up the declared type modifier of a result column's base column.
    ///
    /// Computed columns have no base column and report -1.
    fn type_modifier(&mut self, table_oid: Option<u32>, column_id: Option<i16>) -> Result<i32> {
        let (Some(oid), Some(attnum)) = (table_oid, column_id) else {
            return Ok(-1);
        };
        if oid == 0 || attnum <= 0 {
            return Ok(-1);
        }
        if let Some(typmod) = self.typmods.get(&(oid, attnum)) {
            return Ok(*typmod);
        }

        const SQL: &str = "SELECT atttypmod FROM pg_attribute WHERE attrelid = $1 AND attnum = $2";
        let row = self
            .runtime
            .block_on(self.client.query_opt(SQL, &[&oid, &attnum]))
            .map_err(|e| ReplicationError::query(SQL, e))?;
        let typmod = row.map(|r| r.get::<_, i32>(0)).unwrap_or(-1);

        self.typmods.insert((oid, attnum), typmod);
        Ok(typmod)
    }
}

impl Connection for PgConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Page> {
        let statement = rewrite_placeholders(sql);
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let (stmt, rows) = self
            .runtime
            .block_on(async {
                let stmt = self.client.prepare(&statement).await?;
                let rows = self.client.query(&stmt, &bound).await?;
                Ok::<_, tokio_postgres::Error>((stmt, rows))
            })
            .map_err(|e| ReplicationError::query(&statement, e))?;

        let mut columns = Vec::with_capacity(stmt.columns().len());
        for column in stmt.columns() {
            let precision = self.type_modifier(column.table_oid(), column.column_id())?;
            columns.push(ColumnMeta {
                name: column.name().to_string(),
                native_type: column.type_().name().to_string(),
                precision,
            });
        }

        let rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| value_from_pg_row(row, idx))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ReplicationError::query(&statement, e))?;

        Ok(Page { columns, rows })
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(|e| ReplicationError::query(sql, e))?;
        Ok(())
    }

    fn execute_each(&mut self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        let statement = rewrite_placeholders(sql);
        let client = &self.client;

        self.runtime.block_on(async {
            let stmt = client
                .prepare(&statement)
                .await
                .map_err(|e| ReplicationError::query(&statement, e))?;

            let mut affected = 0u64;
            for (row_idx, params) in param_sets.iter().enumerate() {
                let bound: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
                affected += client
                    .execute(&stmt, &bound)
                    .await
                    .map_err(|e| ReplicationError::query(&statement, e))
                    .with_context(|| format!("Failed on parameter set {}", row_idx))?;
            }
            Ok::<u64, anyhow::Error>(affected)
        })
    }
}

/// Rewrite positional `?` placeholders to PostgreSQL's `$1, $2, ...`.
///
/// Question marks inside quoted literals (including `E'..'` escape strings
/// and `$tag$..$tag$` dollar quotes), double-quoted identifiers, and `--` or
/// `/* */` comments are left alone. Callers write `??` for a literal `?`,
/// which is how the jsonb `?`, `?|` and `?&` operators are spelled.
pub fn rewrite_placeholders(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut i = 0;

    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        let end = match chars[i] {
            '\'' => quoted_end(&chars, i, '\'', is_escape_string(&chars, i)),
            '"' => quoted_end(&chars, i, '"', false),
            '-' if next == Some('-') => line_comment_end(&chars, i),
            '/' if next == Some('*') => block_comment_end(&chars, i),
            '$' if i == 0 || !is_identifier_char(chars[i - 1]) => {
                dollar_quote_end(&chars, i).unwrap_or(i + 1)
            }
            '?' if next == Some('?') => {
                out.push('?');
                i += 2;
                continue;
            }
            '?' => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
                i += 1;
                continue;
            }
            _ => i + 1,
        };
        let end = end.min(chars.len());
        out.extend(&chars[i..end]);
        i = end;
    }

    out
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `E'...'` or `e'...'`, where backslash escapes the next character.
fn is_escape_string(chars: &[char], quote: usize) -> bool {
    quote > 0
        && matches!(chars[quote - 1], 'e' | 'E')
        && (quote == 1 || !is_identifier_char(chars[quote - 2]))
}

/// End (exclusive) of a quoted region opened at `start`. A doubled quote
/// stays inside the region.
fn quoted_end(chars: &[char], start: usize, quote: char, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if backslash_escapes => i += 2,
            c if c == quote && chars.get(i + 1) == Some(&quote) => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn line_comment_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| start + p + 1)
}

/// Block comments nest in PostgreSQL.
fn block_comment_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0;
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1)) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// End of a `$tag$...$tag$` body opened at `start`, or `None` when the `$`
/// does not open a dollar quote (for example `$1`).
fn dollar_quote_end(chars: &[char], start: usize) -> Option<usize> {
    let tag_len = chars[start + 1..]
        .iter()
        .take_while(|&&c| c.is_alphanumeric() || c == '_')
        .count();
    let close = start + 1 + tag_len;
    let numbered = tag_len > 0 && chars[start + 1].is_ascii_digit();
    if numbered || chars.get(close) != Some(&'$') {
        return None;
    }

    let delimiter = &chars[start..=close];
    let body = close + 1;
    Some(
        chars[body..]
            .windows(delimiter.len())
            .position(|w| w == delimiter)
            .map_or(chars.len(), |p| body + p + delimiter.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_placeholders_positional() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM users ORDER BY id LIMIT ? OFFSET ?"),
            "SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2"
        );
        assert_eq!(
            rewrite_placeholders(
                "INSERT INTO users (id, name) VALUES (?, ?) ON CONFLICT (id) DO UPDATE SET name=?"
            ),
            "INSERT INTO users (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name=$3"
        );
    }

    #[test]
    fn test_rewrite_placeholders_skips_quoted_regions() {
        assert_eq!(
            rewrite_placeholders("SELECT '?', \"wh?\" FROM t WHERE a = ? AND b = 'it''s?'"),
            "SELECT '?', \"wh?\" FROM t WHERE a = $1 AND b = 'it''s?'"
        );
    }

    #[test]
    fn test_rewrite_placeholders_skips_comments() {
        assert_eq!(
            rewrite_placeholders("SELECT a -- why?\nFROM t WHERE a = ?"),
            "SELECT a -- why?\nFROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_rewrite_placeholders_skips_block_comments() {
        assert_eq!(
            rewrite_placeholders("SELECT a /* why? /* nested? */ still? */ FROM t WHERE a = ?"),
            "SELECT a /* why? /* nested? */ still? */ FROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_rewrite_placeholders_skips_dollar_quotes() {
        assert_eq!(
            rewrite_placeholders("SELECT $$what?$$, $fn$ 'a?' $$ ? $fn$, ? FROM t"),
            "SELECT $$what?$$, $fn$ 'a?' $$ ? $fn$, $1 FROM t"
        );
        // Numbered parameters and identifiers containing `$` are not quotes
        assert_eq!(
            rewrite_placeholders("SELECT $1::int, a$b$ FROM t"),
            "SELECT $1::int, a$b$ FROM t"
        );
    }

    #[test]
    fn test_rewrite_placeholders_escape_strings() {
        assert_eq!(
            rewrite_placeholders("SELECT E'it\\'s?', e'\\\\' FROM t WHERE a = ?"),
            "SELECT E'it\\'s?', e'\\\\' FROM t WHERE a = $1"
        );
        // Outside an E'' string a backslash is an ordinary character
        assert_eq!(
            rewrite_placeholders("SELECT 'C:\\' FROM t WHERE a = ?"),
            "SELECT 'C:\\' FROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_rewrite_placeholders_doubled_question_mark_is_literal() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM t WHERE doc ?? 'k' AND doc ??| ? AND id = ?"),
            "SELECT * FROM t WHERE doc ? 'k' AND doc ?| $1 AND id = $2"
        );
    }

    #[test]
    fn test_rewrite_placeholders_without_params() {
        assert_eq!(
            rewrite_placeholders("CREATE TABLE IF NOT EXISTS t (id INT4, PRIMARY KEY (id));"),
            "CREATE TABLE IF NOT EXISTS t (id INT4, PRIMARY KEY (id));"
        );
    }
}
