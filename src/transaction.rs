// ABOUTME: Transaction scope around a whole job run
// ABOUTME: BEGIN before, COMMIT on success, ROLLBACK on failure; the engine never calls this itself

use crate::connection::Connection;
use anyhow::{Context, Result};

/// Run `f` inside one transaction on `conn`.
///
/// The closure receives the same connection. If it fails, the transaction is
/// rolled back and the closure's error is returned; a rollback failure is
/// only logged so the original cause is not masked.
pub fn with_transaction<T, F>(conn: &mut dyn Connection, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn Connection) -> Result<T>,
{
    conn.execute("BEGIN").context("Failed to begin transaction")?;
    tracing::debug!("BEGIN");

    match f(&mut *conn) {
        Ok(value) => {
            conn.execute("COMMIT").context("Failed to commit transaction")?;
            tracing::debug!("COMMIT");
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute("ROLLBACK") {
                tracing::warn!("Rollback failed: {:#}", rollback_err);
            } else {
                tracing::debug!("ROLLBACK");
            }
            Err(e)
        }
    }
}
