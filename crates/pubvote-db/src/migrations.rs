use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use crate::StoreError;

/// Bring the schema up to date. Several processes may open the same file at
/// once, so the version is read and bumped under the write lock.
pub fn run(conn: &Connection) -> Result<(), StoreError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (rounds)");
        tx.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rounds (
                channel_id  TEXT PRIMARY KEY,
                owner_id    TEXT,
                votes       TEXT NOT NULL DEFAULT '[]',
                expires_at  INTEGER,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_rounds_expires_at
                ON rounds(expires_at) WHERE expires_at IS NOT NULL;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    tx.commit()?;
    Ok(())
}
