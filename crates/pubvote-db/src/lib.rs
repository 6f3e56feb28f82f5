pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use pubvote_types::models::{NewRound, Round};

pub use error::StoreError;

/// How long a write waits on another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of the atomic "add if absent" vote update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteInsert {
    Added(Round),
    AlreadyPresent(Round),
    NoRound,
}

/// Key-value contract for round rows, keyed by channel id.
///
/// Every conditional operation is evaluated atomically by the backend; callers
/// never lock. Expired rows are invisible to all operations.
pub trait RoundStore: Send + Sync {
    /// Insert a round with no votes. Fails with `AlreadyExists` if a live row
    /// is present for the channel.
    fn create_if_absent(&self, round: &NewRound) -> Result<Round, StoreError>;

    fn read(&self, channel_id: &str) -> Result<Option<Round>, StoreError>;

    /// Append without any duplicate check.
    fn append_vote(&self, channel_id: &str, user_id: &str) -> Result<Option<Round>, StoreError>;

    /// Append only if `user_id` is not already in the votes.
    fn add_vote_if_absent(&self, channel_id: &str, user_id: &str) -> Result<VoteInsert, StoreError>;

    /// Overwrite the votes, provided they still equal `previous`.
    /// Fails with `StaleVotes` when they changed since that read.
    fn replace_votes(
        &self,
        channel_id: &str,
        previous: &[String],
        votes: &[String],
    ) -> Result<Option<Round>, StoreError>;

    /// Delete the row if `owner_id` started it, or if it has no owner.
    /// A missing row is reported as `NotOwner` too.
    fn delete_if_owned_by(&self, channel_id: &str, owner_id: &str) -> Result<Round, StoreError>;

    /// Unconditional delete. Returns the last state if there was a live row.
    fn delete(&self, channel_id: &str) -> Result<Option<Round>, StoreError>;

    /// Drop every expired row. Returns how many were removed.
    fn delete_expired(&self) -> Result<usize, StoreError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Wait on other openers before anything that needs a lock
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL so several server processes can share one file
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        f(&conn)
    }
}
