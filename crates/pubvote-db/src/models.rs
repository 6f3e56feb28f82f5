use chrono::DateTime;
use rusqlite::Row;

use pubvote_types::models::Round;

use crate::StoreError;

/// Columns selected or returned for every round query, in `RoundRow` order.
pub const ROUND_COLUMNS: &str = "channel_id, owner_id, votes, expires_at";

/// A `rounds` row as SQLite stores it: votes as JSON text, expiry as unix seconds.
pub struct RoundRow {
    pub channel_id: String,
    pub owner_id: Option<String>,
    pub votes: String,
    pub expires_at: Option<i64>,
}

impl RoundRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            channel_id: row.get(0)?,
            owner_id: row.get(1)?,
            votes: row.get(2)?,
            expires_at: row.get(3)?,
        })
    }
}

impl TryFrom<RoundRow> for Round {
    type Error = StoreError;

    fn try_from(row: RoundRow) -> Result<Self, Self::Error> {
        let votes: Vec<String> = serde_json::from_str(&row.votes)?;
        let expires_at = match row.expires_at {
            Some(secs) => Some(DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "expires_at {} out of range for channel {}",
                    secs, row.channel_id
                ))
            })?),
            None => None,
        };

        Ok(Round {
            channel_id: row.channel_id,
            owner_id: row.owner_id,
            votes,
            expires_at,
        })
    }
}
