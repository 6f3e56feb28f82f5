use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    // === Conflicts ===
    #[error("a round already exists for this channel")]
    AlreadyExists,

    #[error("round is missing or owned by another user")]
    NotOwner,

    #[error("votes changed since they were read")]
    StaleVotes,

    // === Backend failures ===
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed votes column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("DB lock poisoned: {0}")]
    Lock(String),
}

impl StoreError {
    /// Conflicts are expected outcomes of a conditional write. Everything else
    /// is a backend failure the caller should surface.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists | Self::NotOwner | Self::StaleVotes)
    }
}
