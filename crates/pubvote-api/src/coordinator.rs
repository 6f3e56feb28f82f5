use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use pubvote_db::{RoundStore, StoreError, VoteInsert};
use pubvote_types::models::{NewRound, RoundExpiry};
use pubvote_types::outcome::Outcome;

/// Fewer yes-votes than this and the round fizzles out.
pub const MIN_PARTY_SIZE: usize = 3;

/// `unvote` gives up after this many lost compare-and-swap races.
const MAX_UNVOTE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    /// Stored on each round when it starts: only its starter may end it.
    pub require_owner_for_end: bool,
    pub expiry: RoundExpiry,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            require_owner_for_end: true,
            expiry: RoundExpiry::EndOfDay,
        }
    }
}

#[derive(Debug, Error)]
pub enum RoundError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Round lifecycle for every channel. Holds no state of its own: all
/// coordination happens through the store's conditional writes.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn RoundStore>,
    config: RoundConfig,
}

impl Coordinator {
    pub fn new(store: Arc<dyn RoundStore>, config: RoundConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub async fn start(&self, channel_id: &str, user_id: &str) -> Result<Outcome, RoundError> {
        let round = NewRound {
            channel_id: channel_id.to_string(),
            owner_id: self
                .config
                .require_owner_for_end
                .then(|| user_id.to_string()),
            expires_at: self.config.expiry.deadline(Utc::now()),
        };

        match self.blocking(move |store| store.create_if_absent(&round)).await? {
            Ok(round) => {
                info!(
                    "Starting pub round in {} for {} (expires {:?})",
                    round.channel_id, user_id, round.expires_at
                );
                Ok(Outcome::Started {
                    channel_id: round.channel_id,
                })
            }
            Err(StoreError::AlreadyExists) => {
                debug!("Round already active in {}", channel_id);
                Ok(Outcome::RoundAlreadyActive)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a yes-vote. Voting where no round is running stores nothing and
    /// still answers `VoteRecorded`, with `count: None`.
    pub async fn vote(
        &self,
        channel_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<Outcome, RoundError> {
        let cid = channel_id.to_string();
        let uid = user_id.to_string();

        let inserted = self
            .blocking(move |store| store.add_vote_if_absent(&cid, &uid))
            .await??;

        let outcome = match inserted {
            VoteInsert::Added(round) => {
                debug!("{} is on it in {} ({} so far)", user_id, channel_id, round.votes.len());
                Outcome::VoteRecorded {
                    user_name: user_name.to_string(),
                    count: Some(round.votes.len()),
                }
            }
            VoteInsert::AlreadyPresent(_) => Outcome::AlreadyVoted,
            VoteInsert::NoRound => {
                warn!("{} voted in {} but no round is active", user_id, channel_id);
                Outcome::VoteRecorded {
                    user_name: user_name.to_string(),
                    count: None,
                }
            }
        };

        Ok(outcome)
    }

    pub async fn unvote(&self, channel_id: &str, user_id: &str) -> Result<Outcome, RoundError> {
        for attempt in 1..=MAX_UNVOTE_ATTEMPTS {
            let cid = channel_id.to_string();
            let Some(round) = self.blocking(move |store| store.read(&cid)).await?? else {
                return Ok(Outcome::VoteWithdrawn);
            };

            if !round.has_voted(user_id) {
                return Ok(Outcome::VoteWithdrawn);
            }

            let remaining: Vec<String> = round
                .votes
                .iter()
                .filter(|v| v.as_str() != user_id)
                .cloned()
                .collect();

            let cid = channel_id.to_string();
            let previous = round.votes;
            match self
                .blocking(move |store| store.replace_votes(&cid, &previous, &remaining))
                .await?
            {
                Ok(_) => {
                    debug!("{} withdrew from {}", user_id, channel_id);
                    return Ok(Outcome::VoteWithdrawn);
                }
                Err(StoreError::StaleVotes) => {
                    debug!("Votes in {} changed under unvote, attempt {}", channel_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Giving up withdrawing {} from {} after {} attempts",
            user_id, channel_id, MAX_UNVOTE_ATTEMPTS
        );
        Err(StoreError::StaleVotes.into())
    }

    pub async fn end(&self, channel_id: &str, user_id: &str) -> Result<Outcome, RoundError> {
        let cid = channel_id.to_string();
        let uid = user_id.to_string();

        match self
            .blocking(move |store| store.delete_if_owned_by(&cid, &uid))
            .await?
        {
            Ok(round) => {
                info!(
                    "Round in {} ended by {} with {} votes",
                    channel_id,
                    user_id,
                    round.votes.len()
                );
                Ok(tally(round.votes))
            }
            Err(StoreError::NotOwner) => {
                warn!("{} tried to end a round in {} they do not own", user_id, channel_id);
                Ok(Outcome::NotRoundOwner)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run a store call on the blocking pool. The inner result is left for the
    /// caller so conflicts can be turned into outcomes.
    async fn blocking<F, T>(&self, f: F) -> Result<Result<T, StoreError>, RoundError>
    where
        F: FnOnce(&dyn RoundStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || f(store.as_ref())).await?)
    }
}

fn tally(votes: Vec<String>) -> Outcome {
    if votes.len() >= MIN_PARTY_SIZE {
        Outcome::EndedSuccess { voters: votes }
    } else {
        Outcome::EndedInsufficient { count: votes.len() }
    }
}
