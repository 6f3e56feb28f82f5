use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One open poll, keyed by the channel it runs in. There is no separate
/// round id: the channel id is embedded in every button instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub channel_id: String,
    /// `None` when the round was started with owner tracking disabled.
    /// Such a round can be ended by anyone.
    pub owner_id: Option<String>,
    /// Yes-voters in the order they voted. Never contains duplicates.
    pub votes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn has_voted(&self, user_id: &str) -> bool {
        self.votes.iter().any(|v| v == user_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Row contents for `create_if_absent`. Votes always start empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRound {
    pub channel_id: String,
    pub owner_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// How long a round lives before a new `/pub` may replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundExpiry {
    Never,
    /// Next UTC midnight after the round was started.
    #[default]
    EndOfDay,
    After(Duration),
}

impl RoundExpiry {
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Never => None,
            Self::EndOfDay => {
                let tomorrow = now.date_naive().succ_opt()?;
                Some(tomorrow.and_hms_opt(0, 0, 0)?.and_utc())
            }
            Self::After(ttl) => now.checked_add_signed(*ttl),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid round expiry '{0}': expected never, end-of-day, <n>h or <n>m")]
pub struct ParseExpiryError(String);

impl FromStr for RoundExpiry {
    type Err = ParseExpiryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        match raw.as_str() {
            "never" | "none" => return Ok(Self::Never),
            "end-of-day" | "eod" => return Ok(Self::EndOfDay),
            _ => {}
        }

        let err = || ParseExpiryError(s.to_string());
        let Some((unit_at, _)) = raw.char_indices().last() else {
            return Err(err());
        };
        let (amount, unit) = raw.split_at(unit_at);
        let amount: i64 = amount.parse().map_err(|_| err())?;
        if amount <= 0 {
            return Err(err());
        }

        let ttl = match unit {
            "h" => Duration::try_hours(amount),
            "m" => Duration::try_minutes(amount),
            _ => None,
        }
        .ok_or_else(err)?;

        Ok(Self::After(ttl))
    }
}

impl fmt::Display for RoundExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::EndOfDay => write!(f, "end-of-day"),
            Self::After(ttl) if ttl.num_minutes() % 60 == 0 => write!(f, "{}h", ttl.num_hours()),
            Self::After(ttl) => write!(f, "{}m", ttl.num_minutes()),
        }
    }
}
