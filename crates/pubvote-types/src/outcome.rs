use serde::{Deserialize, Serialize};

/// Result of a round operation. Each variant maps to exactly one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A new round is open. The channel id goes into every button value.
    Started { channel_id: String },
    RoundAlreadyActive,
    AlreadyVoted,
    /// `count` is `None` when there was no round to record the vote in.
    VoteRecorded { user_name: String, count: Option<usize> },
    VoteWithdrawn,
    NotRoundOwner,
    EndedSuccess { voters: Vec<String> },
    EndedInsufficient { count: usize },
}

impl Outcome {
    /// User-visible text. These strings are fixed.
    pub fn text(&self) -> String {
        match self {
            Self::Started { .. } => "Soooooooo, Pub? :beers:".to_string(),
            Self::RoundAlreadyActive => "There is a pub vote in this channel already".to_string(),
            Self::AlreadyVoted => "You have already voted".to_string(),
            Self::VoteRecorded { user_name, .. } => format!("Yass {}!", user_name),
            Self::VoteWithdrawn => "Well you suck".to_string(),
            Self::NotRoundOwner => "You did not start this round".to_string(),
            Self::EndedSuccess { voters } => format!(
                "Round ended with {} people on it: {} Assemble!",
                voters.len(),
                mentions(voters)
            ),
            Self::EndedInsufficient { .. } => {
                "Not enough people are on it, try harder next time".to_string()
            }
        }
    }

    /// Whether the reply is posted for the whole channel to see.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Self::Started { .. } | Self::EndedSuccess { .. } | Self::EndedInsufficient { .. }
        )
    }

    pub fn ends_round(&self) -> bool {
        matches!(self, Self::EndedSuccess { .. } | Self::EndedInsufficient { .. })
    }
}

/// `<@a>, <@b>, <@c>`
pub fn mentions(user_ids: &[String]) -> String {
    user_ids
        .iter()
        .map(|id| format!("<@{}>", id))
        .collect::<Vec<_>>()
        .join(", ")
}
