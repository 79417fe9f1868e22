//! Crate-level error type.

use crate::ledger::LedgerError;
use crate::membership::MembershipError;
use crate::scoreboard::ScoreboardError;

/// Errors surfaced by community, reconciliation and command operations.
#[derive(Debug, thiserror::Error)]
pub enum StarboardError {
    /// No community state exists for the guild
    #[error("Community {0} is not configured")]
    NotConfigured(String),

    /// The leaderboard participant is already linked to a guild member
    #[error("Leaderboard member {remote_id} is already claimed")]
    AlreadyClaimed { remote_id: String },

    /// No leaderboard participant matches the query, even after a refresh
    #[error("No leaderboard member matches '{0}'")]
    NotFound(String),

    /// The guild member has not claimed a leaderboard participant
    #[error("{0} has not claimed a leaderboard member")]
    NotClaimed(String),

    /// The claimed participant is missing from the current leaderboard
    #[error("Leaderboard member {0} is not on the current leaderboard")]
    NotOnScoreboard(String),

    /// Day outside 1..=25
    #[error("Day {0} is outside the event calendar")]
    InvalidDay(u32),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Scoreboard error: {0}")]
    Scoreboard(#[from] ScoreboardError),

    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),
}

impl From<LedgerError> for StarboardError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyClaimed { remote_id, .. } => Self::AlreadyClaimed { remote_id },
            LedgerError::NotFound(local_id) => Self::NotClaimed(local_id),
            other => Self::Ledger(other),
        }
    }
}

/// Result alias for crate operations.
pub type Result<T> = std::result::Result<T, StarboardError>;
