//! Leaderboard access.
//!
//! - `ScoreboardSource`: where snapshots come from (HTTP client or mock)
//! - `ScoreboardCache`: TTL cache with single-flight refresh
//! - `Snapshot`: one immutable copy of the leaderboard

pub mod cache;
pub mod client;
pub mod mock;
pub mod types;

pub use cache::{ScoreboardCache, DEFAULT_TTL};
pub use client::{AocClient, AocClientConfig, ScoreboardSource, DEFAULT_BASE_URL, USER_AGENT};
pub use mock::MockSource;
pub use types::{ScoreboardMember, Snapshot, StarCompletion};

/// Why a leaderboard fetch failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScoreboardError {
    /// Transport failure or unexpected status; safe to retry later
    #[error("Leaderboard fetch failed: {0}")]
    Fetch(String),

    /// Session cookie rejected; needs an operator to refresh it
    #[error("Leaderboard session has expired, please update the session cookie ({0})")]
    Auth(String),

    /// Body did not decode as a leaderboard
    #[error("Malformed leaderboard payload: {0}")]
    Parse(String),
}

impl ScoreboardError {
    /// Whether retrying without operator action can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
