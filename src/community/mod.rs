//! Per-community state: one claim ledger plus one leaderboard cache.

pub mod registry;
pub mod suggest;

pub use registry::{CommunityRegistry, RegistryOptions};

use std::sync::Arc;

use tracing::{debug, info};

use crate::ledger::ClaimLedger;
use crate::scoreboard::{ScoreboardCache, ScoreboardMember, Snapshot};
use crate::types::{Result, StarboardError};

/// Static settings of one community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunitySettings {
    /// Discord guild id
    pub community_id: String,
    /// Event year, e.g. "2024"
    pub event: String,
    pub leaderboard_id: String,
    /// Grant a `Day NN` badge for every completed day
    pub daily_roles: bool,
}

/// Claims and leaderboard for one community.
pub struct CommunityState {
    settings: CommunitySettings,
    ledger: ClaimLedger,
    cache: ScoreboardCache,
}

impl CommunityState {
    pub fn new(settings: CommunitySettings, ledger: ClaimLedger, cache: ScoreboardCache) -> Self {
        Self {
            settings,
            ledger,
            cache,
        }
    }

    pub fn community_id(&self) -> &str {
        &self.settings.community_id
    }

    pub fn settings(&self) -> &CommunitySettings {
        &self.settings
    }

    pub fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &ScoreboardCache {
        &self.cache
    }

    /// Find a participant in the cached leaderboard. On a miss the
    /// leaderboard is refreshed once and searched again.
    async fn locate<F>(&self, query: &str, find: F) -> Result<ScoreboardMember>
    where
        F: Fn(&Snapshot) -> Option<ScoreboardMember>,
    {
        let snapshot = self.cache.get().await?;
        if let Some(member) = find(snapshot.as_ref()) {
            return Ok(member);
        }

        debug!(community_id = %self.community_id(), query, "Participant not cached, refreshing");
        let snapshot = self.cache.force_refresh().await?;
        find(snapshot.as_ref()).ok_or_else(|| StarboardError::NotFound(query.to_string()))
    }

    async fn record_claim(&self, local_id: &str, member: ScoreboardMember) -> Result<ScoreboardMember> {
        self.ledger.claim(local_id, &member.remote_id()).await?;
        info!(
            community_id = %self.community_id(),
            local_id,
            remote_id = member.id,
            name = %member.display_name(),
            "Participant claimed"
        );
        Ok(member)
    }

    /// Claim the participant whose display name is exactly `name`.
    pub async fn claim_by_display_name(&self, local_id: &str, name: &str) -> Result<ScoreboardMember> {
        let member = self
            .locate(name, |snapshot| snapshot.member_by_name(name).cloned())
            .await?;
        self.record_claim(local_id, member).await
    }

    /// Claim the participant with this numeric id.
    pub async fn claim_by_remote_id(&self, local_id: &str, remote_id: &str) -> Result<ScoreboardMember> {
        let member = self
            .locate(remote_id, |snapshot| snapshot.member_by_id(remote_id).cloned())
            .await?;
        self.record_claim(local_id, member).await
    }

    /// Claim by display name, falling back to the numeric id.
    pub async fn claim(&self, local_id: &str, name_or_id: &str) -> Result<ScoreboardMember> {
        let member = self
            .locate(name_or_id, |snapshot| {
                snapshot
                    .member_by_name(name_or_id)
                    .or_else(|| snapshot.member_by_id(name_or_id))
                    .cloned()
            })
            .await?;
        self.record_claim(local_id, member).await
    }

    /// Release the claim held by `local_id`, returning the remote id.
    pub async fn unclaim(&self, local_id: &str) -> Result<String> {
        Ok(self.ledger.unclaim(local_id).await?)
    }

    /// Leaderboard names closest to `query`.
    pub async fn suggest_close_names(&self, query: &str) -> Result<Vec<String>> {
        let snapshot = self.cache.get().await?;
        Ok(suggest::suggest(query, &snapshot.names(), suggest::MAX_SUGGESTIONS))
    }

    /// The participant `local_id` has claimed, from the current leaderboard.
    pub async fn resolve(&self, local_id: &str) -> Result<ScoreboardMember> {
        let remote_id = self
            .ledger
            .lookup_remote(local_id)
            .await
            .ok_or_else(|| StarboardError::NotClaimed(local_id.to_string()))?;

        let snapshot = self.cache.get().await?;
        snapshot
            .member_by_id(&remote_id)
            .cloned()
            .ok_or(StarboardError::NotOnScoreboard(remote_id))
    }

    /// Snapshot used for a periodic pass: freshly fetched when possible,
    /// otherwise whatever was cached last.
    pub async fn snapshot_for_sync(&self) -> Result<Arc<Snapshot>> {
        match self.cache.force_refresh().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => self.cache.peek().await.ok_or(StarboardError::Scoreboard(e)),
        }
    }
}
