//! Registry of configured communities.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{CommunitySettings, CommunityState};
use crate::ledger::ClaimLedger;
use crate::scoreboard::client::DEFAULT_FETCH_TIMEOUT;
use crate::scoreboard::{AocClient, AocClientConfig, ScoreboardCache, DEFAULT_BASE_URL, DEFAULT_TTL};
use crate::types::{Result, StarboardError};

/// Shared settings for opening community states.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Directory holding one ledger file per community
    pub data_dir: PathBuf,
    pub session_cookie: String,
    pub scoreboard_base_url: String,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
}

impl RegistryOptions {
    pub fn new(data_dir: impl Into<PathBuf>, session_cookie: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            session_cookie: session_cookie.into(),
            scoreboard_base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Ledger file of a community.
    pub fn ledger_path(&self, community_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.db", community_id))
    }
}

/// Community states keyed by community id, owned by whoever drives them.
#[derive(Default)]
pub struct CommunityRegistry {
    communities: HashMap<String, Arc<CommunityState>>,
}

impl CommunityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-built state, replacing any previous one.
    pub fn insert(&mut self, state: CommunityState) -> Arc<CommunityState> {
        let state = Arc::new(state);
        self.communities
            .insert(state.community_id().to_string(), Arc::clone(&state));
        state
    }

    /// Open a community's ledger file and leaderboard client and register it.
    pub fn open(
        &mut self,
        settings: CommunitySettings,
        options: &RegistryOptions,
    ) -> Result<Arc<CommunityState>> {
        let path = options.ledger_path(&settings.community_id);
        let ledger = ClaimLedger::open_file(&path).map_err(StarboardError::Ledger)?;

        let client = AocClient::new(
            AocClientConfig::new(
                settings.event.clone(),
                settings.leaderboard_id.clone(),
                options.session_cookie.clone(),
            )
            .with_base_url(options.scoreboard_base_url.clone())
            .with_timeout(options.fetch_timeout),
        )?;
        let cache = ScoreboardCache::new(Arc::new(client), options.cache_ttl);

        info!(
            community_id = %settings.community_id,
            event = %settings.event,
            leaderboard_id = %settings.leaderboard_id,
            daily_roles = settings.daily_roles,
            "Community configured"
        );
        Ok(self.insert(CommunityState::new(settings, ledger, cache)))
    }

    /// State of a configured community.
    pub fn get(&self, community_id: &str) -> Result<Arc<CommunityState>> {
        self.communities
            .get(community_id)
            .cloned()
            .ok_or_else(|| StarboardError::NotConfigured(community_id.to_string()))
    }

    /// Every community, ordered by id.
    pub fn all(&self) -> Vec<Arc<CommunityState>> {
        let mut states: Vec<_> = self.communities.values().cloned().collect();
        states.sort_by(|a, b| a.community_id().cmp(b.community_id()));
        states
    }

    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }
}
