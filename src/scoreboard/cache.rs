//! TTL cache for the leaderboard snapshot.
//!
//! Reads are pull-based: `get()` refreshes when the cached snapshot is older
//! than the TTL. At most one fetch is in flight per cache; callers that
//! arrive during a refresh wait for it and share its result, whether it
//! succeeded or failed.
//!
//! A failed refresh never replaces the cached snapshot. Stale data is
//! preferred over no data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::ScoreboardSource;
use super::types::Snapshot;
use super::ScoreboardError;

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
struct CachedSnapshot {
    snapshot: Arc<Snapshot>,
    refreshed_at: Instant,
}

/// Leaderboard cache with read-triggered refresh.
pub struct ScoreboardCache {
    source: Arc<dyn ScoreboardSource>,
    ttl: Duration,
    current: RwLock<Option<CachedSnapshot>>,
    /// Held for the duration of every fetch; holds the last fetch error
    refresh_gate: Mutex<Option<ScoreboardError>>,
    /// Completed fetch attempts
    attempts: AtomicU64,
}

impl ScoreboardCache {
    pub fn new(source: Arc<dyn ScoreboardSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached snapshot, refreshed first if stale.
    ///
    /// If the refresh fails while an older snapshot is held, the older
    /// snapshot is returned. The error only surfaces when nothing has ever
    /// been fetched.
    pub async fn get(&self) -> Result<Arc<Snapshot>, ScoreboardError> {
        if let Some(snapshot) = self.fresh().await {
            return Ok(snapshot);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut gate = self.refresh_gate.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(snapshot) = self.fresh().await {
            debug!("Joined in-flight leaderboard refresh");
            return Ok(snapshot);
        }

        // Or tried and failed; share that outcome instead of fetching again
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(e) = (*gate).clone() {
                debug!(error = %e, "Joined failed leaderboard refresh");
                return self.stale_or(e).await;
            }
        }

        match self.refresh_locked(&mut gate).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => self.stale_or(e).await,
        }
    }

    /// Fetch unconditionally and replace the cached snapshot.
    ///
    /// On failure the cache is left untouched.
    pub async fn force_refresh(&self) -> Result<Arc<Snapshot>, ScoreboardError> {
        let mut gate = self.refresh_gate.lock().await;
        self.refresh_locked(&mut gate).await
    }

    /// Cached snapshot without refreshing, however old.
    pub async fn peek(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    /// Time since the last successful refresh.
    pub async fn age(&self) -> Option<Duration> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|cached| cached.refreshed_at.elapsed())
    }

    async fn stale_or(&self, error: ScoreboardError) -> Result<Arc<Snapshot>, ScoreboardError> {
        match self.peek().await {
            Some(stale) => {
                warn!(error = %error, "Leaderboard refresh failed, serving stale snapshot");
                Ok(stale)
            }
            None => Err(error),
        }
    }

    async fn fresh(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.refreshed_at.elapsed() <= self.ttl)
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    /// `last_error` is the content of the held `refresh_gate`.
    async fn refresh_locked(
        &self,
        last_error: &mut Option<ScoreboardError>,
    ) -> Result<Arc<Snapshot>, ScoreboardError> {
        let fetched = self.source.fetch().await;
        *last_error = fetched.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::Release);

        let snapshot = match fetched {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!(source = %self.source.describe(), error = %e, "Leaderboard fetch failed");
                return Err(e);
            }
        };

        *self.current.write().await = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            refreshed_at: Instant::now(),
        });

        info!(
            source = %self.source.describe(),
            event = %snapshot.event,
            members = snapshot.len(),
            "Leaderboard refreshed"
        );
        Ok(snapshot)
    }
}
