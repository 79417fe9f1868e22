//! Periodic leaderboard refresh and full reconciliation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::community::{CommunityRegistry, CommunityState};
use crate::roles::{Reconciler, SyncSummary};
use crate::types::Result;

/// Default time between full passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Time from `now` until the next multiple of `interval` since the Unix
/// epoch. A full interval when `now` sits exactly on a boundary.
pub fn until_next_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let period = interval.as_millis();
    if period == 0 {
        return Duration::ZERO;
    }
    let now_ms = now.timestamp_millis().max(0) as u128;
    let remaining = period - now_ms % period;
    Duration::from_millis(remaining as u64)
}

/// Drives refresh + reconciliation for every registered community.
pub struct SyncDriver {
    registry: Arc<CommunityRegistry>,
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl SyncDriver {
    pub fn new(registry: Arc<CommunityRegistry>, reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            registry,
            reconciler,
            interval,
        }
    }

    /// Refresh one community's leaderboard and reconcile every claim.
    ///
    /// When the refresh fails the last cached leaderboard is used instead.
    pub async fn sync_community(&self, state: &CommunityState) -> Result<SyncSummary> {
        let snapshot = state.snapshot_for_sync().await?;
        self.reconciler.reconcile_all(state, &snapshot).await
    }

    /// One pass over every community, one at a time. A failing community
    /// is logged and does not stop the others.
    pub async fn sync_once(&self) -> Vec<(String, Result<SyncSummary>)> {
        let mut results = Vec::with_capacity(self.registry.len());

        for state in self.registry.all() {
            let community_id = state.community_id().to_string();
            let result = self.sync_community(&state).await;
            if let Err(e) = &result {
                error!(community_id = %community_id, error = %e, "Community sync failed");
            }
            results.push((community_id, result));
        }

        results
    }

    /// Sync now, then on every interval boundary, forever.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.interval.as_secs(),
            communities = self.registry.len(),
            "Starting sync driver"
        );
        self.sync_once().await;

        let first = Instant::now() + until_next_boundary(Utc::now(), self.interval);
        let mut ticker = tokio::time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sync_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_boundary_alignment() {
        let interval = Duration::from_secs(15 * 60);

        let at = Utc.with_ymd_and_hms(2024, 12, 1, 5, 7, 30).unwrap();
        assert_eq!(until_next_boundary(at, interval), Duration::from_secs(7 * 60 + 30));

        let on_boundary = Utc.with_ymd_and_hms(2024, 12, 1, 5, 15, 0).unwrap();
        assert_eq!(until_next_boundary(on_boundary, interval), interval);
    }

    #[test]
    fn test_zero_interval() {
        assert_eq!(until_next_boundary(Utc::now(), Duration::ZERO), Duration::ZERO);
    }
}
