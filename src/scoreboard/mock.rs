//! Mock leaderboard source for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::client::ScoreboardSource;
use super::types::Snapshot;
use super::ScoreboardError;

/// Mock source returning a configurable snapshot or error.
pub struct MockSource {
    next: Mutex<Result<Snapshot, ScoreboardError>>,
    delay: Duration,
    fetch_count: AtomicU32,
}

impl MockSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            next: Mutex::new(Ok(snapshot)),
            delay: Duration::ZERO,
            fetch_count: AtomicU32::new(0),
        }
    }

    /// Simulate a slow remote.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serve this snapshot from the next fetch on.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self.next.lock().unwrap_or_else(|e| e.into_inner()) = Ok(snapshot);
    }

    /// Fail every fetch from now on.
    pub fn fail_with(&self, error: ScoreboardError) {
        *self.next.lock().unwrap_or_else(|e| e.into_inner()) = Err(error);
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreboardSource for MockSource {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn fetch(&self) -> Result<Snapshot, ScoreboardError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.next.lock().unwrap_or_else(|e| e.into_inner()).clone();
        next.map(|mut snapshot| {
            snapshot.fetched_at = Utc::now();
            snapshot
        })
    }
}
