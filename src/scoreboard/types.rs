//! Leaderboard snapshot types.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ScoreboardError;

/// When one star of one day was earned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarCompletion {
    /// Unix timestamp the star was earned
    pub get_star_ts: i64,
    #[serde(default)]
    pub star_index: u64,
}

/// One participant of the private leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreboardMember {
    /// Stable numeric participant id
    pub id: u64,
    /// Chosen display name; absent for anonymous participants
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub local_score: i64,
    #[serde(default)]
    pub global_score: i64,
    /// Total stars earned in the event
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub last_star_ts: i64,
    /// day -> level -> completion
    #[serde(default)]
    pub completion_day_level: BTreeMap<u32, BTreeMap<u32, StarCompletion>>,
}

impl ScoreboardMember {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            local_score: 0,
            global_score: 0,
            stars: 0,
            last_star_ts: 0,
            completion_day_level: BTreeMap::new(),
        }
    }

    /// Set the total star count.
    pub fn with_stars(mut self, stars: u32) -> Self {
        self.stars = stars;
        self
    }

    /// Mark the first level of each given day as completed.
    pub fn with_completed_days(mut self, days: &[u32]) -> Self {
        for &day in days {
            self.completion_day_level.entry(day).or_default().insert(
                1,
                StarCompletion {
                    get_star_ts: 0,
                    star_index: 0,
                },
            );
        }
        self
    }

    /// Name as shown on the leaderboard page.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("(anonymous user #{})", self.id),
        }
    }

    /// Identifier recorded in the claim ledger.
    pub fn remote_id(&self) -> String {
        self.id.to_string()
    }

    /// Whether any level of `day` has been completed.
    pub fn completed_day(&self, day: u32) -> bool {
        self.completion_day_level
            .get(&day)
            .is_some_and(|levels| !levels.is_empty())
    }
}

/// Immutable copy of the leaderboard, versioned by fetch time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Event year reported by the leaderboard
    pub event: String,
    pub owner_id: u64,
    /// Participants keyed by id
    pub members: BTreeMap<u64, ScoreboardMember>,
    pub fetched_at: DateTime<Utc>,
}

/// Leaderboard JSON document.
#[derive(Debug, Deserialize)]
struct LeaderboardWire {
    #[serde(default)]
    event: String,
    #[serde(default)]
    owner_id: u64,
    members: HashMap<String, ScoreboardMember>,
}

impl Snapshot {
    pub fn new(
        event: impl Into<String>,
        owner_id: u64,
        members: impl IntoIterator<Item = ScoreboardMember>,
    ) -> Self {
        Self {
            event: event.into(),
            owner_id,
            members: members.into_iter().map(|m| (m.id, m)).collect(),
            fetched_at: Utc::now(),
        }
    }

    /// Decode a leaderboard JSON body.
    pub fn from_json(body: &[u8], fetched_at: DateTime<Utc>) -> Result<Self, ScoreboardError> {
        let wire: LeaderboardWire =
            serde_json::from_slice(body).map_err(|e| ScoreboardError::Parse(e.to_string()))?;

        Ok(Self {
            event: wire.event,
            owner_id: wire.owner_id,
            members: wire.members.into_values().map(|m| (m.id, m)).collect(),
            fetched_at,
        })
    }

    /// Participant with the given id (as recorded in the ledger).
    pub fn member_by_id(&self, remote_id: &str) -> Option<&ScoreboardMember> {
        let id: u64 = remote_id.trim().parse().ok()?;
        self.members.get(&id)
    }

    /// First participant (lowest id) whose display name matches exactly.
    pub fn member_by_name(&self, name: &str) -> Option<&ScoreboardMember> {
        self.members.values().find(|m| m.display_name() == name)
    }

    /// Every display name, in id order.
    pub fn names(&self) -> Vec<String> {
        self.members.values().map(ScoreboardMember::display_name).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
