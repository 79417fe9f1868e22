//! Role reconciliation.
//!
//! Turns (desired badges, current roles) into the smallest set of
//! grant/revoke calls and applies them one at a time. Nothing about a
//! member is remembered between passes: the desired set comes from the
//! leaderboard, the current set from the community, so a pass can be
//! interrupted and simply run again.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::badge::{desired_badges, required_roles, Badge, EVENT_DAYS};
use crate::community::CommunityState;
use crate::membership::{ChannelAccess, GuildMember, Membership, MembershipError, Role};
use crate::scoreboard::Snapshot;
use crate::types::{Result, StarboardError};

/// Default minimum gap between two mutating calls.
pub const DEFAULT_PACE: Duration = Duration::from_secs(1);

/// Default attempts per call when rate limited.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default longest rate-limit delay honoured before giving up on a call.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

const EVERYONE: &str = "@everyone";

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Minimum delay between consecutive grant/revoke calls
    pub pace: Duration,
    /// Attempts per call before a rate limit is reported as a failure
    pub max_attempts: u32,
    /// Rate limits asking for a longer wait are reported at once
    pub max_backoff: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pace: DEFAULT_PACE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Grants and revocations needed to move one member to its desired badges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgePlan {
    pub to_add: Vec<Badge>,
    pub to_remove: Vec<Badge>,
}

impl BadgePlan {
    /// `to_add = desired - current`, `to_remove = (current ∩ managed) - desired`.
    pub fn new(desired: &[Badge], current: &BTreeSet<Badge>) -> Self {
        let desired: BTreeSet<Badge> = desired.iter().copied().collect();

        Self {
            to_add: desired.difference(current).copied().collect(),
            to_remove: current
                .iter()
                .filter(|badge| badge.is_managed() && !desired.contains(badge))
                .copied()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Role name/id lookup for one community.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    ids: HashMap<Badge, String>,
    badges: HashMap<String, Badge>,
    everyone: Option<String>,
}

impl RoleDirectory {
    /// Index the community's roles. Roles that are not badges are ignored;
    /// with duplicate names the first one listed wins.
    pub fn from_roles(roles: &[Role]) -> Self {
        let mut directory = Self::default();
        for role in roles {
            if role.name == EVERYONE {
                directory.everyone.get_or_insert_with(|| role.id.clone());
                continue;
            }
            if let Some(badge) = Badge::from_name(&role.name) {
                directory.insert(badge, role.id.clone());
            }
        }
        directory
    }

    fn insert(&mut self, badge: Badge, role_id: String) {
        if !self.ids.contains_key(&badge) {
            self.badges.insert(role_id.clone(), badge);
            self.ids.insert(badge, role_id);
        }
    }

    pub fn id_of(&self, badge: Badge) -> Option<&str> {
        self.ids.get(&badge).map(String::as_str)
    }

    /// Badges a member currently holds.
    pub fn badges_of(&self, member: &GuildMember) -> BTreeSet<Badge> {
        member
            .roles
            .iter()
            .filter_map(|role_id| self.badges.get(role_id).copied())
            .collect()
    }

    /// Role that applies to every member. Discord gives it the guild's id.
    pub fn everyone_or(&self, community_id: &str) -> String {
        self.everyone
            .clone()
            .unwrap_or_else(|| community_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Outcome of reconciling one member.
#[derive(Debug, Clone, Default)]
pub struct MemberReport {
    pub member_id: String,
    pub added: Vec<Badge>,
    pub removed: Vec<Badge>,
    pub failed: Vec<(Badge, MembershipError)>,
}

impl MemberReport {
    fn new(member_id: &str) -> Self {
        Self {
            member_id: member_id.to_string(),
            ..Self::default()
        }
    }

    /// Whether every needed call succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn changes(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Totals for a full community pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Members whose badges were reconciled
    pub reconciled: usize,
    /// Claims that could not be resolved on the leaderboard or in the community
    pub skipped: usize,
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn record(&mut self, report: &MemberReport) {
        self.reconciled += 1;
        self.added += report.added.len();
        self.removed += report.removed.len();
        self.failed += report.failed.len();
    }
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Grant,
    Revoke,
}

/// Enforces a minimum gap between calls, across every caller.
struct Pacer {
    gap: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(gap: Duration) -> Self {
        Self {
            gap,
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.gap).await;
        }
        *last = Some(Instant::now());
    }
}

/// Applies badge changes against the membership system.
pub struct Reconciler {
    membership: Arc<dyn Membership>,
    config: ReconcilerConfig,
    pacer: Pacer,
}

impl Reconciler {
    pub fn new(membership: Arc<dyn Membership>, config: ReconcilerConfig) -> Self {
        let pacer = Pacer::new(config.pace);
        Self {
            membership,
            config,
            pacer,
        }
    }

    pub fn membership(&self) -> &Arc<dyn Membership> {
        &self.membership
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Current role directory of a community.
    pub async fn directory(&self, community_id: &str) -> Result<RoleDirectory> {
        let roles = self.membership.roles(community_id).await?;
        Ok(RoleDirectory::from_roles(&roles))
    }

    /// Create any badge role the community is missing.
    ///
    /// A role that fails to be created is logged and left out of the
    /// returned directory; reconciling that badge then reports it missing.
    pub async fn ensure_roles(&self, state: &CommunityState) -> Result<RoleDirectory> {
        let community_id = state.community_id();
        let mut directory = self.directory(community_id).await?;

        for badge in required_roles(state.settings().daily_roles) {
            if directory.id_of(badge).is_some() {
                continue;
            }
            match self.membership.create_role(community_id, &badge.role_spec()).await {
                Ok(role) => {
                    info!(community_id, role = %badge, "Created missing role");
                    directory.insert(badge, role.id);
                }
                Err(e) => warn!(community_id, role = %badge, error = %e, "Failed to create role"),
            }
        }

        Ok(directory)
    }

    /// Move one member to exactly `desired` among the managed badges.
    ///
    /// Only missing badges are granted and only held managed badges are
    /// revoked; every other role is left alone. A failed call is recorded
    /// in the report and the remaining calls still run.
    pub async fn reconcile(
        &self,
        community_id: &str,
        directory: &RoleDirectory,
        member: &GuildMember,
        desired: &[Badge],
    ) -> MemberReport {
        let plan = BadgePlan::new(desired, &directory.badges_of(member));
        let mut report = MemberReport::new(&member.id);

        if plan.is_empty() {
            debug!(community_id, member_id = %member.id, "Roles already up to date");
            return report;
        }

        let steps = plan
            .to_add
            .iter()
            .map(|&badge| (badge, Mutation::Grant))
            .chain(plan.to_remove.iter().map(|&badge| (badge, Mutation::Revoke)));

        for (badge, mutation) in steps {
            let result = match directory.id_of(badge) {
                Some(role_id) => self.apply(community_id, &member.id, role_id, mutation).await,
                None => Err(MembershipError::MissingRole(badge.name())),
            };

            match (result, mutation) {
                (Ok(()), Mutation::Grant) => report.added.push(badge),
                (Ok(()), Mutation::Revoke) => report.removed.push(badge),
                (Err(e), _) => {
                    warn!(
                        community_id,
                        member_id = %member.id,
                        role = %badge,
                        ?mutation,
                        error = %e,
                        "Role change failed"
                    );
                    report.failed.push((badge, e));
                }
            }
        }

        info!(
            community_id,
            member_id = %member.id,
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Member reconciled"
        );
        report
    }

    /// Paced grant/revoke, retrying after rate limits.
    async fn apply(
        &self,
        community_id: &str,
        member_id: &str,
        role_id: &str,
        mutation: Mutation,
    ) -> std::result::Result<(), MembershipError> {
        let mut attempt = 1;
        loop {
            self.pacer.wait().await;

            let result = match mutation {
                Mutation::Grant => {
                    self.membership
                        .add_member_role(community_id, member_id, role_id)
                        .await
                }
                Mutation::Revoke => {
                    self.membership
                        .remove_member_role(community_id, member_id, role_id)
                        .await
                }
            };

            match result {
                Err(MembershipError::RateLimited { retry_after_ms })
                    if attempt < self.config.max_attempts
                        && Duration::from_millis(retry_after_ms) <= self.config.max_backoff =>
                {
                    debug!(member_id, role_id, attempt, retry_after_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Reconcile one claimed member against the current leaderboard.
    pub async fn sync_member(&self, state: &CommunityState, local_id: &str) -> Result<MemberReport> {
        let scoreboard_member = state.resolve(local_id).await?;
        let community_id = state.community_id();

        let directory = self.directory(community_id).await?;
        let member = self.membership.member(community_id, local_id).await?;
        let desired = desired_badges(&scoreboard_member, state.settings().daily_roles);

        Ok(self.reconcile(community_id, &directory, &member, &desired).await)
    }

    /// Revoke every managed badge from a member. Opt-in roles stay.
    pub async fn clear_member(&self, community_id: &str, local_id: &str) -> Result<MemberReport> {
        let directory = self.directory(community_id).await?;
        let member = self.membership.member(community_id, local_id).await?;
        Ok(self.reconcile(community_id, &directory, &member, &[]).await)
    }

    /// Reconcile every claim of a community against `snapshot`.
    ///
    /// Members are processed one at a time. Claims whose participant left
    /// the leaderboard, or whose member left the community, are skipped.
    pub async fn reconcile_all(&self, state: &CommunityState, snapshot: &Snapshot) -> Result<SyncSummary> {
        let community_id = state.community_id();
        let daily_roles = state.settings().daily_roles;

        let directory = self.ensure_roles(state).await?;
        let members: HashMap<String, GuildMember> = self
            .membership
            .members(community_id)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut summary = SyncSummary::default();

        for claim in state.ledger().snapshot().await {
            let Some(scoreboard_member) = snapshot.member_by_id(&claim.remote_id) else {
                warn!(
                    community_id,
                    local_id = %claim.local_id,
                    remote_id = %claim.remote_id,
                    "Claimed participant not on leaderboard, skipping"
                );
                summary.skipped += 1;
                continue;
            };
            let Some(member) = members.get(&claim.local_id) else {
                warn!(
                    community_id,
                    local_id = %claim.local_id,
                    "Claimed member not in community, skipping"
                );
                summary.skipped += 1;
                continue;
            };

            let desired = desired_badges(scoreboard_member, daily_roles);
            let report = self.reconcile(community_id, &directory, member, &desired).await;
            summary.record(&report);
        }

        info!(
            community_id,
            reconciled = summary.reconciled,
            skipped = summary.skipped,
            added = summary.added,
            removed = summary.removed,
            failed = summary.failed,
            "Community reconciled"
        );
        Ok(summary)
    }

    /// Flip the opt-in spoiler badge. Returns whether it is now held.
    pub async fn toggle_spoiler(&self, community_id: &str, local_id: &str) -> Result<bool> {
        let directory = self.directory(community_id).await?;
        let role_id = directory
            .id_of(Badge::Spoiler)
            .ok_or_else(|| MembershipError::MissingRole(Badge::Spoiler.name()))?;
        let member = self.membership.member(community_id, local_id).await?;

        let added = !member.has_role(role_id);
        let mutation = if added { Mutation::Grant } else { Mutation::Revoke };
        self.apply(community_id, local_id, role_id, mutation).await?;

        info!(community_id, local_id, added, "Spoiler badge toggled");
        Ok(added)
    }

    /// Restrict a channel to holders of the day's badge or the spoiler badge.
    pub async fn setup_channel(&self, community_id: &str, day: u32, channel_id: &str) -> Result<()> {
        if !EVENT_DAYS.contains(&day) {
            return Err(StarboardError::InvalidDay(day));
        }

        let directory = self.directory(community_id).await?;
        let day_role = directory
            .id_of(Badge::Day(day))
            .ok_or_else(|| MembershipError::MissingRole(Badge::Day(day).name()))?;
        let spoiler_role = directory
            .id_of(Badge::Spoiler)
            .ok_or_else(|| MembershipError::MissingRole(Badge::Spoiler.name()))?;
        let everyone = directory.everyone_or(community_id);

        self.membership
            .set_channel_access(channel_id, day_role, ChannelAccess::Allow)
            .await?;
        self.membership
            .set_channel_access(channel_id, spoiler_role, ChannelAccess::Allow)
            .await?;
        self.membership
            .set_channel_access(channel_id, &everyone, ChannelAccess::Deny)
            .await?;

        info!(community_id, day, channel_id, "Day channel restricted");
        Ok(())
    }
}
