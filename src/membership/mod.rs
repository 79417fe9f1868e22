//! Membership system abstraction.
//!
//! The guild's roles and members live in an external, rate-limited,
//! eventually-consistent API. Every call here may fail independently; none
//! is assumed to have succeeded unless it returned `Ok`.

pub mod discord;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use discord::{DiscordClient, DISCORD_API_URL};
pub use mock::MockMembership;

/// Errors from membership calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MembershipError {
    /// Transport failure
    #[error("Membership request failed: {0}")]
    Request(String),

    /// Rate limited by the API
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Unknown member, role or channel
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success response
    #[error("Membership API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The community has no role with this name
    #[error("Role '{0}' does not exist in the community")]
    MissingRole(String),

    #[error("Malformed membership response: {0}")]
    Parse(String),
}

impl MembershipError {
    /// Whether the failure is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::RateLimited { .. })
    }
}

/// A role defined in the community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

/// Attributes for creating a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    /// RGB colour, e.g. `0xF1C40F`
    pub color: Option<u32>,
    /// Display members separately in the member list
    pub hoist: bool,
    pub mentionable: bool,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            hoist: false,
            mentionable: false,
        }
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn hoisted(mut self) -> Self {
        self.hoist = true;
        self
    }

    pub fn mentionable(mut self) -> Self {
        self.mentionable = true;
        self
    }
}

/// A member of the community and the ids of the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub id: String,
    pub username: String,
    pub roles: Vec<String>,
}

impl GuildMember {
    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r == role_id)
    }
}

/// Whether a role may see a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAccess {
    Allow,
    Deny,
}

/// Operations consumed from the external membership system.
#[async_trait]
pub trait Membership: Send + Sync {
    /// Every role defined in the community.
    async fn roles(&self, community_id: &str) -> Result<Vec<Role>, MembershipError>;

    /// Create a role.
    async fn create_role(&self, community_id: &str, spec: &RoleSpec)
        -> Result<Role, MembershipError>;

    /// Grant a role to a member.
    async fn add_member_role(
        &self,
        community_id: &str,
        member_id: &str,
        role_id: &str,
    ) -> Result<(), MembershipError>;

    /// Revoke a role from a member.
    async fn remove_member_role(
        &self,
        community_id: &str,
        member_id: &str,
        role_id: &str,
    ) -> Result<(), MembershipError>;

    /// One member with their current roles.
    async fn member(&self, community_id: &str, member_id: &str)
        -> Result<GuildMember, MembershipError>;

    /// Every member of the community.
    async fn members(&self, community_id: &str) -> Result<Vec<GuildMember>, MembershipError>;

    /// Set a role's view permission on a channel.
    async fn set_channel_access(
        &self,
        channel_id: &str,
        role_id: &str,
        access: ChannelAccess,
    ) -> Result<(), MembershipError>;
}
