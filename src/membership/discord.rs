//! Discord REST implementation of `Membership`.
//!
//! Uses the v10 HTTP API with bot-token authentication. Rate-limit responses
//! (HTTP 429) are surfaced as `MembershipError::RateLimited` carrying the
//! server's retry delay; retrying is the caller's decision.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChannelAccess, GuildMember, Membership, MembershipError, Role, RoleSpec};

pub const DISCORD_API_URL: &str = "https://discord.com/api/v10";

/// Permission bit allowing a role to see a channel.
const VIEW_CHANNEL: u64 = 1 << 10;

/// Page size for member listing (API maximum).
const MEMBER_PAGE_LIMIT: usize = 1000;

/// Overwrite target type for roles.
const OVERWRITE_ROLE: u8 = 0;

/// Discord REST client.
pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self, MembershipError> {
        let client = Client::builder()
            .user_agent(concat!(
                "DiscordBot (https://github.com/starboard-bot/starboard, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| MembershipError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticate, send, and classify the response status.
    async fn send(&self, request: RequestBuilder) -> Result<Response, MembershipError> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| MembershipError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let body_secs = response
                .json::<RateLimitBody>()
                .await
                .ok()
                .map(|b| b.retry_after);
            let secs = body_secs.or(header_secs).unwrap_or(1.0);
            return Err(MembershipError::RateLimited {
                retry_after_ms: (secs * 1000.0).ceil() as u64,
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(MembershipError::NotFound(body));
        }

        Err(MembershipError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Debug, Deserialize)]
struct RoleWire {
    id: String,
    name: String,
}

impl From<RoleWire> for Role {
    fn from(wire: RoleWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRoleBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    hoist: bool,
    mentionable: bool,
}

#[derive(Debug, Deserialize)]
struct UserWire {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct MemberWire {
    user: Option<UserWire>,
    #[serde(default)]
    roles: Vec<String>,
}

impl MemberWire {
    fn into_member(self) -> Option<GuildMember> {
        let user = self.user?;
        Some(GuildMember {
            id: user.id,
            username: user.username,
            roles: self.roles,
        })
    }
}

#[derive(Debug, Serialize)]
struct OverwriteBody {
    /// Permission bitsets are sent as decimal strings
    allow: String,
    deny: String,
    #[serde(rename = "type")]
    kind: u8,
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, MembershipError> {
    response
        .json()
        .await
        .map_err(|e| MembershipError::Parse(e.to_string()))
}

#[async_trait]
impl Membership for DiscordClient {
    async fn roles(&self, community_id: &str) -> Result<Vec<Role>, MembershipError> {
        let url = self.url(&format!("/guilds/{}/roles", community_id));
        let response = self.send(self.client.get(url)).await?;
        let roles: Vec<RoleWire> = decode(response).await?;
        Ok(roles.into_iter().map(Role::from).collect())
    }

    async fn create_role(
        &self,
        community_id: &str,
        spec: &RoleSpec,
    ) -> Result<Role, MembershipError> {
        let url = self.url(&format!("/guilds/{}/roles", community_id));
        let body = CreateRoleBody {
            name: &spec.name,
            color: spec.color,
            hoist: spec.hoist,
            mentionable: spec.mentionable,
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let role: RoleWire = decode(response).await?;
        debug!(community_id, role = %role.name, "Role created");
        Ok(role.into())
    }

    async fn add_member_role(
        &self,
        community_id: &str,
        member_id: &str,
        role_id: &str,
    ) -> Result<(), MembershipError> {
        let url = self.url(&format!(
            "/guilds/{}/members/{}/roles/{}",
            community_id, member_id, role_id
        ));
        self.send(self.client.put(url)).await?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        community_id: &str,
        member_id: &str,
        role_id: &str,
    ) -> Result<(), MembershipError> {
        let url = self.url(&format!(
            "/guilds/{}/members/{}/roles/{}",
            community_id, member_id, role_id
        ));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn member(
        &self,
        community_id: &str,
        member_id: &str,
    ) -> Result<GuildMember, MembershipError> {
        let url = self.url(&format!("/guilds/{}/members/{}", community_id, member_id));
        let response = self.send(self.client.get(url)).await?;
        let wire: MemberWire = decode(response).await?;
        wire.into_member()
            .ok_or_else(|| MembershipError::Parse("member without user object".to_string()))
    }

    async fn members(&self, community_id: &str) -> Result<Vec<GuildMember>, MembershipError> {
        let url = self.url(&format!("/guilds/{}/members", community_id));
        let mut members = Vec::new();
        let mut after = String::from("0");

        loop {
            let limit = MEMBER_PAGE_LIMIT.to_string();
            let request = self
                .client
                .get(url.as_str())
                .query(&[("limit", limit.as_str()), ("after", after.as_str())]);
            let page: Vec<MemberWire> = decode(self.send(request).await?).await?;
            let page_len = page.len();
            // Cursor comes from this page only, never an earlier one
            let cursor = page
                .iter()
                .rev()
                .find_map(|m| m.user.as_ref().map(|u| u.id.clone()));

            members.extend(page.into_iter().filter_map(MemberWire::into_member));

            if page_len < MEMBER_PAGE_LIMIT {
                break;
            }
            match cursor {
                Some(id) => after = id,
                None => break,
            }
        }

        debug!(community_id, count = members.len(), "Listed guild members");
        Ok(members)
    }

    async fn set_channel_access(
        &self,
        channel_id: &str,
        role_id: &str,
        access: ChannelAccess,
    ) -> Result<(), MembershipError> {
        let url = self.url(&format!("/channels/{}/permissions/{}", channel_id, role_id));
        let (allow, deny) = match access {
            ChannelAccess::Allow => (VIEW_CHANNEL, 0),
            ChannelAccess::Deny => (0, VIEW_CHANNEL),
        };
        let body = OverwriteBody {
            allow: allow.to_string(),
            deny: deny.to_string(),
            kind: OVERWRITE_ROLE,
        };
        self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = DiscordClient::new("token", "http://localhost:9000/api/").unwrap();
        assert_eq!(client.url("/guilds/1/roles"), "http://localhost:9000/api/guilds/1/roles");
    }

    #[test]
    fn test_overwrite_body_shape() {
        let body = OverwriteBody {
            allow: VIEW_CHANNEL.to_string(),
            deny: "0".to_string(),
            kind: OVERWRITE_ROLE,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"allow":"1024","deny":"0","type":0}"#
        );
    }
}
