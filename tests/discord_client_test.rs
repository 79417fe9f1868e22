//! Discord REST client tests against a local HTTP server

use serde_json::json;
use starboard::membership::{ChannelAccess, DiscordClient};
use starboard::{Membership, MembershipError, RoleSpec};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DiscordClient {
    DiscordClient::new("bot-token", format!("{}/api/v10", server.uri())).unwrap()
}

#[tokio::test]
async fn test_list_roles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v10/guilds/1001/roles"))
        .and(header("authorization", "Bot bot-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "1001", "name": "@everyone", "color": 0, "position": 0},
            {"id": "5", "name": "10 Stars", "color": 3066993, "position": 3}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let roles = client_for(&server).roles("1001").await.unwrap();
    assert_eq!(roles.len(), 2);
    assert_eq!(roles[1].name, "10 Stars");
}

#[tokio::test]
async fn test_create_role_sends_attributes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v10/guilds/1001/roles"))
        .and(body_json(json!({
            "name": "50 Stars",
            "color": 0xF1C40F,
            "hoist": true,
            "mentionable": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "9", "name": "50 Stars"})))
        .expect(1)
        .mount(&server)
        .await;

    let spec = RoleSpec::new("50 Stars").with_color(0xF1C40F).hoisted().mentionable();
    let role = client_for(&server).create_role("1001", &spec).await.unwrap();
    assert_eq!(role.id, "9");
}

#[tokio::test]
async fn test_grant_and_revoke_role() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v10/guilds/1001/members/42/roles/5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v10/guilds/1001/members/42/roles/5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.add_member_role("1001", "42", "5").await.unwrap();
    client.remove_member_role("1001", "42", "5").await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_carries_retry_delay() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 0.25, "global": false})),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).add_member_role("1001", "42", "5").await;
    assert!(matches!(result, Err(MembershipError::RateLimited { retry_after_ms: 250 })));
}

#[tokio::test]
async fn test_unknown_member_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v10/guilds/1001/members/404"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Unknown Member", "code": 10007})),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).member("1001", "404").await;
    assert!(matches!(result, Err(MembershipError::NotFound(_))));
}

#[tokio::test]
async fn test_member_listing_follows_pages() {
    let server = MockServer::start().await;

    let first_page: Vec<_> = (1..=1000u64)
        .map(|id| json!({"user": {"id": id.to_string(), "username": format!("user{}", id)}, "roles": []}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v10/guilds/1001/members"))
        .and(query_param("after", "0"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v10/guilds/1001/members"))
        .and(query_param("after", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user": {"id": "1001", "username": "last"}, "roles": ["5"]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let members = client_for(&server).members("1001").await.unwrap();
    assert_eq!(members.len(), 1001);
    assert!(members[1000].has_role("5"));
}

#[tokio::test]
async fn test_member_listing_stops_on_page_without_users() {
    let server = MockServer::start().await;

    let first_page: Vec<_> = (1..=1000u64)
        .map(|id| json!({"user": {"id": id.to_string(), "username": format!("user{}", id)}, "roles": []}))
        .collect();
    let userless_page: Vec<_> = (0..1000).map(|_| json!({"roles": []})).collect();
    Mock::given(method("GET"))
        .and(path("/api/v10/guilds/1001/members"))
        .and(query_param("after", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v10/guilds/1001/members"))
        .and(query_param("after", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(userless_page))
        .expect(1)
        .mount(&server)
        .await;

    let members = client_for(&server).members("1001").await.unwrap();
    assert_eq!(members.len(), 1000);
    assert_eq!(members[999].id, "1000");
}

#[tokio::test]
async fn test_channel_overwrite_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v10/channels/77/permissions/1001"))
        .and(body_json(json!({"allow": "0", "deny": "1024", "type": 0})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .set_channel_access("77", "1001", ChannelAccess::Deny)
        .await
        .unwrap();
}
