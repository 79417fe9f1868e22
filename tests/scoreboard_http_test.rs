//! Leaderboard client tests against a local HTTP server
//!
//! - Request carries the session cookie and the fixed user agent
//! - Response classification (Auth / Fetch / Parse)
//! - A failed refresh keeps the cached snapshot

use std::sync::Arc;
use std::time::Duration;

use starboard::scoreboard::{AocClient, AocClientConfig, USER_AGENT};
use starboard::{ScoreboardCache, ScoreboardError, ScoreboardSource};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LEADERBOARD_PATH: &str = "/2024/leaderboard/private/view/4242.json";

const BODY: &str = r#"{
    "event": "2024",
    "owner_id": 1,
    "members": {
        "1": {"id": 1, "name": "owner", "stars": 12, "local_score": 30, "global_score": 0,
              "last_star_ts": 1733100000, "completion_day_level": {}},
        "2": {"id": 2, "name": "guest", "stars": 3, "local_score": 8, "global_score": 0,
              "last_star_ts": 1733000000,
              "completion_day_level": {"1": {"1": {"get_star_ts": 1733000000, "star_index": 7}}}}
    }
}"#;

fn client_for(server: &MockServer) -> AocClient {
    AocClient::new(
        AocClientConfig::new("2024", "4242", "secret-session")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

fn json_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "application/json")
}

// =============================================================================
// Successful fetch
// =============================================================================

#[tokio::test]
async fn test_fetch_sends_cookie_and_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LEADERBOARD_PATH))
        .and(header("cookie", "session=secret-session"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(json_response(BODY))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = client_for(&server).fetch().await.unwrap();

    assert_eq!(snapshot.event, "2024");
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.member_by_name("owner").unwrap().stars, 12);
    assert!(snapshot.member_by_id("2").unwrap().completed_day(1));
}

// =============================================================================
// Failure classification
// =============================================================================

#[tokio::test]
async fn test_html_response_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LEADERBOARD_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"<html>log in</html>".to_vec(), "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).fetch().await;
    assert!(matches!(result, Err(ScoreboardError::Auth(_))));
}

#[tokio::test]
async fn test_forbidden_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    assert!(matches!(client_for(&server).fetch().await, Err(ScoreboardError::Auth(_))));
}

#[tokio::test]
async fn test_server_error_is_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = client_for(&server).fetch().await;
    assert!(matches!(result, Err(ref e @ ScoreboardError::Fetch(_)) if e.is_retryable()));
}

#[tokio::test]
async fn test_undecodable_json_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(json_response(r#"{"event":"2024","members":[1,2,3]}"#))
        .mount(&server)
        .await;

    assert!(matches!(client_for(&server).fetch().await, Err(ScoreboardError::Parse(_))));
}

// =============================================================================
// Cache over HTTP
// =============================================================================

#[tokio::test]
async fn test_expired_session_keeps_cached_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(json_response(BODY))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"<html/>".to_vec(), "text/html"))
        .mount(&server)
        .await;

    let cache = ScoreboardCache::new(Arc::new(client_for(&server)), Duration::from_secs(900));
    let first = cache.get().await.unwrap();
    assert_eq!(first.len(), 2);

    assert!(matches!(cache.force_refresh().await, Err(ScoreboardError::Auth(_))));

    let cached = cache.peek().await.unwrap();
    assert_eq!(cached.fetched_at, first.fetched_at);
    assert_eq!(cache.get().await.unwrap().len(), 2);
}
