//! Advent of Code private leaderboard client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use super::types::Snapshot;
use super::ScoreboardError;

/// Fixed client identity sent with every leaderboard request.
pub const USER_AGENT: &str = concat!(
    "github.com/starboard-bot/starboard v",
    env!("CARGO_PKG_VERSION"),
    " (leaderboard role sync)"
);

pub const DEFAULT_BASE_URL: &str = "https://adventofcode.com";

/// Default bound on a single leaderboard request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of leaderboard snapshots.
#[async_trait]
pub trait ScoreboardSource: Send + Sync {
    /// Short description for logs (e.g. the request URL).
    fn describe(&self) -> String;

    /// Fetch and decode a fresh snapshot.
    async fn fetch(&self) -> Result<Snapshot, ScoreboardError>;
}

/// Configuration for `AocClient`.
#[derive(Debug, Clone)]
pub struct AocClientConfig {
    pub base_url: String,
    /// Event year, e.g. "2024"
    pub event: String,
    pub leaderboard_id: String,
    pub session_cookie: String,
    pub timeout: Duration,
}

impl AocClientConfig {
    pub fn new(
        event: impl Into<String>,
        leaderboard_id: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            event: event.into(),
            leaderboard_id: leaderboard_id.into(),
            session_cookie: session_cookie.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for one private leaderboard.
pub struct AocClient {
    client: Client,
    config: AocClientConfig,
}

impl AocClient {
    pub fn new(config: AocClientConfig) -> Result<Self, ScoreboardError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScoreboardError::Fetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// `<base>/<event>/leaderboard/private/view/<id>.json`
    pub fn leaderboard_url(&self) -> String {
        format!(
            "{}/{}/leaderboard/private/view/{}.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.event,
            self.config.leaderboard_id
        )
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

#[async_trait]
impl ScoreboardSource for AocClient {
    fn describe(&self) -> String {
        self.leaderboard_url()
    }

    async fn fetch(&self) -> Result<Snapshot, ScoreboardError> {
        let url = self.leaderboard_url();
        debug!(url = %url, "Fetching leaderboard");

        let response = self
            .client
            .get(&url)
            .header(
                header::COOKIE,
                format!("session={}", self.config.session_cookie),
            )
            .send()
            .await
            .map_err(|e| ScoreboardError::Fetch(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScoreboardError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(ScoreboardError::Fetch(format!("HTTP {}", status)));
        }

        // An expired session gets an HTML page instead of the JSON document
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_json(&content_type) {
            return Err(ScoreboardError::Auth(format!(
                "unexpected content type '{}'",
                content_type
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ScoreboardError::Fetch(e.to_string()))?;

        Snapshot::from_json(&body, Utc::now())
    }
}
