//! Configuration for Starboard
//!
//! Process settings come from CLI arguments and environment variables
//! (clap), optionally preloaded from a `.env` file. The communities to
//! serve live in a TOML file:
//!
//! ```toml
//! discord_token = "..."     # optional, DISCORD_TOKEN wins
//! session_cookie = "..."    # optional, AOC_SESSION wins
//!
//! [communities.123456789012345678]
//! year = "2024"
//! leaderboard_id = "1234567"
//! daily_roles = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::community::{CommunitySettings, RegistryOptions};
use crate::membership::DISCORD_API_URL;
use crate::roles::ReconcilerConfig;
use crate::scoreboard::DEFAULT_BASE_URL;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0} is required (set it in the environment or the config file)")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// Starboard - Advent of Code leaderboard roles for Discord
#[derive(Parser, Debug, Clone)]
#[command(name = "starboard")]
#[command(about = "Keeps Discord roles in sync with an Advent of Code private leaderboard")]
#[command(version)]
pub struct Args {
    /// Community config file (TOML)
    #[arg(long, env = "STARBOARD_CONFIG", default_value = "starboard.toml")]
    pub config: PathBuf,

    /// Directory holding one claim ledger per community
    #[arg(long, env = "STARBOARD_DATA_DIR", default_value = "logs")]
    pub data_dir: PathBuf,

    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: Option<String>,

    /// Advent of Code session cookie
    #[arg(long, env = "AOC_SESSION", hide_env_values = true)]
    pub session_cookie: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seconds between full sync passes
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value = "900")]
    pub sync_interval_secs: u64,

    /// Seconds a fetched leaderboard stays fresh
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "900")]
    pub cache_ttl_secs: u64,

    /// Leaderboard request timeout in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "30")]
    pub fetch_timeout_secs: u64,

    /// Minimum milliseconds between role changes
    #[arg(long, env = "ROLE_PACE_MS", default_value = "1000")]
    pub role_pace_ms: u64,

    /// Attempts per role change when rate limited
    #[arg(long, env = "ROLE_MAX_ATTEMPTS", default_value = "3")]
    pub role_max_attempts: u32,

    /// Longest rate-limit wait in milliseconds before a role change is given up
    #[arg(long, env = "ROLE_MAX_BACKOFF_MS", default_value = "10000")]
    pub role_max_backoff_ms: u64,

    /// Advent of Code base URL
    #[arg(long, env = "AOC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub aoc_base_url: String,

    /// Discord REST API base URL
    #[arg(long, env = "DISCORD_API_URL", default_value = DISCORD_API_URL)]
    pub discord_api_url: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operator commands. Without one, `run` is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sync now and then on every interval boundary until interrupted
    Run,

    /// One sync pass over every community
    Sync,

    /// Link a guild member to a leaderboard participant
    Claim {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        member: String,
        /// Leaderboard name or numeric id
        query: String,
    },

    /// Release a member's claim
    Unclaim {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        member: String,
    },

    /// Show a member's star count
    Points {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        member: String,
    },

    /// Toggle a member's Spoiler role
    Spoiler {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        member: String,
    },

    /// Restrict a channel to one day's solvers
    SetupChannel {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        day: u32,
        #[arg(long)]
        channel: String,
    },
}

/// One `[communities.<guild id>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommunityConfig {
    pub year: String,
    pub leaderboard_id: String,
    #[serde(default)]
    pub daily_roles: bool,
}

/// Contents of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub discord_token: Option<String>,
    #[serde(default)]
    pub session_cookie: Option<String>,
    #[serde(default, alias = "guilds")]
    pub communities: BTreeMap<String, CommunityConfig>,
}

impl FileConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    pub discord_api_url: String,
    pub registry: RegistryOptions,
    pub communities: Vec<CommunitySettings>,
    pub reconciler: ReconcilerConfig,
    pub sync_interval: Duration,
}

impl Args {
    /// Merge the config file under the CLI/environment and validate.
    pub fn resolve(&self, file: FileConfig) -> Result<Settings, ConfigError> {
        let discord_token = self
            .discord_token
            .clone()
            .or(file.discord_token)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
        let session_cookie = self
            .session_cookie
            .clone()
            .or(file.session_cookie)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::Missing("AOC_SESSION"))?;

        let communities: Vec<CommunitySettings> = file
            .communities
            .into_iter()
            .map(|(community_id, c)| CommunitySettings {
                community_id,
                event: c.year,
                leaderboard_id: c.leaderboard_id,
                daily_roles: c.daily_roles,
            })
            .collect();

        let settings = Settings {
            discord_token,
            discord_api_url: self.discord_api_url.clone(),
            registry: RegistryOptions {
                data_dir: self.data_dir.clone(),
                session_cookie,
                scoreboard_base_url: self.aoc_base_url.clone(),
                cache_ttl: Duration::from_secs(self.cache_ttl_secs),
                fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            },
            communities,
            reconciler: ReconcilerConfig {
                pace: Duration::from_millis(self.role_pace_ms),
                max_attempts: self.role_max_attempts,
                max_backoff: Duration::from_millis(self.role_max_backoff_ms),
            },
            sync_interval: Duration::from_secs(self.sync_interval_secs),
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.communities.is_empty() {
            return Err(ConfigError::Invalid(
                "No communities configured, add a [communities.<guild id>] table".to_string(),
            ));
        }
        for community in &self.communities {
            if community.community_id.is_empty()
                || !community.community_id.chars().all(|c| c.is_ascii_digit())
            {
                return Err(ConfigError::Invalid(format!(
                    "Community id '{}' is not a Discord guild id",
                    community.community_id
                )));
            }
            if community.event.len() != 4 || !community.event.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!(
                    "Community {}: year '{}' is not an event year",
                    community.community_id, community.event
                )));
            }
            if community.leaderboard_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Community {}: leaderboard_id is empty",
                    community.community_id
                )));
            }
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::Invalid("SYNC_INTERVAL_SECS must be positive".to_string()));
        }
        if self.registry.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid("FETCH_TIMEOUT_SECS must be positive".to_string()));
        }
        if self.reconciler.max_attempts == 0 {
            return Err(ConfigError::Invalid("ROLE_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"
        session_cookie = "from-file"

        [communities.1001]
        year = "2024"
        leaderboard_id = "42"
        daily_roles = true

        [communities.1002]
        year = "2023"
        leaderboard_id = "43"
    "#;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["starboard", "--discord-token", "token"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_file_communities() {
        let file = FileConfig::from_toml(FILE).unwrap();
        assert_eq!(file.communities.len(), 2);
        assert!(file.communities["1001"].daily_roles);
        assert!(!file.communities["1002"].daily_roles);
    }

    #[test]
    fn test_cli_overrides_file() {
        let settings = args(&["--session-cookie", "from-cli"])
            .resolve(FileConfig::from_toml(FILE).unwrap())
            .unwrap();

        assert_eq!(settings.registry.session_cookie, "from-cli");
        assert_eq!(settings.communities[0].community_id, "1001");
        assert_eq!(settings.communities[0].event, "2024");
    }

    #[test]
    fn test_legacy_guilds_table() {
        let file = FileConfig::from_toml(
            "[guilds.77]\nyear = \"2022\"\nleaderboard_id = \"9\"\n",
        )
        .unwrap();
        assert_eq!(file.communities["77"].leaderboard_id, "9");
    }

    #[test]
    fn test_validation() {
        let file = |body: &str| FileConfig::from_toml(body).unwrap();
        let args = args(&["--session-cookie", "c"]);

        assert!(matches!(args.resolve(FileConfig::default()), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            args.resolve(file("[communities.1]\nyear = \"24\"\nleaderboard_id = \"9\"\n")),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            args.resolve(file("[communities.abc]\nyear = \"2024\"\nleaderboard_id = \"9\"\n")),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_subcommand_parsing() {
        let parsed = args(&["claim", "--guild", "1", "--member", "2", "some name"]);
        assert_eq!(
            parsed.command,
            Some(Command::Claim {
                guild: "1".to_string(),
                member: "2".to_string(),
                query: "some name".to_string(),
            })
        );
    }
}
