//! User-facing command surface.
//!
//! Every command returns an [`Outcome`] rather than an error: the caller
//! (a chat gateway or the CLI) only has to show `outcome.message()`.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::community::CommunityRegistry;
use crate::roles::Reconciler;
use crate::scoreboard::ScoreboardError;
use crate::types::StarboardError;

/// Where the bot's source lives.
pub const SOURCE_URL: &str = env!("CARGO_PKG_REPOSITORY");

const HELP: &str = "Help:\n\
- `/claim <username>`: Claims a username by Advent of Code name (or ID)\n\
- `/unclaim [member]`: Releases your claim (administrators may release anyone's)\n\
- `/stars [member]`: Returns how many stars I think you have collected\n\
- `/spoiler`: Toggles the Spoiler role, which unlocks every day channel\n\
- `/setup-channel <day>`: Restricts this channel to solvers of that day (administrators)\n\
- `/source`: Links my source code\n\
- `/help`: Shows this help message";

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    /// Community member id
    pub id: String,
    pub is_admin: bool,
}

impl Invoker {
    pub fn member(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

/// Result of a command, ready to show to the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Claimed { name: String },
    Unclaimed { own: bool },
    Points { stars: u32, own: bool },
    SpoilerToggled { added: bool },
    ChannelConfigured { day: u32 },
    Help,
    Source,

    NotConfigured,
    AlreadyClaimed,
    NotFound { query: String, suggestions: Vec<String> },
    NotClaimed { own: bool },
    NotOnScoreboard,
    Forbidden,
    InvalidDay(u32),
    /// Transient failure
    RetryLater,
    /// Leaderboard session cookie rejected
    CredentialsExpired,
    /// Needs operator attention
    Failed,
}

impl Outcome {
    /// Message shown to the invoker.
    pub fn message(&self) -> String {
        match self {
            Self::Claimed { .. } => "Success: You have claimed your Advent of Code user!".to_string(),
            Self::Unclaimed { own: true } => "Success: You have released your Advent of Code user.".to_string(),
            Self::Unclaimed { own: false } => "Success: That claim has been released.".to_string(),
            Self::Points { stars, own: true } => format!("You have collected **{}** stars!", stars),
            Self::Points { stars, own: false } => format!("They have collected **{}** stars!", stars),
            Self::SpoilerToggled { added: true } => "Success: You now have the Spoiler role.".to_string(),
            Self::SpoilerToggled { added: false } => "Success: The Spoiler role has been removed.".to_string(),
            Self::ChannelConfigured { day } => format!(
                "Success: This channel is now only visible to `Day {:02}` and `Spoiler`.",
                day
            ),
            Self::Help => HELP.to_string(),
            Self::Source => SOURCE_URL.to_string(),

            Self::NotConfigured => "Error: This guild is not configured, yet.".to_string(),
            Self::AlreadyClaimed => "Error: This user has already been claimed, if you believe this is an error, please contact an administrator".to_string(),
            Self::NotFound { suggestions, .. } if suggestions.is_empty() => {
                "Error: I couldn't find that user.".to_string()
            }
            Self::NotFound { suggestions, .. } => {
                let mut message = "Error: I couldn't find that user. Did you mean one of these?\n".to_string();
                for name in suggestions {
                    message.push_str(&format!("- '{}'\n", name));
                }
                message
            }
            Self::NotClaimed { own: true } => "Error: You haven't ran `/claim` yet.".to_string(),
            Self::NotClaimed { own: false } => "Error: That member hasn't ran `/claim` yet.".to_string(),
            Self::NotOnScoreboard => "Error: Something odd happened here, did you quit the leaderboard?".to_string(),
            Self::Forbidden => "Error: Only administrators can do that.".to_string(),
            Self::InvalidDay(day) => format!("Error: Day {} is not an Advent of Code day, pick 1 to 25.", day),
            Self::RetryLater => "Error: Something went wrong, please try again later.".to_string(),
            Self::CredentialsExpired => "Error: The Advent of Code session has expired, please ask an administrator to update it.".to_string(),
            Self::Failed => "Error: Something went wrong, please contact an administrator.".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Claimed { .. }
                | Self::Unclaimed { .. }
                | Self::Points { .. }
                | Self::SpoilerToggled { .. }
                | Self::ChannelConfigured { .. }
                | Self::Help
                | Self::Source
        )
    }

    /// Map a failure to what the invoker is told. `own` says whether the
    /// command was about the invoker themself.
    fn from_error(err: StarboardError, own: bool) -> Self {
        match err {
            StarboardError::NotConfigured(_) => Self::NotConfigured,
            StarboardError::AlreadyClaimed { .. } => Self::AlreadyClaimed,
            StarboardError::NotFound(query) => Self::NotFound {
                query,
                suggestions: Vec::new(),
            },
            StarboardError::NotClaimed(_) => Self::NotClaimed { own },
            StarboardError::NotOnScoreboard(_) => Self::NotOnScoreboard,
            StarboardError::InvalidDay(day) => Self::InvalidDay(day),
            StarboardError::Scoreboard(ScoreboardError::Auth(_)) => Self::CredentialsExpired,
            StarboardError::Scoreboard(_) => Self::RetryLater,
            StarboardError::Membership(e) if e.is_retryable() => Self::RetryLater,
            StarboardError::Membership(_) | StarboardError::Ledger(_) => Self::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Command handlers over the community registry.
pub struct Commands {
    registry: Arc<CommunityRegistry>,
    reconciler: Arc<Reconciler>,
}

impl Commands {
    pub fn new(registry: Arc<CommunityRegistry>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            registry,
            reconciler,
        }
    }

    /// Link the invoker to a leaderboard participant by name or id, then
    /// bring their roles up to date.
    pub async fn claim(&self, community_id: &str, invoker: &Invoker, name_or_id: &str) -> Outcome {
        info!(community_id, local_id = %invoker.id, query = name_or_id, "Claim requested");

        let state = match self.registry.get(community_id) {
            Ok(state) => state,
            Err(e) => return Outcome::from_error(e, true),
        };

        match state.claim(&invoker.id, name_or_id).await {
            Ok(member) => {
                if let Err(e) = self.reconciler.sync_member(&state, &invoker.id).await {
                    warn!(community_id, local_id = %invoker.id, error = %e, "Role sync after claim failed");
                }
                Outcome::Claimed {
                    name: member.display_name(),
                }
            }
            Err(StarboardError::NotFound(query)) => {
                let suggestions = match state.suggest_close_names(&query).await {
                    Ok(names) => names,
                    Err(e) => {
                        warn!(community_id, error = %e, "No suggestions available");
                        Vec::new()
                    }
                };
                Outcome::NotFound { query, suggestions }
            }
            Err(e) => {
                warn!(community_id, local_id = %invoker.id, error = %e, "Claim failed");
                Outcome::from_error(e, true)
            }
        }
    }

    /// Release a claim. Releasing someone else's needs an administrator.
    pub async fn unclaim(&self, community_id: &str, invoker: &Invoker, target: Option<&str>) -> Outcome {
        let member_id = target.unwrap_or(invoker.id.as_str());
        let own = member_id == invoker.id;
        info!(community_id, local_id = %invoker.id, member_id, "Unclaim requested");

        if !own && !invoker.is_admin {
            return Outcome::Forbidden;
        }

        let state = match self.registry.get(community_id) {
            Ok(state) => state,
            Err(e) => return Outcome::from_error(e, own),
        };

        match state.unclaim(member_id).await {
            Ok(_) => {
                if let Err(e) = self.reconciler.clear_member(community_id, member_id).await {
                    warn!(community_id, member_id, error = %e, "Role cleanup after unclaim failed");
                }
                Outcome::Unclaimed { own }
            }
            Err(e) => Outcome::from_error(e, own),
        }
    }

    /// Star count of the invoker, or of `target`.
    pub async fn get_points(&self, community_id: &str, invoker: &Invoker, target: Option<&str>) -> Outcome {
        let member_id = target.unwrap_or(invoker.id.as_str());
        let own = member_id == invoker.id;
        info!(community_id, local_id = %invoker.id, member_id, "Star count requested");

        let result = match self.registry.get(community_id) {
            Ok(state) => state.resolve(member_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(member) => Outcome::Points {
                stars: member.stars,
                own,
            },
            Err(e) => Outcome::from_error(e, own),
        }
    }

    /// Add or remove the invoker's Spoiler role.
    pub async fn toggle_spoiler_badge(&self, community_id: &str, invoker: &Invoker) -> Outcome {
        info!(community_id, local_id = %invoker.id, "Spoiler toggle requested");

        if let Err(e) = self.registry.get(community_id) {
            return Outcome::from_error(e, true);
        }

        match self.reconciler.toggle_spoiler(community_id, &invoker.id).await {
            Ok(added) => Outcome::SpoilerToggled { added },
            Err(e) => {
                warn!(community_id, local_id = %invoker.id, error = %e, "Spoiler toggle failed");
                Outcome::from_error(e, true)
            }
        }
    }

    /// Restrict a channel to one day's solvers. Administrators only.
    pub async fn setup_channel_for_day(
        &self,
        community_id: &str,
        invoker: &Invoker,
        day: u32,
        channel_id: &str,
    ) -> Outcome {
        info!(community_id, local_id = %invoker.id, day, channel_id, "Channel setup requested");

        if !invoker.is_admin {
            return Outcome::Forbidden;
        }
        if let Err(e) = self.registry.get(community_id) {
            return Outcome::from_error(e, true);
        }

        match self.reconciler.setup_channel(community_id, day, channel_id).await {
            Ok(()) => Outcome::ChannelConfigured { day },
            Err(e) => {
                warn!(community_id, day, channel_id, error = %e, "Channel setup failed");
                Outcome::from_error(e, true)
            }
        }
    }

    pub fn help(&self) -> Outcome {
        Outcome::Help
    }

    pub fn source(&self) -> Outcome {
        Outcome::Source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::MembershipError;

    #[test]
    fn test_not_found_lists_suggestions() {
        let outcome = Outcome::NotFound {
            query: "alise".to_string(),
            suggestions: vec!["alice".to_string(), "alicia".to_string()],
        };
        assert_eq!(
            outcome.message(),
            "Error: I couldn't find that user. Did you mean one of these?\n- 'alice'\n- 'alicia'\n"
        );
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_points_message() {
        assert_eq!(
            Outcome::Points { stars: 12, own: true }.to_string(),
            "You have collected **12** stars!"
        );
    }

    #[test]
    fn test_error_classification() {
        let auth = StarboardError::Scoreboard(ScoreboardError::Auth("text/html".into()));
        assert_eq!(Outcome::from_error(auth, true), Outcome::CredentialsExpired);

        let fetch = StarboardError::Scoreboard(ScoreboardError::Fetch("timeout".into()));
        assert_eq!(Outcome::from_error(fetch, true), Outcome::RetryLater);

        let limited = StarboardError::Membership(MembershipError::RateLimited { retry_after_ms: 5 });
        assert_eq!(Outcome::from_error(limited, true), Outcome::RetryLater);

        let missing = StarboardError::Membership(MembershipError::MissingRole("Spoiler".into()));
        assert_eq!(Outcome::from_error(missing, true), Outcome::Failed);

        let unclaimed = StarboardError::NotClaimed("u2".into());
        assert_eq!(Outcome::from_error(unclaimed, false), Outcome::NotClaimed { own: false });
    }
}
