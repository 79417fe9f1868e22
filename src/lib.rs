//! Starboard - Advent of Code leaderboard roles for Discord
//!
//! Links members of a Discord guild to participants of an Advent of Code
//! private leaderboard and keeps their achievement roles in sync.
//!
//! ## Components
//!
//! - **Ledger**: append-only claim log, replayed into memory on startup
//! - **Scoreboard**: leaderboard client and a TTL cache with single-flight refresh
//! - **Community**: per-guild state combining one ledger and one cache
//! - **Roles**: desired-badge computation and paced reconciliation
//! - **Membership**: the Discord REST API behind an async trait
//! - **Commands**: user-facing operations returning explicit outcomes
//! - **Driver**: periodic refresh + full reconciliation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────┐
//! │  SyncDriver  │────▶│       CommunityRegistry      │
//! │  Commands    │     │  ┌────────────────────────┐  │
//! └──────┬───────┘     │  │ CommunityState (guild) │  │
//!        │             │  │  ClaimLedger           │  │
//!        ▼             │  │  ScoreboardCache       │  │
//! ┌──────────────┐     │  └────────────────────────┘  │
//! │  Reconciler  │     └──────────────────────────────┘
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Membership  │ (Discord REST / mock)
//! └──────────────┘
//! ```

pub mod commands;
pub mod community;
pub mod config;
pub mod driver;
pub mod ledger;
pub mod membership;
pub mod roles;
pub mod scoreboard;
pub mod types;

pub use commands::{Commands, Invoker, Outcome};
pub use community::{CommunityRegistry, CommunitySettings, CommunityState, RegistryOptions};
pub use config::Args;
pub use driver::SyncDriver;
pub use ledger::{Claim, ClaimLedger, LedgerError, LedgerEvent, LogSink};
pub use membership::{GuildMember, Membership, MembershipError, Role, RoleSpec};
pub use roles::{desired_badges, Badge, Reconciler, ReconcilerConfig};
pub use scoreboard::{ScoreboardCache, ScoreboardError, ScoreboardMember, ScoreboardSource, Snapshot};
pub use types::{Result, StarboardError};
