//! Badge computation and role reconciliation.

pub mod badge;
pub mod reconcile;

pub use badge::{desired_badges, managed_universe, required_roles, Badge, STAR_THRESHOLDS};
pub use reconcile::{
    BadgePlan, MemberReport, Reconciler, ReconcilerConfig, RoleDirectory, SyncSummary,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, DEFAULT_PACE,
};
