//! Config file loading and resolution tests

use std::fs;
use std::time::Duration;

use clap::Parser;
use starboard::config::{Args, ConfigError, FileConfig};
use tempfile::TempDir;

#[test]
fn test_load_and_resolve_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("starboard.toml");
    fs::write(
        &path,
        r#"
discord_token = "file-token"
session_cookie = "file-cookie"

[communities.123456789012345678]
year = "2024"
leaderboard_id = "1234567"
daily_roles = true
"#,
    )
    .unwrap();

    let args = Args::try_parse_from([
        "starboard",
        "--config",
        path.to_str().unwrap(),
        "--discord-token",
        "cli-token",
        "--session-cookie",
        "cli-cookie",
        "--data-dir",
        "/var/lib/starboard",
        "--role-pace-ms",
        "250",
    ])
    .unwrap();

    let settings = args.resolve(FileConfig::load(&args.config).unwrap()).unwrap();

    assert_eq!(settings.discord_token, "cli-token");
    assert_eq!(settings.registry.session_cookie, "cli-cookie");
    assert_eq!(
        settings.registry.ledger_path("123456789012345678"),
        std::path::PathBuf::from("/var/lib/starboard/123456789012345678.db")
    );
    assert_eq!(settings.reconciler.pace, Duration::from_millis(250));
    assert_eq!(settings.sync_interval, Duration::from_secs(900));

    let community = &settings.communities[0];
    assert_eq!(community.event, "2024");
    assert_eq!(community.leaderboard_id, "1234567");
    assert!(community.daily_roles);
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let result = FileConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
}

#[test]
fn test_invalid_toml() {
    let result = FileConfig::from_toml("[communities.1]\nyear = 2024\n");
    assert!(matches!(result, Err(ConfigError::Toml(_))));
}

#[test]
fn test_zero_interval_rejected() {
    let args = Args::try_parse_from([
        "starboard",
        "--discord-token",
        "t",
        "--session-cookie",
        "c",
        "--sync-interval-secs",
        "0",
    ])
    .unwrap();
    let file = FileConfig::from_toml("[communities.1]\nyear = \"2024\"\nleaderboard_id = \"9\"\n").unwrap();

    assert!(matches!(args.resolve(file), Err(ConfigError::Invalid(_))));
}
