//! Claim ledger persistence tests
//!
//! Exercises the on-disk log:
//! - Replay after reopen reproduces the mapping
//! - Legacy and snapshot records in old logs
//! - Malformed records fail the open
//! - One writer per ledger file

use std::fs;

use starboard::{Claim, ClaimLedger, LedgerError};
use tempfile::TempDir;

// =============================================================================
// Replay fidelity
// =============================================================================

#[tokio::test]
async fn test_reopen_reproduces_claims() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs").join("1001.db");

    {
        let ledger = ClaimLedger::open_file(&path).unwrap();
        ledger.claim("alice", "100").await.unwrap();
        ledger.claim("bob", "200").await.unwrap();
        ledger.claim("carol", "300").await.unwrap();
        ledger.unclaim("bob").await.unwrap();
        ledger.claim("alice", "400").await.unwrap();
    }

    let reopened = ClaimLedger::open_file(&path).unwrap();
    assert_eq!(
        reopened.snapshot().await,
        vec![
            Claim { local_id: "alice".into(), remote_id: "400".into() },
            Claim { local_id: "carol".into(), remote_id: "300".into() },
        ]
    );
    assert!(!reopened.is_claimed("100").await);
    assert!(reopened.is_claimed("400").await);
    assert_eq!(reopened.lookup_local("300").await.as_deref(), Some("carol"));

    // Appends continue after the replayed records
    reopened.claim("bob", "200").await.unwrap();
    drop(reopened);
    let again = ClaimLedger::open_file(&path).unwrap();
    assert_eq!(again.len().await, 3);
}

#[tokio::test]
async fn test_create_create_delete_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("g.db");
    fs::write(
        &path,
        concat!(
            r#"{"create":{"discord_id":"A","aoc_id":"100"}}"#, "\n",
            r#"{"create":{"discord_id":"A","aoc_id":"200"}}"#, "\n",
            r#"{"delete":{"discord_id":"A"}}"#, "\n",
        ),
    )
    .unwrap();

    let ledger = ClaimLedger::open_file(&path).unwrap();
    assert!(ledger.is_empty().await);
    assert_eq!(ledger.lookup_remote("A").await, None);
    assert!(!ledger.is_claimed("100").await);
    assert!(!ledger.is_claimed("200").await);
}

// =============================================================================
// Older log formats
// =============================================================================

#[tokio::test]
async fn test_legacy_and_snapshot_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("g.db");
    fs::write(
        &path,
        concat!(
            r#"{"discord_id":"A","aoc_id":"100"}"#, "\n",
            r#"{"snapshot":{"members":{}}}"#, "\n",
            r#"{"create":{"discord_id":"B","aoc_id":"200"}}"#, "\n",
        ),
    )
    .unwrap();

    let ledger = ClaimLedger::open_file(&path).unwrap();
    assert_eq!(ledger.lookup_remote("A").await.as_deref(), Some("100"));
    assert_eq!(ledger.lookup_remote("B").await.as_deref(), Some("200"));
}

#[tokio::test]
async fn test_restored_duplicates_do_not_crash() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("g.db");
    fs::write(
        &path,
        concat!(
            r#"{"create":{"discord_id":"A","aoc_id":"100"}}"#, "\n",
            r#"{"create":{"discord_id":"B","aoc_id":"100"}}"#, "\n",
        ),
    )
    .unwrap();

    let ledger = ClaimLedger::open_file(&path).unwrap();
    assert_eq!(ledger.len().await, 2);

    ledger.unclaim("A").await.unwrap();
    assert_eq!(ledger.lookup_local("100").await.as_deref(), Some("B"));
    assert!(matches!(
        ledger.claim("C", "100").await,
        Err(LedgerError::AlreadyClaimed { .. })
    ));
}

#[test]
fn test_malformed_record_fails_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("g.db");
    fs::write(
        &path,
        concat!(
            r#"{"create":{"discord_id":"A","aoc_id":"100"}}"#, "\n",
            r#"{"create":{"discord_id":"B","aoc_id":"200"},"delete":{"discord_id":"B"}}"#, "\n",
        ),
    )
    .unwrap();

    assert!(matches!(
        ClaimLedger::open_file(&path),
        Err(LedgerError::Malformed { record: 2, .. })
    ));
}

// =============================================================================
// Single writer
// =============================================================================

#[tokio::test]
async fn test_second_open_of_same_file_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("g.db");

    let first = ClaimLedger::open_file(&path).unwrap();
    first.claim("A", "100").await.unwrap();

    match ClaimLedger::open_file(&path) {
        Err(LedgerError::Locked(locked)) => assert_eq!(locked, path),
        Err(other) => panic!("expected Locked, got {other}"),
        Ok(_) => panic!("second writer opened a held ledger"),
    }

    // Released with the first ledger
    drop(first);
    let second = ClaimLedger::open_file(&path).unwrap();
    assert!(matches!(
        second.claim("B", "100").await,
        Err(LedgerError::AlreadyClaimed { .. })
    ));
}
