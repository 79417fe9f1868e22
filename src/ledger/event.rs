//! Ledger events and their on-disk JSON records.
//!
//! Each record is a JSON object carrying exactly one of `create` or
//! `delete`:
//!
//! ```text
//! {"create":{"discord_id":"1234","aoc_id":"98765"}}
//! {"delete":{"discord_id":"1234"}}
//! ```
//!
//! Two older shapes are still accepted on replay: a flat
//! `{"discord_id":..,"aoc_id":..}` object (a create), and records holding a
//! `snapshot` of total scores, which are skipped.

use serde::{Deserialize, Serialize};

/// A single durable change to the claim mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// `local_id` now claims `remote_id`, replacing any earlier claim
    Create { local_id: String, remote_id: String },
    /// `local_id` no longer claims anything
    Delete { local_id: String },
}

impl LedgerEvent {
    pub fn create(local_id: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self::Create {
            local_id: local_id.into(),
            remote_id: remote_id.into(),
        }
    }

    pub fn delete(local_id: impl Into<String>) -> Self {
        Self::Delete {
            local_id: local_id.into(),
        }
    }

    /// The local identity this event is about.
    pub fn local_id(&self) -> &str {
        match self {
            Self::Create { local_id, .. } | Self::Delete { local_id } => local_id,
        }
    }

    /// Encode as a single JSON record (no trailing newline).
    pub fn to_record(&self) -> serde_json::Result<String> {
        let record = match self {
            Self::Create {
                local_id,
                remote_id,
            } => EnvelopeRecord {
                create: Some(CreateRecord {
                    discord_id: local_id.clone(),
                    aoc_id: remote_id.clone(),
                }),
                ..Default::default()
            },
            Self::Delete { local_id } => EnvelopeRecord {
                delete: Some(DeleteRecord {
                    discord_id: local_id.clone(),
                }),
                ..Default::default()
            },
        };
        serde_json::to_string(&record)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CreateRecord {
    discord_id: String,
    aoc_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DeleteRecord {
    discord_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct EnvelopeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    create: Option<CreateRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<DeleteRecord>,

    /// Total-score snapshots written by older releases
    #[serde(default, skip_serializing)]
    snapshot: Option<serde_json::Value>,
}

/// A record as read back from the log, before validation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawRecord {
    Legacy(CreateRecord),
    Envelope(EnvelopeRecord),
}

impl RawRecord {
    /// Validate the record. `Ok(None)` means the record carries nothing the
    /// claim mapping cares about.
    pub(crate) fn into_event(self) -> Result<Option<LedgerEvent>, &'static str> {
        match self {
            Self::Legacy(create) => Ok(Some(LedgerEvent::Create {
                local_id: create.discord_id,
                remote_id: create.aoc_id,
            })),
            Self::Envelope(envelope) => match (envelope.create, envelope.delete) {
                (Some(create), None) => Ok(Some(LedgerEvent::Create {
                    local_id: create.discord_id,
                    remote_id: create.aoc_id,
                })),
                (None, Some(delete)) => Ok(Some(LedgerEvent::Delete {
                    local_id: delete.discord_id,
                })),
                (None, None) if envelope.snapshot.is_some() => Ok(None),
                (Some(_), Some(_)) => Err("record carries both create and delete"),
                (None, None) => Err("record carries neither create nor delete"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Result<Option<LedgerEvent>, &'static str> {
        serde_json::from_str::<RawRecord>(line)
            .expect("valid JSON object")
            .into_event()
    }

    #[test]
    fn test_create_record_shape() {
        let line = LedgerEvent::create("42", "1001").to_record().unwrap();
        assert_eq!(line, r#"{"create":{"discord_id":"42","aoc_id":"1001"}}"#);
    }

    #[test]
    fn test_delete_record_shape() {
        let line = LedgerEvent::delete("42").to_record().unwrap();
        assert_eq!(line, r#"{"delete":{"discord_id":"42"}}"#);
    }

    #[test]
    fn test_legacy_flat_record_is_create() {
        let event = decode(r#"{"discord_id":"7","aoc_id":"300"}"#).unwrap();
        assert_eq!(event, Some(LedgerEvent::create("7", "300")));
    }

    #[test]
    fn test_score_snapshot_record_is_skipped() {
        let event = decode(r#"{"snapshot":{"timestamp":1701388800,"scores":{"300":12}}}"#).unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_ambiguous_records_rejected() {
        assert!(decode(r#"{"create":{"discord_id":"1","aoc_id":"2"},"delete":{"discord_id":"1"}}"#).is_err());
        assert!(decode(r#"{"unrelated":true}"#).is_err());
    }
}
