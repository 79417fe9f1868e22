//! Claim ledger: an append-only log of identity claims.
//!
//! The log on disk is the source of truth. On open every record is replayed
//! in file order into an in-memory projection; afterwards each successful
//! `claim`/`unclaim` appends one record while holding the write lock, so the
//! projection and the log only diverge across a hard crash.
//!
//! A record is written before the projection changes. If the append fails
//! the in-memory mapping is left exactly as it was, and the log is cut back
//! to its length before the append. A sink that cannot be cut back puts the
//! ledger into a read-only state instead of appending after a torn record.
//!
//! A ledger file has one writer. `open_file` takes an exclusive advisory
//! lock that lives as long as the ledger.

mod event;

pub use event::LedgerEvent;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, error, info};

use event::RawRecord;

/// Errors produced by the claim ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Some live claim already targets this remote identity
    #[error("Remote id {remote_id} is already claimed by {holder}")]
    AlreadyClaimed { remote_id: String, holder: String },

    /// No claim exists for the local identity
    #[error("No claim exists for {0}")]
    NotFound(String),

    /// A record in the log could not be decoded
    #[error("Malformed ledger record #{record}: {reason}")]
    Malformed { record: usize, reason: String },

    /// Another process holds the ledger file
    #[error("Ledger {} is locked by another process", .0.display())]
    Locked(PathBuf),

    /// An earlier append failed and could not be undone
    #[error("Ledger is read-only after a failed append")]
    Poisoned,

    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode ledger record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One live claim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Claim {
    pub local_id: String,
    pub remote_id: String,
}

/// In-memory fold of the event log.
#[derive(Debug, Default, Clone)]
struct Projection {
    /// local_id -> remote_id
    claims: BTreeMap<String, String>,
    /// remote_id -> every local_id currently holding it
    ///
    /// Claim-time checks keep this to one holder, but a restored log may
    /// contain duplicates and replay does not validate.
    holders: HashMap<String, BTreeSet<String>>,
}

impl Projection {
    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::Create {
                local_id,
                remote_id,
            } => {
                if let Some(previous) = self.claims.insert(local_id.clone(), remote_id.clone()) {
                    self.unindex(&previous, local_id);
                }
                self.holders
                    .entry(remote_id.clone())
                    .or_default()
                    .insert(local_id.clone());
            }
            LedgerEvent::Delete { local_id } => {
                if let Some(previous) = self.claims.remove(local_id) {
                    self.unindex(&previous, local_id);
                }
            }
        }
    }

    fn unindex(&mut self, remote_id: &str, local_id: &str) {
        if let Some(locals) = self.holders.get_mut(remote_id) {
            locals.remove(local_id);
            if locals.is_empty() {
                self.holders.remove(remote_id);
            }
        }
    }

    fn holder(&self, remote_id: &str) -> Option<&String> {
        self.holders.get(remote_id).and_then(|locals| locals.iter().next())
    }
}

/// Destination of appended records.
///
/// Sinks that can report and restore their length let a failed append be
/// undone. The defaults cannot, which makes the first failed append final.
pub trait LogSink: Write + Send + Sync {
    /// Current length of the log in bytes.
    fn mark(&mut self) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "log sink has no length"))
    }

    /// Discard everything after `mark`.
    fn rewind_to(&mut self, _mark: u64) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "log sink cannot truncate"))
    }
}

impl LogSink for File {
    fn mark(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn rewind_to(&mut self, mark: u64) -> io::Result<()> {
        self.set_len(mark)
    }
}

impl LogSink for Vec<u8> {
    fn mark(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn rewind_to(&mut self, mark: u64) -> io::Result<()> {
        Vec::truncate(self, mark as usize);
        Ok(())
    }
}

impl LogSink for io::Sink {}

struct LedgerInner {
    projection: Projection,
    appender: Box<dyn LogSink>,
    poisoned: bool,
}

impl LedgerInner {
    fn append(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        if self.poisoned {
            return Err(LedgerError::Poisoned);
        }

        let mut record = event.to_record()?;
        record.push('\n');

        let mark = self.appender.mark().ok();
        let written = self
            .appender
            .write_all(record.as_bytes())
            .and_then(|()| self.appender.flush());

        if let Err(e) = written {
            let rewound = match mark {
                Some(mark) => self.appender.rewind_to(mark),
                None => Err(io::Error::new(io::ErrorKind::Unsupported, "no mark")),
            };
            if let Err(rewind) = rewound {
                error!(error = %e, rewind = %rewind, "Ledger append failed and could not be undone");
                self.poisoned = true;
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Durable, bidirectional local ↔ remote identity mapping.
pub struct ClaimLedger {
    inner: RwLock<LedgerInner>,
}

impl ClaimLedger {
    /// Replay every record from `reader`, then append new records to
    /// `appender`.
    ///
    /// End of stream terminates replay normally; any undecodable record
    /// fails the open.
    pub fn open<R, W>(reader: R, appender: W) -> Result<Self, LedgerError>
    where
        R: Read,
        W: LogSink + 'static,
    {
        let mut projection = Projection::default();
        let mut replayed = 0usize;

        let records =
            serde_json::Deserializer::from_reader(BufReader::new(reader)).into_iter::<RawRecord>();

        for (index, record) in records.enumerate() {
            let record = record.map_err(|e| {
                if e.is_io() {
                    LedgerError::Io(e.into())
                } else {
                    LedgerError::Malformed {
                        record: index + 1,
                        reason: e.to_string(),
                    }
                }
            })?;

            let event = record.into_event().map_err(|reason| LedgerError::Malformed {
                record: index + 1,
                reason: reason.to_string(),
            })?;

            if let Some(event) = event {
                projection.apply(&event);
                replayed += 1;
            }
        }

        debug!(
            events = replayed,
            claims = projection.claims.len(),
            "Ledger replayed"
        );

        Ok(Self {
            inner: RwLock::new(LedgerInner {
                projection,
                appender: Box::new(appender),
                poisoned: false,
            }),
        })
    }

    /// Open (creating if needed) a ledger file, replaying it and appending
    /// to it from then on.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let appender = OpenOptions::new().create(true).append(true).open(path)?;
        if !try_lock_exclusive(&appender)? {
            return Err(LedgerError::Locked(path.to_path_buf()));
        }
        let reader = File::open(path)?;
        let ledger = Self::open(reader, appender)?;

        info!(path = %path.display(), "Claim ledger opened");
        Ok(ledger)
    }

    /// Record that `local_id` claims `remote_id`.
    ///
    /// Fails with `AlreadyClaimed` when any live claim targets `remote_id`,
    /// including one held by `local_id` itself. A different earlier claim
    /// by `local_id` is replaced.
    pub async fn claim(&self, local_id: &str, remote_id: &str) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().await;

        if let Some(holder) = inner.projection.holder(remote_id) {
            return Err(LedgerError::AlreadyClaimed {
                remote_id: remote_id.to_string(),
                holder: holder.clone(),
            });
        }

        let event = LedgerEvent::create(local_id, remote_id);
        inner.append(&event)?;
        inner.projection.apply(&event);

        info!(local_id, remote_id, "Claim recorded");
        Ok(())
    }

    /// Remove the claim held by `local_id`, returning the released remote id.
    pub async fn unclaim(&self, local_id: &str) -> Result<String, LedgerError> {
        let mut inner = self.inner.write().await;

        let remote_id = inner
            .projection
            .claims
            .get(local_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(local_id.to_string()))?;

        let event = LedgerEvent::delete(local_id);
        inner.append(&event)?;
        inner.projection.apply(&event);

        info!(local_id, remote_id = %remote_id, "Claim released");
        Ok(remote_id)
    }

    /// Remote identity claimed by `local_id`.
    pub async fn lookup_remote(&self, local_id: &str) -> Option<String> {
        self.inner.read().await.projection.claims.get(local_id).cloned()
    }

    /// Local identity holding `remote_id`.
    pub async fn lookup_local(&self, remote_id: &str) -> Option<String> {
        self.inner.read().await.projection.holder(remote_id).cloned()
    }

    /// Whether any live claim targets `remote_id`.
    pub async fn is_claimed(&self, remote_id: &str) -> bool {
        self.inner.read().await.projection.holders.contains_key(remote_id)
    }

    /// Copy of every live claim, ordered by local id.
    pub async fn snapshot(&self) -> Vec<Claim> {
        let inner = self.inner.read().await;
        inner
            .projection
            .claims
            .iter()
            .map(|(local_id, remote_id)| Claim {
                local_id: local_id.clone(),
                remote_id: remote_id.clone(),
            })
            .collect()
    }

    /// Visit a consistent copy of every live claim.
    ///
    /// Claims recorded while visiting are not observed.
    pub async fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Claim),
    {
        for claim in self.snapshot().await {
            visit(&claim);
        }
    }

    /// Number of live claims.
    pub async fn len(&self) -> usize {
        self.inner.read().await.projection.claims.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Non-blocking exclusive `flock`. `Ok(false)` when another open file
/// description holds it.
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor is owned by `file` and outlives the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
