//! Append-only audit log.
//!
//! Every mutating operation in the registry and the consent manager writes
//! exactly one [`ActivityEvent`] here before returning success. Events are
//! never updated or deleted. Persistence is one JSONL file per subject,
//! named by the SHA-256 of the subject identifier so arbitrary external ids
//! map to safe file names.
//!
//! Audit persistence is best-effort relative to the primary action: a failed
//! append is logged server-side and never fails or rolls back the operation
//! it documents. The primary action's own durability is the stronger
//! guarantee.

use crate::error::{CoreError, CoreResult};
use crate::model::{ActionFilter, ActivityEvent};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fixed page size for audit reads.
pub const QUERY_PAGE_SIZE: usize = 100;

pub struct AuditLog {
    dir: PathBuf,
    append_lock: Mutex<()>,
}

impl AuditLog {
    /// Opens (creating if necessary) the audit log rooted at `dir`.
    pub fn open(dir: &Path) -> CoreResult<Self> {
        fs::create_dir_all(dir).map_err(CoreError::StoreWrite)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            append_lock: Mutex::new(()),
        })
    }

    fn subject_path(&self, subject_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(subject_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir
            .join(&digest[0..2])
            .join(format!("{}.jsonl", digest))
    }

    /// Records one event. Never fails the caller: persistence errors are
    /// logged and swallowed.
    pub fn record(&self, event: ActivityEvent) {
        if let Err(e) = self.append(&event) {
            tracing::error!(
                "failed to persist audit event (subject {}, action {}): {}",
                event.subject_user_id,
                event.action,
                e
            );
        }
    }

    fn append(&self, event: &ActivityEvent) -> CoreResult<()> {
        let line = serde_json::to_string(event).map_err(CoreError::Serialization)?;

        let _guard = self.append_lock.lock().expect("audit lock poisoned");
        let path = self.subject_path(&event.subject_user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CoreError::StoreWrite)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(CoreError::StoreWrite)?;
        writeln!(file, "{}", line).map_err(CoreError::StoreWrite)?;
        Ok(())
    }

    /// Returns a subject's events matching `filter`, newest first, capped at
    /// [`QUERY_PAGE_SIZE`]. A subject with no events yields an empty list.
    pub fn query(&self, subject_id: &str, filter: &ActionFilter) -> CoreResult<Vec<ActivityEvent>> {
        let path = self.subject_path(subject_id);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::StoreRead(e)),
        };

        let mut events: Vec<ActivityEvent> = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ActivityEvent>(line) {
                Ok(event) => {
                    if filter.matches(event.action) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable audit line for subject: {}", e);
                }
            }
        }

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(QUERY_PAGE_SIZE);
        Ok(events)
    }
}
