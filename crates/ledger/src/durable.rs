//! Durable local ledger backend.
//!
//! Persists anchors to an append-only JSONL journal under the process's own
//! data directory. Protection identifiers are deterministic: a monotonic
//! sequence number combined with the commit timestamp. Reads are served from
//! an in-memory index that is rebuilt from the journal at startup, giving
//! read-after-write consistency for the lifetime of the process.

use crate::{AnchorReceipt, AnchorRequest, AnchoredRecord, LedgerError, LedgerPort, LedgerResult};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const JOURNAL_FILE_NAME: &str = "anchors.jsonl";

struct DurableState {
    anchors: Vec<AnchoredRecord>,
    sequence: u64,
}

/// Local durable [`LedgerPort`] backend.
pub struct DurableLedger {
    journal_path: PathBuf,
    state: Mutex<DurableState>,
}

impl DurableLedger {
    /// Opens the journal under `dir`, creating it if absent, and rebuilds the
    /// in-memory index from any existing entries.
    ///
    /// Journal lines that fail to parse are logged and skipped rather than
    /// poisoning the whole ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the journal directory cannot
    /// be created or an existing journal cannot be read.
    pub fn open(dir: &Path) -> LedgerResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            LedgerError::Unavailable(format!(
                "cannot create ledger directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let journal_path = dir.join(JOURNAL_FILE_NAME);
        let mut anchors = Vec::new();

        if journal_path.is_file() {
            let contents = fs::read_to_string(&journal_path).map_err(|e| {
                LedgerError::Unavailable(format!(
                    "cannot read ledger journal {}: {}",
                    journal_path.display(),
                    e
                ))
            })?;

            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<AnchoredRecord>(line) {
                    Ok(anchor) => anchors.push(anchor),
                    Err(e) => {
                        tracing::warn!("skipping unreadable ledger journal line: {}", e);
                    }
                }
            }
        }

        let sequence = anchors.len() as u64;
        Ok(Self {
            journal_path,
            state: Mutex::new(DurableState { anchors, sequence }),
        })
    }

    fn append_line(&self, anchor: &AnchoredRecord) -> LedgerResult<()> {
        let line = serde_json::to_string(anchor)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl LedgerPort for DurableLedger {
    fn anchor(&self, request: AnchorRequest) -> LedgerResult<AnchorReceipt> {
        let mut state = self.state.lock().expect("ledger state lock poisoned");

        let timestamp = Utc::now();
        state.sequence += 1;
        let protection_id = format!(
            "prot-{}-{:06}",
            timestamp.format("%Y%m%dT%H%M%S%3fZ"),
            state.sequence
        );

        let anchor = AnchoredRecord {
            record_id: request.record_id,
            payload: request.payload,
            submitter_id: request.submitter_id,
            subject_id: request.subject_id,
            protection_id: protection_id.clone(),
            anchored_at: timestamp,
        };

        // Journal first: an anchor only exists once it is durable.
        self.append_line(&anchor)?;

        let receipt = AnchorReceipt {
            record_id: anchor.record_id.clone(),
            protection_id,
            timestamp,
        };
        state.anchors.push(anchor);

        Ok(receipt)
    }

    fn query_by_subject(&self, subject_id: &str) -> LedgerResult<Vec<AnchoredRecord>> {
        let state = self.state.lock().expect("ledger state lock poisoned");
        let mut matches: Vec<AnchoredRecord> = state
            .anchors
            .iter()
            .filter(|a| a.subject_id == subject_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.anchored_at.cmp(&a.anchored_at));
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnchorPayload;

    fn payload(handle: &str) -> AnchorPayload {
        AnchorPayload {
            content_handle: handle.to_string(),
            size_bytes: 42,
            stored_at: Utc::now(),
        }
    }

    fn request(record_id: &str, subject_id: &str) -> AnchorRequest {
        AnchorRequest {
            record_id: record_id.to_string(),
            payload: payload("aa11"),
            submitter_id: subject_id.to_string(),
            subject_id: subject_id.to_string(),
        }
    }

    #[test]
    fn anchor_returns_receipt_with_protection_id() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DurableLedger::open(dir.path()).unwrap();

        let receipt = ledger.anchor(request("rec-1", "P1")).unwrap();

        assert_eq!(receipt.record_id, "rec-1");
        assert!(receipt.protection_id.starts_with("prot-"));
    }

    #[test]
    fn protection_ids_are_unique_and_sequenced() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DurableLedger::open(dir.path()).unwrap();

        let first = ledger.anchor(request("rec-1", "P1")).unwrap();
        let second = ledger.anchor(request("rec-2", "P1")).unwrap();

        assert_ne!(first.protection_id, second.protection_id);
        assert!(first.protection_id.ends_with("000001"));
        assert!(second.protection_id.ends_with("000002"));
    }

    #[test]
    fn query_by_subject_filters_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DurableLedger::open(dir.path()).unwrap();

        ledger.anchor(request("rec-1", "P1")).unwrap();
        ledger.anchor(request("rec-2", "P2")).unwrap();
        ledger.anchor(request("rec-3", "P1")).unwrap();

        let anchors = ledger.query_by_subject("P1").unwrap();

        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].record_id, "rec-3");
        assert_eq!(anchors[1].record_id, "rec-1");
        assert!(anchors[0].anchored_at >= anchors[1].anchored_at);
    }

    #[test]
    fn journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = DurableLedger::open(dir.path()).unwrap();
            ledger.anchor(request("rec-1", "P1")).unwrap();
            ledger.anchor(request("rec-2", "P1")).unwrap();
        }

        let reopened = DurableLedger::open(dir.path()).unwrap();
        let anchors = reopened.query_by_subject("P1").unwrap();
        assert_eq!(anchors.len(), 2);

        // Sequence continues past journalled entries.
        let receipt = reopened.anchor(request("rec-3", "P1")).unwrap();
        assert!(receipt.protection_id.ends_with("000003"));
    }

    #[test]
    fn corrupt_journal_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = DurableLedger::open(dir.path()).unwrap();
            ledger.anchor(request("rec-1", "P1")).unwrap();
        }

        let journal = dir.path().join(JOURNAL_FILE_NAME);
        let mut contents = fs::read_to_string(&journal).unwrap();
        contents.push_str("this is not json\n");
        fs::write(&journal, contents).unwrap();

        let reopened = DurableLedger::open(dir.path()).unwrap();
        assert_eq!(reopened.query_by_subject("P1").unwrap().len(), 1);
    }

    #[test]
    fn unknown_subject_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DurableLedger::open(dir.path()).unwrap();

        assert!(ledger.query_by_subject("nobody").unwrap().is_empty());
    }
}
