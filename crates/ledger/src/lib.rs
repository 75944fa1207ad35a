//! # MedLedger Ledger Port
//!
//! Abstract transactional interface to an append-only store of
//! protected-record anchors.
//!
//! An *anchor* is the tamper-evident handle a ledger returns when a record's
//! fingerprint is committed to it: proof that a given record, addressed by a
//! given content handle, existed for a given subject at a point in time.
//!
//! Two interchangeable backends satisfy [`LedgerPort`]:
//!
//! - [`DurableLedger`] — a local append-only journal with deterministic
//!   protection identifiers and read-after-write consistency within the
//!   process.
//! - [`FabricLedger`] — an adapter over an external permissioned ledger,
//!   reached through the narrow [`FabricGateway`] transport contract.
//!
//! The backend is selected once at process start. Callers hold an
//! `Arc<dyn LedgerPort>` and never learn which backend is active. The
//! operation set is closed and typed: there is no string-dispatched
//! transaction surface on the Rust side.

mod durable;
mod fabric;

pub use durable::DurableLedger;
pub use fabric::{ChaincodeRef, FabricGateway, FabricLedger, QUERY_SUBJECT_RECORDS, STORE_PROTECTED_TX};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Errors surfaced by ledger backends.
///
/// None of these are retried by the port itself; retry policy belongs to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger backend could not be reached or written to.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the caller-supplied deadline.
    #[error("ledger operation timed out after {0:?}")]
    Timeout(Duration),

    /// The external ledger does not know the requested transaction.
    #[error("unsupported ledger operation: {0}")]
    UnsupportedOperation(String),

    /// The backend answered with a payload the port could not decode.
    #[error("failed to decode ledger payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error from the durable journal.
    #[error("ledger journal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Structured payload anchored alongside a record's identifiers.
///
/// This is what the ledger commits for a record: the content handle of the
/// stored blob plus minimal storage metadata. The blob bytes themselves never
/// reach the ledger.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorPayload {
    /// Content-addressed handle of the stored blob.
    pub content_handle: String,
    /// Size of the stored blob in bytes.
    pub size_bytes: u64,
    /// When the blob was stored.
    pub stored_at: DateTime<Utc>,
}

/// A request to anchor one record on the ledger.
#[derive(Clone, Debug)]
pub struct AnchorRequest {
    /// Registry-allocated record identifier.
    pub record_id: String,
    /// Fingerprint payload to commit.
    pub payload: AnchorPayload,
    /// Who submitted the record (may equal the subject for self-uploads).
    pub submitter_id: String,
    /// The patient the record belongs to.
    pub subject_id: String,
}

/// The ledger's answer to a successful anchor submission.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    /// Echo of the anchored record identifier.
    pub record_id: String,
    /// Tamper-evident anchor identifier assigned by the ledger.
    pub protection_id: String,
    /// Ledger-assigned commit timestamp.
    pub timestamp: DateTime<Utc>,
}

/// One previously anchored record, as read back from the ledger.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredRecord {
    pub record_id: String,
    pub payload: AnchorPayload,
    pub submitter_id: String,
    pub subject_id: String,
    pub protection_id: String,
    pub anchored_at: DateTime<Utc>,
}

/// Transactional contract to an append-only anchor store.
pub trait LedgerPort: Send + Sync {
    /// Commits a record fingerprint and returns its anchor receipt.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] (or [`LedgerError::Timeout`] for
    /// remote backends) when the backend cannot be reached. Callers must not
    /// create any registry record for a submission that failed here.
    fn anchor(&self, request: AnchorRequest) -> LedgerResult<AnchorReceipt>;

    /// Returns every anchor committed for a subject, newest first.
    fn query_by_subject(&self, subject_id: &str) -> LedgerResult<Vec<AnchoredRecord>>;
}
