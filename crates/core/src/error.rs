use medledger_ledger::LedgerError;
use medledger_storage::StorageError;

/// Error taxonomy for the consent-and-provenance core.
///
/// The first five variants map one-to-one onto caller-facing failures and
/// are never retried by the core. `StorageUnavailable` and
/// `LedgerUnavailable` mark an external dependency as down; retrying with
/// backoff is the caller's decision, the core performs none itself. Display
/// strings stay short and free of internal identifiers — the full cause
/// chain is reserved for server-side logs via `source()`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("access grant not found: {0}")]
    GrantNotFound(String),
    #[error("access request not found: {0}")]
    RequestNotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("blob storage unavailable")]
    StorageUnavailable(#[from] StorageError),
    #[error("ledger unavailable")]
    LedgerUnavailable(#[from] LedgerError),
    #[error("failed to read entity store")]
    StoreRead(#[source] std::io::Error),
    #[error("failed to write entity store")]
    StoreWrite(#[source] std::io::Error),
    #[error("failed to serialize entity")]
    Serialization(#[source] serde_json::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
