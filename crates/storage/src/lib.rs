//! # MedLedger Blob Storage
//!
//! Storage Reference Resolver for MedLedger: maps a medical record's raw
//! bytes to a content-addressed handle and back.
//!
//! ## Design Principles
//!
//! - Blobs are opaque: the resolver never inspects, validates, or transforms
//!   content. Access control is enforced above this layer, never here.
//! - Handles are content-derived (SHA-256), so storing the same bytes twice
//!   yields the same handle and the store is naturally deduplicating.
//! - Blobs are immutable once written; deletion is not part of the contract.
//!   A handle that is no longer referenced is safe to leave orphaned.
//!
//! ## Storage Layout
//!
//! The filesystem backend shards blobs by the leading hash characters:
//!
//! ```text
//! <root>/
//! └── sha256/
//!     └── ab/
//!         └── cd/
//!             └── abcd9e…   # full 64-hex digest as filename
//! ```

mod blob;

pub use blob::{BlobStore, ContentHandle, FsBlobStore};

use std::time::Duration;

/// Errors that can occur during blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The storage backend could not be reached or written to.
    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    /// No blob exists for the requested content handle.
    #[error("no blob stored for handle {0}")]
    NotFound(String),

    /// The supplied content handle is not a valid SHA-256 hex digest.
    #[error("invalid content handle: {0}")]
    InvalidHandle(String),

    /// A remote backend did not answer within the caller-supplied deadline.
    #[error("blob store operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error from the filesystem backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
