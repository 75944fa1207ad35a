//! Content-addressed blob store implementation.

use crate::{StorageError, StorageResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory under the store root that namespaces the hash algorithm.
const HASH_DIR_NAME: &str = "sha256";

/// A validated content-addressed handle for a stored blob.
///
/// Always a 64-character lowercase hex SHA-256 digest. The handle is the only
/// coupling between a [`MedicalRecord`] and its bytes, so it is validated on
/// every external construction path.
///
/// [`MedicalRecord`]: https://docs.rs/medledger-core
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentHandle(String);

impl ContentHandle {
    /// Computes the handle for a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Validates and wraps an externally supplied handle string.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidHandle`] unless the input is exactly
    /// 64 lowercase hex characters.
    pub fn parse(input: &str) -> StorageResult<Self> {
        let valid = input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(StorageError::InvalidHandle(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    /// Returns the handle as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHandle {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHandle::parse(s)
    }
}

impl serde::Serialize for ContentHandle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ContentHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentHandle::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Contract between the core and an external content-addressed blob store.
///
/// Implementations must be pure pass-throughs: no content inspection, no
/// format validation, no access control. Remote implementations should
/// enforce their configured deadline and surface [`StorageError::Timeout`]
/// rather than blocking indefinitely.
pub trait BlobStore: Send + Sync {
    /// Stores a blob and returns its content handle.
    fn store(&self, blob: &[u8]) -> StorageResult<ContentHandle>;

    /// Retrieves a previously stored blob by handle.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no blob exists for the handle.
    fn retrieve(&self, handle: &ContentHandle) -> StorageResult<Vec<u8>>;
}

/// Filesystem-backed content-addressed blob store.
///
/// Blobs live under `<root>/sha256/<ab>/<cd>/<digest>`. Storing bytes whose
/// digest is already present is a no-op that returns the existing handle.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (creating if necessary) a blob store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the root directory cannot be
    /// created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root.join(HASH_DIR_NAME)).map_err(|e| {
            StorageError::Unavailable(format!(
                "cannot create blob store root {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn blob_path(&self, handle: &ContentHandle) -> PathBuf {
        let digest = handle.as_str();
        self.root
            .join(HASH_DIR_NAME)
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(digest)
    }
}

impl BlobStore for FsBlobStore {
    fn store(&self, blob: &[u8]) -> StorageResult<ContentHandle> {
        let handle = ContentHandle::from_bytes(blob);
        let path = self.blob_path(&handle);

        // Content-addressed: an existing file already holds these bytes.
        if path.exists() {
            return Ok(handle);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, blob)?;

        Ok(handle)
    }

    fn retrieve(&self, handle: &ContentHandle) -> StorageResult<Vec<u8>> {
        let path = self.blob_path(handle);
        if !path.exists() {
            return Err(StorageError::NotFound(handle.to_string()));
        }
        Ok(fs::read(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_retrieve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        let handle = store.store(b"routine bloodwork results").unwrap();
        let bytes = store.retrieve(&handle).unwrap();

        assert_eq!(bytes, b"routine bloodwork results");
    }

    #[test]
    fn identical_content_yields_identical_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        let first = store.store(b"same bytes").unwrap();
        let second = store.store(b"same bytes").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn different_content_yields_different_handles() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        let first = store.store(b"scan one").unwrap();
        let second = store.store(b"scan two").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn retrieve_unknown_handle_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        let handle = ContentHandle::from_bytes(b"never stored");
        let result = store.retrieve(&handle);

        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn handle_matches_known_sha256() {
        // SHA-256 of the empty string.
        let handle = ContentHandle::from_bytes(b"");
        assert_eq!(
            handle.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parse_rejects_malformed_handles() {
        assert!(ContentHandle::parse("").is_err());
        assert!(ContentHandle::parse("abc").is_err());
        assert!(ContentHandle::parse(&"A".repeat(64)).is_err());
        assert!(ContentHandle::parse(&"z".repeat(64)).is_err());
        assert!(ContentHandle::parse(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn handle_serde_round_trip() {
        let handle = ContentHandle::from_bytes(b"payload");
        let json = serde_json::to_string(&handle).unwrap();
        let back: ContentHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(handle, back);
    }

    #[test]
    fn blobs_are_sharded_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        let handle = store.store(b"sharded").unwrap();
        let digest = handle.as_str();
        let expected = dir
            .path()
            .join("sha256")
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(digest);

        assert!(expected.is_file());
    }
}
