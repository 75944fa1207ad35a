//! Identity directory contract.
//!
//! The consent manager needs one thing from the outside identity world: a
//! display name for a grantee or requester, looked up by provider id or by
//! an email-like alias. [`IdentityLookup`] is that seam. A lookup miss is
//! never an error; callers fall back to the raw identifier.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// The slice of an identity the consent manager cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityProfile {
    pub display_name: String,
}

pub trait IdentityLookup: Send + Sync {
    /// Resolves a provider by id or alias. `None` means unknown, not failure.
    fn find_by_id_or_alias(&self, id_or_alias: &str) -> Option<IdentityProfile>;
}

/// Directory that knows nobody. The default when no directory file is
/// configured.
pub struct NullDirectory;

impl IdentityLookup for NullDirectory {
    fn find_by_id_or_alias(&self, _id_or_alias: &str) -> Option<IdentityProfile> {
        None
    }
}

#[derive(Deserialize)]
struct DirectoryEntry {
    id: String,
    #[serde(default)]
    aliases: Vec<String>,
    display_name: String,
}

/// In-memory directory loaded once at startup from a JSON file.
#[derive(Debug)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
}

impl StaticDirectory {
    /// Builds a directory from `(id_or_alias, display_name)` pairs.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            names: entries.into_iter().collect(),
        }
    }

    /// Loads a directory file: a JSON array of objects with `id`, optional
    /// `aliases`, and `display_name`.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut names = HashMap::new();
        for entry in entries {
            for alias in &entry.aliases {
                names.insert(alias.clone(), entry.display_name.clone());
            }
            names.insert(entry.id, entry.display_name);
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl IdentityLookup for StaticDirectory {
    fn find_by_id_or_alias(&self, id_or_alias: &str) -> Option<IdentityProfile> {
        self.names.get(id_or_alias).map(|name| IdentityProfile {
            display_name: name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_directory_knows_nobody() {
        assert!(NullDirectory.find_by_id_or_alias("Dr-Q").is_none());
    }

    #[test]
    fn static_directory_resolves_ids_and_aliases() {
        let dir = StaticDirectory::from_entries([
            ("Dr-Q".to_string(), "Dr Quinn Harper".to_string()),
            ("q@clinic.example".to_string(), "Dr Quinn Harper".to_string()),
        ]);

        assert_eq!(
            dir.find_by_id_or_alias("Dr-Q").unwrap().display_name,
            "Dr Quinn Harper"
        );
        assert_eq!(
            dir.find_by_id_or_alias("q@clinic.example").unwrap().display_name,
            "Dr Quinn Harper"
        );
        assert!(dir.find_by_id_or_alias("someone-else").is_none());
    }

    #[test]
    fn directory_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "Dr-Q", "aliases": ["q@clinic.example"], "display_name": "Dr Quinn Harper"},
                {"id": "Dr-R", "display_name": "Dr Rivka Stein"}
            ]"#,
        )
        .unwrap();

        let loaded = StaticDirectory::from_file(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            loaded.find_by_id_or_alias("Dr-R").unwrap().display_name,
            "Dr Rivka Stein"
        );
    }

    #[test]
    fn malformed_directory_file_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StaticDirectory::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
