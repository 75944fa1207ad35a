//! Write-through JSON document store.
//!
//! Each entity is persisted as one pretty-printed JSON file under a
//! two-level sharded directory derived from its identifier:
//! `<dir>/<s1>/<s2>/<id>.json`. The full set is loaded into memory at
//! startup; mutations go to disk first and the in-memory map second, under a
//! single writer lock per store, so a mutation observed in memory is always
//! durable and mutations of the same entity are serialized.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A persistable entity addressed by a stable string identifier.
pub(crate) trait Document: Clone + Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> &str;
}

impl Document for crate::model::MedicalRecord {
    fn id(&self) -> &str {
        &self.record_id
    }
}

impl Document for crate::model::AccessGrant {
    fn id(&self) -> &str {
        &self.grant_id
    }
}

impl Document for crate::model::AccessRequest {
    fn id(&self) -> &str {
        &self.request_id
    }
}

pub(crate) struct DocumentStore<T> {
    dir: PathBuf,
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Document> DocumentStore<T> {
    /// Opens the store at `dir`, creating it if needed and loading every
    /// persisted document. Files that fail to parse are logged and skipped.
    pub fn open(dir: &Path) -> CoreResult<Self> {
        fs::create_dir_all(dir).map_err(CoreError::StoreWrite)?;

        let mut entries = HashMap::new();

        let s1_iter = fs::read_dir(dir).map_err(CoreError::StoreRead)?;
        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }

            let s2_iter = match fs::read_dir(&s1_path) {
                Ok(it) => it,
                Err(_) => continue,
            };

            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }

                let file_iter = match fs::read_dir(&s2_path) {
                    Ok(it) => it,
                    Err(_) => continue,
                };

                for file in file_iter.flatten() {
                    let file_path = file.path();
                    if file_path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }

                    let contents = match fs::read_to_string(&file_path) {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!(
                                "failed to read stored document {}: {}",
                                file_path.display(),
                                e
                            );
                            continue;
                        }
                    };

                    match serde_json::from_str::<T>(&contents) {
                        Ok(doc) => {
                            entries.insert(doc.id().to_string(), doc);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "skipping unreadable document {}: {}",
                                file_path.display(),
                                e
                            );
                        }
                    }
                }
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        // Entity ids are 32 lowercase hex characters; shard on the first four.
        let s1 = id.get(0..2).unwrap_or("00");
        let s2 = id.get(2..4).unwrap_or("00");
        self.dir.join(s1).join(s2).join(format!("{}.json", id))
    }

    fn persist(&self, doc: &T) -> CoreResult<()> {
        let path = self.path_for(doc.id());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CoreError::StoreWrite)?;
        }
        let json = serde_json::to_vec_pretty(doc).map_err(CoreError::Serialization)?;
        fs::write(&path, json).map_err(CoreError::StoreWrite)
    }

    /// Persists and indexes a new document.
    pub fn insert(&self, doc: T) -> CoreResult<()> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        self.persist(&doc)?;
        entries.insert(doc.id().to_string(), doc);
        Ok(())
    }

    /// Returns a copy of the document with the given id, if present.
    pub fn get(&self, id: &str) -> Option<T> {
        let entries = self.entries.read().expect("store lock poisoned");
        entries.get(id).cloned()
    }

    /// Applies `mutate` to the document under the writer lock, persisting the
    /// result before it becomes visible. Returns `Ok(None)` for an unknown
    /// id. If `mutate` fails, the document is left untouched — this is the
    /// seam state-machine preconditions hang off: with mutations serialized
    /// per store, a status check inside `mutate` picks exactly one winner
    /// among racing transitions.
    pub fn update<F>(&self, id: &str, mutate: F) -> CoreResult<Option<T>>
    where
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        let mut entries = self.entries.write().expect("store lock poisoned");
        let Some(current) = entries.get(id) else {
            return Ok(None);
        };

        let mut draft = current.clone();
        mutate(&mut draft)?;
        self.persist(&draft)?;
        entries.insert(id.to_string(), draft.clone());
        Ok(Some(draft))
    }

    /// Removes a document from disk and the index. Returns `Ok(None)` for an
    /// unknown id.
    pub fn remove(&self, id: &str) -> CoreResult<Option<T>> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        if !entries.contains_key(id) {
            return Ok(None);
        }

        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::StoreWrite(e)),
        }

        Ok(entries.remove(id))
    }

    /// Returns a copy of every stored document, in no particular order.
    pub fn values(&self) -> Vec<T> {
        let entries = self.entries.read().expect("store lock poisoned");
        entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MedicalRecord, RecordStatus, RecordType};
    use chrono::Utc;

    fn record(id: &str, subject: &str) -> MedicalRecord {
        MedicalRecord {
            record_id: id.to_string(),
            title: "CBC Panel".into(),
            description: "routine bloodwork".into(),
            record_type: RecordType::LabReport,
            status: RecordStatus::Active,
            storage_reference: "aa".repeat(32),
            anchor_id: "prot-1".into(),
            submitter_id: subject.to_string(),
            subject_id: subject.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();

        let id = crate::model::new_entity_id();
        store.insert(record(&id, "P1")).unwrap();

        let loaded = store.get(&id).unwrap();
        assert_eq!(loaded.title, "CBC Panel");
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = crate::model::new_entity_id();
        {
            let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
            store.insert(record(&id, "P1")).unwrap();
        }

        let reopened: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
        assert!(reopened.get(&id).is_some());
    }

    #[test]
    fn update_persists_the_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let id = crate::model::new_entity_id();
        {
            let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
            store.insert(record(&id, "P1")).unwrap();
            store
                .update(&id, |rec| {
                    rec.status = RecordStatus::Archived;
                    Ok(())
                })
                .unwrap()
                .unwrap();
        }

        let reopened: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&id).unwrap().status, RecordStatus::Archived);
    }

    #[test]
    fn failed_mutation_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
        let id = crate::model::new_entity_id();
        store.insert(record(&id, "P1")).unwrap();

        let result = store.update(&id, |rec| {
            rec.status = RecordStatus::Archived;
            Err(CoreError::InvalidState("refused".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get(&id).unwrap().status, RecordStatus::Active);
    }

    #[test]
    fn update_unknown_id_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();

        let result = store.update("deadbeef", |_| Ok(())).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn remove_deletes_from_disk_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let id = crate::model::new_entity_id();
        {
            let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
            store.insert(record(&id, "P1")).unwrap();
            assert!(store.remove(&id).unwrap().is_some());
            assert!(store.get(&id).is_none());
            assert!(store.remove(&id).unwrap().is_none());
        }

        let reopened: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
        assert!(reopened.get(&id).is_none());
    }

    #[test]
    fn corrupt_files_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let id = crate::model::new_entity_id();
        {
            let store: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
            store.insert(record(&id, "P1")).unwrap();
        }

        fs::create_dir_all(dir.path().join("zz").join("zz")).unwrap();
        fs::write(dir.path().join("zz").join("zz").join("bad.json"), "{").unwrap();

        let reopened: DocumentStore<MedicalRecord> = DocumentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.values().len(), 1);
    }
}
