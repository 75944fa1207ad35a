//! Record registry.
//!
//! Exclusive owner of [`MedicalRecord`] entities. A record is only ever
//! created with both provenance references in hand (content handle and
//! ledger anchor) — the facade obtains those first, so no record can exist
//! with one but not the other. Every mutating operation writes exactly one
//! audit event before returning success, attributed to the acting subject or
//! to the record's own subject when no actor is supplied.

use crate::audit::AuditLog;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    new_entity_id, ActivityEvent, AuditAction, MedicalRecord, RecordStatus, RecordType,
    StatusFilter,
};
use crate::store::DocumentStore;
use chrono::Utc;
use medledger_types::NonEmptyText;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

const RESOURCE_RECORD: &str = "record";

/// Validated input for record creation.
#[derive(Clone, Debug)]
pub struct NewRecord {
    pub record_id: String,
    pub title: NonEmptyText,
    pub description: NonEmptyText,
    pub record_type: RecordType,
    pub storage_reference: String,
    pub anchor_id: String,
    pub submitter_id: String,
    pub subject_id: String,
}

/// Partial update: only supplied fields change.
#[derive(Clone, Debug, Default)]
pub struct RecordUpdate {
    pub title: Option<NonEmptyText>,
    pub description: Option<NonEmptyText>,
}

pub struct RecordRegistry {
    store: DocumentStore<MedicalRecord>,
    audit: Arc<AuditLog>,
}

impl RecordRegistry {
    /// Opens the registry's document store under `dir`.
    pub fn open(dir: &Path, audit: Arc<AuditLog>) -> CoreResult<Self> {
        Ok(Self {
            store: DocumentStore::open(dir)?,
            audit,
        })
    }

    /// Allocates a record identifier.
    ///
    /// The registry owns id generation; the facade calls this before
    /// anchoring so the ledger can commit the same id the registry will
    /// persist under.
    pub fn allocate_record_id() -> String {
        new_entity_id()
    }

    /// Persists a new record and audits the upload.
    pub fn create_record(&self, new: NewRecord) -> CoreResult<MedicalRecord> {
        let now = Utc::now();
        let record = MedicalRecord {
            record_id: new.record_id,
            title: new.title.into_string(),
            description: new.description.into_string(),
            record_type: new.record_type,
            status: RecordStatus::Active,
            storage_reference: new.storage_reference,
            anchor_id: new.anchor_id,
            submitter_id: new.submitter_id,
            subject_id: new.subject_id,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(record.clone())?;

        self.audit.record(ActivityEvent::new(
            &record.subject_id,
            AuditAction::Upload,
            RESOURCE_RECORD,
            &record.record_id,
            json!({
                "title": record.title,
                "recordType": record.record_type,
                "storageReference": record.storage_reference,
                "anchorId": record.anchor_id,
            }),
        ));

        Ok(record)
    }

    /// Returns a record by id, if present.
    pub fn get_record(&self, record_id: &str) -> Option<MedicalRecord> {
        self.store.get(record_id)
    }

    /// Lists a subject's records, newest created first, narrowed by `filter`.
    pub fn list_records(&self, subject_id: &str, filter: StatusFilter) -> Vec<MedicalRecord> {
        let mut records: Vec<MedicalRecord> = self
            .store
            .values()
            .into_iter()
            .filter(|r| r.subject_id == subject_id && filter.matches(r.status))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Applies a partial metadata update.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] for an unknown id, or when the
    /// acting subject is not the record's owner — a foreign record id is
    /// indistinguishable from an unknown one.
    pub fn update_record(
        &self,
        record_id: &str,
        update: RecordUpdate,
        acting_subject: Option<&str>,
    ) -> CoreResult<MedicalRecord> {
        let updated = self
            .store
            .update(record_id, |rec| {
                if acting_subject.is_some_and(|actor| actor != rec.subject_id) {
                    return Err(CoreError::RecordNotFound(record_id.to_string()));
                }
                if let Some(title) = &update.title {
                    rec.title = title.as_str().to_string();
                }
                if let Some(description) = &update.description {
                    rec.description = description.as_str().to_string();
                }
                rec.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| CoreError::RecordNotFound(record_id.to_string()))?;

        let actor = acting_subject.unwrap_or(&updated.subject_id);
        self.audit.record(ActivityEvent::new(
            actor,
            AuditAction::Edit,
            RESOURCE_RECORD,
            record_id,
            json!({
                "title": update.title.as_ref().map(|t| t.as_str()),
                "description": update.description.as_ref().map(|d| d.as_str()),
            }),
        ));

        Ok(updated)
    }

    /// Flips a record between active and archived.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] for an unknown id or a record
    /// owned by a different subject.
    pub fn toggle_archive(
        &self,
        record_id: &str,
        acting_subject: Option<&str>,
    ) -> CoreResult<MedicalRecord> {
        let updated = self
            .store
            .update(record_id, |rec| {
                if acting_subject.is_some_and(|actor| actor != rec.subject_id) {
                    return Err(CoreError::RecordNotFound(record_id.to_string()));
                }
                rec.status = rec.status.toggled();
                rec.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| CoreError::RecordNotFound(record_id.to_string()))?;

        let action = match updated.status {
            RecordStatus::Archived => AuditAction::Archive,
            RecordStatus::Active => AuditAction::Unarchive,
        };
        let actor = acting_subject.unwrap_or(&updated.subject_id);
        self.audit.record(ActivityEvent::new(
            actor,
            action,
            RESOURCE_RECORD,
            record_id,
            json!({ "title": updated.title }),
        ));

        Ok(updated)
    }

    /// Hard-deletes a record from the registry. The blob and the ledger
    /// anchor are deliberately untouched; they remain as historical proof.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] for an unknown id or a record
    /// owned by a different subject.
    pub fn delete_record(
        &self,
        record_id: &str,
        acting_subject: Option<&str>,
    ) -> CoreResult<MedicalRecord> {
        let existing = self
            .store
            .get(record_id)
            .ok_or_else(|| CoreError::RecordNotFound(record_id.to_string()))?;
        if acting_subject.is_some_and(|actor| actor != existing.subject_id) {
            return Err(CoreError::RecordNotFound(record_id.to_string()));
        }

        let removed = self
            .store
            .remove(record_id)?
            .ok_or_else(|| CoreError::RecordNotFound(record_id.to_string()))?;

        let actor = acting_subject.unwrap_or(&removed.subject_id);
        self.audit.record(ActivityEvent::new(
            actor,
            AuditAction::Delete,
            RESOURCE_RECORD,
            record_id,
            json!({ "title": removed.title }),
        ));

        Ok(removed)
    }
}
