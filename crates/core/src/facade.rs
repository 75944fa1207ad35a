//! Patient service facade.
//!
//! The single entry point the API layer talks to. Owns the sequencing rule
//! for uploads: validate, store the blob, anchor on the ledger, and only
//! then create the registry record. A ledger failure therefore leaves no
//! record behind; the already-stored blob is harmless because it is
//! content-addressed and unreferenced.

use crate::audit::AuditLog;
use crate::config::CoreConfig;
use crate::consent::ConsentManager;
use crate::error::{CoreError, CoreResult};
use crate::identity::IdentityLookup;
use crate::model::{
    AccessGrant, AccessRequest, ActionFilter, ActivityEvent, MedicalRecord, RecordType,
    StatusFilter,
};
use crate::registry::{NewRecord, RecordRegistry, RecordUpdate};
use chrono::Utc;
use medledger_ledger::{AnchorPayload, AnchorRequest, AnchoredRecord, LedgerPort};
use medledger_storage::{BlobStore, ContentHandle};
use medledger_types::NonEmptyText;
use std::sync::Arc;

fn non_empty(value: &str, field: &str) -> CoreResult<NonEmptyText> {
    NonEmptyText::new(value)
        .map_err(|_| CoreError::Validation(format!("{} is required", field)))
}

/// Input for a record upload.
#[derive(Clone, Debug)]
pub struct UploadRecord {
    pub subject_id: String,
    /// Defaults to the subject for self-uploads.
    pub submitter_id: Option<String>,
    pub title: String,
    pub description: String,
    /// Absent means `other`; an unrecognised value is refused.
    pub record_type: Option<String>,
    pub content: Vec<u8>,
}

pub struct PatientService {
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn LedgerPort>,
    registry: RecordRegistry,
    consent: ConsentManager,
    audit: Arc<AuditLog>,
}

impl PatientService {
    /// Initialises the service against the configured data directory,
    /// wiring the injected blob store, ledger and identity directory.
    pub fn new(
        config: &CoreConfig,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn LedgerPort>,
        identity: Arc<dyn IdentityLookup>,
    ) -> CoreResult<Self> {
        let audit = Arc::new(AuditLog::open(&config.audit_dir())?);
        let registry = RecordRegistry::open(&config.records_dir(), Arc::clone(&audit))?;
        let consent = ConsentManager::open(
            &config.grants_dir(),
            &config.requests_dir(),
            Arc::clone(&audit),
            identity,
        )?;

        Ok(Self {
            blobs,
            ledger,
            registry,
            consent,
            audit,
        })
    }

    /// Uploads one record: blob first, ledger anchor second, registry third.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] for an empty subject, title, description
    ///   or content, or an unrecognised record type.
    /// - [`CoreError::StorageUnavailable`] if the blob cannot be stored; the
    ///   ledger is not contacted.
    /// - [`CoreError::LedgerUnavailable`] if anchoring fails; no record is
    ///   created.
    pub fn upload_record(&self, upload: UploadRecord) -> CoreResult<MedicalRecord> {
        non_empty(&upload.subject_id, "subject id")?;
        let title = non_empty(&upload.title, "title")?;
        let description = non_empty(&upload.description, "description")?;
        if upload.content.is_empty() {
            return Err(CoreError::Validation("record content is required".into()));
        }
        let record_type = match upload.record_type.as_deref() {
            None | Some("") => RecordType::default(),
            Some(value) => value.parse::<RecordType>()?,
        };
        let submitter_id = upload
            .submitter_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| upload.subject_id.clone());

        let handle = self.blobs.store(&upload.content)?;

        let record_id = RecordRegistry::allocate_record_id();
        let receipt = self.ledger.anchor(AnchorRequest {
            record_id: record_id.clone(),
            payload: AnchorPayload {
                content_handle: handle.as_str().to_string(),
                size_bytes: upload.content.len() as u64,
                stored_at: Utc::now(),
            },
            submitter_id: submitter_id.clone(),
            subject_id: upload.subject_id.clone(),
        })?;

        self.registry.create_record(NewRecord {
            record_id,
            title,
            description,
            record_type,
            storage_reference: handle.as_str().to_string(),
            anchor_id: receipt.protection_id,
            submitter_id,
            subject_id: upload.subject_id,
        })
    }

    /// Lists a subject's records, optionally narrowed by status.
    pub fn list_records(
        &self,
        subject_id: &str,
        status: Option<&str>,
    ) -> CoreResult<Vec<MedicalRecord>> {
        let filter = StatusFilter::parse(status)?;
        Ok(self.registry.list_records(subject_id, filter))
    }

    /// Retrieves the stored bytes behind a record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] for an unknown record, and
    /// [`CoreError::StorageUnavailable`] if the blob cannot be read back.
    pub fn record_content(&self, record_id: &str) -> CoreResult<Vec<u8>> {
        let record = self
            .registry
            .get_record(record_id)
            .ok_or_else(|| CoreError::RecordNotFound(record_id.to_string()))?;
        let handle = ContentHandle::parse(&record.storage_reference)?;
        Ok(self.blobs.retrieve(&handle)?)
    }

    pub fn update_record(
        &self,
        record_id: &str,
        update: RecordUpdate,
        acting_subject: Option<&str>,
    ) -> CoreResult<MedicalRecord> {
        self.registry.update_record(record_id, update, acting_subject)
    }

    pub fn toggle_archive(
        &self,
        record_id: &str,
        acting_subject: Option<&str>,
    ) -> CoreResult<MedicalRecord> {
        self.registry.toggle_archive(record_id, acting_subject)
    }

    pub fn delete_record(
        &self,
        record_id: &str,
        acting_subject: Option<&str>,
    ) -> CoreResult<MedicalRecord> {
        self.registry.delete_record(record_id, acting_subject)
    }

    pub fn grant_consent(
        &self,
        subject_id: &str,
        grantee_id: &str,
        grantee_role: &str,
        reason: &str,
    ) -> CoreResult<AccessGrant> {
        self.consent
            .grant_consent(subject_id, grantee_id, grantee_role, reason)
    }

    pub fn list_active_grants(&self, subject_id: &str) -> Vec<AccessGrant> {
        self.consent.list_active_grants(subject_id)
    }

    pub fn list_grant_history(&self, subject_id: &str) -> Vec<AccessGrant> {
        self.consent.list_grant_history(subject_id)
    }

    pub fn revoke_access(
        &self,
        grant_id: &str,
        acting_subject: Option<&str>,
    ) -> CoreResult<AccessGrant> {
        self.consent.revoke_access(grant_id, acting_subject)
    }

    pub fn receive_access_request(
        &self,
        subject_id: &str,
        requester_id: &str,
        requester_role: &str,
        reason: &str,
    ) -> CoreResult<AccessRequest> {
        self.consent
            .receive_request(subject_id, requester_id, requester_role, reason)
    }

    pub fn list_incoming_requests(&self, subject_id: &str) -> Vec<AccessRequest> {
        self.consent.list_incoming_requests(subject_id)
    }

    pub fn approve_request(&self, request_id: &str, subject_id: &str) -> CoreResult<AccessGrant> {
        self.consent.approve_request(request_id, subject_id)
    }

    pub fn reject_request(&self, request_id: &str, subject_id: &str) -> CoreResult<AccessRequest> {
        self.consent.reject_request(request_id, subject_id)
    }

    /// Returns a subject's audit trail, optionally narrowed to a
    /// comma-separated set of actions, newest first.
    pub fn list_audit(
        &self,
        subject_id: &str,
        actions: Option<&str>,
    ) -> CoreResult<Vec<ActivityEvent>> {
        let filter = ActionFilter::parse(actions)?;
        self.audit.query(subject_id, &filter)
    }

    /// Returns the ledger's own view of a subject's anchors, for
    /// cross-checking provenance independently of the registry.
    pub fn list_anchors(&self, subject_id: &str) -> CoreResult<Vec<AnchoredRecord>> {
        Ok(self.ledger.query_by_subject(subject_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerBackend;
    use crate::identity::NullDirectory;
    use crate::model::{AuditAction, GrantStatus, RecordStatus};
    use medledger_ledger::{AnchorReceipt, DurableLedger, LedgerError, LedgerResult};
    use medledger_storage::FsBlobStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        service: PatientService,
    }

    fn fixture_with_ledger(ledger: Arc<dyn LedgerPort>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path(), LedgerBackend::Durable).unwrap();
        let blobs = Arc::new(FsBlobStore::open(&config.blob_dir()).unwrap());
        let service =
            PatientService::new(&config, blobs, ledger, Arc::new(NullDirectory)).unwrap();
        Fixture {
            _dir: dir,
            service,
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path(), LedgerBackend::Durable).unwrap();
        let blobs = Arc::new(FsBlobStore::open(&config.blob_dir()).unwrap());
        let ledger = Arc::new(DurableLedger::open(&config.ledger_dir()).unwrap());
        let service =
            PatientService::new(&config, blobs, ledger, Arc::new(NullDirectory)).unwrap();
        Fixture {
            _dir: dir,
            service,
        }
    }

    fn upload(subject: &str, title: &str) -> UploadRecord {
        UploadRecord {
            subject_id: subject.to_string(),
            submitter_id: None,
            title: title.to_string(),
            description: "routine bloodwork".to_string(),
            record_type: Some("lab_report".to_string()),
            content: b"haemoglobin 14.1 g/dL".to_vec(),
        }
    }

    /// Ledger that refuses every anchor, standing in for an unreachable
    /// backend.
    struct DownLedger;

    impl LedgerPort for DownLedger {
        fn anchor(&self, _request: AnchorRequest) -> LedgerResult<AnchorReceipt> {
            Err(LedgerError::Unavailable("connection refused".into()))
        }

        fn query_by_subject(&self, _subject_id: &str) -> LedgerResult<Vec<AnchoredRecord>> {
            Err(LedgerError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn upload_sets_both_provenance_references() {
        let fx = fixture();

        let record = fx.service.upload_record(upload("P1", "CBC Panel")).unwrap();

        let expected = ContentHandle::from_bytes(b"haemoglobin 14.1 g/dL");
        assert_eq!(record.storage_reference, expected.as_str());
        assert!(record.anchor_id.starts_with("prot-"));
        assert_eq!(record.status, RecordStatus::Active);
        assert_eq!(record.submitter_id, "P1");
    }

    #[test]
    fn uploaded_content_reads_back_by_record_id() {
        let fx = fixture();
        let record = fx.service.upload_record(upload("P1", "CBC Panel")).unwrap();

        let content = fx.service.record_content(&record.record_id).unwrap();

        assert_eq!(content, b"haemoglobin 14.1 g/dL");
    }

    #[test]
    fn upload_refuses_empty_title_and_content() {
        let fx = fixture();

        let mut no_title = upload("P1", "CBC Panel");
        no_title.title = "   ".into();
        assert!(matches!(
            fx.service.upload_record(no_title),
            Err(CoreError::Validation(_))
        ));

        let mut no_content = upload("P1", "CBC Panel");
        no_content.content.clear();
        assert!(matches!(
            fx.service.upload_record(no_content),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn upload_refuses_unknown_record_type() {
        let fx = fixture();
        let mut bad = upload("P1", "CBC Panel");
        bad.record_type = Some("x_ray".into());

        assert!(matches!(
            fx.service.upload_record(bad),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn absent_record_type_defaults_to_other() {
        let fx = fixture();
        let mut untyped = upload("P1", "Discharge letter");
        untyped.record_type = None;

        let record = fx.service.upload_record(untyped).unwrap();

        assert_eq!(record.record_type, RecordType::Other);
    }

    #[test]
    fn ledger_failure_leaves_no_record_behind() {
        let fx = fixture_with_ledger(Arc::new(DownLedger));

        let result = fx.service.upload_record(upload("P1", "CBC Panel"));

        assert!(matches!(result, Err(CoreError::LedgerUnavailable(_))));
        assert!(fx.service.list_records("P1", None).unwrap().is_empty());
        // The failed upload must not surface in the audit trail either.
        assert!(fx.service.list_audit("P1", None).unwrap().is_empty());
    }

    #[test]
    fn distinct_submitter_is_recorded() {
        let fx = fixture();
        let mut by_clinic = upload("P1", "Referral");
        by_clinic.submitter_id = Some("Dr-Q".into());

        let record = fx.service.upload_record(by_clinic).unwrap();

        assert_eq!(record.submitter_id, "Dr-Q");
        assert_eq!(record.subject_id, "P1");
    }

    #[test]
    fn anchors_track_uploads_per_subject() {
        let fx = fixture();
        fx.service.upload_record(upload("P1", "CBC Panel")).unwrap();
        let mut second = upload("P2", "Imaging");
        second.content = b"different bytes".to_vec();
        fx.service.upload_record(second).unwrap();

        let anchors = fx.service.list_anchors("P1").unwrap();

        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].subject_id, "P1");
    }

    #[test]
    fn full_consent_lifecycle_is_audited_in_order() {
        let fx = fixture();
        let request = fx
            .service
            .receive_access_request("P1", "Dr-Q", "diagnostic", "referral")
            .unwrap();
        let grant = fx.service.approve_request(&request.request_id, "P1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        fx.service.revoke_access(&grant.grant_id, None).unwrap();

        let events = fx.service.list_audit("P1", None).unwrap();
        let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();

        assert_eq!(
            actions,
            vec![AuditAction::RevokeAccess, AuditAction::ApproveRequest]
        );
        assert!(fx.service.list_active_grants("P1").is_empty());
        assert_eq!(
            fx.service.list_grant_history("P1")[0].status,
            GrantStatus::Revoked
        );
    }

    #[test]
    fn status_filter_flows_through_to_listings() {
        let fx = fixture();
        let record = fx.service.upload_record(upload("P1", "CBC Panel")).unwrap();
        fx.service.toggle_archive(&record.record_id, None).unwrap();

        assert!(fx.service.list_records("P1", Some("active")).unwrap().is_empty());
        assert_eq!(
            fx.service.list_records("P1", Some("archived")).unwrap().len(),
            1
        );
        assert!(matches!(
            fx.service.list_records("P1", Some("bogus")),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn audit_action_filter_flows_through() {
        let fx = fixture();
        let record = fx.service.upload_record(upload("P1", "CBC Panel")).unwrap();
        fx.service.delete_record(&record.record_id, None).unwrap();

        let deletes = fx.service.list_audit("P1", Some("delete")).unwrap();

        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].action, AuditAction::Delete);
    }

    #[test]
    fn cross_subject_mutation_is_refused() {
        let fx = fixture();
        let record = fx.service.upload_record(upload("P1", "CBC Panel")).unwrap();
        let grant = fx
            .service
            .grant_consent("P1", "Dr-Q", "diagnostic", "review")
            .unwrap();

        assert!(matches!(
            fx.service.delete_record(&record.record_id, Some("P2")),
            Err(CoreError::RecordNotFound(_))
        ));
        assert!(matches!(
            fx.service.toggle_archive(&record.record_id, Some("P2")),
            Err(CoreError::RecordNotFound(_))
        ));
        assert!(matches!(
            fx.service.revoke_access(&grant.grant_id, Some("P2")),
            Err(CoreError::GrantNotFound(_))
        ));

        assert_eq!(fx.service.list_records("P1", None).unwrap().len(), 1);
        assert_eq!(fx.service.list_active_grants("P1").len(), 1);
        assert!(fx.service.list_audit("P2", None).unwrap().is_empty());
    }

    #[test]
    fn record_content_unknown_record_is_not_found() {
        let fx = fixture();
        let result = fx.service.record_content("deadbeef");
        assert!(matches!(result, Err(CoreError::RecordNotFound(_))));
    }
}
