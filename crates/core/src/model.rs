//! Domain entities for the consent-and-provenance core.
//!
//! Three entity families, each exclusively owned by one service:
//! [`MedicalRecord`] by the record registry, [`AccessGrant`] and
//! [`AccessRequest`] by the consent manager, and [`ActivityEvent`] by the
//! audit log. Status vocabularies are closed enums; unknown values cannot be
//! represented, only rejected at the boundary.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role recorded on audit events for subject-initiated actions.
pub const SUBJECT_ROLE_PATIENT: &str = "patient";

/// Allocates a fresh entity identifier: 32 lowercase hex characters.
pub(crate) fn new_entity_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Category of a medical record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    LabReport,
    Prescription,
    Imaging,
    ClinicalNote,
    #[default]
    Other,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::LabReport => "lab_report",
            RecordType::Prescription => "prescription",
            RecordType::Imaging => "imaging",
            RecordType::ClinicalNote => "clinical_note",
            RecordType::Other => "other",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lab_report" => Ok(RecordType::LabReport),
            "prescription" => Ok(RecordType::Prescription),
            "imaging" => Ok(RecordType::Imaging),
            "clinical_note" => Ok(RecordType::ClinicalNote),
            "other" => Ok(RecordType::Other),
            _ => Err(CoreError::Validation(format!(
                "unknown record type: '{}'",
                s
            ))),
        }
    }
}

/// Archive status of a medical record. Toggled, never skipped; no terminal
/// state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Archived,
}

impl RecordStatus {
    /// Returns the other status.
    pub fn toggled(self) -> Self {
        match self {
            RecordStatus::Active => RecordStatus::Archived,
            RecordStatus::Archived => RecordStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an access grant. Transitions active→revoked only; a revoked
/// grant is never reactivated and never deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Revoked,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Active => "active",
            GrantStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an inbound access request. `Approved` and `Rejected` are
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed vocabulary of auditable actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Upload,
    Edit,
    Archive,
    Unarchive,
    Delete,
    GrantAccess,
    RevokeAccess,
    ApproveRequest,
    RejectRequest,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Upload => "upload",
            AuditAction::Edit => "edit",
            AuditAction::Archive => "archive",
            AuditAction::Unarchive => "unarchive",
            AuditAction::Delete => "delete",
            AuditAction::GrantAccess => "grant_access",
            AuditAction::RevokeAccess => "revoke_access",
            AuditAction::ApproveRequest => "approve_request",
            AuditAction::RejectRequest => "reject_request",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(AuditAction::Upload),
            "edit" => Ok(AuditAction::Edit),
            "archive" => Ok(AuditAction::Archive),
            "unarchive" => Ok(AuditAction::Unarchive),
            "delete" => Ok(AuditAction::Delete),
            "grant_access" => Ok(AuditAction::GrantAccess),
            "revoke_access" => Ok(AuditAction::RevokeAccess),
            "approve_request" => Ok(AuditAction::ApproveRequest),
            "reject_request" => Ok(AuditAction::RejectRequest),
            _ => Err(CoreError::Validation(format!("unknown action: '{}'", s))),
        }
    }
}

/// A registered medical record: metadata plus the two immutable provenance
/// references set together at creation — the blob store content handle and
/// the ledger anchor.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MedicalRecord {
    pub record_id: String,
    pub title: String,
    pub description: String,
    pub record_type: RecordType,
    pub status: RecordStatus,
    /// Content-addressed handle from the blob store. Immutable once set.
    pub storage_reference: String,
    /// Protection identifier from the ledger. Immutable once set.
    pub anchor_id: String,
    /// Who uploaded the record; equals `subject_id` for self-uploads.
    pub submitter_id: String,
    /// The patient the record belongs to.
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An active or historical consent relationship authorizing a grantee to
/// access a subject's records.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AccessGrant {
    pub grant_id: String,
    pub subject_id: String,
    pub grantee_id: String,
    pub grantee_role: String,
    pub grantee_display_name: String,
    pub reason: String,
    pub status: GrantStatus,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// An inbound, not-yet-decided ask for consent from a would-be grantee.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AccessRequest {
    pub request_id: String,
    pub subject_id: String,
    pub requester_id: String,
    pub requester_role: String,
    pub requester_display_name: String,
    pub reason: String,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

/// One immutable entry in the per-subject audit trail.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ActivityEvent {
    pub event_id: String,
    pub subject_user_id: String,
    pub subject_role: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    /// Action-specific structured payload.
    pub details: serde_json::Value,
    /// Server-assigned; ordering for reads is by this field, descending.
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    /// Builds a new event attributed to `subject_user_id` acting as a
    /// patient, timestamped now.
    pub fn new(
        subject_user_id: &str,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_id: new_entity_id(),
            subject_user_id: subject_user_id.to_string(),
            subject_role: SUBJECT_ROLE_PATIENT.to_string(),
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Status narrowing for record listings.
///
/// Absent and `all` both mean "no narrowing"; any other recognised value
/// restricts exactly to that status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    Active,
    Archived,
    All,
}

impl StatusFilter {
    /// Parses an optional query value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unrecognised value.
    pub fn parse(value: Option<&str>) -> CoreResult<Self> {
        match value {
            None => Ok(StatusFilter::All),
            Some("all") => Ok(StatusFilter::All),
            Some("active") => Ok(StatusFilter::Active),
            Some("archived") => Ok(StatusFilter::Archived),
            Some(other) => Err(CoreError::Validation(format!(
                "unknown status filter: '{}'",
                other
            ))),
        }
    }

    pub fn matches(&self, status: RecordStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == RecordStatus::Active,
            StatusFilter::Archived => status == RecordStatus::Archived,
        }
    }
}

/// Action narrowing for audit queries: a single action or a comma-separated
/// set, matched with set-membership semantics.
#[derive(Clone, Debug, Default)]
pub struct ActionFilter(Option<HashSet<AuditAction>>);

impl ActionFilter {
    /// Parses an optional query value. Absent and `all` mean no narrowing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if any listed action is unknown.
    pub fn parse(value: Option<&str>) -> CoreResult<Self> {
        let value = match value {
            None => return Ok(Self(None)),
            Some("all") => return Ok(Self(None)),
            Some(v) => v,
        };

        let mut actions = HashSet::new();
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            actions.insert(part.parse::<AuditAction>()?);
        }

        if actions.is_empty() {
            return Ok(Self(None));
        }
        Ok(Self(Some(actions)))
    }

    pub fn matches(&self, action: AuditAction) -> bool {
        match &self.0 {
            None => true,
            Some(set) => set.contains(&action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_canonical_hex() {
        let id = new_entity_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    }

    #[test]
    fn record_type_round_trips_through_str() {
        for ty in [
            RecordType::LabReport,
            RecordType::Prescription,
            RecordType::Imaging,
            RecordType::ClinicalNote,
            RecordType::Other,
        ] {
            assert_eq!(ty.as_str().parse::<RecordType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_record_type_is_validation_error() {
        let result = "x_ray".parse::<RecordType>();
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn record_status_toggle_is_an_involution() {
        assert_eq!(RecordStatus::Active.toggled(), RecordStatus::Archived);
        assert_eq!(RecordStatus::Active.toggled().toggled(), RecordStatus::Active);
    }

    #[test]
    fn status_filter_absent_and_all_do_not_narrow() {
        assert_eq!(StatusFilter::parse(None).unwrap(), StatusFilter::All);
        assert_eq!(StatusFilter::parse(Some("all")).unwrap(), StatusFilter::All);
        assert!(StatusFilter::All.matches(RecordStatus::Active));
        assert!(StatusFilter::All.matches(RecordStatus::Archived));
    }

    #[test]
    fn status_filter_narrows_exactly() {
        let filter = StatusFilter::parse(Some("archived")).unwrap();
        assert!(filter.matches(RecordStatus::Archived));
        assert!(!filter.matches(RecordStatus::Active));
    }

    #[test]
    fn status_filter_rejects_unknown_values() {
        assert!(StatusFilter::parse(Some("deleted")).is_err());
    }

    #[test]
    fn action_filter_accepts_comma_separated_sets() {
        let filter = ActionFilter::parse(Some("grant_access,revoke_access")).unwrap();
        assert!(filter.matches(AuditAction::GrantAccess));
        assert!(filter.matches(AuditAction::RevokeAccess));
        assert!(!filter.matches(AuditAction::Upload));
    }

    #[test]
    fn action_filter_single_action() {
        let filter = ActionFilter::parse(Some("upload")).unwrap();
        assert!(filter.matches(AuditAction::Upload));
        assert!(!filter.matches(AuditAction::Delete));
    }

    #[test]
    fn action_filter_rejects_unknown_actions() {
        assert!(ActionFilter::parse(Some("upload,teleport")).is_err());
    }

    #[test]
    fn audit_action_serializes_snake_case() {
        let json = serde_json::to_string(&AuditAction::GrantAccess).unwrap();
        assert_eq!(json, "\"grant_access\"");
    }

    #[test]
    fn activity_event_attributes_to_patient_role() {
        let event = ActivityEvent::new(
            "P1",
            AuditAction::Upload,
            "record",
            "rec-1",
            serde_json::json!({"title": "CBC Panel"}),
        );
        assert_eq!(event.subject_role, SUBJECT_ROLE_PATIENT);
        assert_eq!(event.subject_user_id, "P1");
        assert_eq!(event.action, AuditAction::Upload);
    }
}
