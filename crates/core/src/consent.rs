//! Consent manager.
//!
//! Exclusive owner of the [`AccessGrant`] and [`AccessRequest`] state
//! machines. Grants move active→revoked only and are never deleted — a
//! revoked grant is history, not garbage. Requests move pending→approved
//! (creating exactly one new active grant) or pending→rejected; both are
//! terminal. Racing decisions on the same request are serialized by the
//! request store's writer lock: exactly one caller wins, the loser observes
//! the terminal status and fails with `InvalidState`.

use crate::audit::AuditLog;
use crate::error::{CoreError, CoreResult};
use crate::identity::IdentityLookup;
use crate::model::{
    new_entity_id, AccessGrant, AccessRequest, ActivityEvent, AuditAction, GrantStatus,
    RequestStatus,
};
use crate::store::DocumentStore;
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

const RESOURCE_ACCESS: &str = "access";
const RESOURCE_ACCESS_REQUEST: &str = "access_request";

fn require_non_empty(value: &str, field: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

pub struct ConsentManager {
    grants: DocumentStore<AccessGrant>,
    requests: DocumentStore<AccessRequest>,
    audit: Arc<AuditLog>,
    identity: Arc<dyn IdentityLookup>,
}

impl ConsentManager {
    /// Opens the grant and request stores.
    pub fn open(
        grants_dir: &Path,
        requests_dir: &Path,
        audit: Arc<AuditLog>,
        identity: Arc<dyn IdentityLookup>,
    ) -> CoreResult<Self> {
        Ok(Self {
            grants: DocumentStore::open(grants_dir)?,
            requests: DocumentStore::open(requests_dir)?,
            audit,
            identity,
        })
    }

    fn active_grant_for(&self, subject_id: &str, grantee_id: &str) -> Option<AccessGrant> {
        self.grants
            .values()
            .into_iter()
            .find(|g| {
                g.subject_id == subject_id
                    && g.grantee_id == grantee_id
                    && g.status == GrantStatus::Active
            })
    }

    fn resolve_display_name(&self, id_or_alias: &str) -> String {
        // A lookup miss is not an error, only a degraded display name.
        self.identity
            .find_by_id_or_alias(id_or_alias)
            .map(|profile| profile.display_name)
            .unwrap_or_else(|| id_or_alias.to_string())
    }

    fn insert_grant(
        &self,
        subject_id: &str,
        grantee_id: &str,
        grantee_role: &str,
        grantee_display_name: String,
        reason: &str,
    ) -> CoreResult<AccessGrant> {
        let grant = AccessGrant {
            grant_id: new_entity_id(),
            subject_id: subject_id.to_string(),
            grantee_id: grantee_id.to_string(),
            grantee_role: grantee_role.to_string(),
            grantee_display_name,
            reason: reason.to_string(),
            status: GrantStatus::Active,
            granted_at: Utc::now(),
            revoked_at: None,
        };
        self.grants.insert(grant.clone())?;
        Ok(grant)
    }

    /// Grants a provider access to the subject's records.
    ///
    /// The grantee display name is resolved through the identity directory
    /// (by id or email-like alias), falling back to the raw grantee id.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if subject, grantee, or reason is empty.
    /// - [`CoreError::InvalidState`] while an active grant for the same
    ///   `(subject, grantee)` pair exists; revoke it first.
    pub fn grant_consent(
        &self,
        subject_id: &str,
        grantee_id: &str,
        grantee_role: &str,
        reason: &str,
    ) -> CoreResult<AccessGrant> {
        require_non_empty(subject_id, "subject id")?;
        require_non_empty(grantee_id, "grantee id")?;
        require_non_empty(reason, "reason")?;

        if self.active_grant_for(subject_id, grantee_id).is_some() {
            return Err(CoreError::InvalidState(format!(
                "an active grant for grantee {} already exists",
                grantee_id
            )));
        }

        let display_name = self.resolve_display_name(grantee_id);
        let grant =
            self.insert_grant(subject_id, grantee_id, grantee_role, display_name, reason)?;

        self.audit.record(ActivityEvent::new(
            subject_id,
            AuditAction::GrantAccess,
            RESOURCE_ACCESS,
            grantee_id,
            json!({
                "granteeId": grant.grantee_id,
                "granteeRole": grant.grantee_role,
                "granteeDisplayName": grant.grantee_display_name,
                "reason": grant.reason,
            }),
        ));

        Ok(grant)
    }

    /// Lists a subject's active grants, newest granted first. Revoked grants
    /// are excluded from this read path.
    pub fn list_active_grants(&self, subject_id: &str) -> Vec<AccessGrant> {
        let mut grants: Vec<AccessGrant> = self
            .grants
            .values()
            .into_iter()
            .filter(|g| g.subject_id == subject_id && g.status == GrantStatus::Active)
            .collect();
        grants.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        grants
    }

    /// Lists every grant ever issued for a subject, revoked included, newest
    /// granted first.
    pub fn list_grant_history(&self, subject_id: &str) -> Vec<AccessGrant> {
        let mut grants: Vec<AccessGrant> = self
            .grants
            .values()
            .into_iter()
            .filter(|g| g.subject_id == subject_id)
            .collect();
        grants.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        grants
    }

    /// Revokes a grant, stamping `revoked_at`.
    ///
    /// Revoking an already-revoked grant is allowed: it re-stamps
    /// `revoked_at` and emits another `revoke_access` audit event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::GrantNotFound`] for an unknown id, or when the
    /// acting subject is not the grant's subject — only the patient who
    /// issued a grant can take it back, and a foreign grant id is
    /// indistinguishable from an unknown one.
    pub fn revoke_access(
        &self,
        grant_id: &str,
        acting_subject: Option<&str>,
    ) -> CoreResult<AccessGrant> {
        let revoked = self
            .grants
            .update(grant_id, |grant| {
                if acting_subject.is_some_and(|actor| actor != grant.subject_id) {
                    return Err(CoreError::GrantNotFound(grant_id.to_string()));
                }
                grant.status = GrantStatus::Revoked;
                grant.revoked_at = Some(Utc::now());
                Ok(())
            })?
            .ok_or_else(|| CoreError::GrantNotFound(grant_id.to_string()))?;

        let actor = acting_subject.unwrap_or(&revoked.subject_id);
        self.audit.record(ActivityEvent::new(
            actor,
            AuditAction::RevokeAccess,
            RESOURCE_ACCESS,
            &revoked.grantee_id,
            json!({
                "granteeId": revoked.grantee_id,
                "granteeRole": revoked.grantee_role,
                "granteeDisplayName": revoked.grantee_display_name,
            }),
        ));

        Ok(revoked)
    }

    /// Registers an inbound access request against a subject.
    ///
    /// This is the requester's action, not the subject's, so it writes no
    /// entry in the subject's audit trail; the decision (approve/reject)
    /// does.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if subject, requester, or reason is
    /// empty.
    pub fn receive_request(
        &self,
        subject_id: &str,
        requester_id: &str,
        requester_role: &str,
        reason: &str,
    ) -> CoreResult<AccessRequest> {
        require_non_empty(subject_id, "subject id")?;
        require_non_empty(requester_id, "requester id")?;
        require_non_empty(reason, "reason")?;

        let request = AccessRequest {
            request_id: new_entity_id(),
            subject_id: subject_id.to_string(),
            requester_id: requester_id.to_string(),
            requester_role: requester_role.to_string(),
            requester_display_name: self.resolve_display_name(requester_id),
            reason: reason.to_string(),
            status: RequestStatus::Pending,
            requested_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
        };
        self.requests.insert(request.clone())?;
        Ok(request)
    }

    /// Lists a subject's inbound requests, all statuses, newest first.
    pub fn list_incoming_requests(&self, subject_id: &str) -> Vec<AccessRequest> {
        let mut requests: Vec<AccessRequest> = self
            .requests
            .values()
            .into_iter()
            .filter(|r| r.subject_id == subject_id)
            .collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        requests
    }

    fn request_for_subject(&self, request_id: &str, subject_id: &str) -> CoreResult<AccessRequest> {
        let request = self
            .requests
            .get(request_id)
            .ok_or_else(|| CoreError::RequestNotFound(request_id.to_string()))?;
        // A subject can only decide their own requests; a mismatch is
        // indistinguishable from an unknown id on purpose.
        if request.subject_id != subject_id {
            return Err(CoreError::RequestNotFound(request_id.to_string()));
        }
        Ok(request)
    }

    /// Approves a pending request and creates exactly one new active grant
    /// carrying over the requester's identity and reason.
    ///
    /// # Errors
    ///
    /// - [`CoreError::RequestNotFound`] for an unknown id or one belonging
    ///   to another subject.
    /// - [`CoreError::InvalidState`] if the request has already been decided,
    ///   or while an active grant for the pair already exists.
    pub fn approve_request(&self, request_id: &str, subject_id: &str) -> CoreResult<AccessGrant> {
        let current = self.request_for_subject(request_id, subject_id)?;
        if current.status == RequestStatus::Pending
            && self
                .active_grant_for(&current.subject_id, &current.requester_id)
                .is_some()
        {
            return Err(CoreError::InvalidState(format!(
                "an active grant for grantee {} already exists",
                current.requester_id
            )));
        }

        let approved = self
            .requests
            .update(request_id, |req| {
                if req.status != RequestStatus::Pending {
                    return Err(CoreError::InvalidState(format!(
                        "request is already {}",
                        req.status
                    )));
                }
                req.status = RequestStatus::Approved;
                req.approved_at = Some(Utc::now());
                Ok(())
            })?
            .ok_or_else(|| CoreError::RequestNotFound(request_id.to_string()))?;

        let grant = self.insert_grant(
            &approved.subject_id,
            &approved.requester_id,
            &approved.requester_role,
            approved.requester_display_name.clone(),
            &approved.reason,
        )?;

        self.audit.record(ActivityEvent::new(
            subject_id,
            AuditAction::ApproveRequest,
            RESOURCE_ACCESS_REQUEST,
            request_id,
            json!({
                "granteeId": approved.requester_id,
                "granteeRole": approved.requester_role,
            }),
        ));

        Ok(grant)
    }

    /// Rejects a pending request. Creates no grant.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`approve_request`](Self::approve_request).
    pub fn reject_request(&self, request_id: &str, subject_id: &str) -> CoreResult<AccessRequest> {
        self.request_for_subject(request_id, subject_id)?;

        let rejected = self
            .requests
            .update(request_id, |req| {
                if req.status != RequestStatus::Pending {
                    return Err(CoreError::InvalidState(format!(
                        "request is already {}",
                        req.status
                    )));
                }
                req.status = RequestStatus::Rejected;
                req.rejected_at = Some(Utc::now());
                Ok(())
            })?
            .ok_or_else(|| CoreError::RequestNotFound(request_id.to_string()))?;

        self.audit.record(ActivityEvent::new(
            subject_id,
            AuditAction::RejectRequest,
            RESOURCE_ACCESS_REQUEST,
            request_id,
            json!({
                "granteeId": rejected.requester_id,
                "granteeRole": rejected.requester_role,
            }),
        ));

        Ok(rejected)
    }
}
