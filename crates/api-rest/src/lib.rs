//! # API REST
//!
//! REST surface for the MedLedger patient service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON envelopes, base64 content transport, CORS)
//!
//! Every response carries a `success` flag; failures map the core error
//! taxonomy onto HTTP statuses in [`ApiError`]. No authentication or session
//! handling lives here — the caller-supplied subject identifier in the path
//! is trusted, and enforcement belongs to the deployment's gateway.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use medledger_core::model::{AccessGrant, AccessRequest, ActivityEvent, MedicalRecord};
use medledger_core::registry::RecordUpdate;
use medledger_core::{CoreError, PatientService, UploadRecord};
use medledger_ledger::AnchoredRecord;
use medledger_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PatientService>,
}

/// Core error carried to the HTTP boundary.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::RecordNotFound(_)
            | CoreError::GrantNotFound(_)
            | CoreError::RequestNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidState(_) => StatusCode::CONFLICT,
            CoreError::StorageUnavailable(_) | CoreError::LedgerUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            // Full cause chain stays server-side; the envelope carries only
            // the short display string.
            tracing::error!("request failed: {:?}", self.0);
        }

        (
            status,
            Json(ErrorRes {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorRes {
    pub success: bool,
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordDto {
    pub record_id: String,
    pub title: String,
    pub description: String,
    pub record_type: String,
    pub status: String,
    pub storage_reference: String,
    pub anchor_id: String,
    pub submitter_id: String,
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MedicalRecord> for RecordDto {
    fn from(r: MedicalRecord) -> Self {
        Self {
            record_id: r.record_id,
            title: r.title,
            description: r.description,
            record_type: r.record_type.as_str().to_string(),
            status: r.status.as_str().to_string(),
            storage_reference: r.storage_reference,
            anchor_id: r.anchor_id,
            submitter_id: r.submitter_id,
            subject_id: r.subject_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantDto {
    pub grant_id: String,
    pub subject_id: String,
    pub grantee_id: String,
    pub grantee_role: String,
    pub grantee_display_name: String,
    pub reason: String,
    pub status: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<AccessGrant> for GrantDto {
    fn from(g: AccessGrant) -> Self {
        Self {
            grant_id: g.grant_id,
            subject_id: g.subject_id,
            grantee_id: g.grantee_id,
            grantee_role: g.grantee_role,
            grantee_display_name: g.grantee_display_name,
            reason: g.reason,
            status: g.status.as_str().to_string(),
            granted_at: g.granted_at,
            revoked_at: g.revoked_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestDto {
    pub request_id: String,
    pub subject_id: String,
    pub requester_id: String,
    pub requester_role: String,
    pub requester_display_name: String,
    pub reason: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl From<AccessRequest> for RequestDto {
    fn from(r: AccessRequest) -> Self {
        Self {
            request_id: r.request_id,
            subject_id: r.subject_id,
            requester_id: r.requester_id,
            requester_role: r.requester_role,
            requester_display_name: r.requester_display_name,
            reason: r.reason,
            status: r.status.as_str().to_string(),
            requested_at: r.requested_at,
            approved_at: r.approved_at,
            rejected_at: r.rejected_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub event_id: String,
    pub subject_user_id: String,
    pub subject_role: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl From<ActivityEvent> for EventDto {
    fn from(e: ActivityEvent) -> Self {
        Self {
            event_id: e.event_id,
            subject_user_id: e.subject_user_id,
            subject_role: e.subject_role,
            action: e.action.as_str().to_string(),
            resource_type: e.resource_type,
            resource_id: e.resource_id,
            details: e.details,
            timestamp: e.timestamp,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnchorDto {
    pub record_id: String,
    pub content_handle: String,
    pub size_bytes: u64,
    pub submitter_id: String,
    pub subject_id: String,
    pub protection_id: String,
    pub anchored_at: DateTime<Utc>,
}

impl From<AnchoredRecord> for AnchorDto {
    fn from(a: AnchoredRecord) -> Self {
        Self {
            record_id: a.record_id,
            content_handle: a.payload.content_handle,
            size_bytes: a.payload.size_bytes,
            submitter_id: a.submitter_id,
            subject_id: a.subject_id,
            protection_id: a.protection_id,
            anchored_at: a.anchored_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecordReq {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub submitter_id: Option<String>,
    /// Record content, base64-encoded.
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct RecordRes {
    pub success: bool,
    pub record: RecordDto,
}

#[derive(Serialize, ToSchema)]
pub struct RecordsRes {
    pub success: bool,
    pub records: Vec<RecordDto>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentRes {
    pub success: bool,
    pub storage_reference: String,
    /// Record content, base64-encoded.
    pub content: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordReq {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantConsentReq {
    pub grantee_id: String,
    pub grantee_role: String,
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct GrantRes {
    pub success: bool,
    pub grant: GrantDto,
}

#[derive(Serialize, ToSchema)]
pub struct GrantsRes {
    pub success: bool,
    pub grants: Vec<GrantDto>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestReq {
    pub requester_id: String,
    pub requester_role: String,
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct RequestRes {
    pub success: bool,
    pub request: RequestDto,
}

#[derive(Serialize, ToSchema)]
pub struct RequestsRes {
    pub success: bool,
    pub requests: Vec<RequestDto>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditRes {
    pub success: bool,
    pub events: Vec<EventDto>,
}

#[derive(Serialize, ToSchema)]
pub struct AnchorsRes {
    pub success: bool,
    pub anchors: Vec<AnchorDto>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        upload_record,
        list_records,
        record_content,
        update_record,
        toggle_archive,
        delete_record,
        grant_consent,
        list_grants,
        grant_history,
        revoke_access,
        receive_request,
        list_requests,
        approve_request,
        reject_request,
        list_audit,
        list_anchors,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        UploadRecordReq,
        UpdateRecordReq,
        RecordRes,
        RecordsRes,
        ContentRes,
        RecordDto,
        GrantConsentReq,
        GrantRes,
        GrantsRes,
        GrantDto,
        AccessRequestReq,
        RequestRes,
        RequestsRes,
        RequestDto,
        AuditRes,
        EventDto,
        AnchorsRes,
        AnchorDto,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients/:subject_id/records", post(upload_record))
        .route("/patients/:subject_id/records", get(list_records))
        .route(
            "/patients/:subject_id/records/:record_id/content",
            get(record_content),
        )
        .route(
            "/patients/:subject_id/records/:record_id",
            put(update_record),
        )
        .route(
            "/patients/:subject_id/records/:record_id/archive",
            post(toggle_archive),
        )
        .route(
            "/patients/:subject_id/records/:record_id",
            delete(delete_record),
        )
        .route("/patients/:subject_id/grants", post(grant_consent))
        .route("/patients/:subject_id/grants", get(list_grants))
        .route("/patients/:subject_id/grants/history", get(grant_history))
        .route(
            "/patients/:subject_id/grants/:grant_id/revoke",
            post(revoke_access),
        )
        .route("/patients/:subject_id/requests", post(receive_request))
        .route("/patients/:subject_id/requests", get(list_requests))
        .route(
            "/patients/:subject_id/requests/:request_id/approve",
            post(approve_request),
        )
        .route(
            "/patients/:subject_id/requests/:request_id/reject",
            post(reject_request),
        )
        .route("/patients/:subject_id/audit", get(list_audit))
        .route("/patients/:subject_id/anchors", get(list_anchors))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn decode_content(encoded: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(encoded)
        .map_err(|_| ApiError(CoreError::Validation("content is not valid base64".into())))
}

fn optional_text(value: Option<String>, field: &str) -> Result<Option<NonEmptyText>, ApiError> {
    value
        .map(|v| {
            NonEmptyText::new(&v)
                .map_err(|_| ApiError(CoreError::Validation(format!("{} cannot be empty", field))))
        })
        .transpose()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "MedLedger REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/records",
    request_body = UploadRecordReq,
    responses(
        (status = 201, description = "Record uploaded", body = RecordRes),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 503, description = "Storage or ledger unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn upload_record(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
    Json(req): Json<UploadRecordReq>,
) -> Result<(StatusCode, Json<RecordRes>), ApiError> {
    let content = decode_content(&req.content)?;
    let record = state.service.upload_record(UploadRecord {
        subject_id,
        submitter_id: req.submitter_id,
        title: req.title,
        description: req.description,
        record_type: req.record_type,
        content,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(RecordRes {
            success: true,
            record: record.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/records",
    params(
        ("status" = Option<String>, Query, description = "active, archived or all")
    ),
    responses(
        (status = 200, description = "Subject's records, newest first", body = RecordsRes),
        (status = 400, description = "Unknown status filter", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_records(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<RecordsRes>, ApiError> {
    let records = state
        .service
        .list_records(&subject_id, params.get("status").map(String::as_str))?;
    Ok(Json(RecordsRes {
        success: true,
        records: records.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/records/{record_id}/content",
    responses(
        (status = 200, description = "Stored content, base64-encoded", body = ContentRes),
        (status = 404, description = "Unknown record", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn record_content(
    State(state): State<AppState>,
    AxumPath((subject_id, record_id)): AxumPath<(String, String)>,
) -> Result<Json<ContentRes>, ApiError> {
    // Scope the lookup to the path's subject so one patient's record ids
    // cannot be read through another patient's URL space.
    let record = state
        .service
        .list_records(&subject_id, None)?
        .into_iter()
        .find(|r| r.record_id == record_id)
        .ok_or_else(|| ApiError(CoreError::RecordNotFound(record_id.clone())))?;
    let content = state.service.record_content(&record_id)?;
    Ok(Json(ContentRes {
        success: true,
        storage_reference: record.storage_reference,
        content: BASE64.encode(content),
    }))
}

#[utoipa::path(
    put,
    path = "/patients/{subject_id}/records/{record_id}",
    request_body = UpdateRecordReq,
    responses(
        (status = 200, description = "Record updated", body = RecordRes),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 404, description = "Unknown record", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn update_record(
    State(state): State<AppState>,
    AxumPath((subject_id, record_id)): AxumPath<(String, String)>,
    Json(req): Json<UpdateRecordReq>,
) -> Result<Json<RecordRes>, ApiError> {
    let update = RecordUpdate {
        title: optional_text(req.title, "title")?,
        description: optional_text(req.description, "description")?,
    };
    let record = state
        .service
        .update_record(&record_id, update, Some(&subject_id))?;
    Ok(Json(RecordRes {
        success: true,
        record: record.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/records/{record_id}/archive",
    responses(
        (status = 200, description = "Record archive status toggled", body = RecordRes),
        (status = 404, description = "Unknown record", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn toggle_archive(
    State(state): State<AppState>,
    AxumPath((subject_id, record_id)): AxumPath<(String, String)>,
) -> Result<Json<RecordRes>, ApiError> {
    let record = state.service.toggle_archive(&record_id, Some(&subject_id))?;
    Ok(Json(RecordRes {
        success: true,
        record: record.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/patients/{subject_id}/records/{record_id}",
    responses(
        (status = 200, description = "Record deleted", body = RecordRes),
        (status = 404, description = "Unknown record", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_record(
    State(state): State<AppState>,
    AxumPath((subject_id, record_id)): AxumPath<(String, String)>,
) -> Result<Json<RecordRes>, ApiError> {
    let record = state.service.delete_record(&record_id, Some(&subject_id))?;
    Ok(Json(RecordRes {
        success: true,
        record: record.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/grants",
    request_body = GrantConsentReq,
    responses(
        (status = 201, description = "Consent granted", body = GrantRes),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 409, description = "Active grant already exists", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn grant_consent(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
    Json(req): Json<GrantConsentReq>,
) -> Result<(StatusCode, Json<GrantRes>), ApiError> {
    let grant = state.service.grant_consent(
        &subject_id,
        &req.grantee_id,
        &req.grantee_role,
        &req.reason,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(GrantRes {
            success: true,
            grant: grant.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/grants",
    responses(
        (status = 200, description = "Active grants, newest first", body = GrantsRes)
    )
)]
#[axum::debug_handler]
async fn list_grants(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
) -> Json<GrantsRes> {
    let grants = state.service.list_active_grants(&subject_id);
    Json(GrantsRes {
        success: true,
        grants: grants.into_iter().map(Into::into).collect(),
    })
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/grants/history",
    responses(
        (status = 200, description = "All grants ever issued, newest first", body = GrantsRes)
    )
)]
#[axum::debug_handler]
async fn grant_history(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
) -> Json<GrantsRes> {
    let grants = state.service.list_grant_history(&subject_id);
    Json(GrantsRes {
        success: true,
        grants: grants.into_iter().map(Into::into).collect(),
    })
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/grants/{grant_id}/revoke",
    responses(
        (status = 200, description = "Grant revoked", body = GrantRes),
        (status = 404, description = "Unknown grant", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn revoke_access(
    State(state): State<AppState>,
    AxumPath((subject_id, grant_id)): AxumPath<(String, String)>,
) -> Result<Json<GrantRes>, ApiError> {
    let grant = state.service.revoke_access(&grant_id, Some(&subject_id))?;
    Ok(Json(GrantRes {
        success: true,
        grant: grant.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/requests",
    request_body = AccessRequestReq,
    responses(
        (status = 201, description = "Request registered", body = RequestRes),
        (status = 400, description = "Invalid input", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn receive_request(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
    Json(req): Json<AccessRequestReq>,
) -> Result<(StatusCode, Json<RequestRes>), ApiError> {
    let request = state.service.receive_access_request(
        &subject_id,
        &req.requester_id,
        &req.requester_role,
        &req.reason,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(RequestRes {
            success: true,
            request: request.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/requests",
    responses(
        (status = 200, description = "Inbound requests, newest first", body = RequestsRes)
    )
)]
#[axum::debug_handler]
async fn list_requests(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
) -> Json<RequestsRes> {
    let requests = state.service.list_incoming_requests(&subject_id);
    Json(RequestsRes {
        success: true,
        requests: requests.into_iter().map(Into::into).collect(),
    })
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/requests/{request_id}/approve",
    responses(
        (status = 200, description = "Request approved; grant created", body = GrantRes),
        (status = 404, description = "Unknown request", body = ErrorRes),
        (status = 409, description = "Request already decided", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn approve_request(
    State(state): State<AppState>,
    AxumPath((subject_id, request_id)): AxumPath<(String, String)>,
) -> Result<Json<GrantRes>, ApiError> {
    let grant = state.service.approve_request(&request_id, &subject_id)?;
    Ok(Json(GrantRes {
        success: true,
        grant: grant.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/patients/{subject_id}/requests/{request_id}/reject",
    responses(
        (status = 200, description = "Request rejected", body = RequestRes),
        (status = 404, description = "Unknown request", body = ErrorRes),
        (status = 409, description = "Request already decided", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn reject_request(
    State(state): State<AppState>,
    AxumPath((subject_id, request_id)): AxumPath<(String, String)>,
) -> Result<Json<RequestRes>, ApiError> {
    let request = state.service.reject_request(&request_id, &subject_id)?;
    Ok(Json(RequestRes {
        success: true,
        request: request.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/audit",
    params(
        ("actions" = Option<String>, Query, description = "Comma-separated action set, or all")
    ),
    responses(
        (status = 200, description = "Audit trail, newest first", body = AuditRes),
        (status = 400, description = "Unknown action in filter", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_audit(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AuditRes>, ApiError> {
    let events = state
        .service
        .list_audit(&subject_id, params.get("actions").map(String::as_str))?;
    Ok(Json(AuditRes {
        success: true,
        events: events.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{subject_id}/anchors",
    responses(
        (status = 200, description = "Ledger anchors for the subject", body = AnchorsRes),
        (status = 503, description = "Ledger unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_anchors(
    State(state): State<AppState>,
    AxumPath(subject_id): AxumPath<String>,
) -> Result<Json<AnchorsRes>, ApiError> {
    let anchors = state.service.list_anchors(&subject_id)?;
    Ok(Json(AnchorsRes {
        success: true,
        anchors: anchors.into_iter().map(Into::into).collect(),
    }))
}
