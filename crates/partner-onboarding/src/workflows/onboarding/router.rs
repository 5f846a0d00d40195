use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::approval::ApprovalError;
use super::checklist::ChecklistError;
use super::decisions::{
    DecisionError, FieldVerificationInput, KycApprovalInput, StageDecision, TeleVerificationInput,
};
use super::domain::{
    Actor, ActorRole, ApplicationNumber, ApplicationStatus, ApplicationSubmission, DocumentStatus,
    PartnerCase,
};
use super::notifications::Notifier;
use super::repository::{ApplicationRepository, BlobStore, RepositoryError};
use super::service::{OnboardingError, OnboardingService};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, B, N> = Arc<OnboardingService<R, B, N>>;

/// Router exposing the onboarding pipeline over HTTP.
pub fn onboarding_router<R, B, N>(service: SharedService<R, B, N>) -> Router
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(submit_handler::<R, B, N>))
        .route(
            "/api/v1/applications/:number",
            get(snapshot_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/documents/corrections",
            post(correction_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/documents/:document",
            post(upload_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/documents/:document/status",
            post(document_status_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/kyc/start",
            post(begin_kyc_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/kyc/complete",
            post(complete_kyc_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/tele-verification",
            post(tele_verification_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/kyc-approval",
            post(kyc_approval_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/field-visit/start",
            post(field_visit_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/field-verification",
            post(field_verification_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/resume",
            post(resume_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/approve",
            post(approve_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/reject",
            post(reject_handler::<R, B, N>),
        )
        .route(
            "/api/v1/applications/:number/hold",
            post(hold_handler::<R, B, N>),
        )
        .route(
            "/api/v1/notifications/retry",
            post(retry_notifications_handler::<R, B, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub local_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentStatusRequest {
    pub status: DocumentStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub documents: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TeleVerificationRequest {
    pub decision: StageDecision,
    #[serde(flatten)]
    pub input: TeleVerificationInput,
}

#[derive(Debug, Deserialize)]
pub struct KycApprovalRequest {
    pub decision: StageDecision,
    #[serde(flatten)]
    pub input: KycApprovalInput,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub compliance_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    #[serde(default)]
    pub clarification: String,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
}

/// Read the caller identity vouched for by the session layer.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(ActorRole::from_label);

    match (id, role) {
        (Some(id), Some(role)) => Ok(Actor::new(id, role)),
        _ => {
            let payload = json!({
                "error": format!("headers '{ACTOR_ID_HEADER}' and '{ACTOR_ROLE_HEADER}' are required"),
            });
            Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
        }
    }
}

/// Map a service error onto its HTTP status; state guards carry the canonical status.
pub fn error_response(error: OnboardingError) -> Response {
    let status = match &error {
        OnboardingError::InvalidSubmission(_)
        | OnboardingError::Checklist(ChecklistError::ReasonRequired { .. })
        | OnboardingError::Checklist(ChecklistError::EmptySelection)
        | OnboardingError::Approval(ApprovalError::ReasonRequired { .. })
        | OnboardingError::Decision(DecisionError::ReasonRequired { .. })
        | OnboardingError::Decision(DecisionError::MissingGps)
        | OnboardingError::Decision(DecisionError::MissingResult)
        | OnboardingError::Decision(DecisionError::DocumentsIncomplete { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OnboardingError::ApplicationNotFound(_)
        | OnboardingError::Checklist(ChecklistError::InvalidDocumentType { .. })
        | OnboardingError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        OnboardingError::Forbidden { .. } => StatusCode::FORBIDDEN,
        OnboardingError::IllegalTransition(_)
        | OnboardingError::ConcurrentUpdate { .. }
        | OnboardingError::Approval(_)
        | OnboardingError::Decision(DecisionError::NotAssigned { .. })
        | OnboardingError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        OnboardingError::Storage(_) => StatusCode::BAD_GATEWAY,
        OnboardingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match error.current_status() {
        Some(current) => json!({
            "error": error.to_string(),
            "current_status": current,
            "current_status_label": current.label(),
        }),
        None => json!({
            "error": error.to_string(),
        }),
    };
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, OnboardingError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Json(submission): Json<ApplicationSubmission>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    match service.submit_application(submission) {
        Ok(application) => {
            let payload = json!({
                "application_number": application.application_number(),
                "partner_type": application.kind(),
                "status": application.status(),
                "required_documents": application
                    .required_documents()
                    .iter()
                    .map(|document| document.key())
                    .collect::<Vec<_>>(),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn snapshot_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let number = ApplicationNumber(number);
    respond(StatusCode::OK, service.get_application_snapshot(&number))
}

pub(crate) async fn upload_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path((number, document)): Path<(String, String)>,
    Json(request): Json<UploadRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.attach_document(&number, &document, &request.local_ref),
    )
}

pub(crate) async fn document_status_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path((number, document)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<DocumentStatusRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.set_document_status(
            &number,
            &actor,
            &document,
            request.status,
            request.reason.as_deref(),
        ),
    )
}

pub(crate) async fn correction_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CorrectionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    let result = service
        .request_document_correction(&number, &actor, &request.documents, &request.reason)
        .map(|updated| {
            updated
                .into_iter()
                .map(|(document, record)| {
                    json!({
                        "document_type": document,
                        "status": record.status,
                        "reason": record.reason,
                    })
                })
                .collect::<Vec<_>>()
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn begin_kyc_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(StatusCode::OK, status_body(service.begin_kyc(&number, &actor)))
}

pub(crate) async fn complete_kyc_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        status_body(service.complete_document_check(&number, &actor)),
    )
}

pub(crate) async fn tele_verification_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TeleVerificationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.record_tele_verification(&number, &actor, request.decision, request.input),
    )
}

pub(crate) async fn kyc_approval_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(request): Json<KycApprovalRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.record_kyc_approval(&number, &actor, request.decision, request.input),
    )
}

pub(crate) async fn field_visit_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        status_body(service.start_field_visit(&number, &actor)),
    )
}

pub(crate) async fn field_verification_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(input): Json<FieldVerificationInput>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.record_field_verification(&number, &actor, input),
    )
}

pub(crate) async fn resume_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(StatusCode::OK, status_body(service.resume(&number, &actor)))
}

pub(crate) async fn approve_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ApproveRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.approve(&number, &actor, request.compliance_notes),
    )
}

pub(crate) async fn reject_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RejectRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.reject(&number, &actor, &request.reason, request.details),
    )
}

pub(crate) async fn hold_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
    Path(number): Path<String>,
    headers: HeaderMap,
    Json(request): Json<HoldRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let number = ApplicationNumber(number);
    respond(
        StatusCode::OK,
        service.hold(
            &number,
            &actor,
            &request.clarification,
            request.follow_up_date,
        ),
    )
}

pub(crate) async fn retry_notifications_handler<R, B, N>(
    State(service): State<SharedService<R, B, N>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    match tokio::task::spawn_blocking(move || service.retry_pending_notifications()).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => {
            let payload = json!({ "error": format!("notification retry failed: {err}") });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn status_body(
    result: Result<ApplicationStatus, OnboardingError>,
) -> Result<serde_json::Value, OnboardingError> {
    result.map(|status| {
        json!({
            "status": status,
            "status_label": status.label(),
        })
    })
}
