//! JSON API over the decision service.
//!
//! - `POST /api/v1/requests`                            submit a request for a student
//! - `GET  /api/v1/requests?status=&limit=`             list requests, oldest first
//! - `GET  /api/v1/requests/{id}`                       request with its chain
//! - `GET  /api/v1/requests/{id}/tracking`              tracking summary
//! - `POST /api/v1/requests/{id}/decision`              approve or reject the active step
//! - `GET  /api/v1/approvals/pending?name=&role=`       queue an approver may act on
//! - `GET  /api/v1/students/{student_id}/notifications`  decision notices
//! - `POST /api/v1/notifications/{id}/read`             mark a notice read

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use diplomas_core::approvals::Decision;
use diplomas_core::domain::approval::{ApprovalStatus, Approver};
use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
use diplomas_core::domain::session::SessionContext;
use diplomas_core::errors::{ApplicationError, InterfaceError};
use diplomas_core::notifications::{Notification, NotificationId};
use diplomas_core::tracking::TrackingSummary;
use diplomas_db::{DecisionCommand, DecisionService, DEFAULT_MAX_ATTEMPTS};

pub const CORRELATION_HEADER: &str = "x-correlation-id";
const DEFAULT_LIST_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<DecisionService>,
}

impl ApiState {
    pub fn new(service: Arc<DecisionService>) -> Self {
        Self { service }
    }
}

pub fn router(service: Arc<DecisionService>) -> Router {
    Router::new()
        .route("/api/v1/requests", post(submit_request).get(list_requests))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/tracking", get(request_tracking))
        .route("/api/v1/requests/{id}/decision", post(record_decision))
        .route("/api/v1/approvals/pending", get(pending_approvals))
        .route("/api/v1/students/{student_id}/notifications", get(student_notifications))
        .route("/api/v1/notifications/{id}/read", post(mark_notification_read))
        .with_state(ApiState::new(service))
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub student_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub decision: Decision,
    pub approver_name: String,
    pub approver_role: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub name: String,
    pub role: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub detail: String,
    pub retriable: bool,
    pub correlation_id: String,
}

/// Interface error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, class, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", message)
            }
            InterfaceError::NotFound { message, .. } => {
                (StatusCode::NOT_FOUND, "not_found", message)
            }
            InterfaceError::Forbidden { message, .. } => {
                (StatusCode::FORBIDDEN, "forbidden", message)
            }
            InterfaceError::Conflict { message, .. } => (StatusCode::CONFLICT, "conflict", message),
            InterfaceError::ServiceUnavailable { message, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
            }
            InterfaceError::Internal { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        };

        if status.is_server_error() {
            error!(
                event_name = "api.request_failed",
                correlation_id = %self.0.correlation_id(),
                error_class = class,
                error = %detail,
                "api request failed"
            );
        } else {
            warn!(
                event_name = "api.request_refused",
                correlation_id = %self.0.correlation_id(),
                error_class = class,
                error = %detail,
                "api request refused"
            );
        }

        let body = ErrorBody {
            error: class,
            message: self.0.user_message(),
            detail: detail.clone(),
            retriable: self.0.is_retriable(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()))
}

pub async fn submit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<ValidationRequest>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let request = state
        .service
        .submit(StudentId(body.student_id.trim().to_string()), &correlation_id, Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<ValidationRequest>> {
    let correlation_id = correlation_id(&headers);
    let status = query
        .status
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<ApprovalStatus>)
        .transpose()
        .map_err(|error| ApiError::from_application(error.into(), &correlation_id))?;

    let requests = state
        .service
        .list(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(requests))
}

pub async fn get_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<ValidationRequest> {
    let correlation_id = correlation_id(&headers);
    let request = state
        .service
        .get(&RequestId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(request))
}

pub async fn request_tracking(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<TrackingSummary> {
    let correlation_id = correlation_id(&headers);
    let summary = state
        .service
        .tracking(&RequestId(id), Utc::now())
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(summary))
}

pub async fn record_decision(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<ValidationRequest> {
    let session = SessionContext::new(
        Approver::new(body.approver_name.trim(), body.approver_role.trim()),
        correlation_id(&headers),
    );
    let command = DecisionCommand {
        request_id: RequestId(id),
        decision: body.decision,
        comment: body.comment.unwrap_or_default(),
        expected_version: body.expected_version,
    };

    let saved = state
        .service
        .decide_with_retry(&command, &session, Utc::now(), DEFAULT_MAX_ATTEMPTS)
        .await
        .map_err(|error| ApiError::from_application(error, &session.correlation_id))?;

    info!(
        event_name = "api.decision_recorded",
        correlation_id = %session.correlation_id,
        request_id = %saved.id.0,
        approver_role = %session.approver.role,
        version = saved.version,
        "decision accepted over http"
    );
    Ok(Json(saved))
}

pub async fn pending_approvals(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Vec<ValidationRequest>> {
    let session =
        SessionContext::new(Approver::new(query.name, query.role), correlation_id(&headers));
    let queue = state
        .service
        .actionable_for(&session, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await
        .map_err(|error| ApiError::from_application(error, &session.correlation_id))?;
    Ok(Json(queue))
}

pub async fn student_notifications(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    let correlation_id = correlation_id(&headers);
    let notices = state
        .service
        .notifications(&StudentId(student_id), query.unread)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(notices))
}

pub async fn mark_notification_read(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id(&headers);
    state
        .service
        .mark_notification_read(&NotificationId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}
