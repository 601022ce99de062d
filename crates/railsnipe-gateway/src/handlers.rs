// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use railsnipe_core::{
    ErrorClass, ErrorKind, ExternalRecordRef, Provider, RailsnipeError, ReservationRequest,
    TaskId, TaskState, TaskStatus, UserRef,
};
use railsnipe_engine::BookingSummary;
use serde::Serialize;

use crate::server::GatewayState;

/// Response body for POST /v1/tasks.
#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_tasks: usize,
}

/// Response body for GET /v1/bookings/{provider}/{user}.
#[derive(Debug, Serialize)]
pub struct BookingList {
    pub bookings: Vec<BookingSummary>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// A [`RailsnipeError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(RailsnipeError);

impl From<RailsnipeError> for ApiError {
    fn from(e: RailsnipeError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RailsnipeError::Validation(_) => StatusCode::BAD_REQUEST,
            RailsnipeError::TaskNotFound(_) | RailsnipeError::RecordNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RailsnipeError::Upstream(e) => match e.class {
                ErrorClass::ValidationError => StatusCode::BAD_REQUEST,
                ErrorClass::BotDetected => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            RailsnipeError::Auth { .. } => StatusCode::BAD_GATEWAY,
            RailsnipeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> Option<ErrorKind> {
        match &self.0 {
            RailsnipeError::Validation(_) => Some(ErrorKind::Validation),
            RailsnipeError::TaskNotFound(_) | RailsnipeError::RecordNotFound(_) => {
                Some(ErrorKind::NotFound)
            }
            RailsnipeError::Upstream(e) => Some(e.class.kind()),
            RailsnipeError::Auth { .. } => Some(ErrorKind::Auth),
            RailsnipeError::Timeout { .. } => Some(ErrorKind::Transient),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            kind: self.kind(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    Provider::from_str(raw)
        .map_err(|_| ApiError(RailsnipeError::Validation(format!("unknown provider: {raw}"))))
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.shutdown.is_cancelled() {
            "draining"
        } else {
            "ok"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_tasks: state.supervisor.active(),
    })
}

/// POST /v1/tasks
///
/// Accepts a reservation request and returns its task id immediately.
pub async fn post_task(
    State(state): State<GatewayState>,
    Json(request): Json<ReservationRequest>,
) -> Response {
    if state.shutdown.is_cancelled() {
        let body = ErrorResponse {
            error: "shutting down".to_string(),
            kind: None,
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }
    match state.supervisor.start(request).await {
        Ok(task_id) => {
            let status = state
                .supervisor
                .status(&task_id)
                .await
                .map(|s| s.status)
                .unwrap_or(TaskStatus::Pending);
            (StatusCode::ACCEPTED, Json(TaskAccepted { task_id, status })).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// GET /v1/tasks/{id}
pub async fn get_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<TaskState>, ApiError> {
    Ok(Json(state.supervisor.status(&TaskId(id)).await?))
}

/// POST /v1/tasks/{id}/cancel
///
/// Returns the state at the time of the request; the task reaches
/// CANCELLED shortly after.
pub async fn cancel_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TaskState>), ApiError> {
    let task_id = TaskId(id);
    state.supervisor.cancel(&task_id).await?;
    let snapshot = state.supervisor.status(&task_id).await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// GET /v1/bookings/{provider}/{user}
pub async fn list_bookings(
    State(state): State<GatewayState>,
    Path((provider, user)): Path<(String, String)>,
) -> Result<Json<BookingList>, ApiError> {
    let provider = parse_provider(&provider)?;
    let bookings = state.desk.list(&UserRef(user), provider).await?;
    Ok(Json(BookingList { bookings }))
}

/// POST /v1/bookings/{provider}/{user}/{ref}/cancel
pub async fn cancel_booking(
    State(state): State<GatewayState>,
    Path((provider, user, record_ref)): Path<(String, String, String)>,
) -> Result<Json<BookingSummary>, ApiError> {
    let provider = parse_provider(&provider)?;
    let cancelled = state
        .desk
        .cancel(&UserRef(user), provider, &ExternalRecordRef(record_ref))
        .await?;
    Ok(Json(cancelled))
}

/// POST /v1/bookings/{provider}/{user}/{ref}/pay
pub async fn pay_booking(
    State(state): State<GatewayState>,
    Path((provider, user, record_ref)): Path<(String, String, String)>,
) -> Result<Json<BookingSummary>, ApiError> {
    let provider = parse_provider(&provider)?;
    let paid = state
        .desk
        .pay(&UserRef(user), provider, &ExternalRecordRef(record_ref))
        .await?;
    Ok(Json(paid))
}
