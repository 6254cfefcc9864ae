use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use hirehub_core::dashboard::DashboardError;
use hirehub_core::document::DocumentError;
use hirehub_core::types::ReviewError;
use hirehub_storage::{ChangeLogError, DocumentStoreError};

use crate::mutation::MutationError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// `application/problem+json` error body returned by every handler.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", detail)
    }

    pub fn not_found<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }

    pub fn conflict<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", detail)
    }

    /// Logs the cause and hides it from the client.
    pub fn internal(cause: &dyn std::error::Error) -> Self {
        error!(stage = "api", error = %cause, "request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<DocumentError> for ProblemResponse {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotAnObject | DocumentError::Invalid(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_document", err.to_string())
            }
            DocumentError::GuardedField(_) => {
                Self::new(StatusCode::BAD_REQUEST, "guarded_field", err.to_string())
            }
            DocumentError::Validation(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                err.to_string(),
            ),
        }
    }
}

impl From<DocumentStoreError> for ProblemResponse {
    fn from(err: DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::NotFound { .. } => Self::not_found(err.to_string()),
            DocumentStoreError::Duplicate { .. } => Self::conflict(err.to_string()),
            DocumentStoreError::Decode { .. } | DocumentStoreError::Database(_) => {
                Self::internal(&err)
            }
        }
    }
}

impl From<ChangeLogError> for ProblemResponse {
    fn from(err: ChangeLogError) -> Self {
        Self::internal(&err)
    }
}

impl From<ReviewError> for ProblemResponse {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::AlreadyReviewed(_) => Self::conflict(err.to_string()),
            ReviewError::MissingReviewer => Self::bad_request(err.to_string()),
        }
    }
}

impl From<DashboardError> for ProblemResponse {
    fn from(err: DashboardError) -> Self {
        match err {
            DashboardError::UnknownTeamLead(_) => Self::not_found(err.to_string()),
        }
    }
}

impl From<MutationError> for ProblemResponse {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::Document(inner) => inner.into(),
            MutationError::Store(inner) => inner.into(),
            MutationError::Review(inner) => inner.into(),
            MutationError::Validation(inner) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                inner.to_string(),
            ),
            MutationError::NotFound(detail) => Self::not_found(detail),
            MutationError::Conflict(detail) => Self::conflict(detail),
            MutationError::Attendance(_) | MutationError::Database(_) => Self::internal(&err),
        }
    }
}

impl From<JsonRejection> for ProblemResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_body", rejection.body_text())
    }
}

impl From<QueryRejection> for ProblemResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(rejection.status(), "invalid_query", rejection.body_text())
    }
}
