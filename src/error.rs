//! API error taxonomy.
//!
//! Distinguishes the four client-visible failure classes of the platform:
//! unknown names/ids, rejected parameter objects, downloads that are not
//! (yet) available, and internal faults. Worker-side execution failures are
//! *not* part of this taxonomy: they are captured into the task record and
//! only observed through polling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// A single schema violation in a submitted parameter object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// The offending field (required-property name or JSON pointer).
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Error returned by the client-facing API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown calculation module name or task identifier.
    #[error("{0} not found")]
    NotFound(String),

    /// Submitted parameters violate the module's declared schema.
    #[error("parameters failed schema validation ({} violation(s))", .0.len())]
    Validation(Vec<Violation>),

    /// Download requested before completion, or the module produces no file.
    #[error("no downloadable result available for task {0}")]
    NotAvailable(String),

    /// Illegal task state transition (store misuse guard).
    #[error("conflicting task update: {0}")]
    Conflict(String),

    /// Anything that should not leak details to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Not-found error for a calculation module name.
    pub fn unknown_cm(name: &str) -> Self {
        Self::NotFound(format!("calculation module '{}'", name))
    }

    /// Not-found error for a task identifier.
    pub fn unknown_task(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("task {}", id))
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAvailable(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body sent with every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<Violation>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = match self {
            ApiError::Validation(violations) => ErrorBody {
                message: format!(
                    "parameters failed schema validation ({} violation(s))",
                    violations.len()
                ),
                fields: Some(violations),
            },
            other => ErrorBody {
                message: other.to_string(),
                fields: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
