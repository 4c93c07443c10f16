// crates/exam-catalog-server/src/error.rs
// ============================================================================
// Module: HTTP Errors
// Description: Client-facing error envelope and status mapping.
// Purpose: Translate catalog errors into stable `{ code, message, details }`.
// Dependencies: axum, exam-catalog-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Every failed request answers with one JSON envelope. Status codes follow
//! the error kind; database and internal failures keep their detail in the
//! log and show clients a generic message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use exam_catalog_core::CatalogError;
use exam_catalog_core::ErrorKind;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Error Envelope
// ============================================================================

/// Non-standard status for requests abandoned by the client.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// HTTP error response.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Response status.
    status: StatusCode,
    /// Machine-readable code.
    code: &'static str,
    /// Client-safe message.
    message: String,
    /// Structured context.
    details: Map<String, Value>,
}

/// Serialized error body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    /// Machine-readable code.
    code: &'a str,
    /// Client-safe message.
    message: &'a str,
    /// Structured context.
    details: &'a Map<String, Value>,
}

impl ApiError {
    /// Builds an error with empty details.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Malformed request.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    /// Missing or unknown credentials.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", "authentication required")
    }

    /// Authenticated caller lacks permission.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// Missing, unknown, or expired CSRF token.
    #[must_use]
    pub fn csrf_rejected() -> Self {
        Self::new(StatusCode::FORBIDDEN, "CSRF_TOKEN_INVALID", "missing or invalid csrf token")
    }

    /// Body larger than the configured limit.
    #[must_use]
    pub fn payload_too_large(limit: usize) -> Self {
        let mut error = Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            "request body too large",
        );
        error.details.insert("max_bytes".to_string(), Value::from(limit));
        error
    }

    /// Body is not JSON.
    #[must_use]
    pub fn unsupported_media_type() -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_MEDIA_TYPE",
            "content type must be application/json",
        )
    }

    /// Client exceeded its request budget.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "too many requests")
    }

    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

/// Maps an error kind to its HTTP status.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateName | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => {
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
        }
        ErrorKind::Db | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CatalogError> for ApiError {
    fn from(error: CatalogError) -> Self {
        let status = status_for(error.kind());
        if status.is_server_error() {
            tracing::error!(code = error.code(), error = %error, "request failed");
        } else {
            tracing::debug!(code = error.code(), error = %error, "request rejected");
        }
        Self {
            status,
            code: error.code(),
            message: error.public_message(),
            details: error.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
            details: &self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use exam_catalog_core::ResourceKind;

    use super::*;

    #[test]
    fn kinds_map_to_documented_statuses() {
        let cases = [
            (CatalogError::InvalidInput("bad".to_string()), 400),
            (
                CatalogError::ParentNotFound {
                    resource: ResourceKind::Major,
                    id: 4,
                },
                404,
            ),
            (
                CatalogError::Conflict {
                    resource: ResourceKind::University,
                    id: 1,
                    expected: 3,
                },
                409,
            ),
            (
                CatalogError::Timeout {
                    operation: "find_all".to_string(),
                },
                504,
            ),
            (
                CatalogError::Cancelled {
                    operation: "create_university".to_string(),
                },
                499,
            ),
            (CatalogError::Db("disk I/O error".to_string()), 500),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status().as_u16(), status);
        }
    }

    #[test]
    fn database_detail_is_not_exposed() {
        let error = ApiError::from(CatalogError::Db("near \"SELEC\": syntax error".to_string()));
        assert_eq!(error.code(), "DB_ERROR");
        assert!(!error.message.contains("SELEC"));
        assert!(error.details.is_empty());
    }

    #[test]
    fn parent_not_found_keeps_its_code() {
        let error = ApiError::from(CatalogError::ParentNotFound {
            resource: ResourceKind::Department,
            id: 9,
        });
        assert_eq!(error.code(), "PARENT_NOT_FOUND");
        assert_eq!(error.details.get("id"), Some(&Value::from(9_u64)));
    }
}
