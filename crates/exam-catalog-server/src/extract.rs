// crates/exam-catalog-server/src/extract.rs
// ============================================================================
// Module: Request Extraction
// Description: JSON bodies, path ids, query strings, and request contexts.
// Purpose: Turn raw requests into typed input or a JSON error envelope.
// Dependencies: axum, serde_json, tokio-util, exam-catalog-core
// ============================================================================

//! ## Overview
//! Body extraction enforces the JSON content type (415) and the configured
//! size limit (413) before decoding. Path ids must be positive integers that
//! fit a signed 64-bit column.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::FromRequest;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use exam_catalog_core::DeleteMode;
use exam_catalog_core::OpContext;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;

use crate::error::ApiError;
use crate::server::AppState;

// ============================================================================
// SECTION: JSON Body
// ============================================================================

/// Decoded JSON request body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> FromRequest<Arc<AppState>> for JsonBody<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        if !is_json(&req) {
            return Err(ApiError::unsupported_media_type());
        }
        let limit = state.max_body_bytes;
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::payload_too_large(limit)
            } else {
                ApiError::invalid_input("failed to read request body")
            }
        })?;
        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|err| ApiError::invalid_input(format!("malformed json: {err}")))
    }
}

/// Returns true when the content type is `application/json`.
fn is_json(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Decodes a JSON object and reports whether `field` was present.
///
/// # Errors
///
/// Returns 400 when the value does not decode into `T`.
pub fn decode_with_presence<T: DeserializeOwned>(
    value: Value,
    field: &str,
) -> Result<(T, bool), ApiError> {
    let present = value.get(field).is_some();
    let decoded = serde_json::from_value(value)
        .map_err(|err| ApiError::invalid_input(format!("malformed json: {err}")))?;
    Ok((decoded, present))
}

// ============================================================================
// SECTION: Path and Query
// ============================================================================

/// Parses a path id into its typed wrapper.
///
/// # Errors
///
/// Returns 400 for non-numeric, zero, or out-of-range ids.
pub fn parse_id<T: From<u64>>(label: &str, raw: &str) -> Result<T, ApiError> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid_input(format!("{label} must be a positive integer")))?;
    checked_id(label, value)
}

/// Wraps a decoded id after the same range checks as [`parse_id`].
///
/// # Errors
///
/// Returns 400 for zero or ids beyond `i64::MAX`.
pub fn checked_id<T: From<u64>>(label: &str, value: u64) -> Result<T, ApiError> {
    if value == 0 || i64::try_from(value).is_err() {
        return Err(ApiError::invalid_input(format!("{label} is out of range")));
    }
    Ok(T::from(value))
}

/// Parses an optional numeric query parameter.
///
/// # Errors
///
/// Returns 400 when the value is not a number.
pub fn query_number<T: std::str::FromStr>(
    query: &BTreeMap<String, String>,
    name: &str,
) -> Result<Option<T>, ApiError> {
    query
        .get(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ApiError::invalid_input(format!("{name} must be a number")))
        })
        .transpose()
}

/// Reads `?soft=` into a delete mode.
///
/// # Errors
///
/// Returns 400 for values other than `true` or `false`.
pub fn delete_mode(query: &BTreeMap<String, String>) -> Result<DeleteMode, ApiError> {
    match query.get("soft").map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "") => Ok(DeleteMode::Hard),
        Some("true" | "1") => Ok(DeleteMode::Soft),
        Some(_) => Err(ApiError::invalid_input("soft must be true or false")),
    }
}

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request operation context cancelled when the handler is dropped.
///
/// Dropping the scope after the handler finished is harmless; dropping it
/// mid-request (client disconnect) stops in-flight store work.
pub struct RequestScope {
    /// Context handed to the service.
    ctx: OpContext,
    /// Cancels the context on drop.
    _guard: DropGuard,
}

impl RequestScope {
    /// Starts a scope with a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            ctx: OpContext::new(token, None),
            _guard: guard,
        }
    }

    /// Returns the operation context.
    #[must_use]
    pub const fn ctx(&self) -> &OpContext {
        &self.ctx
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Fixtures are known-valid.")]

    use exam_catalog_core::UniversityId;

    use super::*;

    #[test]
    fn ids_must_fit_signed_columns() {
        assert_eq!(parse_id::<UniversityId>("id", "42").unwrap(), UniversityId::new(42));
        for raw in ["0", "-1", "abc", "9223372036854775808"] {
            assert_eq!(parse_id::<UniversityId>("id", raw).unwrap_err().status().as_u16(), 400);
        }
        assert!(parse_id::<UniversityId>("id", "9223372036854775807").is_ok());
    }

    #[test]
    fn soft_flag_selects_delete_mode() {
        let mut query = BTreeMap::new();
        assert_eq!(delete_mode(&query).unwrap(), DeleteMode::Hard);
        query.insert("soft".to_string(), "true".to_string());
        assert_eq!(delete_mode(&query).unwrap(), DeleteMode::Soft);
        query.insert("soft".to_string(), "maybe".to_string());
        assert!(delete_mode(&query).is_err());
    }

    #[test]
    fn dropping_the_scope_cancels_its_context() {
        let scope = RequestScope::new();
        let ctx = scope.ctx().clone();
        assert!(!ctx.is_cancelled());
        drop(scope);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn presence_of_children_is_reported() {
        let value = serde_json::json!({ "name": "東京大学", "departments": [] });
        let (_, present): (exam_catalog_core::University, bool) =
            decode_with_presence(value, "departments").unwrap();
        assert!(present);
    }
}
