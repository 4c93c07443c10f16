// crates/exam-catalog-server/src/auth.rs
// ============================================================================
// Module: Bearer Authentication
// Description: Token authentication and read-only authorization.
// Purpose: Enforce fail-closed access control before handlers run.
// Dependencies: axum, subtle, exam-catalog-config
// ============================================================================

//! ## Overview
//! In `open` mode every request passes. In `bearer_token` mode a request
//! must carry `Authorization: Bearer <token>` matching a configured token;
//! read-only tokens may only issue safe methods. Token comparison is
//! constant-time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::Method;
use axum::http::header::AUTHORIZATION;
use exam_catalog_config::AuthConfig;
use exam_catalog_config::AuthMode;
use subtle::ConstantTimeEq;

use crate::error::ApiError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on an inspected `Authorization` header.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Access granted to an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads and writes.
    ReadWrite,
    /// Safe methods only.
    ReadOnly,
}

/// Bearer token policy built from configuration.
#[derive(Clone)]
pub struct AuthPolicy {
    /// Configured mode.
    mode: AuthMode,
    /// Read-write tokens.
    read_write: Vec<String>,
    /// Read-only tokens.
    read_only: Vec<String>,
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPolicy")
            .field("mode", &self.mode)
            .field("read_write_tokens", &self.read_write.len())
            .field("read_only_tokens", &self.read_only.len())
            .finish()
    }
}

impl AuthPolicy {
    /// Builds a policy from validated configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        let trimmed = |tokens: &[String]| tokens.iter().map(|t| t.trim().to_string()).collect();
        Self {
            mode: config.mode,
            read_write: trimmed(&config.bearer_tokens),
            read_only: trimmed(&config.read_only_tokens),
        }
    }

    /// Authenticates and authorizes one request.
    ///
    /// # Errors
    ///
    /// Returns 401 for missing or unknown tokens and 403 when a read-only
    /// token attempts a write.
    pub fn authorize(&self, method: &Method, headers: &HeaderMap) -> Result<Access, ApiError> {
        if self.mode == AuthMode::Open {
            return Ok(Access::ReadWrite);
        }
        let token = bearer_token(headers).ok_or_else(ApiError::unauthenticated)?;
        let access = if matches_any(&self.read_write, token) {
            Access::ReadWrite
        } else if matches_any(&self.read_only, token) {
            Access::ReadOnly
        } else {
            tracing::warn!(method = %method, "rejected unknown bearer token");
            return Err(ApiError::unauthenticated());
        };
        if access == Access::ReadOnly && !is_safe_method(method) {
            return Err(ApiError::forbidden("token is not permitted to modify the catalog"));
        }
        Ok(access)
    }
}

/// Returns true for methods that never mutate state.
pub(crate) fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Extracts the bearer credential from `Authorization`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?;
    if value.len() > MAX_AUTH_HEADER_BYTES {
        return None;
    }
    let value = value.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Compares `candidate` against every token without short-circuiting.
fn matches_any(tokens: &[String], candidate: &str) -> bool {
    tokens.iter().fold(false, |found, token| {
        let equal: bool = token.as_bytes().ct_eq(candidate.as_bytes()).into();
        found | equal
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Header fixtures are known-valid.")]

    use axum::http::HeaderValue;

    use super::*;

    fn policy() -> AuthPolicy {
        AuthPolicy::from_config(&AuthConfig {
            mode: AuthMode::BearerToken,
            bearer_tokens: vec!["writer".to_string()],
            read_only_tokens: vec!["reader".to_string()],
        })
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn open_mode_allows_everything() {
        let open = AuthPolicy::from_config(&AuthConfig::default());
        assert_eq!(open.authorize(&Method::DELETE, &HeaderMap::new()).unwrap(), Access::ReadWrite);
    }

    #[test]
    fn bearer_mode_distinguishes_missing_unknown_and_read_only() {
        let policy = policy();
        let missing = policy.authorize(&Method::GET, &HeaderMap::new()).unwrap_err();
        assert_eq!(missing.status().as_u16(), 401);
        let unknown = policy.authorize(&Method::GET, &headers("Bearer nobody")).unwrap_err();
        assert_eq!(unknown.status().as_u16(), 401);
        assert_eq!(
            policy.authorize(&Method::GET, &headers("Bearer reader")).unwrap(),
            Access::ReadOnly
        );
        let write = policy.authorize(&Method::POST, &headers("Bearer reader")).unwrap_err();
        assert_eq!(write.status().as_u16(), 403);
        assert_eq!(
            policy.authorize(&Method::PUT, &headers("bearer writer")).unwrap(),
            Access::ReadWrite
        );
    }

    #[test]
    fn non_bearer_schemes_are_rejected() {
        assert!(bearer_token(&headers("Basic d3JpdGVyOg==")).is_none());
        assert!(bearer_token(&headers("Bearer   ")).is_none());
    }
}
