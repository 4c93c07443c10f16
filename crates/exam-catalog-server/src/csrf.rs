// crates/exam-catalog-server/src/csrf.rs
// ============================================================================
// Module: CSRF Tokens
// Description: Issues and verifies expiring anti-forgery tokens.
// Purpose: Require a server-issued token on every mutating request.
// Dependencies: base64, parking_lot, rand, exam-catalog-config
// ============================================================================

//! ## Overview
//! Tokens are random bytes encoded as unpadded URL-safe base64, held in a
//! bounded in-memory store until they expire. A token stays valid for
//! repeated use within its lifetime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::http::HeaderName;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use exam_catalog_config::CsrfConfig;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::ApiError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum live tokens kept in memory.
const MAX_LIVE_TOKENS: usize = 16_384;

// ============================================================================
// SECTION: Token Store
// ============================================================================

/// In-memory CSRF token store.
#[derive(Debug)]
pub struct CsrfGuard {
    /// Whether verification is enforced.
    enabled: bool,
    /// Header carrying the token.
    header: HeaderName,
    /// Random bytes per token.
    token_length: usize,
    /// Token lifetime.
    expiration: Duration,
    /// Live tokens and their expiry.
    tokens: Mutex<HashMap<String, Instant>>,
}

impl CsrfGuard {
    /// Builds a guard from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message when the header name is invalid.
    pub fn from_config(config: &CsrfConfig) -> Result<Self, String> {
        let header = HeaderName::from_bytes(config.header.trim().as_bytes())
            .map_err(|_| format!("invalid csrf header name: {}", config.header))?;
        Ok(Self {
            enabled: config.enabled,
            header,
            token_length: config.token_length,
            expiration: config.expiration,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// Returns true when mutating requests must carry a token.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the header name clients send the token in.
    #[must_use]
    pub const fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Issues a fresh token.
    #[must_use]
    pub fn issue(&self) -> String {
        let mut bytes = vec![0_u8; self.token_length];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let now = Instant::now();
        let expires = now.checked_add(self.expiration).unwrap_or(now);
        let mut tokens = self.tokens.lock();
        if tokens.len() >= MAX_LIVE_TOKENS {
            tokens.retain(|_, expiry| *expiry > now);
        }
        if tokens.len() >= MAX_LIVE_TOKENS
            && let Some(oldest) =
                tokens.iter().min_by_key(|(_, expiry)| **expiry).map(|(key, _)| key.clone())
        {
            tokens.remove(&oldest);
        }
        tokens.insert(token.clone(), expires);
        token
    }

    /// Verifies the token carried by `headers`.
    ///
    /// # Errors
    ///
    /// Returns 403 when the token is missing, unknown, or expired.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if !self.enabled {
            return Ok(());
        }
        let token = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(ApiError::csrf_rejected)?;
        let now = Instant::now();
        let mut tokens = self.tokens.lock();
        match tokens.get(token) {
            Some(expiry) if *expiry > now => Ok(()),
            Some(_) => {
                tokens.remove(token);
                Err(ApiError::csrf_rejected())
            }
            None => Err(ApiError::csrf_rejected()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Fixtures are known-valid.")]

    use axum::http::HeaderValue;

    use super::*;

    fn guard(expiration: Duration) -> CsrfGuard {
        CsrfGuard::from_config(&CsrfConfig {
            expiration,
            ..CsrfConfig::default()
        })
        .unwrap()
    }

    fn with_token(guard: &CsrfGuard, token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(guard.header().clone(), HeaderValue::from_str(token).unwrap());
        headers
    }

    #[test]
    fn issued_tokens_verify_repeatedly() {
        let guard = guard(Duration::from_secs(60));
        let token = guard.issue();
        assert_eq!(URL_SAFE_NO_PAD.decode(&token).unwrap().len(), 32);
        guard.verify(&with_token(&guard, &token)).unwrap();
        guard.verify(&with_token(&guard, &token)).unwrap();
    }

    #[test]
    fn missing_unknown_and_expired_tokens_are_rejected() {
        let guard = guard(Duration::ZERO);
        assert_eq!(guard.verify(&HeaderMap::new()).unwrap_err().status().as_u16(), 403);
        assert!(guard.verify(&with_token(&guard, "forged")).is_err());
        let token = guard.issue();
        assert!(guard.verify(&with_token(&guard, &token)).is_err());
    }

    #[test]
    fn disabled_guard_accepts_anything() {
        let guard = CsrfGuard::from_config(&CsrfConfig {
            enabled: false,
            ..CsrfConfig::default()
        })
        .unwrap();
        guard.verify(&HeaderMap::new()).unwrap();
    }
}
