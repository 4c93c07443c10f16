// crates/exam-catalog-server/src/rate_limit.rs
// ============================================================================
// Module: Rate Limiting
// Description: Fixed-window request budget per peer address.
// Purpose: Bound per-client request rates with bounded memory.
// Dependencies: parking_lot, exam-catalog-config
// ============================================================================

//! ## Overview
//! Each peer IP gets `max_requests` per window. The table of tracked peers is
//! capped; when it is full, expired windows are evicted first and a new peer
//! is refused if no room frees up.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use std::time::Instant;

use exam_catalog_config::RateLimitConfig;
use parking_lot::Mutex;

use crate::error::ApiError;

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Request count within the current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    /// Window start.
    started: Instant,
    /// Requests admitted so far.
    count: u32,
}

/// Fixed-window per-peer rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests per window.
    max_requests: u32,
    /// Window length.
    window: Duration,
    /// Maximum tracked peers.
    max_entries: usize,
    /// Windows by peer.
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    /// Builds a limiter from validated configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            max_entries: config.max_entries,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or refuses one request from `peer`.
    ///
    /// # Errors
    ///
    /// Returns 429 when the peer exhausted its window or the peer table is
    /// full.
    pub fn check(&self, peer: IpAddr) -> Result<(), ApiError> {
        self.check_at(peer, Instant::now())
    }

    /// Admission decision at an explicit instant.
    fn check_at(&self, peer: IpAddr, now: Instant) -> Result<(), ApiError> {
        let mut windows = self.windows.lock();
        if !windows.contains_key(&peer) && windows.len() >= self.max_entries {
            let window = self.window;
            windows.retain(|_, entry| now.saturating_duration_since(entry.started) < window);
            if windows.len() >= self.max_entries {
                tracing::warn!(tracked = windows.len(), "rate limiter peer table full");
                return Err(ApiError::rate_limited());
            }
        }
        let entry = windows.entry(peer).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.max_requests {
            tracing::debug!(peer = %peer, "rate limit exceeded");
            return Err(ApiError::rate_limited());
        }
        entry.count += 1;
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn limiter(max_requests: u32, max_entries: usize) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window: Duration::from_secs(1),
            max_entries,
        })
    }

    #[test]
    fn window_budget_resets_after_expiry() {
        let limiter = limiter(2, 8);
        let peer = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let start = Instant::now();
        assert!(limiter.check_at(peer, start).is_ok());
        assert!(limiter.check_at(peer, start).is_ok());
        assert_eq!(limiter.check_at(peer, start).map_err(|e| e.status().as_u16()), Err(429));
        assert!(limiter.check_at(peer, start + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn full_peer_table_refuses_new_peers_until_windows_expire() {
        let limiter = limiter(10, 1);
        let first = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let second = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let start = Instant::now();
        assert!(limiter.check_at(first, start).is_ok());
        assert!(limiter.check_at(second, start).is_err());
        assert!(limiter.check_at(second, start + Duration::from_secs(2)).is_ok());
    }
}
