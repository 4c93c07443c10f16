// crates/exam-catalog-core/src/runtime/retry.rs
// ============================================================================
// Module: Exam Catalog Retry Policy
// Description: Exponential backoff with jitter for transient store faults.
// Purpose: Retry deadlocks, serialization failures, and lock contention.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! A [`RetryPolicy`] is a plain value; each write creates a fresh
//! [`RetryHandle`] that yields the delay before the next attempt, or `None`
//! once the retry budget is spent. Delays start at the initial interval,
//! grow by the multiplier, are capped at the max interval, and are spread by
//! the randomization factor. The total elapsed time is capped as well; it is
//! the larger of wall-clock time since the start and the sum of delays
//! already granted, so a sequence stops at the cap even before it sleeps.
//!
//! Only store errors whose message mentions a transient condition are
//! retried; see [`is_retryable`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use rand::Rng;
use rand::thread_rng;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);
/// Default growth factor between retries.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Default cap on a single delay.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(2);
/// Default jitter fraction.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.1;
/// Default cap on total time spent retrying.
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(60);

/// Lowercase message fragments that mark a driver error as transient.
const RETRYABLE_MARKERS: [&str; 5] = ["deadlock", "serialization", "timeout", "lock", "connection"];

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    initial_interval: Duration,
    /// Growth factor between retries.
    multiplier: f64,
    /// Cap on a single delay.
    max_interval: Duration,
    /// Jitter fraction in `[0, 1]`.
    randomization_factor: f64,
    /// Cap on total elapsed time, measured from the first attempt.
    max_elapsed: Duration,
    /// Optional cap on the number of retries.
    max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_INITIAL_INTERVAL,
            DEFAULT_MULTIPLIER,
            DEFAULT_MAX_INTERVAL,
            DEFAULT_RANDOMIZATION_FACTOR,
            DEFAULT_MAX_ELAPSED,
        )
    }
}

impl RetryPolicy {
    /// Creates a policy; the multiplier is floored at 1 and the jitter
    /// fraction clamped into `[0, 1]`.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        randomization_factor: f64,
        max_elapsed: Duration,
    ) -> Self {
        Self {
            initial_interval,
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
            max_interval: max_interval.max(initial_interval),
            randomization_factor: if randomization_factor.is_finite() {
                randomization_factor.clamp(0.0, 1.0)
            } else {
                0.0
            },
            max_elapsed,
            max_retries: None,
        }
    }

    /// Returns a policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_retries(0)
    }

    /// Caps the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Returns the initial interval.
    #[must_use]
    pub const fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Returns the maximum interval.
    #[must_use]
    pub const fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Returns the elapsed-time cap.
    #[must_use]
    pub const fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Starts a retry sequence now.
    #[must_use]
    pub fn handle(&self) -> RetryHandle {
        self.handle_from(Instant::now())
    }

    /// Starts a retry sequence measured from `start`.
    #[must_use]
    pub fn handle_from(&self, start: Instant) -> RetryHandle {
        RetryHandle {
            policy: self.clone(),
            retries: 0,
            start,
            granted: Duration::ZERO,
        }
    }

    /// Returns the un-jittered delay before retry number `retry` (1-based).
    fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_interval)
    }

    /// Spreads a delay by the randomization factor.
    fn jittered(&self, delay: Duration) -> Duration {
        if delay.is_zero() || self.randomization_factor <= 0.0 {
            return delay;
        }
        let low = 1.0 - self.randomization_factor;
        let high = 1.0 + self.randomization_factor;
        let factor = thread_rng().gen_range(low..=high);
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }
}

/// In-flight retry sequence for one operation.
#[derive(Debug)]
pub struct RetryHandle {
    /// Policy being applied.
    policy: RetryPolicy,
    /// Retries granted so far.
    retries: u32,
    /// Start of the sequence.
    start: Instant,
    /// Sum of the delays granted so far.
    granted: Duration,
}

impl RetryHandle {
    /// Returns the delay before the next attempt, or `None` when the budget
    /// is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_retries
            && self.retries >= max
        {
            return None;
        }
        let next = self.retries.saturating_add(1);
        let delay = self.policy.jittered(self.policy.base_delay(next));
        let elapsed = self.start.elapsed().max(self.granted);
        match elapsed.checked_add(delay) {
            Some(total) if total <= self.policy.max_elapsed => {}
            _ => return None,
        }
        self.retries = next;
        self.granted = self.granted.saturating_add(delay);
        Some(delay)
    }

    /// Returns the number of retries granted so far.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Returns true when a store error is worth retrying.
#[must_use]
pub fn is_retryable(error: &StoreError) -> bool {
    match error {
        StoreError::Db(message) => is_retryable_message(message),
        _ => false,
    }
}

/// Returns true when a driver message names a transient condition.
#[must_use]
pub fn is_retryable_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

    use super::*;

    fn exact(max_elapsed: Duration) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(500),
            0.0,
            max_elapsed,
        )
    }

    #[test]
    fn delays_grow_geometrically_up_to_the_cap() {
        let mut handle = exact(Duration::from_secs(60)).handle();
        let delays: Vec<_> = (0..5).filter_map(|_| handle.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
        assert_eq!(handle.retries(), 5);
    }

    #[test]
    fn jitter_stays_within_the_randomization_band() {
        let policy = RetryPolicy::new(
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(2),
            0.1,
            Duration::from_secs(60),
        );
        for _ in 0..50 {
            let delay = policy.handle().next_delay().unwrap_or_default();
            assert!(delay >= Duration::from_millis(89) && delay <= Duration::from_millis(111));
        }
    }

    #[test]
    fn elapsed_cap_stops_retries() {
        let mut handle = exact(Duration::from_millis(250)).handle();
        assert_eq!(handle.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(handle.next_delay(), None);
    }

    #[test]
    fn elapsed_cap_counts_wall_clock_time_already_spent() {
        let start = Instant::now().checked_sub(Duration::from_millis(200)).unwrap();
        let mut handle = exact(Duration::from_millis(250)).handle_from(start);
        assert_eq!(handle.next_delay(), None);
        assert_eq!(handle.retries(), 0);
    }

    #[test]
    fn zero_retry_policy_never_grants_a_delay() {
        let mut handle = RetryPolicy::none().handle();
        assert_eq!(handle.next_delay(), None);
    }

    #[test]
    fn only_transient_db_messages_are_retryable() {
        assert!(is_retryable(&StoreError::Db("database is locked".to_string())));
        assert!(is_retryable(&StoreError::Db("Deadlock detected".to_string())));
        assert!(is_retryable(&StoreError::Db(
            "serialization failure: could not serialize access".to_string()
        )));
        assert!(is_retryable(&StoreError::Db("connection reset by peer".to_string())));
        assert!(!is_retryable(&StoreError::Db("syntax error".to_string())));
        assert!(!is_retryable(&StoreError::Timeout));
        assert!(!is_retryable(&StoreError::Invalid("lock".to_string())));
    }
}
