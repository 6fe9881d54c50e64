//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for upstream catalog
//! calls. When the catalog keeps failing, requests fail fast for a while
//! instead of piling retries on top of an outage.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::api_config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for upstream HTTP calls
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold exceeded, requests fail fast
/// - **Half-Open**: Reset timeout elapsed, the next request is let through
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use jcyl_bot::api_config::RecoveryConfig;
    /// use jcyl_bot::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// Check if the circuit is open (blocking requests)
    ///
    /// Resets to closed once the reset timeout has elapsed since the last
    /// recorded failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = state.last_failure_time {
                let reset_after = Duration::from_secs(self.config.circuit_breaker_reset_secs);
                if last_time.elapsed() < reset_after {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    /// Record a failed upstream call
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful upstream call, closing the circuit
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(RecoveryConfig {
            circuit_breaker_threshold: threshold,
            circuit_breaker_reset_secs: reset_secs,
            ..Default::default()
        })
    }

    #[test]
    fn test_circuit_breaker_initialization() {
        let circuit_breaker = breaker(2, 60);
        assert!(!circuit_breaker.is_open());
        assert_eq!(circuit_breaker.failure_count(), 0);
    }

    #[test]
    fn test_circuit_breaker_opens_at_threshold() {
        let circuit_breaker = breaker(2, 60);

        circuit_breaker.record_failure();
        assert!(!circuit_breaker.is_open());

        circuit_breaker.record_failure();
        assert!(circuit_breaker.is_open());
    }

    #[test]
    fn test_circuit_breaker_success_resets() {
        let circuit_breaker = breaker(2, 60);

        circuit_breaker.record_failure();
        circuit_breaker.record_failure();
        assert!(circuit_breaker.is_open());

        circuit_breaker.record_success();
        assert!(!circuit_breaker.is_open());
        assert_eq!(circuit_breaker.failure_count(), 0);
    }

    #[test]
    fn test_circuit_breaker_half_opens_after_timeout() {
        let circuit_breaker = breaker(1, 0);

        circuit_breaker.record_failure();
        // Zero reset timeout: the open window has already elapsed
        assert!(!circuit_breaker.is_open());
        assert_eq!(circuit_breaker.failure_count(), 0);
    }
}
