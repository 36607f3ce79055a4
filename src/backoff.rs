//! # Backoff policy for bus reconnects.
//!
//! [`BackoffPolicy`] controls how reconnect delays grow after repeated
//! connection failures. The delay for attempt `n` is `first × factor^n`,
//! clamped to `max`. The base delay is derived purely from the attempt number,
//! so a long outage never pushes delays past the cap.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use meteobridge::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::reconnect(Duration::from_secs(10));
//!
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(1), Duration::from_secs(2));
//! // 1s × 2^10 → capped at max=10s
//! assert_eq!(backoff.delay(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

/// First reconnect delay.
pub const RECONNECT_FIRST_DELAY: Duration = Duration::from_secs(1);

/// Growth factor between reconnect attempts.
pub const RECONNECT_FACTOR: f64 = 2.0;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Initial delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap for retries.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns a policy with `first = 1s`, `factor = 2.0`, `max = 60s`.
    fn default() -> Self {
        Self::reconnect(Duration::from_secs(60))
    }
}

impl BackoffPolicy {
    /// Exponential reconnect policy (1s, 2s, 4s, ...) capped at `max`.
    pub fn reconnect(max: Duration) -> Self {
        Self {
            first: RECONNECT_FIRST_DELAY,
            max,
            factor: RECONNECT_FACTOR,
        }
    }

    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// The result is never larger than [`BackoffPolicy::max`].
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let clamped_exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(clamped_exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_zero_returns_first() {
        let policy = BackoffPolicy::reconnect(Duration::from_secs(30));
        assert_eq!(policy.delay(0), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy::reconnect(Duration::from_secs(60));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_clamped_to_max() {
        let policy = BackoffPolicy::reconnect(Duration::from_secs(20));
        assert_eq!(policy.delay(5), Duration::from_secs(20));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(20));
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
        };
        assert_eq!(policy.delay(0), Duration::from_secs(5));
    }

    #[test]
    fn test_constant_factor() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 1.0,
        };
        for attempt in 0..10 {
            assert_eq!(
                policy.delay(attempt),
                Duration::from_millis(500),
                "attempt {} should be constant at 500ms",
                attempt
            );
        }
    }
}
