//! Reconnection Policy
//!
//! Upstream feeds are retried after a fixed delay. Jitter spreads retries
//! of many streams that dropped together; the attempt cap gives up after a
//! run of consecutive failures. Out of the box: every three seconds,
//! forever, no jitter.

use std::time::Duration;

use rand::Rng;

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Shortest delay handed out once jitter is applied.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Reconnection tunables.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before each attempt.
    pub delay: Duration,
    /// Relative spread applied to `delay`, in `[0, 1]`. `0.25` draws from
    /// 75% to 125% of the delay.
    pub jitter_factor: f64,
    /// Consecutive failed attempts tolerated; `0` never gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Fixed delay, no jitter, unlimited attempts.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    const fn is_unlimited(&self) -> bool {
        self.max_attempts == 0
    }
}

/// Tracks consecutive attempts for one feed task.
///
/// ```rust
/// use std::time::Duration;
/// use tournament_gateway::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Start with no attempts recorded.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Count one more attempt and return how long to wait before it.
    ///
    /// `None` once the attempt cap is reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempts = self.attempts.saturating_add(1);
        Some(self.jittered())
    }

    /// Forget past failures; called once a connection is up.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.is_unlimited() || self.attempts < self.config.max_attempts
    }

    fn jittered(&self) -> Duration {
        let spread = self.config.jitter_factor.clamp(0.0, 1.0);
        if spread <= 0.0 {
            return self.config.delay;
        }

        let scale = 1.0 + rand::rng().random_range(-spread..=spread);
        self.config.delay.mul_f64(scale).max(MIN_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_retry_forever_every_three_seconds() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.max_attempts, 0);

        let mut policy = ReconnectPolicy::new(config);
        for _ in 0..500 {
            assert_eq!(policy.next_delay(), Some(DEFAULT_RECONNECT_DELAY));
        }
        assert_eq!(policy.attempt_count(), 500);
    }

    #[test]
    fn cap_stops_after_consecutive_failures() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::fixed(Duration::from_millis(5))
        });

        assert_eq!(
            std::iter::from_fn(|| policy.next_delay()).take(10).count(),
            3
        );
        assert!(!policy.should_retry());

        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_factor: 0.2,
            ..ReconnectConfig::fixed(Duration::from_millis(500))
        });

        for _ in 0..200 {
            let delay = policy.next_delay().unwrap();
            assert!(
                (Duration::from_millis(400)..=Duration::from_millis(600)).contains(&delay),
                "{delay:?}"
            );
        }
    }

    #[test]
    fn jitter_never_reaches_zero() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_factor: 1.0,
            ..ReconnectConfig::fixed(Duration::from_millis(2))
        });

        for _ in 0..200 {
            assert!(policy.next_delay().unwrap() >= MIN_DELAY);
        }
    }
}
