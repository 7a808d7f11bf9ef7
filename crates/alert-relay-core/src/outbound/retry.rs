//! # Retry Policy Module
//!
//! Exponential backoff policy for transient outbound delivery failures.
//!
//! Retries are a bounded iterative loop carrying an explicit attempt
//! counter; the retry count is a visible loop invariant, never recursion
//! depth.

use rand::Rng;
use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Examples
///
/// ```rust
/// use alert_relay_core::outbound::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: 3 retries, 1s base, 2.0x multiplier (1s, 2s, 4s).
/// let policy = RetryPolicy::default();
///
/// // Custom policy
/// let policy = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(30), 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial one.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0).
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays.
    ///
    /// Off by default: the 1s/2s/4s schedule is part of the delivery
    /// contract and observable in tests. Deployments fanning out to many
    /// endpoints behind one flaky receiver can enable it to desynchronize
    /// retries.
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (±).
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retry attempts after the initial one
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Cap applied to computed delays
    /// * `backoff_multiplier` - Exponential growth factor
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }

    /// Enable jitter with the given range (clamped to 0.0..=1.0).
    pub fn with_jitter(mut self, percent: f64) -> Self {
        self.use_jitter = true;
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate the delay before a given retry attempt.
    ///
    /// Uses `base_delay * multiplier^attempt`, capped at `max_delay`, with
    /// jitter applied when enabled.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Retry attempt number (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs)
    }

    /// Check whether another retry is allowed for this attempt number.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Current attempt number (0-based, where 0 is first retry)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Total delivery attempts including the initial one.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Apply random variation in `[delay * (1-jitter), delay * (1+jitter)]`.
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let mut rng = rand::thread_rng();
        let jitter_range = delay_secs * jitter_percent;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

/// State tracker for one delivery's retry loop.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry attempt (0-based).
    pub attempt: u32,

    /// Total attempts made so far (including the initial one).
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    /// Create new retry state at the initial attempt.
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    /// Advance to the next retry attempt.
    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Delay to wait before the next retry under `policy`.
    pub fn get_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.attempt)
    }

    /// Check whether `policy` allows another retry from this state.
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
