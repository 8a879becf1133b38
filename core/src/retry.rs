//! Bounded retry with jittered exponential backoff.
//!
//! Mutating engine operations wrap their storage call in a retry loop
//! that absorbs optimistic-lock conflicts. The backoff grows
//! exponentially but each sleep is drawn uniformly from
//! `[base, min(base · factor^attempt, max)]`, so concurrent losers on the
//! same lineage spread out instead of retrying in lockstep.

use rand::Rng;
use std::time::Duration;

/// Retry policy for optimistic-lock conflicts.
///
/// # Default values
///
/// - `max_attempts`: 5
/// - `base_delay`: 10 ms
/// - `max_delay`: 1 second
/// - `factor`: 2.0 (upper bound doubles each attempt)
///
/// # Examples
///
/// ```
/// use noncepool_core::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(3)
///     .base_delay(Duration::from_millis(5))
///     .build();
///
/// assert_eq!(policy.max_attempts(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl RetryPolicy {
    /// Create a policy with the default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
        }
    }

    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::new(),
        }
    }

    /// Maximum number of attempts before giving up.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw the sleep before the next attempt.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    /// The sleep is uniformly random in `[base, upper]` where
    /// `upper = min(base · factor^attempt, max)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        #[allow(clippy::cast_possible_wrap)]
        let upper = (base * self.factor.powi(attempt as i32)).min(self.max_delay.as_secs_f64());
        if upper <= base {
            return self.base_delay;
        }
        let jittered = rand::thread_rng().gen_range(base..=upper);
        Duration::from_secs_f64(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the base delay (lower bound of every sleep).
    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Set the cap on the sleep upper bound.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set the exponential growth factor.
    #[must_use]
    pub const fn factor(mut self, factor: f64) -> Self {
        self.policy.factor = factor;
        self
    }

    /// Build the policy.
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        self.policy
    }
}
