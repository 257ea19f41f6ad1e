//! # Retry Policy
//!
//! Decides, for each pending entry at drain time, whether it should be
//! replayed now, wait for its backoff to elapse, or be treated as a dead
//! letter.
//!
//! The default policy retries forever with no delay between drains. A
//! dead-letter threshold and exponential backoff are opt-in.
//!
//! ## Usage
//!
//! ```rust
//! use babysync::offline::retry::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default()
//!     .with_max_attempts(10)
//!     .with_backoff(BackoffStrategy::Exponential {
//!         base: Duration::from_secs(5),
//!         max: Duration::from_secs(300),
//!     });
//! assert_eq!(policy.delay_for(3), Duration::from_secs(20));
//! ```

use crate::offline::queue::PendingOperation;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Delay applied between failed attempts of one entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Every drain retries every entry
    #[default]
    None,
    /// Fixed interval between retries
    Fixed {
        interval: Duration,
    },
    /// `base * 2^(attempts - 1)`, capped at `max`
    Exponential {
        base: Duration,
        max: Duration,
    },
}

/// Outcome of consulting the policy for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Replay in this drain
    Ready,
    /// Still backing off until the given time
    Backoff { until: DateTime<Utc> },
    /// Attempt budget exhausted, never replayed again
    DeadLetter,
}

/// Retry policy for failed entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Attempts after which an entry becomes a dead letter
    pub max_attempts: Option<u32>,
    /// Delay between attempts
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Set the dead-letter threshold
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the backoff strategy
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether `op` used up its attempt budget
    pub fn is_dead_letter(&self, op: &PendingOperation) -> bool {
        self.max_attempts.is_some_and(|max| op.attempts >= max)
    }

    /// Delay owed after `attempts` failures
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        match &self.backoff {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Exponential { base, max } => {
                let exponent = (attempts - 1).min(31);
                base.saturating_mul(1u32 << exponent).min(*max)
            }
        }
    }

    /// Decide what a drain running at `now` should do with `op`
    pub fn decide(&self, op: &PendingOperation, now: DateTime<Utc>) -> RetryDecision {
        if self.is_dead_letter(op) {
            return RetryDecision::DeadLetter;
        }

        let delay = self.delay_for(op.attempts);
        match op.last_attempt_at {
            Some(last) if !delay.is_zero() => {
                // A delay past chrono's range backs off forever
                let until = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|delay| last.checked_add_signed(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if now < until {
                    RetryDecision::Backoff { until }
                } else {
                    RetryDecision::Ready
                }
            }
            _ => RetryDecision::Ready,
        }
    }
}
