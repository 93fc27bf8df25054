//! Retry policy with configurable inter-attempt backoff.
//!
//! Every transfer-level failure (network error, timeout, non-success HTTP
//! status, write error) counts as one attempt. The [`RetryPolicy`] bounds how
//! many retries follow the initial attempt and how long the loop waits
//! between them.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use downpour::download::{Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::new(5, Backoff::Exponential {
//!     base: Duration::from_secs(1),
//!     multiplier: 2.0,
//!     max: Duration::from_secs(32),
//! });
//! assert_eq!(policy.retries(), 5);
//! ```

use std::time::Duration;

use rand::Rng;

/// Default maximum retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between attempts (3 seconds).
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Maximum jitter added to exponential delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Strategy for spacing retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Wait a constant duration between attempts.
    Fixed(Duration),
    /// Exponential backoff with jitter.
    ///
    /// Delay for attempt `n` is `min(base * multiplier^(n-1), max)` plus up
    /// to 500ms of jitter to avoid thundering-herd retries.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Multiplier applied each attempt (typically 2.0 for doubling).
        multiplier: f64,
        /// Cap on the computed delay, before jitter.
        max: Duration,
    },
}

/// Configuration for how a download retries failed attempts.
///
/// # Default Values
///
/// - `retries`: 3 (so up to 4 attempts total)
/// - `backoff`: fixed 3-second delay between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    retries: u32,

    /// Spacing strategy between attempts.
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::Fixed(DEFAULT_RETRY_DELAY),
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with the given retry budget and backoff.
    #[must_use]
    pub fn new(retries: u32, backoff: Backoff) -> Self {
        Self { retries, backoff }
    }

    /// Creates a policy with a custom retry budget and the default backoff.
    #[must_use]
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Creates a policy that never retries and never waits.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            retries: 0,
            backoff: Backoff::None,
        }
    }

    /// Returns the configured number of retries.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns the configured backoff strategy.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Returns the maximum number of attempts (initial attempt plus retries).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Computes the delay before the retry that follows failed attempt
    /// number `attempt` (1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                // attempt is 1-indexed; the first retry waits the base delay.
                let exponent = f64::from(attempt.saturating_sub(1));
                let delay_ms = (base.as_millis() as f64) * multiplier.powf(exponent);
                let capped_ms = delay_ms.min(max.as_millis() as f64);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let capped = Duration::from_millis(capped_ms as u64);
                capped + jitter()
            }
        }
    }
}

/// Generates random jitter between 0 and [`MAX_JITTER`].
fn jitter() -> Duration {
    let mut rng = rand::thread_rng();
    #[allow(clippy::cast_possible_truncation)]
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}
