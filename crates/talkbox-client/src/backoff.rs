//! Reconnection policy: attempt counting and delay calculation.
//!
//! The default is a fixed delay between attempts. Exponential backoff
//! follows the AWS "Full Jitter" strategy:
//! `delay = random(0, min(cap, base * 2^attempt))`.

use std::time::Duration;

use talkbox_config::{BackoffStrategy, ReconnectSection};

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// Exponential growth with full jitter.
    Exponential {
        /// Base delay in milliseconds.
        base_ms: u64,
        /// Maximum delay cap in milliseconds.
        max_ms: u64,
    },
}

impl Backoff {
    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base_ms, max_ms } => {
                let exp = base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
                let capped = exp.min(max_ms);
                let jittered = if capped == 0 {
                    0
                } else {
                    fastrand::u64(0..=capped)
                };
                Duration::from_millis(jittered)
            },
        }
    }
}

impl From<&ReconnectSection> for Backoff {
    fn from(section: &ReconnectSection) -> Self {
        match section.strategy {
            BackoffStrategy::Fixed => Self::Fixed(Duration::from_millis(section.delay_ms)),
            BackoffStrategy::Exponential => Self::Exponential {
                base_ms: section.delay_ms,
                max_ms: section.max_delay_ms,
            },
        }
    }
}

/// Counts reconnect attempts against a maximum.
///
/// `attempts` is reset to zero on every successful open. Once it reaches
/// `max_attempts` no further retry is scheduled.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
    backoff: Backoff,
}

impl ReconnectPolicy {
    /// Create a policy allowing `max_attempts` retries.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            backoff,
        }
    }

    /// Retries scheduled since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured retry limit.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether no further retry may be scheduled.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Claim the next retry, returning the delay to wait before it.
    ///
    /// Returns `None` once exhausted.
    pub fn next_retry(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.backoff.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(delay)
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Force exhaustion so no retry is scheduled.
    pub fn exhaust(&mut self) {
        self.attempts = self.max_attempts;
    }
}

impl From<&ReconnectSection> for ReconnectPolicy {
    fn from(section: &ReconnectSection) -> Self {
        Self::new(section.max_attempts, Backoff::from(section))
    }
}
