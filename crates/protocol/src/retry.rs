//! Fixed-delay retry policy.

use std::time::Duration;

/// Bounded retry with a constant delay between attempts.
///
/// Attempts are numbered from 1. Tests use [`RetryPolicy::immediate`] to
/// avoid real waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    /// Delay before each attempt after the first.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Policy with no delay between attempts.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Client connect: 3 attempts, one second apart.
    pub const fn connect() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Client receive: consecutive timed-out reads tolerated before giving up.
    pub const fn receive() -> Self {
        Self::new(12, Duration::ZERO)
    }

    /// Server send: a full socket buffer is retried after a short pause.
    pub const fn send() -> Self {
        Self::new(500, Duration::from_millis(10))
    }

    /// Whether attempt number `attempt` (1-based) is within the budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts.max(1)
    }

    /// Delay to wait before attempt number `attempt`; zero for the first.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 { Duration::ZERO } else { self.delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::connect()
    }
}
