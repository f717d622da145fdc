use std::{cmp::min, time::Duration};

/// Back-off between attempts of the same unit.
///
/// Linear: the n-th consecutive failure waits `(n - 1) * base_delay`,
/// capped at `max_delay`. The first retry is immediate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Retry immediately, always. Handy for tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub fn delay_for(&self, error_count: u32) -> Duration {
        let steps = error_count.saturating_sub(1);
        let delay = self
            .base_delay
            .checked_mul(steps)
            .unwrap_or(self.max_delay);
        min(delay, self.max_delay)
    }
}
