use crate::config::RunConfig;
use std::time::Duration;

/// Delay applied before a retry attempt
///
/// The first attempt never waits. Attempt `n >= 2` waits
/// `base * 2^(n - 2)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
}

impl RetryBackoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_run(run: &RunConfig) -> Self {
        Self::new(run.retry_backoff, run.retry_backoff_max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt < 2 || self.base.is_zero() {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow((attempt - 2).min(20));
        self.base.saturating_mul(factor).min(self.max)
    }
}
