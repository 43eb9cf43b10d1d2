use std::time::Duration;

use async_trait::async_trait;

/// Exponential backoff: the delay before retry `n` (0-indexed) is `base * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base: Duration,
    max_retries: u32,
}

impl BackoffSchedule {
    #[must_use]
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay to wait before retry number `retry`.
    ///
    /// Saturates at `Duration::MAX` rather than overflowing.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Every delay in the schedule, first retry first.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|retry| self.delay_for(retry))
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.delays()
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Suspends the caller between connection attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
