use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::warn;

use crate::error::{Result, TrafficError};

/// How the pause between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * n` after the n-th failed attempt.
    Linear,
    /// `base * 2^(n-1)` after the n-th failed attempt.
    Exponential,
}

/// Bounded retry schedule for transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of calls, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff,
        }
    }

    /// Unbounded sequence of pauses, the n-th following the n-th failure.
    fn schedule(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let base = self.base_delay;
        match self.backoff {
            Backoff::Linear => Box::new((1u32..).map(move |n| base.saturating_mul(n))),
            // 2, 4, 8 ms steps scale the base by 1, 2, 4
            Backoff::Exponential => Box::new(ExponentialBackoff::from_millis(2).map(move |step| {
                let factor = u32::try_from(step.as_millis() / 2).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            })),
        }
    }

    /// Retry strategy with one pause per attempt after the first.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> + Send {
        let retries = self.max_attempts.max(1) as usize - 1;
        self.schedule().take(retries)
    }

    /// Pause to take after the `failed_attempt`-th attempt (1-based) failed.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let n = failed_attempt.max(1) as usize;
        self.schedule().nth(n - 1).unwrap_or(Duration::MAX)
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    ///
    /// The last underlying error is carried in the returned
    /// [`TrafficError::TransportFailure`].
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempts = AtomicU32::new(0);

        let action = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.delay_for(attempt);
            let call = op();
            async move {
                let result = call.await;
                if let Err(e) = &result {
                    if attempt < max_attempts {
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Request failed, retrying"
                        );
                    }
                }
                result
            }
        };

        Retry::spawn(self.strategy(), action).await.map_err(|e| {
            TrafficError::transport(attempts.load(Ordering::SeqCst), format!("{e:#}"))
        })
    }
}
