use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{BotError, Result};

/// Fetch depths tried in order when mirroring a ref; `None` fetches full history.
pub const FETCH_DEPTHS: [Option<u32>; 5] = [Some(5), Some(10), Some(50), Some(100), None];

/// Largest multiplier of the pipeline-trigger backoff.
const TRIGGER_BACKOFF_CAP: u32 = 64;

/// Source of delays between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays without waiting.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Wait `unit * 2^(n-1)` before retry `n`, the multiplier never exceeding `cap`
    Doubling { unit: Duration, cap: u32 },
}

impl Backoff {
    /// Delay before the given retry (1-based); `None` when no wait is needed.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        match *self {
            Self::None => None,
            Self::Doubling { unit, cap } => {
                let multiplier = 1u32
                    .checked_shl(retry.saturating_sub(1))
                    .unwrap_or(cap)
                    .min(cap);
                Some(unit * multiplier)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Pipeline creation: one attempt plus a retry per doubling of 1..=64 seconds.
    pub fn pipeline_trigger() -> Self {
        Self {
            max_attempts: TRIGGER_BACKOFF_CAP.trailing_zeros() + 2,
            backoff: Backoff::Doubling {
                unit: Duration::from_secs(1),
                cap: TRIGGER_BACKOFF_CAP,
            },
        }
    }

    /// Ref mirroring: one attempt per entry of [`FETCH_DEPTHS`], no waiting.
    pub fn fetch_depths() -> Self {
        Self {
            max_attempts: FETCH_DEPTHS.len() as u32,
            backoff: Backoff::None,
        }
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects, or
    /// the attempts run out. `op` receives the zero-based attempt index.
    pub async fn run<T, F, Fut, R>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: F,
        retryable: R,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Fn(&BotError) -> bool,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            attempt += 1;
            if !retryable(&err) || attempt >= self.max_attempts {
                return Err(err);
            }

            warn!(
                "Attempt {}/{} failed: {}",
                attempt, self.max_attempts, err
            );
            if let Some(delay) = self.backoff.delay(attempt) {
                debug!("Waiting {}s before retrying", delay.as_secs());
                sleeper.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> BotError {
        BotError::TransientPipeline("502 Bad Gateway".to_string())
    }

    #[test]
    fn test_doubling_backoff_is_capped() {
        let backoff = Backoff::Doubling {
            unit: Duration::from_secs(1),
            cap: 64,
        };
        let delays: Vec<u64> = (1..=9)
            .map(|retry| backoff.delay(retry).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 64, 64]);
        assert_eq!(Backoff::None.delay(3), None);
    }

    #[test]
    fn test_first_success_needs_no_retry() {
        let sleeper = RecordingSleeper::new();
        let value = tokio_test::block_on(RetryPolicy::pipeline_trigger().run(
            &sleeper,
            |attempt| async move { Ok(attempt) },
            |_| true,
        ))
        .unwrap();

        assert_eq!(value, 0);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_trigger_retries_until_cap() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::pipeline_trigger()
            .run(
                &sleeper,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(transient()) }
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        let waited: Vec<u64> = sleeper.recorded().iter().map(Duration::as_secs).collect();
        assert_eq!(waited, vec![1, 2, 4, 8, 16, 32, 64]);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::pipeline_trigger()
            .run(
                &sleeper,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(BotError::Api {
                            status: 400,
                            message: "Missing CI config file".to_string(),
                        })
                    }
                },
                |err| !err.is_missing_ci_config(),
            )
            .await;

        assert!(result.unwrap_err().is_missing_ci_config());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_depths_pass_attempt_index_without_waiting() {
        let sleeper = RecordingSleeper::new();
        let seen = Mutex::new(Vec::new());

        let depth = RetryPolicy::fetch_depths()
            .run(
                &sleeper,
                |attempt| {
                    seen.lock().unwrap().push(FETCH_DEPTHS[attempt as usize]);
                    async move {
                        if attempt < 2 {
                            Err(transient())
                        } else {
                            Ok(FETCH_DEPTHS[attempt as usize])
                        }
                    }
                },
                |_| true,
            )
            .await
            .unwrap();

        assert_eq!(depth, Some(50));
        assert_eq!(*seen.lock().unwrap(), vec![Some(5), Some(10), Some(50)]);
        assert!(sleeper.recorded().is_empty());
    }
}
