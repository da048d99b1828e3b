use crate::core::error::{ErrorKind, MarketDataError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// When set, only errors of these kinds are retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<Vec<ErrorKind>>,
}

impl RetryPolicy {
    /// Policy for the primary provider.
    pub fn primary() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 2.0,
            retryable: None,
        }
    }

    /// Looser policy for the fallback provider: fewer attempts, longer delays.
    pub fn fallback() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
            retryable: None,
        }
    }

    fn is_retryable(&self, err: &MarketDataError) -> bool {
        self.retryable
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&err.kind()))
    }

    /// Delay to wait after `delay`, capped at `max_delay`. A product that is
    /// not a representable duration is capped too.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = delay.as_secs_f64() * self.backoff_multiplier.max(1.0);
        Duration::try_from_secs_f64(scaled).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// The sleeps performed between attempts when every attempt fails.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..self.max_attempts.max(1) {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::primary()
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// Attempts run one after another. The last error is returned once
/// `max_attempts` have failed, or immediately when the error kind is outside
/// the policy's allow-list.
pub async fn with_retry<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T, MarketDataError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay.min(policy.max_delay);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= max_attempts || !policy.is_retryable(&err) {
                    if attempt > 1 {
                        warn!("Giving up after attempt {}/{}: {}", attempt, max_attempts, err);
                    }
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt, max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
