//! Shared exponential-backoff retry policy for all outbound HTTP (§4.3,
//! §5): base 30s, doubling, max 3 attempts by default, with jitter. This is
//! deliberately true exponential doubling (unlike a linear `base * attempt`
//! shortcut), since the spec calls that out explicitly.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Backoff before the `attempt`-th retry (1-indexed): `base * 2^(attempt-1)`,
    /// with up to 20% positive jitter so concurrent workers don't retry in lockstep.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1u64 << attempt.saturating_sub(1).min(16);
        let base_backoff = self.base.saturating_mul(multiplier as u32);
        let jitter_frac: f64 = rand::rng().random_range(0.0..0.2);
        base_backoff + base_backoff.mul_f64(jitter_frac)
    }

    /// 429-specific wait: the waiting time doubles with attempt index,
    /// honoring a provider-supplied `Retry-After` hint if present.
    pub fn quota_backoff(&self, attempt: u32, retry_after_hint: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after_hint {
            return hint;
        }
        self.backoff(attempt)
    }
}

/// Classifies an operation's error so the retry loop knows whether to
/// retry, and if so, after how long (honoring provider quota hints).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
    fn is_quota(&self) -> bool {
        false
    }
    fn retry_after_hint(&self) -> Option<Duration> {
        None
    }
}

/// Runs `op` until it succeeds, a non-retryable error occurs, or
/// `policy.max_attempts` attempts have been made. `op` receives the
/// 1-indexed attempt number.
pub async fn retry_with_policy<T, E, F, Fut>(policy: &RetryPolicy, service: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts || !err.is_retryable() => {
                warn!(service, attempt, error = %err, "giving up after retries");
                return Err(err);
            }
            Err(err) => {
                let wait = if err.is_quota() {
                    policy.quota_backoff(attempt, err.retry_after_hint())
                } else {
                    policy.backoff(attempt)
                };
                debug!(service, attempt, ?wait, error = %err, "retrying after backoff");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky {
        retryable: bool,
    }

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky error")
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(Duration::from_millis(100), 5);
        let b1 = policy.backoff(1).as_millis();
        let b2 = policy.backoff(2).as_millis();
        let b3 = policy.backoff(3).as_millis();
        assert!((100..=120).contains(&b1));
        assert!((200..=240).contains(&b2));
        assert!((400..=480).contains(&b3));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 3);
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_with_policy(&policy, "test", |attempt| {
            let calls = &calls;
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err(Flaky { retryable: true })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 3);
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_with_policy(&policy, "test", |_attempt| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky { retryable: false })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 3);
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_with_policy(&policy, "test", |_attempt| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky { retryable: true })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
