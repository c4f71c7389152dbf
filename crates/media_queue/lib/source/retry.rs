use std::future::Future;
use std::time::Duration;

/// Retry settings for page fetches against the archive API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

/// Last error seen by [`run_with_retry`] once it gives up.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub error: E,
    pub attempts: u32,
    /// True when the last error was still retryable and only the attempt budget ran out.
    pub budget_spent: bool,
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the budget runs out.
///
/// `key` seeds the jitter so concurrent callers with different keys spread out.
pub async fn run_with_retry<T, E, Op, Fut, Classify>(
    policy: &RetryPolicy,
    key: u64,
    mut op: Op,
    mut is_retryable: Classify,
) -> Result<(T, u32), RetryExhausted<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: FnMut(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => error,
        };

        let retryable = is_retryable(&error);
        if !retryable || attempt >= max_attempts {
            return Err(RetryExhausted {
                error,
                attempts: attempt,
                budget_spent: retryable,
            });
        }

        let delay = backoff_delay(policy, attempt, key);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

/// Exponential backoff capped at `max_backoff`, plus deterministic jitter in `[0, jitter]`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, key: u64) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let base = policy
        .initial_backoff
        .saturating_mul(1u32 << shift)
        .min(policy.max_backoff);

    let jitter_cap = policy.jitter.as_millis() as u64;
    let jitter_ms = if jitter_cap == 0 {
        0
    } else {
        mix(key, attempt) % (jitter_cap + 1)
    };

    base.saturating_add(Duration::from_millis(jitter_ms))
}

fn mix(key: u64, attempt: u32) -> u64 {
    let mut x = key ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
