use std::time::Duration;

use crate::{
    foundation::error::{OracleError, RefitError, RefitResult},
    oracle::LayoutOracle,
};

/// Deadline and backoff schedule for oracle calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles after every further failure.
    pub base_delay: Duration,
    /// Wall-clock deadline of a single attempt.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Reject policies that can never succeed.
    pub fn validate(&self) -> RefitResult<()> {
        if self.max_attempts == 0 {
            return Err(RefitError::config("retry max_attempts must be >= 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(RefitError::config("retry request_timeout must be > 0"));
        }
        Ok(())
    }

    /// Sleep after failed attempt number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Successful oracle reply plus how many attempts it took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleReply {
    /// Raw reply text.
    pub text: String,
    /// Attempts used, `1..=max_attempts`.
    pub attempts: u32,
}

/// Call the oracle with a per-attempt deadline, retrying retryable failures with backoff.
///
/// Returns the last error once the attempt budget is spent. Fatal errors return immediately.
#[tracing::instrument(skip_all, fields(max_attempts = policy.max_attempts))]
pub async fn send_with_retry(
    oracle: &dyn LayoutOracle,
    prompt: &str,
    detection_png: &[u8],
    policy: &RetryPolicy,
) -> Result<OracleReply, OracleError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = tokio::time::timeout(
            policy.request_timeout,
            oracle.send_layout(prompt, detection_png),
        )
        .await
        .unwrap_or(Err(OracleError::Timeout(policy.request_timeout)));

        match outcome {
            Ok(text) => {
                tracing::debug!(attempt, bytes = text.len(), "oracle replied");
                return Ok(OracleReply {
                    text,
                    attempts: attempt,
                });
            }
            Err(err) if !err.is_retryable() => {
                tracing::warn!(attempt, error = %err, "oracle failed; not retrying");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::warn!(attempt, error = %err, "oracle retries exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "oracle attempt failed; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/oracle/retry.rs"]
mod tests;
