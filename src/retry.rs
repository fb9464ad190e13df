//! Bounded retry with exponential backoff.
//!
//! Ingestion failures are retried a fixed number of times with a delay that
//! doubles per attempt. No jitter and no delay cap; the attempt bound alone
//! limits total wall time.

use crate::error::PipelineError;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Trait for errors that can be classified as retryable or not.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for PipelineError {
    fn is_retryable(&self) -> bool {
        match self {
            // Anything that can go wrong while talking to or validating the
            // remote source gets another attempt.
            PipelineError::Http(_) => true,
            PipelineError::Json(_) => true,
            PipelineError::Schema { .. } => true,
            // Local failures are permanent.
            PipelineError::Toml(_)
            | PipelineError::Io(_)
            | PipelineError::NoRawData(_)
            | PipelineError::Arrow(_)
            | PipelineError::Parquet(_) => false,
        }
    }
}

/// Attempt count and backoff schedule for one retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay inserted after the given 1-indexed failed attempt:
    /// `initial_backoff * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping between
/// attempts per the backoff schedule. Returns the last error as a value once
/// attempts are exhausted or a non-retryable error is seen.
pub async fn run_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let wait = policy.delay_for(attempt);
                warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                error!(error = %e, attempts = attempt, "Operation failed, giving up");
                return Err(e);
            }
        }
    }
}
