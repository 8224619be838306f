//! Retry policy with exponential backoff.
//!
//! One policy type is used for provider searches, downloads, narration
//! engines and whole-scene renders; each layer supplies its own limits.

use reel_media::JobContext;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics;

/// Longest server-requested wait honoured before a retry.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Classifies errors as worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Minimum wait the remote side asked for, e.g. from `Retry-After`.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Run `operation`, retrying errors that report themselves retryable.
    ///
    /// A server-requested wait longer than the backoff delay replaces it,
    /// up to one minute.
    pub async fn run<F, Fut, T, E>(
        &self,
        operation_name: &str,
        ctx: &JobContext,
        operation: F,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display + Retryable,
    {
        self.run_inner(
            operation_name,
            ctx,
            operation,
            |e: &E| e.is_retryable(),
            |e: &E| e.retry_after(),
        )
        .await
    }

    /// Run `operation`, retrying errors accepted by `retryable`.
    ///
    /// Backoff sleeps end early if the job is cancelled; the last error is
    /// returned in that case.
    pub async fn run_if<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        ctx: &JobContext,
        operation: F,
        retryable: P,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        self.run_inner(operation_name, ctx, operation, retryable, |_: &E| None)
            .await
    }

    async fn run_inner<F, Fut, T, E, P, H>(
        &self,
        operation_name: &str,
        ctx: &JobContext,
        mut operation: F,
        retryable: P,
        retry_after: H,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
        H: Fn(&E) -> Option<Duration>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(value) => return RetryResult::Success(value),
                Err(e) if attempt < max_attempts && retryable(&e) => {
                    let mut delay = self.delay_for_retry(attempt);
                    if let Some(requested) = retry_after(&e) {
                        delay = delay.max(requested.min(MAX_RETRY_AFTER));
                    }
                    debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    metrics::record_retry(operation_name);
                    if !ctx.sleep(delay).await {
                        return RetryResult::Failed { error: e, attempts: attempt };
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Giving up after retries"
                        );
                    }
                    return RetryResult::Failed { error: e, attempts: attempt };
                }
            }
        }
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed; `attempts` were made.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}
