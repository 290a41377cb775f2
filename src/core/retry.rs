//! Retry executor for a single inference call.

use std::future::Future;

use tracing::warn;

use super::cancel::CancelToken;
use super::clock::Clock;
use super::pipeline::RetryPolicy;
use super::progress::Narrator;
use crate::adapters::InferenceError;

/// Why a retried call gave up
#[derive(Debug)]
pub enum RetryFailure {
    /// Every attempt failed with a transient error
    Exhausted { attempts: u32, last: InferenceError },

    /// A non-retryable error; no further attempts were made
    Fatal { attempt: u32, error: InferenceError },

    Cancelled,
}

/// Drives a call through the retry policy for one category.
pub struct Retrier<'a> {
    pub policy: &'a RetryPolicy,
    pub clock: &'a dyn Clock,
    pub cancel: &'a CancelToken,
}

impl<'a> Retrier<'a> {
    /// Run `call` until it succeeds, fails fatally, or attempts run out.
    ///
    /// A `retry` event is narrated before every backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        category: &str,
        narrator: &mut Narrator<'_>,
        mut call: F,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = self
                .cancel
                .run_until_cancelled(call())
                .await
                .map_err(|_| RetryFailure::Cancelled)?;

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(category, attempt, error = %error, "Inference failed permanently");
                return Err(RetryFailure::Fatal { attempt, error });
            }

            if !self.policy.should_retry(attempt) {
                warn!(category, attempt, error = %error, "Retries exhausted");
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.sample_delay(attempt);
            warn!(
                category,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Inference failed, retrying"
            );
            narrator.retry(category, attempt + 1, self.policy.max_attempts, delay);

            self.cancel
                .run_until_cancelled(self.clock.sleep(delay))
                .await
                .map_err(|_| RetryFailure::Cancelled)?;
        }
    }
}
