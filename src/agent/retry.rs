//! # Bounded Retry
//!
//! A single retry loop shared by transaction submission, confirmation polling,
//! HTTP fetches and chain/registry reads. Callers supply the attempt budget,
//! the pause between attempts and a classifier deciding what each error means.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::agent::types::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        multiplier: u32,
        max: Duration,
    },
}

impl Backoff {
    /// Pause after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
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
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }
}

/// What the classifier wants done with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Give up and surface the error.
    Stop,
    /// Try again straight away.
    Immediate,
    /// Try again after the policy's backoff.
    Backoff,
}

#[derive(Debug)]
pub enum RetryError<E> {
    Permanent { attempts: u32, error: E },
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. } | RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent { error, .. } => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Runs `op` until it succeeds, the classifier says stop, or the policy's
/// attempt budget is spent. `op` receives the 1-based attempt number.
pub async fn retry_bounded<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryClass,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let class = classify(&error);
        if class == RetryClass::Stop {
            return Err(RetryError::Permanent {
                attempts: attempt,
                error,
            });
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }
        if class == RetryClass::Backoff {
            let delay = policy.backoff.delay(attempt);
            debug!("attempt {}/{} failed, retrying in {:?}", attempt, max_attempts, delay);
            sleep(delay).await;
        }
    }
}

/// Retries a read while it fails with a transient error (rate limit,
/// timeout, transport) and surfaces anything else straight away.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    retry_bounded(
        policy,
        |e: &AgentError| {
            if e.is_transient() {
                RetryClass::Backoff
            } else {
                RetryClass::Stop
            }
        },
        |attempt| {
            let call = op();
            async move {
                let result = call.await;
                if let Err(e) = &result {
                    if e.is_transient() {
                        warn!("{} attempt {} failed: {}", what, attempt, e);
                    }
                }
                result
            }
        },
    )
    .await
    .map_err(RetryError::into_inner)
}
