//! Bounded retry with exponential backoff
//!
//! One [`RetryPolicy`] drives both the HTTP fetcher (async, sleeping on the
//! tokio timer) and the store's atomic replace step (blocking). Callers pass
//! a classifier deciding which errors are worth another attempt; anything
//! else fails immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// How the pause between attempts grows
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `unit * base^attempt`, capped
    Power {
        base: f64,
        unit: Duration,
        cap: Duration,
    },

    /// `initial * 2^(attempt - 1)`, capped
    Doubling { initial: Duration, cap: Duration },
}

impl Backoff {
    /// Pause after the given (1-based) failed attempt, before jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Power { base, unit, cap } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = unit.as_secs_f64() * base.powi(exponent);
                Duration::try_from_secs_f64(secs).unwrap_or(cap).min(cap)
            }
            Self::Doubling { initial, cap } => 2u32
                .checked_pow(attempt.saturating_sub(1))
                .and_then(|factor| initial.checked_mul(factor))
                .unwrap_or(cap)
                .min(cap),
        }
    }

    pub fn cap(&self) -> Duration {
        match *self {
            Self::Power { cap, .. } | Self::Doubling { cap, .. } => cap,
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error the classifier rejected
    Fatal { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// The last error observed
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Maximum attempts, backoff curve and jitter for a retried operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Upper bound of the uniform random pause added to each backoff
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// The pauses between consecutive attempts, without jitter
    ///
    /// There are `max_attempts - 1` of them: nothing sleeps after the final
    /// attempt.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(|attempt| self.backoff.delay(attempt))
    }

    /// Pause after a failed attempt, jitter included
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt) + self.random_jitter()
    }

    fn random_jitter(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Runs an async operation until it succeeds, fails fatally, or runs out
    /// of attempts
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Fatal { attempt, error });
                }
                Err(last) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                Err(_) => {
                    let pause = self.delay(attempt);
                    tracing::trace!("Attempt {} failed, retrying in {:?}", attempt, pause);
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Blocking counterpart of [`RetryPolicy::run`]
    pub fn run_blocking<T, E, F>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Fatal { attempt, error });
                }
                Err(last) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                Err(_) => {
                    let pause = self.delay(attempt);
                    tracing::trace!("Attempt {} failed, retrying in {:?}", attempt, pause);
                    std::thread::sleep(pause);
                    attempt += 1;
                }
            }
        }
    }
}
