//! Per-record retry state machine with exponential backoff.
//!
//! A record moves `Attempting(1) → Attempting(2) → …` on transient errors
//! and ends in exactly one [`Terminal`] state. Every attempt takes one
//! admission from the [`RateLimiter`] before it runs.

use std::time::Duration;

use crate::rate_limit::RateLimiter;

/// How a failed attempt affects the record and the run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying (timeouts, 5xx, quota)
    Transient,
    /// Record is done and failed; the run continues
    Permanent,
    /// The whole run must stop (bad credentials)
    Fatal,
}

/// Errors that know their retry class.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// Provider-supplied delay before the next attempt, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Backoff settings: `base_delay * factor^(attempt-1)`, capped by `max_delay`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.max(1.0).powi(exp);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        self.cap(delay)
    }

    /// Delay before the next attempt, preferring the provider's hint
    pub fn next_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => self.cap(hint),
            None => self.backoff(attempt),
        }
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// State of a record that is still being attempted.
#[derive(Debug)]
pub struct RetryState<E> {
    pub key: String,
    /// Attempt about to run, in `1..=max_attempts`
    pub attempt: u32,
    pub last_error: Option<E>,
    /// Sleep before `attempt` runs
    pub next_delay: Duration,
}

/// Final state of a record.
#[derive(Debug)]
pub enum Terminal<T, E> {
    Succeeded {
        value: T,
        attempts: u32,
    },
    /// Permanent error, or transient error on the last allowed attempt
    Failed {
        error: E,
        attempts: u32,
        exhausted: bool,
    },
    Fatal {
        error: E,
        attempts: u32,
    },
}

/// Result of feeding one attempt's outcome into the state machine
#[derive(Debug)]
pub enum Step<T, E> {
    Retry(RetryState<E>),
    Done(Terminal<T, E>),
}

impl<E: Classify> RetryState<E> {
    pub fn first(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attempt: 1,
            last_error: None,
            next_delay: Duration::ZERO,
        }
    }

    /// Transition on the outcome of the current attempt.
    pub fn advance<T>(mut self, result: Result<T, E>, policy: &RetryPolicy) -> Step<T, E> {
        let attempts = self.attempt;
        let error = match result {
            Ok(value) => return Step::Done(Terminal::Succeeded { value, attempts }),
            Err(e) => e,
        };
        match error.class() {
            ErrorClass::Fatal => Step::Done(Terminal::Fatal { error, attempts }),
            ErrorClass::Permanent => Step::Done(Terminal::Failed {
                error,
                attempts,
                exhausted: false,
            }),
            ErrorClass::Transient if attempts >= policy.max_attempts => {
                Step::Done(Terminal::Failed {
                    error,
                    attempts,
                    exhausted: true,
                })
            }
            ErrorClass::Transient => {
                self.next_delay = policy.next_delay(attempts, error.retry_after());
                self.attempt += 1;
                self.last_error = Some(error);
                Step::Retry(self)
            }
        }
    }
}

/// Drive one record to a terminal state.
///
/// Before every attempt (the first included) one admission is taken from
/// `limiter`. Between attempts the thread sleeps for the computed backoff.
pub fn retry_with_backoff<T, E>(
    key: &str,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
) -> Terminal<T, E>
where
    E: Classify + std::fmt::Display,
{
    let mut state = RetryState::first(key);
    loop {
        limiter.acquire();
        let result = attempt_fn(state.attempt);
        match state.advance(result, policy) {
            Step::Done(terminal) => {
                if let Terminal::Failed {
                    error,
                    attempts,
                    exhausted: true,
                } = &terminal
                {
                    log::warn!("{key}: giving up after {attempts} attempts: {error}");
                }
                return terminal;
            }
            Step::Retry(next) => {
                if let Some(e) = &next.last_error {
                    log::warn!(
                        "{key}: attempt {}/{} failed: {e}, retrying in {:.2}s",
                        next.attempt - 1,
                        policy.max_attempts,
                        next.next_delay.as_secs_f64()
                    );
                }
                std::thread::sleep(next.next_delay);
                state = next;
            }
        }
    }
}
