//! Retry utilities with exponential backoff for flaky page extractions.
//!
//! The loop is a small state machine:
//! `Attempting(1) → … → Attempting(n) → Succeeded | ExhaustedFailed`.
//! Under [`RetryPolicy::Unbounded`] the exhausted state is unreachable, so a
//! permanently broken operation never terminates; pick it only for supervised
//! runs.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{RetryPolicyKind, RetrySettings};

/// When to stop retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most `max_attempts` attempts in total, the first one included
    Bounded { max_attempts: u32 },
    /// Retry until the operation succeeds
    Unbounded,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub policy: RetryPolicy,
    /// Delay after the first failure; the fixed delay when unbounded
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        let policy = match settings.policy {
            RetryPolicyKind::Bounded => RetryPolicy::Bounded {
                max_attempts: settings.max_attempts.max(1),
            },
            RetryPolicyKind::Unbounded => RetryPolicy::Unbounded,
        };
        Self {
            policy,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

impl RetryConfig {
    /// Bounded policy with no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            policy: RetryPolicy::Bounded { max_attempts },
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy = RetryPolicy::Bounded {
            max_attempts: max_attempts.max(1),
        };
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.policy = RetryPolicy::Unbounded;
        self
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.policy {
            RetryPolicy::Bounded { max_attempts } => attempt <= max_attempts,
            RetryPolicy::Unbounded => true,
        }
    }

    /// Delay to wait after failed attempt number `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.policy {
            RetryPolicy::Unbounded => self.initial_delay,
            RetryPolicy::Bounded { .. } => {
                let exp = self.initial_delay.as_secs_f64()
                    * self.backoff_multiplier.powf(attempt.saturating_sub(1) as f64);
                Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()).max(0.0))
            }
        }
    }
}

/// Where a retried operation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to run attempt `n`
    Attempting(u32),
    Succeeded,
    ExhaustedFailed,
}

impl RetryState {
    /// Transition after the current attempt finished.
    pub fn next(self, succeeded: bool, config: &RetryConfig) -> RetryState {
        match self {
            RetryState::Attempting(_) if succeeded => RetryState::Succeeded,
            RetryState::Attempting(n) if config.allows(n.saturating_add(1)) => {
                RetryState::Attempting(n.saturating_add(1))
            }
            RetryState::Attempting(_) => RetryState::ExhaustedFailed,
            terminal => terminal,
        }
    }
}

/// Terminal failure of a retried operation
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("Exhausted retries after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E: fmt::Display> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Execute an async operation with retry logic
///
/// `operation` receives the 1-based attempt number and is re-invoked from
/// scratch after every failure, regardless of the error kind.
///
/// # Returns
///
/// The first successful value, or [`RetryError::Exhausted`] carrying the last
/// error once the bounded policy runs out of attempts.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;

    loop {
        let result = operation(attempt).await;

        match (RetryState::Attempting(attempt).next(result.is_ok(), config), result) {
            (_, Ok(value)) => {
                if attempt > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} failures",
                        attempt,
                        attempt - 1
                    );
                }
                return Ok(value);
            }
            (RetryState::Attempting(next), Err(error)) => {
                let delay = config.delay_after(attempt);
                tracing::debug!(
                    "Attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    error,
                    delay
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                attempt = next;
            }
            (_, Err(error)) => {
                tracing::warn!("Operation failed after {} attempts: {}", attempt, error);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
        }
    }
}
